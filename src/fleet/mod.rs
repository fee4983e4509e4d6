//! Fleet orchestration and public API
//!
//! This module wires together discovery, the master connection, selection,
//! and the command pipeline, and holds the run-wide [`FleetConfig`].

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// Submodules
pub mod channel;
pub mod command;
pub mod discovery;
pub mod error;
pub mod master;
pub mod model;
pub mod runner;
pub mod selection;
pub mod settings;

pub use error::{FleetError, Result};
pub use runner::Runner;

/// Run-wide configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Master host name
    pub host: String,

    /// Master port
    pub port: u16,

    /// Program invoked by the build command with a project folder argument
    pub build_program: String,

    /// Milliseconds to wait after the status probe before re-listing the fleet
    pub settle_delay_ms: u64,

    /// Give up waiting for a response after this many milliseconds (none: wait forever)
    pub response_timeout_ms: Option<u64>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8090,
            build_program: "isbuild".to_string(),
            settle_delay_ms: 2000,
            response_timeout_ms: None,
        }
    }
}

impl FleetConfig {
    /// Load configuration from a JSON settings file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let config: FleetConfig =
            serde_json::from_slice(&data).context("Failed to deserialize settings")?;
        Ok(config)
    }

    /// Address of the master as `host:port`
    pub fn master_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Delay between the status probe and the re-listing
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Bound on waiting for a single response, if any
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}
