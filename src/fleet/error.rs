//! Error types for the fleet orchestrator
//!
//! Domain errors use thiserror. Nothing below the binary's `main` exits the
//! process: every failure travels up as a [`FleetError`] and `main` performs
//! the single exit.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::command::CommandKind;

/// Top-level orchestrator error
#[derive(Debug, Error)]
pub enum FleetError {
    /// No command flags were supplied
    #[error("no commands requested")]
    NoCommands,

    /// A command prerequisite is not met by the resolved selection
    #[error("{command}: {message}")]
    Validation {
        /// Command whose prerequisite failed
        command: CommandKind,
        /// Description of the unmet requirement
        message: String,
    },

    /// The channel closed while a response was outstanding
    #[error("connection to master lost while waiting for {request}")]
    ConnectionLost {
        /// Operation type that was waiting
        request: String,
    },

    /// The master answered with a failure status
    #[error("master rejected {operation}: {message}")]
    Master {
        /// Operation type that failed
        operation: String,
        /// Failure reason reported by the master
        message: String,
    },

    /// The master answered with a payload we cannot interpret
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A project folder has no built artifact to upload
    #[error("no build artifact for {activity} under {folder}")]
    MissingArtifact {
        /// Activity name of the project
        activity: String,
        /// Project folder that was searched
        folder: PathBuf,
    },

    /// The external build program failed
    #[error("build failed for {folder}: {detail}")]
    Build {
        /// Project folder being built
        folder: PathBuf,
        /// Exit status or spawn error
        detail: String,
    },

    /// A command needing the master ran without a connection
    #[error("{0} requires a connection to the master")]
    NotConnected(CommandKind),

    /// Transport errors
    #[error("transport error: {0}")]
    Channel(#[from] ChannelError),

    /// Project discovery errors
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Configuration text errors
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Transport channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection could not be established
    #[error("could not open channel to {addr}: {detail}")]
    OpenFailed {
        /// Address that was dialled
        addr: String,
        /// Underlying failure
        detail: String,
    },

    /// A send was attempted on a channel that is not open
    #[error("channel is not open")]
    NotOpen,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Envelope encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Project discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A supplied search path does not exist
    #[error("path does not exist: {}{}", .path.display(), hint_suffix(.hint))]
    MissingPath {
        /// Path as supplied
        path: PathBuf,
        /// Suggestion when the argument looks like a misparsed flag
        hint: Option<String>,
    },

    /// A project descriptor could not be decoded
    #[error("invalid project descriptor {path}: {detail}")]
    InvalidDescriptor {
        /// Descriptor file
        path: PathBuf,
        /// Decoder message
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration text errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A non-empty line without `=`
    #[error("invalid property line {line}: {text:?}")]
    InvalidLine {
        /// 1-based line number
        line: usize,
        /// Offending text
        text: String,
    },

    /// A line with an empty key
    #[error("empty key on line {0}")]
    EmptyKey(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(" ({hint})"),
        None => String::new(),
    }
}

/// Result type using FleetError
pub type Result<T> = std::result::Result<T, FleetError>;

/// Convenience result alias for channel operations
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;
