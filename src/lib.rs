//! fleetctl – command-line orchestration for a fleet of live activities
//!
//! This crate drives multi-step operations against live activities deployed
//! on remote controllers, coordinated by a central master:
//! - Project discovery over local search paths
//! - A persistent duplex channel to the master with request correlation
//! - Selection of target live activities from explicit or inferred references
//! - A fixed-order command pipeline with implied commands

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Fleet orchestration modules
pub mod fleet;

// Re-export key types for convenience
pub use fleet::{FleetConfig, Runner};

/// Current version of fleetctl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
