//! Startup-time error type
//!
//! Covers configuration loading and the file handling around it.
//! Store failures have their own taxonomy in the engine's record
//! store; API failures map to HTTP responses there too.

use thiserror::Error;

/// Result alias for startup and configuration paths
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parsed but failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}
