//! Export error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can end a single export cycle.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid export config: {0}")]
    InvalidConfig(String),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {address} after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("failed to write metrics: {0}")]
    Write(#[source] std::io::Error),

    #[error("timed out writing metrics after {timeout:?}")]
    WriteTimeout { timeout: Duration },
}

pub type ExportResult<T> = Result<T, ExportError>;
