use std::io;

use thiserror::Error;

/// Main error type for cpuprobe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Reading a kernel-exposed file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Report serialization failed
    #[error("Report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for cpuprobe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
