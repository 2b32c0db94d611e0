use std::path::PathBuf;

use thiserror::Error;

/// Failures the driver maps to specific exit codes.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Incorrect source_folder: {}", .0.display())]
    InvalidSource(PathBuf),

    #[error("Incorrect destination_folder: {}", .0.display())]
    InvalidDestination(PathBuf),

    #[error("invalid skip pattern: {pattern}")]
    InvalidSkipPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("invalid archive name template: {0:?}")]
    InvalidName(String),

    #[error("Failed to add {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving bytes from the file into the archive failed, on either side.
    #[error("Failed to add {}: {source}", .path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to add {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: async_zip::error::ZipError,
    },
}

impl BackupError {
    /// Process exit code for this failure. Path problems are usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            BackupError::InvalidSource(_) | BackupError::InvalidDestination(_) => 2,
            _ => 1,
        }
    }

    /// Whether the usage text should follow the message.
    pub fn wants_usage(&self) -> bool {
        matches!(
            self,
            BackupError::InvalidSource(_) | BackupError::InvalidDestination(_)
        )
    }
}
