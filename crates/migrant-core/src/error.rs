use thiserror::Error;

/// Failures surfaced by a package catalog before or while running a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog is not initialized")]
    NotInitialized,

    #[error("invalid package id: {0}")]
    InvalidPackageId(String),

    #[error("invalid version format: {0}")]
    InvalidVersion(String),

    #[error("failed to start catalog command: {0}")]
    Spawn(String),

    #[error("Command timed out")]
    TimedOut,

    #[error("catalog command failed (exit code {exit_code}): {message}")]
    CommandFailed { exit_code: i32, message: String },
}
