//! CLI error types.

use webby_config::ConfigError;
use webby_server::{HandoffError, ServerError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("Could not hand off to running instance: {0}")]
    Handoff(#[from] HandoffError),
}
