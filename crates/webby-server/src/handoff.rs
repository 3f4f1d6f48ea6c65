//! Single-instance handoff.
//!
//! When the control port is already owned by a running manager, a second
//! invocation asks that manager to serve its path instead of starting its own.

use std::path::Path;
use std::time::Duration;

use ureq::Agent;

use crate::record::ServerRecord;

/// Timeout for a handoff request.
const DEFAULT_TIMEOUT: u64 = 10;

/// Handoff error.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// Transport failure talking to the running manager.
    #[error("Request to running instance failed: {0}")]
    Request(#[from] ureq::Error),

    /// The running manager refused the request.
    #[error("Running instance returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response was not a server record.
    #[error("Invalid response from running instance: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request path cannot be sent as a form field.
    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(std::path::PathBuf),
}

/// Client for the control API of a running manager.
pub struct SingleInstanceClient {
    agent: Agent,
    base_url: String,
}

impl SingleInstanceClient {
    /// Create a client for the manager on `host:port`.
    ///
    /// A wildcard bind address is contacted over loopback.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        let host = match host {
            "0.0.0.0" | "" => "127.0.0.1",
            "::" => "[::1]",
            other => other,
        };

        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: format!("http://{host}:{port}"),
        }
    }

    /// Ask the running manager to serve `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError`] on transport failure, a non-success status,
    /// or an undecodable body.
    pub fn create_server(&self, path: &Path) -> Result<ServerRecord, HandoffError> {
        let root_path = path
            .to_str()
            .ok_or_else(|| HandoffError::NonUtf8Path(path.to_path_buf()))?;
        let url = format!("{}/create-server", self.base_url);

        tracing::debug!(url = %url, path = root_path, "Handing off to running instance");
        let response = self.agent.post(&url).send_form([("root_path", root_path)])?;

        let status = response.status().as_u16();
        let body = response.into_body().read_to_string()?;

        if !(200..300).contains(&status) {
            return Err(HandoffError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
