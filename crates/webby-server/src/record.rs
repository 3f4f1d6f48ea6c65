//! Wire schema for file servers.
//!
//! Shared by the `/create-server` endpoint and the single-instance client.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// A running file server as reported over the control API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Monotonic id, unique within one manager process.
    pub id: u64,
    /// Port the file server listens on.
    pub port: u16,
    /// Canonical root directory.
    pub path: PathBuf,
    /// File name requested when the server was added for a file.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub file: Option<String>,
}

impl ServerRecord {
    /// Base URL of the file server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// URL to open in a browser: the opened file if any, else the root.
    #[must_use]
    pub fn open_url(&self) -> String {
        self.url_for(self.file.as_deref())
    }

    /// URL of `file` on this server, or of the root when `None`.
    #[must_use]
    pub fn url_for(&self, file: Option<&str>) -> String {
        match file {
            Some(file) => format!("{}/{file}", self.url()),
            None => format!("{}/", self.url()),
        }
    }
}

/// Older managers report a missing file as `""`.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
