//! LiveReload wire messages.
//!
//! Only the handshake and the reload command are implemented; every other
//! client command is accepted and ignored.

use serde::{Deserialize, Serialize};

/// Name reported to clients in the hello response.
pub(crate) const SERVER_NAME: &str = "Webby";

/// Protocols advertised in the hello response.
pub(crate) const PROTOCOLS: [&str; 5] = [
    "http://livereload.com/protocols/connection-check-1",
    "http://livereload.com/protocols/official-7",
    "http://livereload.com/protocols/official-8",
    "http://livereload.com/protocols/official-9",
    "http://livereload.com/protocols/2.x-origin-version-negotiation",
];

/// Any message sent by a client. Only `command` is inspected.
#[derive(Debug, Deserialize)]
pub(crate) struct ClientCommand {
    pub command: String,
}

impl ClientCommand {
    /// Parse a text frame, returning `None` for frames that are not JSON commands.
    pub(crate) fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text)
            .inspect_err(|e| tracing::debug!(error = %e, "Ignoring malformed live reload frame"))
            .ok()
    }

    pub(crate) fn is_hello(&self) -> bool {
        self.command == "hello"
    }
}

/// Handshake response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HelloMessage {
    command: &'static str,
    protocols: [&'static str; 5],
    server_name: &'static str,
}

impl HelloMessage {
    pub(crate) fn new() -> Self {
        Self {
            command: "hello",
            protocols: PROTOCOLS,
            server_name: SERVER_NAME,
        }
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Reload instruction broadcast when a watched file changes.
#[derive(Debug, Serialize)]
pub(crate) struct ReloadMessage<'a> {
    command: &'static str,
    path: &'a str,
    #[serde(rename = "liveCSS")]
    live_css: bool,
}

impl<'a> ReloadMessage<'a> {
    pub(crate) fn new(path: &'a str) -> Self {
        Self {
            command: "reload",
            path,
            live_css: true,
        }
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
