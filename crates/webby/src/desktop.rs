//! Desktop integration.
//!
//! Notifications, browser launch and the "open manager" action sit behind
//! [`Desktop`] so the serve command does not depend on a particular platform.

use std::io;
use std::process::{Command, Stdio};

use crate::output::Output;

/// Platform UI capabilities used by the CLI.
pub(crate) trait Desktop {
    /// Show a short notification.
    fn notify(&self, title: &str, body: &str);

    /// Open `url` in the default browser.
    fn open_url(&self, url: &str) -> io::Result<()>;

    /// Register the page opened when the user activates the application.
    fn on_activate(&self, url: &str);
}

/// Terminal-only desktop: notifications go to stderr and URLs are opened
/// with the platform's opener command.
pub(crate) struct ConsoleDesktop {
    output: Output,
    open_browser: bool,
}

impl ConsoleDesktop {
    pub(crate) fn new(open_browser: bool) -> Self {
        Self {
            output: Output::new(),
            open_browser,
        }
    }
}

impl Desktop for ConsoleDesktop {
    fn notify(&self, title: &str, body: &str) {
        self.output.highlight(title);
        self.output.info(body);
    }

    fn open_url(&self, url: &str) -> io::Result<()> {
        if !self.open_browser {
            return Ok(());
        }

        tracing::debug!(url, "Opening browser");
        opener_command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }

    fn on_activate(&self, url: &str) {
        self.output.info(&format!("Manager: {url}"));
    }
}

/// Command that opens `url` with the system default handler.
fn opener_command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(url);
        command
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }
}
