//! `webby [PATH]` command implementation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::Args;
use tokio::net::TcpListener;
use webby_config::{CliSettings, Config};
use webby_server::{
    Manager, ManagerConfig, ServerRecord, SingleInstanceClient, manager_config_from_config,
    serve_control,
};

use crate::desktop::{ConsoleDesktop, Desktop};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for serving a path.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Directory or file to serve.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Path to configuration file (default: auto-discover webby.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Manager host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Manager control port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable live reload.
    #[arg(long)]
    no_live_reload: bool,

    /// Do not open the browser.
    #[arg(long)]
    no_open: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the manager fails, or the
    /// running instance rejects the handoff.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let desktop = ConsoleDesktop::new(!self.no_open);

        let cli_settings = CliSettings {
            host: self.host.clone(),
            port: self.port,
            live_reload_enabled: self.no_live_reload.then_some(false),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let manager_config = manager_config_from_config(&config);

        match TcpListener::bind((manager_config.host.as_str(), manager_config.port)).await {
            Ok(listener) => {
                run_manager(listener, manager_config, &self.path, &output, &desktop).await
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                hand_off(&manager_config, &self.path, &output, &desktop).await
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Become the manager: serve `path` and the control API until Ctrl-C.
async fn run_manager(
    listener: TcpListener,
    config: ManagerConfig,
    path: &Path,
    output: &Output,
    desktop: &impl Desktop,
) -> Result<(), CliError> {
    let live_reload = config.live_reload_enabled;
    let manager = Manager::start(config);
    let manager_url = format!("http://localhost:{}/", manager.port());

    let record = match manager.add_server(path).await {
        Ok((record, _)) => record,
        Err(e) => {
            manager.shutdown().await;
            return Err(e.into());
        }
    };

    output.success(&format!("Serving {} on {}", record.path.display(), record.url()));
    if let Some(ip) = manager.network_ip() {
        output.info(&format!("Network: http://{ip}:{}/", record.port));
    }
    output.info(&format!(
        "Live reload: {}",
        if live_reload { "enabled" } else { "disabled" }
    ));
    desktop.notify(
        "Webby started",
        "Open the manager page to see and stop running servers.",
    );
    desktop.on_activate(&manager_url);
    open(desktop, output, &record);

    serve_control(listener, manager, shutdown_signal()).await?;
    Ok(())
}

/// Ask the running manager to serve `path`.
async fn hand_off(
    config: &ManagerConfig,
    path: &Path,
    output: &Output,
    desktop: &impl Desktop,
) -> Result<(), CliError> {
    let path = std::path::absolute(path)?;
    let client = SingleInstanceClient::new(&config.host, config.port);

    let record = tokio::task::spawn_blocking(move || client.create_server(&path))
        .await
        .map_err(std::io::Error::other)??;

    open(desktop, output, &record);
    output.info("Server already open");
    output.info(&format!("Serving {} on {}", record.path.display(), record.url()));
    Ok(())
}

/// Open the requested file in the browser. Directories are not opened.
fn open(desktop: &impl Desktop, output: &Output, record: &ServerRecord) {
    if record.file.is_none() {
        return;
    }

    let url = record.open_url();
    if let Err(e) = desktop.open_url(&url) {
        output.warning(&format!("Could not open browser: {e}"));
        output.info(&format!("Open {url} manually"));
    }
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
