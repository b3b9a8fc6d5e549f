//! # termlink-bridge
//!
//! Bridge server binary: spawn an agent CLI in a PTY, publish its screen to
//! TCP observers, and route their input back into the PTY.
//!
//! Attended by default: the operator's terminal shows the agent and stays
//! interactive while observers are connected. `--no-stdin` runs headless for
//! service deployments.

use std::sync::Arc;

use clap::Parser;
use crossterm::tty::IsTty;
use tokio::net::TcpListener;
use tracing::{error, info};

use termlink_bridge::{input, register, BridgeServer};
use termlink_core::{Config, SessionRegistry};

#[derive(Debug, Parser)]
#[command(name = "termlink-bridge", version, about)]
struct Cli {
    /// TCP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Command to run inside the PTY
    #[arg(long)]
    cmd: Option<String>,

    /// Project name to register under (defaults to the working directory name)
    #[arg(long)]
    project: Option<String>,

    /// Session registry directory
    #[arg(long)]
    registry_dir: Option<std::path::PathBuf>,

    /// Host address to advertise (defaults to the routed local address)
    #[arg(long)]
    host: Option<String>,

    /// Skip registry advertisement
    #[arg(long)]
    no_register: bool,

    /// Headless mode: do not forward the local keyboard or echo the screen
    #[arg(long)]
    no_stdin: bool,

    /// Configuration file (YAML)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Arguments passed to the wrapped command
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.bridge.port = port;
    }
    if let Some(cmd) = &cli.cmd {
        config.bridge.command = cmd.clone();
    }
    if let Some(dir) = &cli.registry_dir {
        config.registry.dir = dir.clone();
    }

    let attended = !cli.no_stdin && std::io::stdin().is_tty();

    let work_dir = std::env::current_dir()?;
    let project = cli.project.clone().unwrap_or_else(|| {
        work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bridge".to_string())
    });

    info!(
        "Starting bridge for '{}': {} on port {}",
        project, config.bridge.command, config.bridge.port
    );

    let server = BridgeServer::spawn(
        config.bridge.clone(),
        &cli.args,
        Some(work_dir.to_string_lossy().into_owned()),
        attended,
    )?;

    let listener = TcpListener::bind(("0.0.0.0", config.bridge.port)).await?;

    let registry = SessionRegistry::new(config.registry.dir.clone());
    if !cli.no_register {
        let host = cli.host.clone().unwrap_or_else(register::advertise_host);
        register::register(
            &registry,
            &project,
            &host,
            config.bridge.port,
            Some(work_dir.to_string_lossy().into_owned()),
        )?;
    }

    if attended {
        let stdin_server = Arc::clone(&server);
        std::thread::spawn(move || {
            if let Err(e) = input::run_stdin_pump(stdin_server) {
                error!("Keyboard pump failed: {}", e);
            }
        });
    }

    let result = server.serve(listener).await;

    if !cli.no_register {
        register::deregister(&registry, &project);
    }
    info!("Bridge for '{}' shut down", project);
    result.map_err(Into::into)
}
