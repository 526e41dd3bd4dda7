//! fpsim - virtual fingerprint sensor shell
//!
//! Reads commands from stdin, one per line, and prints every session event
//! to stdout as a JSON line. Logs go to stderr.

mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use fpsim_core::{Config, SessionEvent};
use fpsim_engine::{SessionCallback, VirtualFingerprint};
use fpsim_hal::NullModuleLoader;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shell::{Flow, Shell};

/// Virtual fingerprint sensor
#[derive(Parser)]
#[command(name = "fpsim")]
#[command(about = "Simulated fingerprint sensor driven by configuration")]
#[command(version)]
struct Cli {
    /// JSON object of configuration overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Configuration override, applied after --config
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// User id of the initial session
    #[arg(long, default_value_t = 0)]
    user_id: i32,

    /// Print the sensor props as JSON and exit
    #[arg(long)]
    props: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fpsim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let service = VirtualFingerprint::new(Arc::new(config), &NullModuleLoader);
    if cli.props {
        println!("{}", serde_json::to_string_pretty(&service.sensor_props())?);
        return Ok(());
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));
    let callback: Arc<dyn SessionCallback> = Arc::new(tx);

    let mut shell = Shell::new(service, cli.user_id, callback)?;
    info!("Ready, type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match shell::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("error: {e:#}");
                continue;
            }
        };

        match shell.execute(command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("error: {e:#}"),
        }
    }

    shell.close().await;
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        error!("Event printer did not finish");
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::new(),
    };

    for assignment in &cli.overrides {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("expected KEY=VALUE, got {assignment:?}");
        };
        config
            .set_str(key.trim(), value.trim())
            .with_context(|| format!("applying --set {assignment}"))?;
    }
    Ok(config)
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to encode event: {}", e),
        }
    }
}
