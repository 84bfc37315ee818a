mod activity_log;
mod alarm;
mod alert;
mod config;
mod display;
mod manager;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use crate::alarm::scheduler::{AlarmScheduler, InMemoryScheduler, now_unix_ms};
use crate::alert::{AlertSound, MutedAlert, TerminalBell};
use crate::config::{DemoConfig, DemoSettings, load_demo_config};
use crate::manager::{AlarmManager, CreatePolicy};

#[derive(Parser, Debug)]
#[command(
    name = "alarmdesk",
    version,
    about = "Interactive demo for scheduling, listing and cancelling named alarms"
)]
struct Cli {
    /// JSON file with settings and alarms to create at startup.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Track the alert without ringing the terminal bell.
    #[arg(long)]
    mute: bool,

    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long)]
    log_capacity: Option<usize>,

    #[arg(long)]
    refresh_timeout_ms: Option<u64>,

    /// Forward malformed create requests to the scheduler instead of rejecting them.
    #[arg(long)]
    permissive: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.config {
        Some(path) => load_demo_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DemoConfig::default(),
    };
    apply_cli_overrides(&cli, &mut config.settings)?;

    let alert: Box<dyn AlertSound> = if cli.mute {
        Box::new(MutedAlert::default())
    } else {
        Box::new(TerminalBell::new())
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_demo(config, alert))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_cli_overrides(cli: &Cli, settings: &mut DemoSettings) -> Result<()> {
    if let Some(tick_ms) = cli.tick_ms {
        if tick_ms == 0 {
            bail!("--tick-ms must be greater than zero");
        }
        settings.tick_ms = tick_ms;
    }
    if let Some(capacity) = cli.log_capacity {
        if capacity == 0 {
            bail!("--log-capacity must be greater than zero");
        }
        settings.log_capacity = Some(capacity);
    }
    if let Some(timeout_ms) = cli.refresh_timeout_ms {
        settings.refresh_timeout_ms = Some(timeout_ms);
    }
    if cli.permissive {
        settings.create_policy = CreatePolicy::Permissive;
    }
    Ok(())
}

async fn run_demo(config: DemoConfig, alert: Box<dyn AlertSound>) -> Result<()> {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let manager = Arc::new(AlarmManager::new(
        Arc::clone(&scheduler),
        alert,
        config.settings.manager_settings(),
    ));

    let listener = tokio::spawn({
        let manager = Arc::clone(&manager);
        let fired = scheduler.subscribe();
        async move { manager.listen(fired).await }
    });
    let clock = scheduler.spawn_clock(Duration::from_millis(config.settings.tick_ms));

    for seed in &config.alarms {
        manager
            .create_alarm(&seed.name, &seed.create_info(now_unix_ms()))
            .await;
    }
    manager.refresh_display().await;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let result = shell::run_shell(&manager, stdin, &mut stdout).await;

    clock.abort();
    listener.abort();
    result
}
