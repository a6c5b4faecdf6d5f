use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use kuma_probe::{
    cli::cli_options_from_args,
    config::Config,
    console::Console,
    logging::init_tracing,
    probe::run_probe,
    recorder::EventRecorder,
    report::render_summary,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(target: "main", error = %format!("{err:#}"), "probe_failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let options = cli_options_from_args()?;
    let mut config = Config::load_or_default(&options.config_path, options.config_explicit)
        .with_context(|| format!("failed to load config from {}", options.config_path.display()))?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    options.apply_to(&mut config);

    let logging_guard = init_tracing(&config.logging).context("failed to initialize logging")?;
    tracing::info!(
        target: "main",
        run_id = %logging_guard.run_id(),
        log_dir = %logging_guard.log_dir().display(),
        base_url = %config.server.base_url,
        steps = config.plan.len(),
        "probe_starting"
    );

    let console = Console::stdout();
    let recorder = Arc::new(if config.echo_events {
        EventRecorder::with_echo(console.clone())
    } else {
        EventRecorder::new()
    });

    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone())?;

    let report = run_probe(&config, &console, recorder, shutdown).await?;
    console.line(render_summary(&report));

    if report.connection_lost.is_some() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn spawn_signal_watcher(shutdown: CancellationToken) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;

    tokio::spawn(async move {
        let signal_name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = shutdown.cancelled() => return,
        };
        tracing::warn!(target: "main", signal = signal_name, "shutdown_signal_received");
        eprintln!("received {signal_name}; stopping probe");
        shutdown.cancel();
    });
    Ok(())
}
