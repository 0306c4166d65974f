use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use toastd::config::ConfigManager;
use toastd::render::{LogRenderer, Renderer};
use toastd::scheduler::{self, timer, Scheduler};
use toastd::tracker::NotificationTracker;
use toastd::{protocol, LifecycleEvent, SchedulerCommand};

#[derive(Parser, Debug)]
#[command(name = "toastd", version, about = "Desktop notification daemon")]
struct Args {
    /// Path to the configuration file (created with defaults if missing)
    #[arg(long, env = "TOASTD_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config_manager =
        ConfigManager::new(args.config.clone()).context("failed to load configuration")?;
    let config = config_manager.config().clone();

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);
    let _file_guard = init_tracing(level, config.daemon.log_path.as_deref())?;

    info!(config = %config_manager.config_path().display(), "starting toastd");

    let (commands_tx, commands_rx) = flume::unbounded::<SchedulerCommand>();
    let (events_tx, events_rx) = flume::unbounded::<LifecycleEvent>();
    let (timer_tx, timer_rx) = flume::unbounded::<timer::TimerCmd>();

    let tracker = Arc::new(NotificationTracker::new());
    let renderer: Arc<dyn Renderer> = Arc::new(LogRenderer::new());
    let scheduler = Arc::new(Scheduler::new(
        renderer,
        tracker,
        config.display.clone(),
        events_tx,
        timer_tx,
    ));

    // Fatal if another daemon already owns the bus name.
    let connection = protocol::connect(commands_tx).await?;

    tokio::spawn(scheduler::run_dispatch(scheduler.clone(), commands_rx));
    tokio::spawn(timer::run_timer(scheduler.clone(), timer_rx));
    let emitter = tokio::spawn(protocol::run_signal_emitter(connection.clone(), events_rx));

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("received Ctrl+C, shutting down");
                break;
            }
            _ = hangup.recv() => {
                match config_manager.reload() {
                    Ok(()) => {
                        scheduler.apply_config(config_manager.config().display.clone());
                        info!("configuration reloaded");
                    }
                    Err(e) => error!("configuration reload failed: {e}"),
                }
            }
        }
    }

    // Dismiss everything still visible so clients see the closure signals
    // before the connection goes away.
    scheduler.close_all();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    emitter.abort();

    info!("toastd stopped");
    Ok(())
}

fn init_tracing(
    level: &str,
    log_path: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env()
        .add_directive(level.parse().unwrap_or_else(|_| tracing::Level::INFO.into()));

    if let Some(log_path) = log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create log directory")?;
        }
        let file_appender = tracing_appender::rolling::daily(
            log_path.parent().unwrap_or_else(|| std::path::Path::new(".")),
            log_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("toastd.log")),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        use tracing_subscriber::prelude::*;
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        Ok(None)
    }
}
