//! aria2-host - Main entry point
//!
//! Launches an aria2 engine, submits the requested downloads and follows
//! them, including the downloads the engine generates on its own, until
//! every one has finished.

use anyhow::{anyhow, Context, Result};
use aria2_host::cli::config::Input;
use aria2_host::{
    reclaim_instance, CliArgs, Config, DownloadStats, EngineHost, EventBus, ProgressDisplay, Task, TaskEvent,
    TaskStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

/// Why the session loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    Faulted,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("aria2-host starting");
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args).context("Failed to read inputs")?;
    config.validate().context("Invalid configuration")?;

    let mut progress = ProgressDisplay::new(config.is_quiet());
    display_session_info(&config, &progress)?;

    if config.should_reclaim() {
        reclaim_previous(&config).await?;
    }

    let bus = EventBus::new(config.host.event_capacity);
    let mut events = bus.subscribe();
    let host = EngineHost::start(config.host.clone(), bus)
        .await
        .context("Failed to start engine")?;

    if let Some(reason) = host.fault_reason() {
        progress.print_error(&format!("Engine did not come up: {}", reason))?;
        host.stop().await;
        return Err(anyhow!("Engine did not come up: {}", reason));
    }
    info!(
        "Engine running on port {} (pid {})",
        host.port().unwrap_or_default(),
        host.pid().map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
    );

    let submitted = submit_inputs(&host, &config, &mut progress).await?;
    let outcome = if submitted == 0 {
        progress.print_error("No download could be submitted")?;
        Outcome::Faulted
    } else {
        run_session(&host, &mut events, &mut progress).await?
    };

    let tasks = host.graph().all_tasks().await;
    progress.print_summary(&tasks)?;
    let failed = host
        .graph()
        .top_level_tasks()
        .await
        .iter()
        .filter(|t| tree_failed(t))
        .count();

    match host.stop().await {
        Some(status) => debug!("Engine exited with {}", status),
        None => warn!("Engine exit status unknown"),
    }

    match outcome {
        Outcome::Finished if failed == 0 && submitted == config.inputs.len() => {
            info!("All downloads finished");
            Ok(())
        }
        Outcome::Finished => {
            let unsuccessful = failed + config.inputs.len() - submitted;
            Err(anyhow!("{} of {} downloads failed", unsuccessful, config.inputs.len()))
        }
        Outcome::Faulted => Err(anyhow!("Engine session failed")),
        Outcome::Interrupted => {
            info!("Interrupted; engine stopped");
            Ok(())
        }
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", level);
}

/// Display what this run is about to do
fn display_session_info(config: &Config, progress: &ProgressDisplay) -> Result<()> {
    if progress.is_quiet() {
        return Ok(());
    }

    println!("Downloads:");
    for input in &config.inputs {
        match input {
            Input::Magnet(info) => {
                println!("  magnet  {} ({})", info.label(), info.info_hash_hex());
            }
            Input::Torrent { path, meta } => println!(
                "  torrent {} ({}, {} files) from {}",
                meta.name,
                DownloadStats::format_bytes(meta.total_length),
                meta.file_count,
                path.display()
            ),
            Input::Uri(uri) => println!("  uri     {}", uri),
        }
    }
    println!();
    println!("Configuration:");
    println!("  Output directory: {}", config.host.download_dir.display());
    match config.host.port {
        Some(port) => println!("  RPC port: {}", port),
        None => println!("  RPC port: random"),
    }
    println!(
        "  Refresh interval: {}",
        DownloadStats::format_duration(config.host.refresh_interval)
    );
    println!();

    Ok(())
}

/// Free the port or pid left over from an earlier session
async fn reclaim_previous(config: &Config) -> Result<()> {
    let port = config.host.port.unwrap_or_default();
    let secret = config.host.secret.as_deref().unwrap_or_default();

    if reclaim_instance(port, secret, config.reclaim_pid).await {
        debug!("Previous engine instance reclaimed");
        Ok(())
    } else {
        Err(anyhow!("A previous engine instance still holds port {}", port))
    }
}

/// Submit every input; returns how many the engine accepted
async fn submit_inputs(host: &EngineHost, config: &Config, progress: &mut ProgressDisplay) -> Result<usize> {
    let mut submitted = 0;
    for input in &config.inputs {
        let source = input.source_in(&config.host.download_dir);
        match host.graph().add_top_level_task(source, None).await {
            Ok(task) => {
                progress.set_label(task.gid(), input.label());
                submitted += 1;
            }
            Err(e) => {
                error!("Failed to submit {}: {}", input.label(), e);
                progress.print_error(&format!("Failed to submit {}: {}", input.label(), e))?;
            }
        }
    }
    Ok(submitted)
}

/// Print events and progress until every download tree finished
async fn run_session(
    host: &EngineHost,
    events: &mut broadcast::Receiver<TaskEvent>,
    progress: &mut ProgressDisplay,
) -> Result<Outcome> {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => progress.handle_event(&event)?,
                Err(RecvError::Lagged(skipped)) => debug!("Display fell behind by {} events", skipped),
                Err(RecvError::Closed) => return Ok(Outcome::Faulted),
            },
            _ = ticker.tick() => {
                if host.is_faulted() {
                    return Ok(Outcome::Faulted);
                }
                let tasks = host.graph().all_tasks().await;
                progress.update(&tasks)?;

                let top_level = host.graph().top_level_tasks().await;
                if top_level.iter().all(|t| t.is_tree_finished()) {
                    return Ok(Outcome::Finished);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                progress.print_status("Interrupted, stopping engine...")?;
                return Ok(Outcome::Interrupted);
            },
        }
    }
}

/// Whether a download or anything generated from it ended in error
fn tree_failed(task: &Arc<Task>) -> bool {
    matches!(task.status(), TaskStatus::Error | TaskStatus::Removed) || task.followed_by().iter().any(tree_failed)
}
