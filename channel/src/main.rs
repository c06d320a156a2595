//! Main entry point for the task monitor binary
//!
//! `watch` follows one task over the event channel; `start`, `stop` and
//! `restart` drive the task-control API.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;

use shared::{
    logging, task_debug, task_error, task_info, task_warn, Component, ConnectionState, Event, LogLevel, TaskAction,
    TaskId,
};
use task_channel::{
    ChannelConfig, ChannelUpdate, HttpTaskControl, SubscriptionRegistry, TaskControl, TransportKind, UpdateCause,
    COMPACT_LOG_LIMIT,
};

/// Watch and control tasks over the task event channel
#[derive(Parser)]
#[command(name = "task-monitor")]
#[command(about = "Streams task progress, logs and completion from a task feed")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Subscribe to a task and log its state until it finishes or the channel fails
    Watch(WatchArgs),
    /// Start a task
    Start(ControlArgs),
    /// Stop a running task
    Stop(ControlArgs),
    /// Restart a task
    Restart(ControlArgs),
}

#[derive(ClapArgs)]
pub struct WatchArgs {
    #[arg(long)]
    pub task_id: String,

    /// Feed URL, may contain {task_id} (overrides TASK_CHANNEL_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// Use the in-process mock event source instead of a WebSocket feed
    #[arg(long)]
    pub mock: bool,

    /// Seed for the mock event source
    #[arg(long)]
    pub seed: Option<u64>,

    /// Mock progress tick in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Only report the 20 most recent log lines at the end
    #[arg(long)]
    pub compact: bool,

    #[arg(long)]
    pub reconnect_attempts: Option<u32>,

    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(ClapArgs)]
pub struct ControlArgs {
    #[arg(long)]
    pub task_id: String,

    /// Base URL of the task API
    #[arg(long, default_value = "http://127.0.0.1:8765")]
    pub api_url: String,

    /// Bearer token (falls back to TASK_API_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = dotenv::dotenv();

    logging::init_tracing(Component::Monitor, Some(&args.log_level));

    match args.command {
        Command::Watch(watch_args) => watch(watch_args).await,
        Command::Start(control_args) => control(TaskAction::Start, control_args).await,
        Command::Stop(control_args) => control(TaskAction::Stop, control_args).await,
        Command::Restart(control_args) => control(TaskAction::Restart, control_args).await,
    }
}

fn build_config(args: &WatchArgs) -> anyhow::Result<ChannelConfig> {
    let mut config = ChannelConfig::from_env().context("loading TASK_CHANNEL_* settings")?;

    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if args.mock {
        config.transport = TransportKind::Mock;
    }
    if let Some(seed) = args.seed {
        config.mock.seed = Some(seed);
    }
    if let Some(tick_ms) = args.tick_ms {
        config.mock.tick_interval_ms = tick_ms;
    }
    if let Some(attempts) = args.reconnect_attempts {
        config.reconnect_attempts = attempts;
    }
    if let Some(delay) = args.reconnect_delay_ms {
        config.reconnect_delay_ms = delay;
        config.max_reconnect_delay_ms = config.max_reconnect_delay_ms.max(delay);
    }
    if let Some(timeout) = args.connect_timeout_ms {
        config.connect_timeout_ms = Some(timeout);
    }

    config.validate()?;
    Ok(config)
}

async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let task_id = TaskId::parse(&args.task_id)?;
    let config = build_config(&args)?;
    logging::log_startup(
        Component::Monitor,
        &format!("watching task {} via {:?} ({})", task_id, config.transport, config.endpoint_for(&task_id)),
    );

    let registry = SubscriptionRegistry::from_config(config)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<ChannelUpdate>();
    let subscription = registry.subscribe(task_id.clone(), Arc::new(tx)).await;

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last_state = None;
    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else { break };
                report(&update, args.compact);
                let terminal = update.state.connection.is_terminal();
                last_state = Some(Arc::clone(&update.state));
                if terminal {
                    break;
                }
            }
            _ = &mut shutdown => {
                logging::log_shutdown(Component::Monitor, "Received Ctrl+C signal");
                break;
            }
        }
    }

    subscription.unsubscribe().await;
    registry.reset().await;

    let stats = registry.stats().snapshot();
    task_debug!(
        task_id,
        frames = stats.frames_received,
        decode_failures = stats.decode_failures,
        reconnects = stats.reconnect_attempts,
        "Channel statistics"
    );

    let Some(state) = last_state else {
        return Ok(());
    };
    if args.compact {
        for entry in state.logs.recent(COMPACT_LOG_LIMIT).into_iter().rev() {
            task_info!(task_id, level = ?entry.level, "{}", entry.message);
        }
    }

    match state.connection {
        ConnectionState::Failed => bail!(
            "task {} feed failed: {}",
            task_id,
            state.last_error.as_deref().unwrap_or("unknown error")
        ),
        _ if state.finished => {
            logging::log_success(Component::Monitor, &format!("Task {} finished", task_id));
            Ok(())
        }
        _ => Ok(()),
    }
}

fn report(update: &ChannelUpdate, compact: bool) {
    let task_id = &update.task_id;
    match &update.cause {
        UpdateCause::CatchUp => {
            task_debug!(task_id, connection = %update.state.connection, "Attached to task channel");
        }
        UpdateCause::Connection(state) => {
            task_info!(task_id, epoch = update.state.epoch, "🔌 Connection {}", state);
        }
        UpdateCause::Event(Event::Progress { data }) => {
            task_info!(
                task_id,
                units = %format!("{}/{}", data.current_units, data.total_units),
                rate = %format!("{:.1}/s", data.rate),
                eta_seconds = data.eta_seconds.round() as u64,
                cpu = %format!("{:.0}%", data.cpu_usage),
                memory = %format!("{:.0}%", data.memory_usage),
                gpu = %format!("{:.0}%", data.gpu_usage),
                "📊 {:.1}%",
                data.progress
            );
            if update.state.progress_regressed {
                task_warn!(task_id, "Progress went backwards");
            }
        }
        UpdateCause::Event(Event::Log { data }) if !compact => match data.level {
            LogLevel::Error => {
                task_error!(task_id, "{}", data.message);
            }
            LogLevel::Warning => {
                task_warn!(task_id, "{}", data.message);
            }
            LogLevel::Info | LogLevel::Success => {
                task_info!(task_id, level = ?data.level, "{}", data.message);
            }
        },
        UpdateCause::Event(Event::Log { .. }) => {}
        UpdateCause::Event(Event::Complete { summary, .. }) => {
            task_info!(
                task_id,
                total_units = summary.total_units,
                detections = summary.total_detections,
                duration_seconds = summary.duration_seconds,
                average_rate = summary.average_rate,
                peak_memory = summary.peak_memory,
                peak_compute = summary.peak_compute,
                "🏁 Task complete"
            );
            let mut categories: Vec<_> = summary.counts_by_category.iter().collect();
            categories.sort();
            for (category, count) in categories {
                task_info!(task_id, "  {}: {}", category, count);
            }
        }
        UpdateCause::Event(Event::Error { error, .. }) => {
            task_error!(task_id, "❌ {}", error);
        }
        UpdateCause::Event(Event::Disconnected { reason, .. }) => {
            task_warn!(task_id, "Disconnected: {}", reason);
        }
        UpdateCause::Event(Event::Connected { timestamp, .. }) => {
            task_debug!(task_id, server_time = %timestamp, "Feed acknowledged subscription");
        }
    }
}

async fn control(action: TaskAction, args: ControlArgs) -> anyhow::Result<()> {
    let task_id = TaskId::parse(&args.task_id)?;
    let mut client = HttpTaskControl::new(&args.api_url)?;
    if let Some(token) = args.token.or_else(|| std::env::var("TASK_API_TOKEN").ok()) {
        client = client.with_token(token);
    }

    let response = client
        .execute(&task_id, action)
        .await
        .with_context(|| format!("{} {}", action, task_id))?;
    let message = response.message.unwrap_or_default();

    if !response.success {
        bail!("{} {} rejected: {}", action, task_id, message);
    }
    logging::log_success(Component::Monitor, &format!("{} {}: {}", action, task_id, message));
    Ok(())
}
