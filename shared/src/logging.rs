//! Shared logging utilities for consistent tracing across components

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::types::Component;

/// Filter directive for a component at the given base level
pub fn filter_for(component: Component, base_level: &str) -> String {
    match component {
        Component::Monitor => {
            format!("task_channel={base_level},task_monitor={base_level},shared={base_level},tungstenite=warn,reqwest=warn")
        }
        Component::FeedServer => {
            format!("feedserver={base_level},task_feed_server={base_level},task_channel={base_level},shared={base_level},tower_http={base_level},axum={base_level}")
        }
    }
}

/// Initialize the tracing subscriber for a component
///
/// `RUST_LOG` wins over the component defaults when it is set. Calling this
/// twice is harmless; the second subscriber is ignored.
pub fn init_tracing(component: Component, log_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt};

    let base_level = log_level.unwrap_or("info");
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_for(component, base_level)));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Task-aware info logging
#[macro_export]
macro_rules! task_info {
    ($task_id:expr, $($arg:tt)*) => {
        tracing::info!(
            task = %$task_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Task-aware warning logging
#[macro_export]
macro_rules! task_warn {
    ($task_id:expr, $($arg:tt)*) => {
        tracing::warn!(
            task = %$task_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Task-aware error logging
#[macro_export]
macro_rules! task_error {
    ($task_id:expr, $($arg:tt)*) => {
        tracing::error!(
            task = %$task_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Task-aware debug logging
#[macro_export]
macro_rules! task_debug {
    ($task_id:expr, $($arg:tt)*) => {
        tracing::debug!(
            task = %$task_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: Component, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: Component, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: Component, message: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
