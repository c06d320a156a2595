//! Test helpers for channel service tests

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use shared::{ConnectionState, Event};
use crate::core::ChannelState;
use crate::services::ConnectionHandle;
use crate::traits::Observer;
use crate::types::{ChannelUpdate, UpdateCause};

const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// Observer that forwards every update into a channel
pub fn recorder() -> (Arc<dyn Observer>, mpsc::UnboundedReceiver<ChannelUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

/// Wait until the handle publishes the given connection state
pub async fn wait_for_connection(handle: &ConnectionHandle, expected: ConnectionState) -> Arc<ChannelState> {
    let mut rx = handle.watch();
    let state = timeout(WAIT_LIMIT, rx.wait_for(|state| state.connection == expected))
        .await
        .expect("timed out waiting for connection state")
        .expect("connection actor dropped its state");
    Arc::clone(&state)
}

/// Wait until the actor has stopped
pub async fn wait_for_finish(handle: &ConnectionHandle) {
    for _ in 0..1000 {
        if handle.is_finished() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection actor did not finish");
}

/// Collect updates until `done` matches one (inclusive)
pub async fn collect_until<F>(rx: &mut mpsc::UnboundedReceiver<ChannelUpdate>, mut done: F) -> Vec<ChannelUpdate>
where
    F: FnMut(&ChannelUpdate) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let update = timeout(WAIT_LIMIT, rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("observer channel closed");
        let stop = done(&update);
        seen.push(update);
        if stop {
            return seen;
        }
    }
}

pub fn events(updates: &[ChannelUpdate]) -> Vec<Event> {
    updates.iter().filter_map(|update| update.event().cloned()).collect()
}

pub fn progress_values(updates: &[ChannelUpdate]) -> Vec<f64> {
    events(updates)
        .into_iter()
        .filter_map(|event| match event {
            Event::Progress { data } => Some(data.progress),
            _ => None,
        })
        .collect()
}

pub fn connection_changes(updates: &[ChannelUpdate]) -> Vec<ConnectionState> {
    updates
        .iter()
        .filter_map(|update| match update.cause {
            UpdateCause::Connection(state) => Some(state),
            _ => None,
        })
        .collect()
}

pub fn is_connection(update: &ChannelUpdate, expected: ConnectionState) -> bool {
    update.cause == UpdateCause::Connection(expected)
}

pub fn is_progress(update: &ChannelUpdate, value: f64) -> bool {
    matches!(update.event(), Some(Event::Progress { data }) if data.progress == value)
}
