//! End-to-end behaviour of the task event channel
//!
//! Registry, connection actor, decoder and reducer together over the
//! in-process mock transport.

use shared::{ConnectionState, Event, TaskId};
use task_channel::{
    ChannelConfig, MockEventSource, MockPlan, MockStep, RawFrame, UpdateCause, DEFAULT_LOG_CAPACITY,
};

mod common;
use common::{ChannelHarness, TestFixtures, TestHelpers};

/// Progress events reach the observer in emission order
#[tokio::test]
async fn test_progress_delivered_in_order() {
    let harness = ChannelHarness::new();
    let values: Vec<f64> = (1..=40).map(|n| n as f64 * 2.5).collect();
    let events: Vec<Event> = values.iter().map(|v| TestFixtures::progress_event(*v)).collect();
    harness.plan(MockPlan::Accept(TestFixtures::steps(&events)));

    let task = TestFixtures::task("t1");
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::collect_until(&mut rx, |u| TestHelpers::is_progress(u, 100.0)).await;

    assert_eq!(TestHelpers::progress_values(&updates), values);
    let state = harness.registry.state(&task).await.unwrap();
    assert_eq!(state.progress, Some(TestFixtures::progress(100.0)));
    harness.registry.reset().await;
}

/// The log buffer keeps exactly the most recent entries
#[tokio::test]
async fn test_log_buffer_keeps_most_recent() {
    let harness = ChannelHarness::new();
    let events: Vec<Event> = (0..75).map(TestFixtures::log_event).collect();
    harness.plan(MockPlan::Accept(TestFixtures::steps(&events)));

    let task = TestFixtures::task("t1");
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::collect_until(&mut rx, |u| {
        matches!(u.event(), Some(Event::Log { data }) if data.message == "log line 74")
    })
    .await;

    let logs = &updates.last().unwrap().state.logs;
    assert_eq!(logs.len(), DEFAULT_LOG_CAPACITY);
    let messages: Vec<String> = logs.iter().map(|e| e.message.clone()).collect();
    let expected: Vec<String> = (25..75).map(|n| format!("log line {n}")).collect();
    assert_eq!(messages, expected);
    assert_eq!(logs.evicted_count(), 25);
    harness.registry.reset().await;
}

/// Two observers of one task share a single connection
#[tokio::test]
async fn test_observers_share_connection() {
    let harness = ChannelHarness::new();
    let (plan, remote) = MockPlan::remote();
    harness.plan(plan);

    let task = TestFixtures::task("t1");
    let (_a, mut first) = harness.subscribe(&task).await;
    let (_b, mut second) = harness.subscribe(&task).await;
    TestHelpers::until_connection(&mut first, ConnectionState::Connected).await;

    remote.send_event(&TestFixtures::progress_event(10.0));
    TestHelpers::collect_until(&mut first, |u| TestHelpers::is_progress(u, 10.0)).await;
    TestHelpers::collect_until(&mut second, |u| TestHelpers::is_progress(u, 10.0)).await;

    assert_eq!(harness.transport.connect_attempts(), 1);
    assert_eq!(harness.transport.live_connections(), 1);
    assert_eq!(harness.registry.active_connections().await, 1);
    harness.registry.reset().await;
}

/// A late subscriber first sees the last-known snapshot
#[tokio::test]
async fn test_late_subscriber_catch_up() {
    let harness = ChannelHarness::new();
    let (plan, remote) = MockPlan::remote();
    harness.plan(plan);

    let task = TestFixtures::task("t1");
    let (_a, mut first) = harness.subscribe(&task).await;
    for n in 1..=5 {
        remote.send_event(&TestFixtures::progress_event(n as f64 * 10.0));
    }
    TestHelpers::collect_until(&mut first, |u| TestHelpers::is_progress(u, 50.0)).await;

    let (_b, mut second) = harness.subscribe(&task).await;
    let first_update = TestHelpers::collect_until(&mut second, |_| true).await.remove(0);

    assert_eq!(first_update.cause, UpdateCause::CatchUp);
    assert_eq!(first_update.state.progress, Some(TestFixtures::progress(50.0)));
    assert_eq!(first_update.state.connection, ConnectionState::Connected);
    harness.registry.reset().await;
}

/// Exhausting reconnect attempts ends in Failed with no actor left running
#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion() {
    let harness = ChannelHarness::with_config(ChannelConfig { reconnect_attempts: 2, ..TestFixtures::config() });
    harness.plan(MockPlan::Accept(vec![MockStep::Close]));

    let task = TestFixtures::task("t1");
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::until_connection(&mut rx, ConnectionState::Failed).await;

    let reconnecting = updates
        .iter()
        .filter(|u| u.cause == UpdateCause::Connection(ConnectionState::Reconnecting))
        .count();
    assert_eq!(reconnecting, 2);
    assert_eq!(harness.transport.connect_attempts(), 3);
    assert_eq!(harness.registry.stats().snapshot().reconnect_attempts, 2);

    let registry = harness.registry.clone();
    let task_ref = task.clone();
    assert!(TestHelpers::eventually(|| {
        let registry = registry.clone();
        let task = task_ref.clone();
        async move { registry.is_finished(&task).await == Some(true) }
    })
    .await);

    // Last-known data stays visible next to the failed status
    let state = harness.registry.state(&task).await.unwrap();
    assert_eq!(state.connection, ConnectionState::Failed);
    assert_eq!(state.last_error.as_deref(), Some("reconnect attempts exhausted"));
}

/// A feed that accepts and then drops every connection still runs out of attempts
#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_on_repeated_drops() {
    let harness = ChannelHarness::with_config(ChannelConfig { reconnect_attempts: 2, ..TestFixtures::config() });
    for _ in 0..6 {
        harness.plan(MockPlan::Accept(vec![MockStep::Fail("drop".to_string())]));
    }

    let task = TestFixtures::task("t1");
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::until_connection(&mut rx, ConnectionState::Failed).await;

    let reconnecting = updates
        .iter()
        .filter(|u| u.cause == UpdateCause::Connection(ConnectionState::Reconnecting))
        .count();
    assert_eq!(reconnecting, 2);
    assert_eq!(harness.transport.connect_attempts(), 3);

    let state = harness.registry.state(&task).await.unwrap();
    assert_eq!(state.epoch, 3);
    assert_eq!(state.last_error.as_deref(), Some("reconnect attempts exhausted"));
}

/// Unsubscribing twice is harmless
#[tokio::test]
async fn test_idempotent_unsubscribe() {
    let harness = ChannelHarness::new();
    harness.plan(MockPlan::Accept(vec![]));

    let task = TestFixtures::task("t1");
    let (subscription, _rx) = harness.subscribe(&task).await;
    subscription.unsubscribe().await;
    subscription.unsubscribe().await;

    assert_eq!(harness.registry.active_connections().await, 0);
    assert_eq!(harness.registry.subscriber_count(&task).await, 0);
    assert_eq!(harness.transport.live_connections(), 0);
}

/// Scripted lifecycle for "t1" in steps of 25
#[tokio::test]
async fn test_full_lifecycle_scenario() {
    let task = TestFixtures::task("t1");
    let mut source = MockEventSource::new(task.clone(), TestFixtures::mock_source(25.0, 42));
    let script = source.lifecycle_script();
    let mut steps = TestFixtures::steps(&script);
    steps.push(MockStep::Close);

    let harness = ChannelHarness::new();
    harness.plan(MockPlan::Accept(steps));
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::until_connection(&mut rx, ConnectionState::Closed).await;

    assert_eq!(TestHelpers::progress_values(&updates), vec![25.0, 50.0, 75.0, 100.0]);
    let kinds: Vec<&str> = updates.iter().filter_map(|u| u.event()).map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        ["connected", "progress", "log", "progress", "log", "progress", "log", "progress", "log", "complete", "disconnected"]
    );

    let state = &updates.last().unwrap().state;
    assert!(state.finished);
    assert_eq!(state.logs.len(), 4);
    let summary = state.summary.as_ref().unwrap();
    assert_eq!(summary.total_units, 1800);
    assert_eq!(summary.total_detections, summary.counts_by_category.values().sum::<u64>());
    assert_eq!(harness.transport.connect_attempts(), 1);
}

/// Live mock source on timers drives the same lifecycle
#[tokio::test(start_paused = true)]
async fn test_live_mock_source_lifecycle() {
    let config = ChannelConfig { mock: TestFixtures::mock_source(25.0, 7), ..TestFixtures::config() };
    let harness = ChannelHarness::with_config(config.clone());
    harness.plan(MockPlan::Source(config.mock.clone()));

    let task = TestFixtures::task("t1");
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::until_connection(&mut rx, ConnectionState::Closed).await;

    assert_eq!(TestHelpers::progress_values(&updates), vec![25.0, 50.0, 75.0, 100.0]);
    let state = &updates.last().unwrap().state;
    assert!(state.finished);
    assert_eq!(state.summary.as_ref().map(|s| s.duration_seconds), Some(0.4));
}

/// A malformed frame between two valid ones is dropped and counted
#[tokio::test]
async fn test_malformed_frame_tolerated() {
    let harness = ChannelHarness::new();
    harness.plan(MockPlan::Accept(vec![
        MockStep::event(&TestFixtures::progress_event(10.0)),
        MockStep::Frame(RawFrame::Text("{\"type\": \"progress\", \"data\": oops}".to_string())),
        MockStep::event(&TestFixtures::progress_event(20.0)),
    ]));

    let task = TestFixtures::task("t1");
    let (_subscription, mut rx) = harness.subscribe(&task).await;
    let updates = TestHelpers::collect_until(&mut rx, |u| TestHelpers::is_progress(u, 20.0)).await;

    assert_eq!(TestHelpers::progress_values(&updates), vec![10.0, 20.0]);
    assert_eq!(harness.registry.stats().decode_failures(), 1);
    assert_eq!(
        harness.registry.connection_state(&TaskId::from("t1")).await,
        Some(ConnectionState::Connected)
    );
    harness.registry.reset().await;
}
