//! Connection manager
//!
//! Owns the socket lifecycle of one task: connect, subscribe, heartbeat,
//! reconnect with backoff, close. Each task connection runs as a single-owner
//! actor; frames, timers and observer commands are serialized through its
//! `select!` loop so observers see events in arrival order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use shared::{task_debug, task_error, task_info, task_warn, ClientFrame, ConnectionState, Event, TaskId};
use crate::config::ChannelConfig;
use crate::core::{decode, reduce, ChannelState, ReconnectPolicy};
use crate::error::{ChannelError, ChannelResult};
use crate::state::ChannelStats;
use crate::traits::{Observer, Transport, TransportConnection};
use crate::types::{ChannelUpdate, ObserverId, RawFrame, UpdateCause};

/// Opens and closes task connections over one transport
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    stats: Arc<ChannelStats>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_stats(transport, Arc::new(ChannelStats::new()))
    }

    pub fn with_stats(transport: Arc<dyn Transport>, stats: Arc<ChannelStats>) -> Self {
        Self { transport, stats }
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn the connection actor for `task_id`; connecting happens in the background
    pub fn open(&self, task_id: TaskId, config: &ChannelConfig) -> ConnectionHandle {
        let initial = ChannelState::new(task_id.clone(), config.log_capacity);
        self.spawn(task_id, config, initial)
    }

    /// Open a fresh connection that carries on from the last-known state of a failed one
    ///
    /// Snapshot, logs and epoch numbering continue; the retry budget starts full
    /// and the error that ended the previous connection is cleared.
    pub fn retry(&self, previous: &ChannelState, config: &ChannelConfig) -> ConnectionHandle {
        let mut initial = previous.clone().with_connection(ConnectionState::Idle);
        initial.last_error = None;
        task_info!(previous.task_id, epoch = previous.epoch, "Retrying task connection");
        self.spawn(previous.task_id.clone(), config, initial)
    }

    fn spawn(&self, task_id: TaskId, config: &ChannelConfig, initial: ChannelState) -> ConnectionHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let epoch = initial.epoch;
        let initial = Arc::new(initial);
        let (state_tx, state_rx) = watch::channel(Arc::clone(&initial));

        let actor = ConnectionActor {
            task_id: task_id.clone(),
            endpoint: config.endpoint_for(&task_id),
            connect_timeout: config.connect_timeout(),
            heartbeat: config.heartbeat_interval(),
            transport: Arc::clone(&self.transport),
            stats: Arc::clone(&self.stats),
            policy: ReconnectPolicy::from_config(config),
            state: initial,
            published: state_tx,
            observers: Vec::new(),
            commands: commands_rx,
            epoch,
        };

        task_debug!(task_id, endpoint = %actor.endpoint, "Opening task connection");
        let join = tokio::spawn(actor.run());

        ConnectionHandle {
            task_id,
            commands: commands_tx,
            state: state_rx,
            actor: join,
        }
    }

    /// Close the connection and wait for its actor to finish
    ///
    /// Cancels any pending reconnect sleep or in-flight handshake.
    pub async fn close(&self, handle: ConnectionHandle) {
        let ConnectionHandle { task_id, commands, actor, .. } = handle;
        let _ = commands.send(Command::Close);
        drop(commands);

        if let Err(e) = actor.await {
            task_error!(task_id, "Connection actor ended abnormally: {}", e);
        }
    }
}

enum Command {
    AddObserver { id: ObserverId, observer: Arc<dyn Observer> },
    RemoveObserver { id: ObserverId },
    Close,
}

/// Owner-side handle to a running task connection
pub struct ConnectionHandle {
    task_id: TaskId,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<Arc<ChannelState>>,
    actor: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Latest published state; stays readable after the actor finished
    pub fn state(&self) -> Arc<ChannelState> {
        Arc::clone(&self.state.borrow())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.borrow().connection
    }

    /// Receiver that changes every time the state does
    pub fn watch(&self) -> watch::Receiver<Arc<ChannelState>> {
        self.state.clone()
    }

    /// Attach an observer; it first receives the last-known state
    pub fn add_observer(&self, id: ObserverId, observer: Arc<dyn Observer>) {
        if let Err(mpsc::error::SendError(Command::AddObserver { observer, .. })) =
            self.commands.send(Command::AddObserver { id, observer })
        {
            // Actor already finished: the published state is final
            observer.on_update(&ChannelUpdate {
                task_id: self.task_id.clone(),
                cause: UpdateCause::CatchUp,
                state: self.state(),
            });
        }
    }

    pub fn remove_observer(&self, id: ObserverId) {
        let _ = self.commands.send(Command::RemoveObserver { id });
    }

    /// The actor has stopped (closed or failed); no timers remain
    pub fn is_finished(&self) -> bool {
        self.actor.is_finished()
    }
}

/// How a phase of the actor ended
enum Flow {
    Continue,
    Close,
}

enum StreamEnd {
    Closed,
    PeerClosed,
    Failed(ChannelError),
}

enum Input {
    Command(Option<Command>),
    Frame(Option<ChannelResult<RawFrame>>),
    Heartbeat,
}

struct ConnectionActor {
    task_id: TaskId,
    endpoint: String,
    connect_timeout: Option<Duration>,
    heartbeat: Option<Duration>,
    transport: Arc<dyn Transport>,
    stats: Arc<ChannelStats>,
    policy: ReconnectPolicy,
    state: Arc<ChannelState>,
    published: watch::Sender<Arc<ChannelState>>,
    observers: Vec<(ObserverId, Arc<dyn Observer>)>,
    commands: mpsc::UnboundedReceiver<Command>,
    epoch: u64,
}

impl ConnectionActor {
    async fn run(mut self) {
        let mut pending_delay: Option<Duration> = None;

        loop {
            if let Some(delay) = pending_delay.take() {
                if let Flow::Close = self.wait(delay).await {
                    return self.finish_closed();
                }
            }

            self.set_connection(ConnectionState::Connecting);
            let connection = match self.connect().await {
                Ok(Some(connection)) => connection,
                Ok(None) => return self.finish_closed(),
                Err(e) => {
                    task_warn!(self.task_id, endpoint = %self.endpoint, "Connect attempt failed: {}", e);
                    self.report_failure(&e);
                    match self.schedule_retry() {
                        Some(delay) => {
                            pending_delay = Some(delay);
                            continue;
                        }
                        None => return,
                    }
                }
            };

            match self.stream(connection).await {
                StreamEnd::Closed => return self.finish_closed(),
                StreamEnd::PeerClosed => {
                    self.apply_event(Event::disconnected(self.task_id.clone(), "connection closed by server"));
                    if self.state.completed_this_epoch() {
                        task_info!(self.task_id, "Feed closed after completion");
                        return self.finish_closed();
                    }
                }
                StreamEnd::Failed(e) => {
                    task_warn!(self.task_id, epoch = self.epoch, "Connection lost: {}", e);
                    self.report_failure(&e);
                }
            }

            match self.schedule_retry() {
                Some(delay) => pending_delay = Some(delay),
                None => return,
            }
        }
    }

    /// Sleep before the next attempt while still serving commands
    async fn wait(&mut self, delay: Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    if let Flow::Close = self.handle_command(command) {
                        return Flow::Close;
                    }
                }
                _ = &mut sleep => return Flow::Continue,
            }
        }
    }

    /// Run one handshake; `Ok(None)` when closed while connecting
    async fn connect(&mut self) -> ChannelResult<Option<Box<dyn TransportConnection>>> {
        self.stats.record_connect_attempt();

        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let task_id = self.task_id.clone();
        let limit = self.connect_timeout;
        let handshake = async move {
            let attempt = transport.connect(&endpoint, &task_id);
            match limit {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ChannelError::ConnectTimeout {
                        url: endpoint.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
                None => attempt.await,
            }
        };
        tokio::pin!(handshake);

        let mut connection = loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    if let Flow::Close = self.handle_command(command) {
                        return Ok(None);
                    }
                }
                result = &mut handshake => break result?,
            }
        };

        self.epoch += 1;
        self.stats.record_connection_opened();
        let next = self.state.as_ref().clone().begin_epoch(self.epoch);
        self.state = Arc::new(next);
        self.set_connection(ConnectionState::Connected);
        task_info!(self.task_id, epoch = self.epoch, "Connected to task feed");

        connection.send(&ClientFrame::subscribe(self.task_id.clone())).await?;
        Ok(Some(connection))
    }

    async fn stream(&mut self, mut connection: Box<dyn TransportConnection>) -> StreamEnd {
        let mut heartbeat = self.heartbeat.map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            let input = tokio::select! {
                biased;
                command = self.commands.recv() => Input::Command(command),
                frame = connection.recv() => Input::Frame(frame),
                _ = next_tick(&mut heartbeat) => Input::Heartbeat,
            };

            match input {
                Input::Command(command) => {
                    if let Flow::Close = self.handle_command(command) {
                        if let Err(e) = connection.close().await {
                            task_debug!(self.task_id, "Close handshake failed: {}", e);
                        }
                        return StreamEnd::Closed;
                    }
                }
                Input::Frame(Some(Ok(frame))) => self.process_frame(frame),
                Input::Frame(Some(Err(e))) => return StreamEnd::Failed(e),
                Input::Frame(None) => return StreamEnd::PeerClosed,
                Input::Heartbeat => match connection.heartbeat().await {
                    Ok(()) => self.stats.record_heartbeat(),
                    Err(e) => return StreamEnd::Failed(e),
                },
            }
        }
    }

    fn handle_command(&mut self, command: Option<Command>) -> Flow {
        match command {
            Some(Command::AddObserver { id, observer }) => {
                observer.on_update(&ChannelUpdate {
                    task_id: self.task_id.clone(),
                    cause: UpdateCause::CatchUp,
                    state: Arc::clone(&self.state),
                });
                self.observers.push((id, observer));
                task_debug!(self.task_id, observer = %id, observers = self.observers.len(), "Observer attached");
                Flow::Continue
            }
            Some(Command::RemoveObserver { id }) => {
                self.observers.retain(|(existing, _)| *existing != id);
                task_debug!(self.task_id, observer = %id, observers = self.observers.len(), "Observer detached");
                Flow::Continue
            }
            // Every handle dropped counts as a close
            Some(Command::Close) | None => Flow::Close,
        }
    }

    fn process_frame(&mut self, frame: RawFrame) {
        self.stats.record_frame();
        match decode(&frame) {
            Ok(event) => {
                // Task data refills the retry budget; a bare acknowledgement does not
                if !matches!(event, Event::Connected { .. }) {
                    self.policy.on_healthy();
                }
                self.apply_event(event);
            }
            Err(failure) => {
                let total = self.stats.record_decode_failure();
                task_warn!(
                    self.task_id,
                    reason = failure.reason(),
                    bytes = frame.len(),
                    total,
                    "Dropped undecodable frame: {}",
                    failure
                );
            }
        }
    }

    /// Transport failures reach observers as an error followed by a disconnect
    fn report_failure(&mut self, error: &ChannelError) {
        self.apply_event(Event::error(self.task_id.clone(), error.to_string()));
        self.apply_event(Event::disconnected(self.task_id.clone(), error.to_string()));
    }

    fn schedule_retry(&mut self) -> Option<Duration> {
        match self.policy.next_attempt() {
            Some(delay) => {
                self.stats.record_reconnect_attempt();
                self.set_connection(ConnectionState::Reconnecting);
                task_info!(
                    self.task_id,
                    delay_ms = delay.as_millis() as u64,
                    remaining = self.policy.remaining(),
                    "Reconnecting"
                );
                Some(delay)
            }
            None => {
                self.apply_event(Event::error(self.task_id.clone(), "reconnect attempts exhausted"));
                self.set_connection(ConnectionState::Failed);
                task_error!(self.task_id, attempts = self.policy.consumed(), "Giving up on task feed");
                None
            }
        }
    }

    fn finish_closed(&mut self) {
        self.set_connection(ConnectionState::Closed);
        task_debug!(self.task_id, "Connection actor stopped");
    }

    fn apply_event(&mut self, event: Event) {
        let previous_regressions = self.state.regressions;
        let next = reduce(self.state.as_ref().clone(), &event);
        if next.regressions > previous_regressions {
            self.stats.record_progress_regression();
            task_warn!(self.task_id, progress = ?next.progress_value(), "Progress went backwards");
        }
        self.commit(next, UpdateCause::Event(event));
    }

    fn set_connection(&mut self, connection: ConnectionState) {
        if self.state.connection == connection {
            return;
        }
        let next = self.state.as_ref().clone().with_connection(connection);
        self.commit(next, UpdateCause::Connection(connection));
    }

    fn commit(&mut self, next: ChannelState, cause: UpdateCause) {
        let state = Arc::new(next);
        self.state = Arc::clone(&state);
        self.published.send_replace(Arc::clone(&state));

        let update = ChannelUpdate {
            task_id: self.task_id.clone(),
            cause,
            state,
        };
        for (_, observer) in &self.observers {
            observer.on_update(&update);
            self.stats.record_delivery();
        }
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
