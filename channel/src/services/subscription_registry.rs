//! Subscription registry
//!
//! Maps task ids to observers. The first subscriber of a task opens its
//! connection, later ones share it, and the last one to leave closes it.
//! Subscribing to a task whose connection has failed retries it for every
//! attached observer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;

use shared::{task_debug, task_info, ConnectionState, TaskId};
use crate::config::ChannelConfig;
use crate::core::ChannelState;
use crate::error::ChannelResult;
use crate::services::build_transport;
use crate::services::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::state::ChannelStats;
use crate::traits::{Observer, Transport};
use crate::types::ObserverId;

/// Injectable registry of task subscriptions
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    manager: ConnectionManager,
    config: ChannelConfig,
    slots: Mutex<HashMap<TaskId, TaskSlot>>,
    next_id: AtomicU64,
}

struct TaskSlot {
    handle: ConnectionHandle,
    observers: HashMap<ObserverId, Arc<dyn Observer>>,
}

impl SubscriptionRegistry {
    pub fn new(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        Self::with_manager(ConnectionManager::new(transport), config)
    }

    pub fn with_manager(manager: ConnectionManager, config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                manager,
                config,
                slots: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Validate the configuration and pick the transport it names
    pub fn from_config(config: ChannelConfig) -> ChannelResult<Self> {
        config.validate()?;
        let transport = build_transport(&config);
        Ok(Self::new(transport, config))
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        self.inner.manager.stats()
    }

    /// Attach `observer` to the task, opening its connection when needed
    ///
    /// The observer immediately receives the last-known state of the task. A
    /// connection that ended in `Failed` is retried first.
    pub async fn subscribe(&self, task_id: TaskId, observer: Arc<dyn Observer>) -> Subscription {
        let id = ObserverId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let mut slots = self.inner.slots.lock().await;

        let failed = slots
            .get(&task_id)
            .is_some_and(|slot| slot.handle.connection_state() == ConnectionState::Failed);
        if failed {
            if let Some(slot) = slots.remove(&task_id) {
                let slot = self.inner.retry(slot).await;
                slots.insert(task_id.clone(), slot);
            }
        }

        let slot = slots.entry(task_id.clone()).or_insert_with(|| {
            task_info!(task_id, "First subscriber, opening connection");
            TaskSlot {
                handle: self.inner.manager.open(task_id.clone(), &self.inner.config),
                observers: HashMap::new(),
            }
        });
        slot.observers.insert(id, Arc::clone(&observer));
        slot.handle.add_observer(id, observer);
        task_debug!(task_id, observer = %id, subscribers = slot.observers.len(), "Subscribed");

        Subscription {
            task_id,
            id,
            inner: Arc::clone(&self.inner),
            runtime: Handle::try_current().ok(),
            active: AtomicBool::new(true),
        }
    }

    /// Close every connection and forget all subscribers
    pub async fn reset(&self) {
        let mut slots = self.inner.slots.lock().await;
        for (task_id, slot) in slots.drain() {
            task_debug!(task_id, subscribers = slot.observers.len(), "Closing connection on reset");
            self.inner.manager.close(slot.handle).await;
        }
    }

    pub async fn active_connections(&self) -> usize {
        self.inner.slots.lock().await.len()
    }

    pub async fn subscriber_count(&self, task_id: &TaskId) -> usize {
        let slots = self.inner.slots.lock().await;
        slots.get(task_id).map_or(0, |slot| slot.observers.len())
    }

    /// Last-known state of a subscribed task
    pub async fn state(&self, task_id: &TaskId) -> Option<Arc<ChannelState>> {
        let slots = self.inner.slots.lock().await;
        slots.get(task_id).map(|slot| slot.handle.state())
    }

    pub async fn connection_state(&self, task_id: &TaskId) -> Option<ConnectionState> {
        let slots = self.inner.slots.lock().await;
        slots.get(task_id).map(|slot| slot.handle.connection_state())
    }

    /// Whether the connection actor of a task has stopped
    pub async fn is_finished(&self, task_id: &TaskId) -> Option<bool> {
        let slots = self.inner.slots.lock().await;
        slots.get(task_id).map(|slot| slot.handle.is_finished())
    }
}

impl RegistryInner {
    /// Replace a failed connection, re-attaching everyone who watched it
    async fn retry(&self, slot: TaskSlot) -> TaskSlot {
        let TaskSlot { handle, observers } = slot;
        let previous = handle.state();
        // The failed actor is joined before its successor starts
        self.manager.close(handle).await;

        let handle = self.manager.retry(&previous, &self.config);
        for (id, observer) in &observers {
            handle.add_observer(*id, Arc::clone(observer));
        }
        TaskSlot { handle, observers }
    }

    async fn remove(&self, task_id: &TaskId, id: ObserverId) {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(task_id) else {
            return;
        };
        if slot.observers.remove(&id).is_none() {
            return;
        }
        slot.handle.remove_observer(id);
        task_debug!(task_id, observer = %id, subscribers = slot.observers.len(), "Unsubscribed");

        if slot.observers.is_empty() {
            if let Some(slot) = slots.remove(task_id) {
                task_info!(task_id, "Last subscriber left, closing connection");
                // Held across close so a new connection for this task cannot overlap
                self.manager.close(slot.handle).await;
            }
        }
    }
}

/// One observer's membership in a task channel
///
/// Dropping it unsubscribes in the background on the runtime it was created
/// on, even when the drop happens outside that runtime.
pub struct Subscription {
    task_id: TaskId,
    id: ObserverId,
    inner: Arc<RegistryInner>,
    runtime: Option<Handle>,
    active: AtomicBool,
}

impl Subscription {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Detach the observer; calling it again does nothing
    pub async fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.inner.remove(&self.task_id, self.id).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            task_debug!(self.task_id, observer = %self.id, "No runtime to detach dropped subscription");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let task_id = self.task_id.clone();
        let id = self.id;
        runtime.spawn(async move { inner.remove(&task_id, id).await });
    }
}
