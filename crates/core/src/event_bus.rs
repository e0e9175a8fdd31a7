//! Typed fan-out of runtime events to many subscribers (§4.1).
//!
//! Two subscription styles share one bus: a plain `broadcast::Receiver` for
//! pollers, and a registered `EventObserver` for callback-style consumers
//! (e.g. `ActivityService` could use either; it uses the receiver form).
//! Publish is non-blocking and best-effort: a full subscriber queue drops
//! the event for that subscriber without affecting delivery to others —
//! this bus is an observability channel, not a reliable queue.

use crate::events::EventObserver;
use crate::types::Event;
use crate::value::ValueMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::broadcast;
use tokio::task;
use tokio::task::JoinSet;

const EVENT_BUS_BUFFER: usize = 256;

pub type ObserverToken = u64;

type ObserverList = Vec<(ObserverToken, Arc<dyn EventObserver>)>;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
    observers: Arc<Mutex<ObserverList>>,
    observer_sequence: AtomicU64,
    observer_tasks: Arc<TokioMutex<JoinSet<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            observers: Arc::new(Mutex::new(Vec::new())),
            observer_sequence: AtomicU64::new(1),
            observer_tasks: Arc::new(TokioMutex::new(JoinSet::new())),
        }
    }

    /// Subscribe to the raw event stream. A subscriber registered now sees
    /// every event published from this point on (I5); it never sees events
    /// published before it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) -> ObserverToken {
        let token = self.observer_sequence.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((token, observer));
        token
    }

    /// Returns true when a matching token was found and removed. Once
    /// removed, the observer is never invoked again, even for events
    /// already in flight to other observers from the same `publish` call.
    pub fn remove_observer(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn publish(&self, kind: &str, payload: ValueMap) {
        self.publish_event(Event::new(kind, payload));
    }

    pub fn publish_event(&self, event: Event) {
        // A send error just means there are currently no broadcast
        // subscribers; that is not a failure to publish.
        let _ = self.sender.send(event.clone());

        let observers: Vec<_> = self
            .observers
            .lock()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        if observers.is_empty() {
            return;
        }

        let tasks = self.observer_tasks.clone();
        task::spawn(async move {
            let mut guard = tasks.lock().await;
            for observer in observers {
                let event = event.clone();
                guard.spawn(async move {
                    if let Err(err) = observer.on_event(&event).await {
                        log::error!(
                            "EventBus observer failure: kind={}, error={}",
                            event.kind,
                            err
                        );
                    }
                });
            }
        });
    }

    /// Abort all in-flight observer tasks. Does not affect the broadcast
    /// channel; receivers simply stop getting new sends once the bus is
    /// dropped.
    pub async fn shutdown(&self) {
        log::debug!("EventBus: shutting down, aborting pending observer tasks");
        self.observer_tasks.lock().await.shutdown().await;
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
