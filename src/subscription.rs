use crate::error::{Result, VbanError};
use crate::types::Event;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Callback target for dirty events
///
/// `on_update` runs on the dispatcher thread. Snapshot intake carries on
/// while it runs, but events that arrive while the queue is full are dropped.
pub trait Observer: Send + Sync + 'static {
    fn on_update(&self, event: Event);
}

impl<F> Observer for F
where
    F: Fn(Event) + Send + Sync + 'static,
{
    fn on_update(&self, event: Event) {
        self(event)
    }
}

/// Which events observers are interested in
#[derive(Debug, Default)]
pub struct EventSubscriptions {
    pdirty: AtomicBool,
    ldirty: AtomicBool,
}

impl EventSubscriptions {
    pub fn new(pdirty: bool, ldirty: bool) -> Self {
        Self {
            pdirty: AtomicBool::new(pdirty),
            ldirty: AtomicBool::new(ldirty),
        }
    }

    fn flag(&self, event: Event) -> &AtomicBool {
        match event {
            Event::ParameterChanged => &self.pdirty,
            Event::LevelChanged => &self.ldirty,
        }
    }

    pub fn is_subscribed(&self, event: Event) -> bool {
        self.flag(event).load(Ordering::Acquire)
    }

    /// Start delivering `event`
    pub fn add(&self, event: Event) {
        self.flag(event).store(true, Ordering::Release);
        tracing::info!("{} added to events, now listening for {:?}", event, self.get());
    }

    /// Stop delivering `event`
    pub fn remove(&self, event: Event) {
        self.flag(event).store(false, Ordering::Release);
        tracing::info!("{} removed from events, now listening for {:?}", event, self.get());
    }

    /// Currently subscribed events
    pub fn get(&self) -> Vec<Event> {
        [Event::ParameterChanged, Event::LevelChanged]
            .into_iter()
            .filter(|event| self.is_subscribed(*event))
            .collect()
    }

    pub fn any(&self) -> bool {
        !self.get().is_empty()
    }
}

/// Registered observers, notified in registration order
#[derive(Default)]
pub struct Observers {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(list: &[Arc<dyn Observer>], observer: &Arc<dyn Observer>) -> Option<usize> {
        let target = Arc::as_ptr(observer) as *const ();
        list.iter().position(|o| Arc::as_ptr(o) as *const () == target)
    }

    /// Register an observer; registering the same `Arc` twice is a no-op
    pub fn add(&self, observer: Arc<dyn Observer>) {
        let mut list = self.observers.write();
        if Self::position(&list, &observer).is_some() {
            tracing::warn!("observer already registered, ignoring");
            return;
        }
        list.push(observer);
        tracing::info!("observer added ({} registered)", list.len());
    }

    /// Deregister an observer; removing an unknown observer is a no-op
    pub fn remove(&self, observer: &Arc<dyn Observer>) {
        let mut list = self.observers.write();
        match Self::position(&list, observer) {
            Some(i) => {
                list.remove(i);
                tracing::info!("observer removed ({} registered)", list.len());
            }
            None => tracing::warn!("observer not registered, nothing to remove"),
        }
    }

    pub fn clear(&self) {
        self.observers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every observer synchronously
    pub fn notify(&self, event: Event) {
        // clone the list so observers may (de)register from inside a callback
        let observers: Vec<Arc<dyn Observer>> = self.observers.read().clone();
        for observer in observers {
            observer.on_update(event);
        }
    }
}

/// Receiver for events delivered by the dispatcher
pub struct EventReceiver {
    rx: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Create a new event receiver
    pub(crate) fn new(rx: broadcast::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// A receiver with no session behind it
    pub(crate) fn closed() -> Self {
        let (_, rx) = broadcast::channel(1);
        Self { rx }
    }

    /// Receive the next event
    ///
    /// Returns [`VbanError::NotConnected`] once the session has shut down.
    pub async fn recv(&mut self) -> Result<Event> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => VbanError::NotConnected,
            broadcast::error::RecvError::Lagged(n) => {
                VbanError::Channel(format!("Lagged by {} events", n))
            }
        })
    }

    /// Try to receive an event without waiting
    ///
    /// Returns `None` if no event is pending.
    pub fn try_recv(&mut self) -> Result<Option<Event>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(VbanError::NotConnected),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(VbanError::Channel(format!("Lagged by {} events", n)))
            }
        }
    }
}
