//! Background loops of a logged-in session
//!
//! - keepalive: one register packet every 10 seconds
//! - receiver: snapshot ingest, dirty detection, canonical snapshot swap
//! - dispatcher: fans queued events out to observers and event receivers
//!
//! The async loops watch the shared shutdown flag at each await point. The
//! dispatcher runs on a blocking thread so observer callbacks never hold up
//! snapshot intake; it ends once the receiver is gone, closing every
//! [`EventReceiver`](crate::EventReceiver) of the session.

use crate::client::Shared;
use crate::connection::Connection;
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Resend the registration packet so the remote keeps streaming
pub(crate) async fn keepalive(
    connection: Arc<Connection>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(KEEPALIVE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = connection.send_register().await {
                    tracing::error!("Keepalive failed: {}", e);
                    shared.record_fault(e.reason());
                    break;
                }
            }
        }
    }
    tracing::debug!("Terminating keepalive loop");
}

/// Ingest snapshots until shutdown or a recorded fault
pub(crate) async fn receive(
    connection: Arc<Connection>,
    shared: Arc<Shared>,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) {
    let timeout = shared.config.timeout;
    let ratelimit = shared.config.ratelimit;
    let mut fault = shared.faults();

    while !*shutdown.borrow() {
        let started = Instant::now();

        let incoming = tokio::select! {
            _ = shutdown.changed() => break,
            reason = wait_fault(&mut fault) => {
                tracing::debug!("Snapshot receiver stopped after fault: {}", reason);
                break;
            }
            result = connection.recv_snapshot(timeout) => result,
        };
        let incoming = match incoming {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Snapshot receiver stopped: {}", e);
                shared.record_fault(e.reason());
                break;
            }
        };

        let dirty = shared.store.compare(&incoming);
        let (pdirty, ldirty) = (dirty.parameter, dirty.level);
        shared.store.publish(incoming, dirty);

        if pdirty {
            emit(&shared, &events, Event::ParameterChanged);
        }
        if ldirty {
            emit(&shared, &events, Event::LevelChanged);
        }

        if let Some(rest) = ratelimit.checked_sub(started.elapsed()) {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(rest) => {}
            }
        }
    }
    tracing::debug!("Terminating snapshot receiver");
}

/// Queue an event without ever blocking ingestion; a full queue drops it
fn emit(shared: &Shared, events: &mpsc::Sender<Event>, event: Event) {
    if !shared.subscriptions.is_subscribed(event) {
        return;
    }
    match events.try_send(event) {
        Ok(()) => tracing::trace!("Queued {} event", event),
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!("Event queue full, dropping {} event", event)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

/// Deliver queued events to observers in registration order, then to event receivers
///
/// Runs on a blocking thread until the receiver drops its end of the queue
/// or shutdown is signalled. Dropping `fanout` on return closes the
/// session's event receivers.
pub(crate) fn dispatch(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<Event>,
    fanout: broadcast::Sender<Event>,
    shutdown: watch::Receiver<bool>,
) {
    tracing::info!("Listening for {:?} events", shared.subscriptions.get());

    while let Some(event) = events.blocking_recv() {
        if *shutdown.borrow() {
            break;
        }
        // interest may have been dropped while the event was queued
        if !shared.subscriptions.is_subscribed(event) {
            continue;
        }
        tracing::debug!("Dispatching {} event", event);
        shared.observers.notify(event);
        let _ = fanout.send(event);
    }
    tracing::debug!("Terminating event dispatcher");
}

/// Resolve once a fault has been recorded
pub(crate) async fn wait_fault(rx: &mut watch::Receiver<Option<String>>) -> String {
    let fault = rx.wait_for(Option::is_some).await.map(|fault| fault.clone());
    match fault {
        Ok(reason) => reason.unwrap_or_default(),
        Err(_) => "session closed".to_string(),
    }
}
