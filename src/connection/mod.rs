//! Connection lifecycle
//!
//! [`ConnectionManager`] owns the network endpoint, the connection status state
//! machine and the live entity schema:
//!
//! - the datagram source and the background worker sit behind the connect
//!   lock, so reading the status never waits on socket teardown
//! - status and schema live in `watch` channels and are only replaced when they
//!   actually change, so repeated identical transitions notify at most once
//! - the reception flag is a plain atomic, independent of the socket

mod source;


pub use source::{DatagramSource, UdpSource};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::driver::{Worker, WorkerMode};
use crate::events::{EngineEvent, EventBus};
use crate::types::{ConnectionStatus, EntitySchema, Frame};

#[derive(Default)]
struct Link {
    source: Option<Arc<dyn DatagramSource>>,
    worker: Option<Worker>,
}

/// Socket handle, status state machine and schema change detection.
pub struct ConnectionManager {
    link: Mutex<Link>,
    status: watch::Sender<ConnectionStatus>,
    schema: watch::Sender<Arc<EntitySchema>>,
    reception: AtomicBool,
    events: EventBus,
}

impl ConnectionManager {
    pub fn new(events: EventBus) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (schema, _) = watch::channel(Arc::new(EntitySchema::empty()));
        Self {
            link: Mutex::new(Link::default()),
            status,
            schema,
            reception: AtomicBool::new(false),
            events,
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Move to `next`, notifying once if the status actually changed.
    ///
    /// Transitions that are not edges of the state machine are refused.
    pub fn set_status(&self, next: ConnectionStatus) -> bool {
        let mut previous = next;
        let changed = self.status.send_if_modified(|current| {
            if *current == next || !current.can_transition_to(next) {
                previous = *current;
                return false;
            }
            previous = std::mem::replace(current, next);
            true
        });

        if changed {
            debug!(from = ?previous, to = ?next, "Connection status changed");
            self.events.emit(EngineEvent::StatusChanged(next));
        } else if previous != next {
            warn!(from = ?previous, to = ?next, "Refused invalid status transition");
        }
        changed
    }

    pub fn current_schema(&self) -> Arc<EntitySchema> {
        Arc::clone(&self.schema.borrow())
    }

    pub fn schema_receiver(&self) -> watch::Receiver<Arc<EntitySchema>> {
        self.schema.subscribe()
    }

    /// Replace the schema if `frame` differs from it, notifying once.
    pub fn publish_schema(&self, frame: &Frame) -> bool {
        let changed = self.schema.send_if_modified(|current| {
            if current.matches(frame) {
                return false;
            }
            *current = Arc::new(EntitySchema::from_frame(frame));
            true
        });

        if changed {
            let schema = self.current_schema();
            debug!(actors = schema.actors.len(), props = schema.props.len(), "Live data changed");
            self.events.emit(EngineEvent::LiveDataChanged(schema));
        }
        changed
    }

    /// Forget the schema. Notifies if it was non-empty, or always when `force`.
    pub fn clear_schema(&self, force: bool) {
        let changed = self.schema.send_if_modified(|current| {
            if current.is_empty() {
                return false;
            }
            *current = Arc::new(EntitySchema::empty());
            true
        });
        if changed || force {
            self.events.emit(EngineEvent::LiveDataChanged(self.current_schema()));
        }
    }

    pub fn set_reception(&self, enabled: bool) {
        self.reception.store(enabled, Ordering::SeqCst);
    }

    pub fn reception_enabled(&self) -> bool {
        self.reception.load(Ordering::SeqCst)
    }

    pub fn has_source(&self) -> bool {
        self.link().source.is_some()
    }

    /// Store the socket and the worker reading from it.
    ///
    /// `spawn` runs under the connect lock, so a worker that fails at once
    /// still finds its socket installed when it releases it.
    pub(crate) fn install<F>(
        &self,
        source: Arc<dyn DatagramSource>,
        spawn: F,
    ) -> crate::Result<()>
    where
        F: FnOnce(Arc<dyn DatagramSource>) -> crate::Result<Worker>,
    {
        let mut link = self.link();
        let worker = spawn(Arc::clone(&source))?;
        link.source = Some(source);
        link.worker = Some(worker);
        Ok(())
    }

    /// Take the socket and its worker out, leaving the manager disconnected.
    ///
    /// Returns `None` when no socket is open.
    pub(crate) fn take_network(&self) -> Option<(Arc<dyn DatagramSource>, Option<Worker>)> {
        let mut link = self.link();
        let source = link.source.take()?;
        Some((source, link.worker.take()))
    }

    /// Let go of the socket handle but leave the worker in place.
    ///
    /// Used by a worker ending on its own; it cannot join itself. Returns
    /// `None` when a disconnect already took the socket.
    pub(crate) fn release_source(&self) -> Option<Arc<dyn DatagramSource>> {
        self.link().source.take()
    }

    /// Take whatever worker is installed.
    pub(crate) fn take_worker(&self) -> Option<Worker> {
        self.link().worker.take()
    }

    /// Install a worker unless a live one is already running or a socket is open.
    ///
    /// A receiver left behind by a socket error is joined first; it has
    /// released the socket and no longer touches the link.
    /// Returns `false` without calling `spawn` when nothing needs to start.
    pub(crate) fn install_worker_if_idle<F>(&self, spawn: F) -> crate::Result<bool>
    where
        F: FnOnce() -> crate::Result<Worker>,
    {
        let mut link = self.link();
        if link.source.is_some() {
            return Ok(false);
        }
        if let Some(stale) =
            link.worker.take_if(|w| w.mode() == WorkerMode::Receive || w.is_finished())
        {
            stale.stop();
        }
        if link.worker.is_some() {
            return Ok(false);
        }
        link.worker = Some(spawn()?);
        Ok(true)
    }
}
