//! Notifications emitted to the host
//!
//! Delivery is fire-and-forget over a broadcast channel: ordering is preserved,
//! a receiver that falls behind skips the oldest events, and emitting with no
//! receivers is not an error.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, trace};

use crate::types::{ConnectionStatus, EntitySchema};

/// Something the host may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The connection status changed
    StatusChanged(ConnectionStatus),

    /// The set of actors/props in the live stream changed
    LiveDataChanged(Arc<EntitySchema>),

    /// Another batch of frames was buffered
    BufferPulse { received: usize },

    /// Consumer slots were updated; redraw
    Redraw { playing: bool },
}

impl EngineEvent {
    pub fn is_redraw(&self) -> bool {
        matches!(self, EngineEvent::Redraw { .. })
    }
}

/// Broadcast fan-out of [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        trace!(?event, "Emitting event");
        // no receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Events as a stream. Lagged gaps are logged and skipped.
    pub fn stream(&self) -> impl Stream<Item = EngineEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event receiver lagged");
                    None
                }
            }
        })
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
