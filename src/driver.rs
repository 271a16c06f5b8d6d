//! Driver spawns and manages the background worker
//!
//! One OS thread runs at a time. With a socket open it is the receive loop;
//! without one, and only while playing, it is the no-connection playback loop
//! that paces dispatches with a sleep.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec;
use crate::connection::DatagramSource;
use crate::engine::EngineCore;
use crate::events::EngineEvent;
use crate::playback::{DispatchPlan, PlaybackDispatcher};
use crate::types::ConnectionStatus;
use crate::{Result, StreamError};

/// What a [`Worker`] thread is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    Receive,
    Playback,
}

/// Handle to the running worker thread
pub struct Worker {
    mode: WorkerMode,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the thread.
    ///
    /// The receive loop notices within one read timeout.
    pub fn stop(self) {
        self.cancel.cancel();
        if self.handle.join().is_err() {
            error!(mode = ?self.mode, "Worker thread panicked");
        } else {
            debug!(mode = ?self.mode, "Worker stopped");
        }
    }
}

/// Driver spawns the worker thread for a connection or for playback
pub struct Driver;

impl Driver {
    /// Spawn the receive loop reading from `source`.
    pub(crate) fn spawn_receiver(
        core: Arc<EngineCore>,
        source: Arc<dyn DatagramSource>,
    ) -> Result<Worker> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("mocap-receiver".to_string())
            .spawn(move || Self::receive_loop(&core, source.as_ref(), &token))
            .map_err(|e| StreamError::Worker {
                reason: "failed to spawn receiver thread".to_string(),
                source: Some(e),
            })?;
        Ok(Worker { mode: WorkerMode::Receive, cancel, handle })
    }

    /// Spawn the no-connection playback loop.
    pub(crate) fn spawn_playback(core: Arc<EngineCore>) -> Result<Worker> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("mocap-playback".to_string())
            .spawn(move || Self::playback_loop(&core, &token))
            .map_err(|e| StreamError::Worker {
                reason: "failed to spawn playback thread".to_string(),
                source: Some(e),
            })?;
        Ok(Worker { mode: WorkerMode::Playback, cancel, handle })
    }

    fn receive_loop(core: &EngineCore, source: &dyn DatagramSource, cancel: &CancellationToken) {
        info!("Receive loop started");
        let config = &core.config;
        let mut buf = vec![0u8; config.max_datagram_size];
        let mut datagrams = 0u64;

        loop {
            if cancel.is_cancelled() {
                debug!("Receive loop cancelled");
                break;
            }

            let timeout = if core.connection.reception_enabled() {
                config.read_timeout()
            } else {
                config.idle_read_timeout()
            };

            let result = source.recv(&mut buf, timeout);
            // disconnect resets shared state after joining us; don't race it
            if cancel.is_cancelled() {
                break;
            }

            match result {
                Ok(None) => Self::on_silence(core),
                Ok(Some(len)) => {
                    datagrams += 1;
                    Self::on_datagram(core, &buf[..len], datagrams);
                }
                Err(e) => {
                    error!(error = %e, "Socket failed, dropping connection");
                    // a concurrent disconnect already owns the teardown
                    if core.connection.release_source().is_some() {
                        core.reset_connection_state();
                    }
                    break;
                }
            }

            if let Some(plan) = core.cursor.tick(core.connection.reception_enabled()) {
                Self::dispatch(core, plan);
            }
        }

        info!(datagrams, "Receive loop ended");
    }

    fn on_silence(core: &EngineCore) {
        let was_receiving = core.connection.status() == ConnectionStatus::Receiving;
        if core.connection.set_status(ConnectionStatus::NoData) && was_receiving {
            core.connection.clear_schema(false);
        }
    }

    fn on_datagram(core: &EngineCore, bytes: &[u8], datagrams: u64) {
        let buffering = core.connection.reception_enabled();
        if !buffering {
            let probe_due = core.connection.status() != ConnectionStatus::Receiving
                || datagrams % u64::from(core.config.idle_probe_interval) == 0;
            if !probe_due {
                return;
            }
        }

        let frame = match codec::decode_with_limit(bytes, core.config.max_decoded_size) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Dropping undecodable datagram");
                return;
            }
        };

        core.connection.publish_schema(&frame);
        core.connection.set_status(ConnectionStatus::Receiving);

        if !buffering {
            return;
        }
        if core.store.append_live(Arc::new(frame)).is_none() {
            trace!("No live queue installed, frame dropped");
            return;
        }
        let received = core.cursor.record_received();
        if received % core.config.buffer_pulse_interval as usize == 0 {
            core.events.emit(EngineEvent::BufferPulse { received });
        }
    }

    fn playback_loop(core: &EngineCore, cancel: &CancellationToken) {
        debug!("Playback loop started");
        loop {
            let period = core.config.no_connection_frame() * core.cursor.divisor();
            if Self::sleep_cancellable(period, cancel) {
                break;
            }
            let plan = core.cursor.step();
            Self::dispatch(core, plan);
            if !plan.playing {
                break;
            }
        }
        debug!("Playback loop ended");
    }

    /// Sleep in short slices; returns `true` if cancelled meanwhile.
    fn sleep_cancellable(total: Duration, cancel: &CancellationToken) -> bool {
        const SLICE: Duration = Duration::from_millis(5);
        let mut remaining = total;
        while !remaining.is_zero() {
            if cancel.is_cancelled() {
                return true;
            }
            let nap = remaining.min(SLICE);
            thread::sleep(nap);
            remaining -= nap;
        }
        cancel.is_cancelled()
    }

    pub(crate) fn dispatch(core: &EngineCore, plan: DispatchPlan) -> usize {
        PlaybackDispatcher::new(&core.store, &core.registry, &core.events).dispatch(plan)
    }
}
