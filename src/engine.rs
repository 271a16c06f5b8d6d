//! Host-facing engine
//!
//! [`Engine`] is the composition root. The host creates one per capture
//! stream, hands `&Engine` (or an `Arc<Engine>`) to whatever needs it, and
//! drops it to shut the worker down.

use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::clip;
use crate::codec;
use crate::config::EngineConfig;
use crate::connection::{ConnectionManager, DatagramSource, UdpSource};
use crate::driver::Driver;
use crate::events::{EngineEvent, EventBus};
use crate::playback::{CursorState, PlaybackCursor};
use crate::registry::{Consumer, ConsumerHandle, ConsumerRegistry};
use crate::store::{ConnectOutcome, FrameQueueStore};
use crate::stream::CoalesceRedrawsExt;
use crate::types::{
    ConnectionStatus, DataSetDescriptor, DataSetId, EntitySchema, Frame, UpdateRate,
};
use crate::{Result, StreamError};

/// Capture rate assumed until the live stream reports one
const FALLBACK_FPS: f64 = 60.0;

/// State shared between the host-facing [`Engine`] and the worker thread.
///
/// Each field guards itself; no operation holds two of their locks at once.
pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) live_id: DataSetId,
    pub(crate) connection: ConnectionManager,
    pub(crate) store: FrameQueueStore,
    pub(crate) registry: ConsumerRegistry,
    pub(crate) cursor: PlaybackCursor,
    pub(crate) events: EventBus,
}

impl EngineCore {
    /// Drop the live queue and connection state once the socket is gone.
    ///
    /// Live consumers are flushed so none keeps a stale index.
    pub(crate) fn reset_connection_state(&self) {
        self.store.remove_live();
        self.cursor.reset();
        self.connection.set_reception(false);
        self.connection.set_status(ConnectionStatus::Disconnected);
        self.connection.clear_schema(true);
        Driver::dispatch(self, self.cursor.current());
    }

    /// Join a worker that is no longer wanted, such as a playback loop or a
    /// receiver that ended on a socket error. Its socket closes with it.
    fn stop_stale_worker(&self) {
        if let Some(worker) = self.connection.take_worker() {
            worker.stop();
        }
    }
}

/// Buffers a motion-capture stream and dispatches frame indices to consumers.
///
/// ```rust,no_run
/// use mocap_live::{Engine, EngineConfig};
///
/// fn main() -> mocap_live::Result<()> {
///     let engine = Engine::new(EngineConfig::default())?;
///     engine.connect()?;
///     engine.start_reception();
///     engine.play()?;
///     println!("status: {:?}", engine.status());
///     Ok(())
/// }
/// ```
pub struct Engine {
    core: Arc<EngineCore>,
}

impl Engine {
    /// Create an engine. Nothing is bound until [`Engine::connect`].
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);
        let core = EngineCore {
            live_id: config.live_descriptor().id(),
            connection: ConnectionManager::new(events.clone()),
            store: FrameQueueStore::new(),
            registry: ConsumerRegistry::new(),
            cursor: PlaybackCursor::new(config.playback_rate_divisor),
            events,
            config,
        };
        Ok(Self { core: Arc::new(core) })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Bind the configured UDP port and start the receive loop.
    pub fn connect(&self) -> Result<()> {
        if self.status().is_connected() {
            debug!("Already connected");
            return Ok(());
        }
        self.core.stop_stale_worker();
        let source = UdpSource::bind(self.core.config.socket_addr())?;
        self.connect_with(Arc::new(source))
    }

    /// Start the receive loop on any datagram source.
    ///
    /// Clears the counters, installs an empty live queue and performs one
    /// probe receive to seed the schema. A probe error leaves the engine
    /// disconnected. The probe's frame only seeds the schema; it is not buffered.
    pub fn connect_with(&self, source: Arc<dyn DatagramSource>) -> Result<()> {
        let core = &self.core;
        if core.connection.status().is_connected() {
            debug!("Already connected");
            return Ok(());
        }
        core.stop_stale_worker();

        core.cursor.reset();
        core.store.install_live(core.live_id);

        let mut buf = vec![0u8; core.config.max_datagram_size];
        match source.recv(&mut buf, core.config.idle_read_timeout()) {
            Ok(Some(len)) => {
                match codec::decode_with_limit(&buf[..len], core.config.max_decoded_size) {
                    Ok(frame) => {
                        core.connection.publish_schema(&frame);
                    }
                    Err(e) => warn!(error = %e, "Probe datagram undecodable"),
                }
            }
            Ok(None) => debug!("Probe timed out, stream is silent"),
            Err(e) => {
                core.store.remove_live();
                return Err(StreamError::connection_failed_with_source(
                    "probe receive failed",
                    Box::new(e),
                ));
            }
        }

        core.connection.set_status(ConnectionStatus::NoData);
        let spawned = core
            .connection
            .install(source, |source| Driver::spawn_receiver(Arc::clone(core), source));
        if let Err(e) = spawned {
            core.connection.set_status(ConnectionStatus::Disconnected);
            core.store.remove_live();
            return Err(e);
        }

        info!(data_set = %core.live_id, "Connected to capture stream");
        Ok(())
    }

    /// Close the socket, stop the worker and drop the live queue.
    ///
    /// Blocks for at most one receive timeout while the worker exits.
    pub fn disconnect(&self) {
        let core = &self.core;
        let Some((_source, worker)) = core.connection.take_network() else {
            return;
        };
        if let Some(worker) = worker {
            worker.stop();
        }
        core.reset_connection_state();

        info!("Disconnected from capture stream");
    }

    pub fn status(&self) -> ConnectionStatus {
        self.core.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Id of the live data-set, derived from the configuration.
    pub fn live_data_set(&self) -> DataSetId {
        self.core.live_id
    }

    pub fn current_schema(&self) -> Arc<EntitySchema> {
        self.core.connection.current_schema()
    }

    /// Frame rate reported by the newest live frame.
    pub fn source_fps(&self) -> f64 {
        self.core
            .store
            .latest_live()
            .map(|frame| f64::from(frame.fps))
            .filter(|fps| *fps > 0.0)
            .unwrap_or(FALLBACK_FPS)
    }

    /// Clear the live buffer and start appending to it, following live.
    pub fn start_reception(&self) {
        let core = &self.core;
        let dropped = core.store.clear_live();
        core.cursor.reset();
        core.connection.set_reception(true);
        info!(dropped, "Reception started");
    }

    /// Stop appending; the buffer is kept.
    pub fn pause_reception(&self) {
        self.core.connection.set_reception(false);
        info!("Reception paused");
    }

    /// Resume appending to the existing buffer.
    pub fn resume_reception(&self) {
        self.core.connection.set_reception(true);
        info!("Reception resumed");
    }

    /// Stop appending and pause playback.
    pub fn stop_reception(&self) {
        let core = &self.core;
        core.connection.set_reception(false);
        core.cursor.pause();
        Driver::dispatch(core, core.cursor.current());
        info!(frames = core.store.size(core.live_id), "Reception stopped");
    }

    pub fn is_reception_enabled(&self) -> bool {
        self.core.connection.reception_enabled()
    }

    /// Empty the live buffer and reset the counters.
    pub fn flush_buffers(&self) {
        let core = &self.core;
        let dropped = core.store.clear_live();
        core.cursor.reset();
        Driver::dispatch(core, core.cursor.current());
        debug!(dropped, "Flushed live buffer");
    }

    /// Install a data-set by running `loader`, unless it is already buffered.
    ///
    /// Unreferenced clip queues are garbage collected first.
    pub fn connect_data_set<L>(&self, id: DataSetId, loader: L) -> Result<ConnectOutcome>
    where
        L: FnOnce() -> Result<Vec<Frame>>,
    {
        let referenced = self.core.registry.referenced_data_sets();
        self.core.store.connect_data_set(id, &referenced, loader)
    }

    /// Load a clip file as a data-set and return its id.
    pub fn connect_clip<P: AsRef<Path>>(
        &self,
        name: impl Into<String>,
        path: P,
        local: bool,
    ) -> Result<DataSetId> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let descriptor = DataSetDescriptor::Clip { name: name.into(), path: path.clone(), local };
        let id = descriptor.id();
        self.connect_data_set(id, || clip::load_clip(&path))?;
        Ok(id)
    }

    pub fn get_frame(&self, id: DataSetId, idx: usize) -> Option<Arc<Frame>> {
        self.core.store.get_frame(id, idx)
    }

    pub fn size(&self, id: DataSetId) -> usize {
        self.core.store.size(id)
    }

    /// Drop a data-set. The live queue is emptied but stays installed.
    pub fn discard(&self, id: DataSetId) -> bool {
        let discarded = self.core.store.discard(id);
        if discarded {
            debug!(data_set = %id, "Discarded data-set");
        }
        discarded
    }

    /// Drop every data-set and flush every consumer.
    pub fn discard_all(&self) {
        self.core.store.discard_all();
        self.core.registry.flush_all();
        debug!("Discarded all data-sets");
    }

    /// Installed data-sets and their lengths.
    pub fn data_sets(&self) -> Vec<(DataSetId, usize)> {
        self.core.store.data_sets()
    }

    /// Write all of a data-set, or `range` of it, to a clip file.
    ///
    /// Returns the number of frames written.
    pub fn save_data_set<P: AsRef<Path>>(
        &self,
        id: DataSetId,
        path: P,
        range: Option<Range<usize>>,
    ) -> Result<usize> {
        let frames =
            self.core.store.snapshot(id, range).ok_or(StreamError::UnknownDataSet { id })?;
        clip::save_clip(path, &frames)?;
        Ok(frames.len())
    }

    pub fn register_consumer(&self, consumer: Arc<dyn Consumer>) -> ConsumerHandle {
        self.core.registry.register(consumer)
    }

    pub fn unregister_consumer(&self, handle: ConsumerHandle) -> bool {
        self.core.registry.unregister(handle)
    }

    pub fn unregister_all(&self) {
        self.core.registry.unregister_all();
    }

    pub fn flush_consumer(&self, handle: ConsumerHandle) {
        self.core.registry.flush(handle);
    }

    /// The frame index `handle` should render now, if any.
    pub fn current_frame_index(&self, handle: ConsumerHandle) -> Option<usize> {
        self.core.registry.current_index(handle)
    }

    /// Dispatch now, optionally jumping to `explicit` first.
    ///
    /// Returns how many consumers received an index.
    pub fn dispatch_frame(&self, explicit: Option<usize>) -> usize {
        let core = &self.core;
        let plan = match explicit {
            Some(idx) => core.cursor.seek(idx),
            None => core.cursor.current(),
        };
        Driver::dispatch(core, plan)
    }

    /// Start advancing the dispatch index.
    ///
    /// Without a connection this starts the paced playback loop.
    pub fn play(&self) -> Result<()> {
        let core = &self.core;
        core.cursor.play();
        let started = core
            .connection
            .install_worker_if_idle(|| Driver::spawn_playback(Arc::clone(core)))?;
        if started {
            debug!("Playback started without connection");
        }
        Ok(())
    }

    /// Freeze the dispatch index. Consumers keep their current frame.
    pub fn pause(&self) {
        let core = &self.core;
        core.cursor.pause();
        if !core.connection.has_source() {
            if let Some(worker) = core.connection.take_worker() {
                worker.stop();
            }
        }
        Driver::dispatch(core, core.cursor.current());
    }

    /// Scrub to `idx` and dispatch it.
    pub fn seek(&self, idx: usize) -> usize {
        self.dispatch_frame(Some(idx))
    }

    /// Re-couple the dispatch index to the live edge and dispatch it.
    pub fn sync_frame_counters(&self) -> usize {
        let core = &self.core;
        let plan = core.cursor.sync();
        Driver::dispatch(core, plan)
    }

    /// Dispatch every `divisor`th receiver iteration. Zero is treated as one.
    pub fn set_playback_rate(&self, divisor: u32) {
        self.core.cursor.set_divisor(divisor);
        debug!(divisor = self.core.cursor.divisor(), "Playback rate changed");
    }

    pub fn playback_rate(&self) -> u32 {
        self.core.cursor.divisor()
    }

    pub fn is_playing(&self) -> bool {
        self.core.cursor.is_playing()
    }

    pub fn received_count(&self) -> usize {
        self.core.cursor.state().received_count
    }

    pub fn dispatch_index(&self) -> usize {
        self.core.cursor.state().dispatch_index
    }

    pub fn cursor_state(&self) -> CursorState {
        self.core.cursor.state()
    }

    /// Raw broadcast receiver of every event.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.core.events.subscribe()
    }

    /// Every event as a stream; lagged gaps are skipped.
    pub fn events(&self) -> BoxStream<'static, EngineEvent> {
        self.core.events.stream().boxed()
    }

    /// Events with redraws coalesced to at most `rate`.
    ///
    /// Must be called within a tokio runtime when `rate` is limiting.
    pub fn events_with_rate(&self, rate: UpdateRate) -> BoxStream<'static, EngineEvent> {
        match rate.interval(self.source_fps()) {
            None => self.events(),
            Some(period) => self.core.events.stream().coalesce_redraws(period).boxed(),
        }
    }

    /// Current status, then every change.
    pub fn status_updates(&self) -> WatchStream<ConnectionStatus> {
        WatchStream::new(self.core.connection.status_receiver())
    }

    /// Current schema, then every change.
    pub fn schema_updates(&self) -> WatchStream<Arc<EntitySchema>> {
        WatchStream::new(self.core.connection.schema_receiver())
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.core.connection.status_receiver()
    }

    /// Buffered length of every non-empty data-set.
    pub fn lengths(&self) -> HashMap<DataSetId, usize> {
        self.core.store.lengths()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        debug!("Dropping engine");
        self.disconnect();
        self.core.stop_stale_worker();
    }
}
