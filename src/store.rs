//! Buffered frame queues, one per data-set
//!
//! The store owns every buffered frame. Exactly one queue, the live queue, is
//! appended to by the receiver loop; clip queues are installed once by
//! [`FrameQueueStore::connect_data_set`] and never change afterwards.
//!
//! All access goes through a single mutex (the queue lock). Loading a clip
//! happens outside that lock, so a slow disk never stalls the receiver's append.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::Result;
use crate::types::{DataSetId, Frame};

/// Outcome of [`FrameQueueStore::connect_data_set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A non-empty queue was already installed; nothing was loaded
    AlreadyInstalled { frames: usize },
    /// The loader ran and its frames were installed
    Loaded { frames: usize },
}

#[derive(Default)]
struct Queues {
    queues: HashMap<DataSetId, Vec<Arc<Frame>>>,
    live: Option<DataSetId>,
}

/// Map of data-set id to its ordered, append-only frame queue.
#[derive(Default)]
pub struct FrameQueueStore {
    inner: Mutex<Queues>,
}

impl FrameQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `id` the live data-set with an empty queue.
    pub fn install_live(&self, id: DataSetId) {
        let mut inner = self.lock();
        if let Some(previous) = inner.live.replace(id) {
            if previous != id {
                inner.queues.remove(&previous);
            }
        }
        inner.queues.insert(id, Vec::new());
        debug!(data_set = %id, "Installed live queue");
    }

    /// Empty the live queue, returning how many frames were dropped.
    pub fn clear_live(&self) -> usize {
        let mut inner = self.lock();
        let Some(live) = inner.live else { return 0 };
        inner.queues.get_mut(&live).map(|q| std::mem::take(q).len()).unwrap_or(0)
    }

    /// Drop the live queue entirely.
    pub fn remove_live(&self) -> Option<DataSetId> {
        let mut inner = self.lock();
        let live = inner.live.take()?;
        inner.queues.remove(&live);
        debug!(data_set = %live, "Removed live queue");
        Some(live)
    }

    pub fn live_id(&self) -> Option<DataSetId> {
        self.lock().live
    }

    /// Append to the live queue, returning its new length.
    ///
    /// Returns `None` when no live queue is installed.
    pub fn append_live(&self, frame: Arc<Frame>) -> Option<usize> {
        let mut inner = self.lock();
        let live = inner.live?;
        let queue = inner.queues.get_mut(&live)?;
        queue.push(frame);
        Some(queue.len())
    }

    /// Install a queue for `id` by running `loader`, unless one is already there.
    ///
    /// Before loading, queues that are neither live nor in `referenced` are
    /// garbage collected. A loader error installs nothing and leaves every other
    /// queue untouched.
    pub fn connect_data_set<L>(
        &self,
        id: DataSetId,
        referenced: &HashSet<DataSetId>,
        loader: L,
    ) -> Result<ConnectOutcome>
    where
        L: FnOnce() -> Result<Vec<Frame>>,
    {
        {
            let mut inner = self.lock();
            if let Some(frames) = inner.queues.get(&id).map(Vec::len).filter(|n| *n > 0) {
                debug!(data_set = %id, frames, "Data-set already installed");
                return Ok(ConnectOutcome::AlreadyInstalled { frames });
            }
            Self::collect_garbage(&mut inner, referenced);
        }

        let frames: Vec<Arc<Frame>> = loader()?.into_iter().map(Arc::new).collect();
        let count = frames.len();

        let mut inner = self.lock();
        if let Some(existing) = inner.queues.get(&id).map(Vec::len).filter(|n| *n > 0) {
            // another caller won the race; keep theirs
            return Ok(ConnectOutcome::AlreadyInstalled { frames: existing });
        }
        inner.queues.insert(id, frames);
        info!(data_set = %id, frames = count, "Installed data-set");
        Ok(ConnectOutcome::Loaded { frames: count })
    }

    /// Drop queues no longer referenced, always keeping the live one.
    pub fn garbage_collect(&self, referenced: &HashSet<DataSetId>) -> usize {
        Self::collect_garbage(&mut self.lock(), referenced)
    }

    fn collect_garbage(inner: &mut Queues, referenced: &HashSet<DataSetId>) -> usize {
        let live = inner.live;
        let before = inner.queues.len();
        inner.queues.retain(|id, _| Some(*id) == live || referenced.contains(id));
        let dropped = before - inner.queues.len();
        if dropped > 0 {
            debug!(dropped, "Garbage collected unreferenced data-sets");
        }
        dropped
    }

    /// Frame `idx` of data-set `id`, if both exist.
    pub fn get_frame(&self, id: DataSetId, idx: usize) -> Option<Arc<Frame>> {
        self.lock().queues.get(&id)?.get(idx).cloned()
    }

    /// Number of frames buffered for `id`, zero when unknown.
    pub fn size(&self, id: DataSetId) -> usize {
        self.lock().queues.get(&id).map_or(0, Vec::len)
    }

    pub fn contains(&self, id: DataSetId) -> bool {
        self.lock().queues.contains_key(&id)
    }

    /// Drop the queue of `id`. The live queue is emptied but stays installed.
    pub fn discard(&self, id: DataSetId) -> bool {
        let mut inner = self.lock();
        if inner.live == Some(id) {
            return inner.queues.get_mut(&id).map(|q| q.clear()).is_some();
        }
        inner.queues.remove(&id).is_some()
    }

    /// Drop every clip queue and empty the live queue.
    pub fn discard_all(&self) {
        let mut inner = self.lock();
        let live = inner.live;
        inner.queues.retain(|id, _| Some(*id) == live);
        inner.queues.values_mut().for_each(Vec::clear);
    }

    /// Lengths of every non-empty queue.
    pub fn lengths(&self) -> HashMap<DataSetId, usize> {
        self.lock()
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, q)| (*id, q.len()))
            .collect()
    }

    /// Installed data-sets and their lengths, sorted by id.
    pub fn data_sets(&self) -> Vec<(DataSetId, usize)> {
        let mut sets: Vec<_> = self.lock().queues.iter().map(|(id, q)| (*id, q.len())).collect();
        sets.sort_unstable();
        sets
    }

    /// Shared references to a range of frames, clamped to the queue length.
    pub fn snapshot(&self, id: DataSetId, range: Option<Range<usize>>) -> Option<Vec<Arc<Frame>>> {
        let inner = self.lock();
        let queue = inner.queues.get(&id)?;
        let range = range.unwrap_or(0..queue.len());
        let end = range.end.min(queue.len());
        let start = range.start.min(end);
        Some(queue[start..end].to_vec())
    }

    /// Newest frame of the live queue.
    pub fn latest_live(&self) -> Option<Arc<Frame>> {
        let inner = self.lock();
        inner.queues.get(&inner.live?)?.last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamError;
    use crate::test_utils::sample_frames;

    fn id(raw: u32) -> DataSetId {
        DataSetId::from_raw(raw)
    }

    #[test]
    fn loaded_clip_is_readable_in_order() {
        let store = FrameQueueStore::new();
        let frames = sample_frames(3);
        let expected = frames.clone();

        let outcome = store.connect_data_set(id(1), &HashSet::new(), || Ok(frames)).unwrap();
        assert_eq!(outcome, ConnectOutcome::Loaded { frames: 3 });

        for (i, frame) in expected.iter().enumerate() {
            assert_eq!(store.get_frame(id(1), i).as_deref(), Some(frame));
        }
        assert!(store.get_frame(id(1), 3).is_none());
        assert_eq!(store.size(id(1)), 3);
    }

    #[test]
    fn unknown_ids_are_absent_not_errors() {
        let store = FrameQueueStore::new();
        assert!(store.get_frame(id(42), 0).is_none());
        assert_eq!(store.size(id(42)), 0);
        assert!(!store.discard(id(42)));
    }

    #[test]
    fn connecting_installed_data_set_skips_loader() {
        let store = FrameQueueStore::new();
        store.connect_data_set(id(1), &HashSet::new(), || Ok(sample_frames(2))).unwrap();

        let outcome = store
            .connect_data_set(id(1), &HashSet::new(), || panic!("loader must not run"))
            .unwrap();
        assert_eq!(outcome, ConnectOutcome::AlreadyInstalled { frames: 2 });
    }

    #[test]
    fn loader_error_installs_nothing() {
        let store = FrameQueueStore::new();
        let referenced: HashSet<_> = [id(1)].into();
        store.connect_data_set(id(1), &referenced, || Ok(sample_frames(2))).unwrap();

        let result = store.connect_data_set(id(2), &referenced, || {
            Err(StreamError::file_error(
                "missing.clip".into(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            ))
        });

        assert!(result.is_err());
        assert!(!store.contains(id(2)));
        assert_eq!(store.size(id(1)), 2);
    }

    #[test]
    fn garbage_collection_keeps_live_and_referenced() {
        let store = FrameQueueStore::new();
        store.install_live(id(100));
        store.append_live(Arc::new(sample_frames(1).remove(0)));
        store.connect_data_set(id(1), &HashSet::new(), || Ok(sample_frames(1))).unwrap();
        store.connect_data_set(id(2), &HashSet::new(), || Ok(sample_frames(1))).unwrap();

        // connecting a third data-set while only id(2) is referenced drops id(1)
        let referenced: HashSet<_> = [id(2)].into();
        store.connect_data_set(id(3), &referenced, || Ok(sample_frames(1))).unwrap();

        assert!(!store.contains(id(1)));
        assert!(store.contains(id(2)));
        assert!(store.contains(id(3)));
        assert_eq!(store.size(id(100)), 1);
    }

    #[test]
    fn live_queue_appends_and_clears() {
        let store = FrameQueueStore::new();
        assert_eq!(store.append_live(Arc::new(sample_frames(1).remove(0))), None);

        store.install_live(id(7));
        for (i, frame) in sample_frames(4).into_iter().enumerate() {
            assert_eq!(store.append_live(Arc::new(frame)), Some(i + 1));
        }
        let newest = sample_frames(4)[3].timestamp();
        assert_eq!(store.latest_live().map(|f| f.timestamp()), Some(newest));
        assert_eq!(store.clear_live(), 4);
        assert_eq!(store.size(id(7)), 0);
        assert!(store.contains(id(7)));

        assert_eq!(store.remove_live(), Some(id(7)));
        assert!(!store.contains(id(7)));
        assert_eq!(store.live_id(), None);
    }

    #[test]
    fn discard_keeps_live_installed() {
        let store = FrameQueueStore::new();
        store.install_live(id(7));
        store.append_live(Arc::new(sample_frames(1).remove(0)));
        store.connect_data_set(id(1), &HashSet::new(), || Ok(sample_frames(2))).unwrap();

        store.discard_all();
        assert!(store.contains(id(7)));
        assert_eq!(store.size(id(7)), 0);
        assert!(!store.contains(id(1)));
    }

    #[test]
    fn lengths_skip_empty_queues_and_snapshot_clamps() {
        let store = FrameQueueStore::new();
        store.install_live(id(7));
        store.connect_data_set(id(1), &HashSet::new(), || Ok(sample_frames(5))).unwrap();

        let lengths = store.lengths();
        assert_eq!(lengths.get(&id(1)), Some(&5));
        assert!(!lengths.contains_key(&id(7)));

        assert_eq!(store.snapshot(id(1), Some(2..99)).map(|s| s.len()), Some(3));
        assert_eq!(store.snapshot(id(1), Some(9..12)).map(|s| s.len()), Some(0));
        assert_eq!(store.snapshot(id(1), None).map(|s| s.len()), Some(5));
        assert!(store.snapshot(id(2), None).is_none());
    }
}
