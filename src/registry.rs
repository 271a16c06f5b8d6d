//! Consumer registry
//!
//! Each registered consumer owns one slot holding the frame index it should
//! render now. Slots are last-write-wins: consumers render state, so an
//! intermediate index that was overwritten before anyone read it is simply
//! skipped.
//!
//! The registry sits behind its own mutex (the consumer lock). The dispatcher
//! takes a snapshot of the consumers, resolves indices without holding the
//! lock, then writes every slot back in one short critical section.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::types::DataSetId;

/// What the engine needs to know about something that renders frames.
///
/// Implemented by whatever scene object the host provides. Calls are cheap
/// reads; the dispatcher asks once per tick.
pub trait Consumer: Send + Sync {
    /// Whether the consumer still exists on the host side
    fn is_alive(&self) -> bool;

    /// The data-set this consumer plays, if it has been assigned one
    fn target_data_set(&self) -> Option<DataSetId>;

    /// Range of the data-set's queue this consumer loops over.
    ///
    /// `None` plays the whole queue.
    fn sub_range(&self) -> Option<Range<usize>> {
        None
    }
}

/// Opaque handle of a registered consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerHandle(u64);

impl fmt::Display for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

struct Slot {
    consumer: Arc<dyn Consumer>,
    index: Option<usize>,
}

/// Thread-safe map of consumer handle to its current frame index.
pub struct ConsumerRegistry {
    slots: Mutex<HashMap<ConsumerHandle, Slot>>,
    next_handle: AtomicU64,
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()), next_handle: AtomicU64::new(1) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConsumerHandle, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a consumer. Its slot starts flushed.
    pub fn register(&self, consumer: Arc<dyn Consumer>) -> ConsumerHandle {
        let handle = ConsumerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(handle, Slot { consumer, index: None });
        debug!(%handle, "Registered consumer");
        handle
    }

    pub fn unregister(&self, handle: ConsumerHandle) -> bool {
        self.lock().remove(&handle).is_some()
    }

    pub fn unregister_all(&self) {
        self.lock().clear();
    }

    /// Clear the consumer's index; it renders nothing until the next assignment.
    pub fn flush(&self, handle: ConsumerHandle) {
        if let Some(slot) = self.lock().get_mut(&handle) {
            slot.index = None;
        }
    }

    /// Flush every slot.
    pub fn flush_all(&self) {
        self.lock().values_mut().for_each(|slot| slot.index = None);
    }

    /// Set the index the consumer should render now.
    ///
    /// Returns `false` if the handle is not registered.
    pub fn assign(&self, handle: ConsumerHandle, idx: usize) -> bool {
        match self.lock().get_mut(&handle) {
            Some(slot) => {
                slot.index = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Write many slots at once; unknown handles are ignored.
    pub fn assign_many<I>(&self, assignments: I)
    where
        I: IntoIterator<Item = (ConsumerHandle, Option<usize>)>,
    {
        let mut slots = self.lock();
        for (handle, index) in assignments {
            if let Some(slot) = slots.get_mut(&handle) {
                slot.index = index;
            }
        }
    }

    pub fn current_index(&self, handle: ConsumerHandle) -> Option<usize> {
        self.lock().get(&handle)?.index
    }

    pub fn is_registered(&self, handle: ConsumerHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Every registered consumer, for resolution outside the lock.
    pub fn snapshot(&self) -> Vec<(ConsumerHandle, Arc<dyn Consumer>)> {
        self.lock().iter().map(|(h, slot)| (*h, Arc::clone(&slot.consumer))).collect()
    }

    /// Data-sets still targeted by a live consumer.
    pub fn referenced_data_sets(&self) -> HashSet<DataSetId> {
        self.snapshot()
            .into_iter()
            .filter(|(_, c)| c.is_alive())
            .filter_map(|(_, c)| c.target_data_set())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
