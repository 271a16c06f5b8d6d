//! Playback cursor and frame dispatch
//!
//! The cursor holds two counters behind the frame-counter lock:
//!
//! - `received_count`: frames appended to the live queue since the last reset
//! - `dispatch_index`: the frame index currently broadcast to consumers
//!
//! While following live, every received frame moves `dispatch_index` to the
//! newest frame. Seeking or pausing decouples the counters until
//! [`PlaybackCursor::sync`] couples them again.
//!
//! The playback-rate divisor is a frame-skipping throttle: a dispatch happens
//! on every Nth receiver iteration, and while playing (unless following a live
//! queue that is being appended to) each dispatch advances `dispatch_index` by
//! one. Advancing wraps, since every index is taken modulo a queue length.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::events::{EngineEvent, EventBus};
use crate::registry::{Consumer, ConsumerRegistry};
use crate::store::FrameQueueStore;
use crate::types::DataSetId;

/// Counter values at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    pub received_count: usize,
    pub dispatch_index: usize,
    pub playing: bool,
    pub following_live: bool,
    pub divisor: u32,
}

/// A dispatch that is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub dispatch_index: usize,
    pub playing: bool,
}

#[derive(Debug)]
struct Counters {
    received_count: usize,
    dispatch_index: usize,
    playing: bool,
    following_live: bool,
    divisor: u32,
    ticks: u64,
}

impl Counters {
    fn new(divisor: u32) -> Self {
        Self {
            received_count: 0,
            dispatch_index: 0,
            playing: false,
            following_live: true,
            divisor: divisor.max(1),
            ticks: 0,
        }
    }
}

/// Receive and dispatch counters shared by the worker and the host.
#[derive(Debug)]
pub struct PlaybackCursor {
    counters: Mutex<Counters>,
}

impl PlaybackCursor {
    pub fn new(divisor: u32) -> Self {
        Self { counters: Mutex::new(Counters::new(divisor)) }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CursorState {
        let c = self.lock();
        CursorState {
            received_count: c.received_count,
            dispatch_index: c.dispatch_index,
            playing: c.playing,
            following_live: c.following_live,
            divisor: c.divisor,
        }
    }

    /// Zero both counters and follow live again. Play state and divisor survive.
    pub fn reset(&self) {
        let mut c = self.lock();
        c.received_count = 0;
        c.dispatch_index = 0;
        c.following_live = true;
        c.ticks = 0;
    }

    /// Count one frame appended to the live queue.
    pub fn record_received(&self) -> usize {
        let mut c = self.lock();
        c.received_count = c.received_count.saturating_add(1);
        if c.following_live {
            c.dispatch_index = c.received_count - 1;
        }
        c.received_count
    }

    /// One receiver iteration. Returns the dispatch to perform, if one is due.
    ///
    /// `buffering` says whether received frames are being appended. Following
    /// live only holds the index while they are; otherwise playing leaves the
    /// live edge and advances.
    pub fn tick(&self, buffering: bool) -> Option<DispatchPlan> {
        let mut c = self.lock();
        c.ticks = c.ticks.wrapping_add(1);
        if c.ticks % u64::from(c.divisor) != 0 {
            return None;
        }
        if c.playing && !(c.following_live && buffering) {
            c.following_live = false;
            c.dispatch_index = c.dispatch_index.wrapping_add(1);
        }
        Some(DispatchPlan { dispatch_index: c.dispatch_index, playing: c.playing })
    }

    /// One step of no-connection playback: advance if playing.
    ///
    /// The caller paces these steps with a sleep scaled by the divisor.
    pub fn step(&self) -> DispatchPlan {
        let mut c = self.lock();
        if c.playing {
            c.dispatch_index = c.dispatch_index.wrapping_add(1);
        }
        DispatchPlan { dispatch_index: c.dispatch_index, playing: c.playing }
    }

    /// Jump to `idx` (manual scrub). Stops following live.
    pub fn seek(&self, idx: usize) -> DispatchPlan {
        let mut c = self.lock();
        c.dispatch_index = idx;
        c.following_live = false;
        DispatchPlan { dispatch_index: idx, playing: c.playing }
    }

    /// Current dispatch without changing anything.
    pub fn current(&self) -> DispatchPlan {
        let c = self.lock();
        DispatchPlan { dispatch_index: c.dispatch_index, playing: c.playing }
    }

    /// Couple the dispatch index to the live edge again.
    pub fn sync(&self) -> DispatchPlan {
        let mut c = self.lock();
        c.following_live = true;
        c.dispatch_index = c.received_count.saturating_sub(1);
        DispatchPlan { dispatch_index: c.dispatch_index, playing: c.playing }
    }

    pub fn play(&self) {
        self.lock().playing = true;
    }

    /// Freeze `dispatch_index`. Consumers keep their last frame.
    pub fn pause(&self) {
        let mut c = self.lock();
        c.playing = false;
        c.following_live = false;
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn set_divisor(&self, divisor: u32) {
        let mut c = self.lock();
        c.divisor = divisor.max(1);
        c.ticks = 0;
    }

    pub fn divisor(&self) -> u32 {
        self.lock().divisor
    }
}

/// Resolve the index a consumer should render.
///
/// `None` means the consumer must be flushed: it is dead, unassigned, its
/// data-set has no frames, or its sub-range is empty after clamping.
pub fn resolve_index(
    consumer: &dyn Consumer,
    lengths: &HashMap<DataSetId, usize>,
    dispatch_index: usize,
) -> Option<usize> {
    if !consumer.is_alive() {
        return None;
    }
    let target = consumer.target_data_set()?;
    let len = *lengths.get(&target).filter(|len| **len > 0)?;

    match consumer.sub_range() {
        None => Some(dispatch_index % len),
        Some(Range { start, end }) => {
            let end = end.min(len);
            let width = end.checked_sub(start).filter(|w| *w > 0)?;
            Some(start + dispatch_index % width)
        }
    }
}

/// Pushes the dispatch index into every consumer slot.
pub struct PlaybackDispatcher<'a> {
    store: &'a FrameQueueStore,
    registry: &'a ConsumerRegistry,
    events: &'a EventBus,
}

impl<'a> PlaybackDispatcher<'a> {
    pub fn new(
        store: &'a FrameQueueStore,
        registry: &'a ConsumerRegistry,
        events: &'a EventBus,
    ) -> Self {
        Self { store, registry, events }
    }

    /// Assign every consumer its index for `plan`, then request one redraw.
    ///
    /// Returns how many consumers received an index.
    pub fn dispatch(&self, plan: DispatchPlan) -> usize {
        let lengths = self.store.lengths();
        let consumers = self.registry.snapshot();

        let assignments: Vec<_> = consumers
            .iter()
            .map(|(handle, consumer)| {
                (*handle, resolve_index(consumer.as_ref(), &lengths, plan.dispatch_index))
            })
            .collect();
        let assigned = assignments.iter().filter(|(_, idx)| idx.is_some()).count();

        self.registry.assign_many(assignments);
        trace!(dispatch_index = plan.dispatch_index, assigned, "Dispatched frame");

        self.events.emit(EngineEvent::Redraw { playing: plan.playing });
        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestConsumer;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn id(raw: u32) -> DataSetId {
        DataSetId::from_raw(raw)
    }

    #[test]
    fn divisor_three_advances_once_per_three_ticks_while_playing() {
        let cursor = PlaybackCursor::new(3);
        cursor.seek(0);
        cursor.play();

        let dispatches = (0..9).filter_map(|_| cursor.tick(true)).count();
        assert_eq!(dispatches, 3);
        assert_eq!(cursor.state().dispatch_index, 3);

        cursor.pause();
        let before = cursor.state().dispatch_index;
        for _ in 0..9 {
            cursor.tick(true);
        }
        assert_eq!(cursor.state().dispatch_index, before);
    }

    #[test]
    fn following_live_tracks_newest_frame() {
        let cursor = PlaybackCursor::new(1);
        for _ in 0..5 {
            cursor.record_received();
        }
        let state = cursor.state();
        assert_eq!(state.received_count, 5);
        assert_eq!(state.dispatch_index, 4);

        cursor.seek(1);
        cursor.record_received();
        assert_eq!(cursor.state().dispatch_index, 1);

        let plan = cursor.sync();
        assert_eq!(plan.dispatch_index, 5);
        cursor.record_received();
        assert_eq!(cursor.state().dispatch_index, 6);
    }

    #[test]
    fn reset_clears_counters_but_keeps_divisor() {
        let cursor = PlaybackCursor::new(4);
        cursor.record_received();
        cursor.seek(10);
        cursor.reset();

        let state = cursor.state();
        assert_eq!(state.received_count, 0);
        assert_eq!(state.dispatch_index, 0);
        assert!(state.following_live);
        assert_eq!(state.divisor, 4);
    }

    #[test]
    fn playing_without_buffering_leaves_live_edge() {
        let cursor = PlaybackCursor::new(1);
        cursor.play();

        cursor.tick(true);
        assert_eq!(cursor.state().dispatch_index, 0);
        assert!(cursor.state().following_live);

        cursor.tick(false);
        cursor.tick(false);
        let state = cursor.state();
        assert_eq!(state.dispatch_index, 2);
        assert!(!state.following_live);

        // decoupled now, so buffering again keeps advancing
        cursor.tick(true);
        assert_eq!(cursor.state().dispatch_index, 3);
    }

    #[test]
    fn advancing_past_usize_max_wraps() {
        let cursor = PlaybackCursor::new(1);
        cursor.seek(usize::MAX);
        cursor.play();
        assert_eq!(cursor.tick(true).map(|plan| plan.dispatch_index), Some(0));

        cursor.seek(usize::MAX);
        assert_eq!(cursor.step().dispatch_index, 0);

        let lengths: HashMap<_, _> = [(id(1), 7)].into();
        let consumer = TestConsumer::following(id(1));
        assert_eq!(resolve_index(consumer.as_ref(), &lengths, usize::MAX), Some(usize::MAX % 7));
    }

    #[test]
    fn zero_divisor_is_clamped() {
        let cursor = PlaybackCursor::new(0);
        assert_eq!(cursor.divisor(), 1);
        cursor.set_divisor(0);
        assert!(cursor.tick(true).is_some());
    }

    #[test]
    fn shared_queue_sub_ranges_resolve_independently() {
        let lengths: HashMap<_, _> = [(id(1), 40)].into();
        let first = TestConsumer::with_range(id(1), 0..10);
        let second = TestConsumer::with_range(id(1), 20..30);

        assert_eq!(resolve_index(first.as_ref(), &lengths, 25), Some(5));
        assert_eq!(resolve_index(second.as_ref(), &lengths, 25), Some(25));
    }

    #[test]
    fn consumers_without_valid_data_are_flushed() {
        let lengths: HashMap<_, _> = [(id(1), 10)].into();

        let dead = TestConsumer::following(id(1));
        dead.set_alive(false);
        assert_eq!(resolve_index(dead.as_ref(), &lengths, 3), None);

        assert_eq!(resolve_index(TestConsumer::unassigned().as_ref(), &lengths, 3), None);
        assert_eq!(resolve_index(TestConsumer::following(id(2)).as_ref(), &lengths, 3), None);

        let zero_width = TestConsumer::with_range(id(1), 4..4);
        assert_eq!(resolve_index(zero_width.as_ref(), &lengths, 3), None);

        let past_end = TestConsumer::with_range(id(1), 12..20);
        assert_eq!(resolve_index(past_end.as_ref(), &lengths, 3), None);

        let empty: HashMap<_, _> = [(id(1), 0)].into();
        assert_eq!(resolve_index(TestConsumer::following(id(1)).as_ref(), &empty, 3), None);
    }

    #[test]
    fn dispatcher_assigns_and_requests_redraw() {
        let store = FrameQueueStore::new();
        let registry = ConsumerRegistry::new();
        let events = EventBus::new(16);
        let mut rx = events.subscribe();

        store
            .connect_data_set(id(1), &Default::default(), || {
                Ok(crate::test_utils::sample_frames(4))
            })
            .unwrap();
        let playing = registry.register(TestConsumer::following(id(1)));
        let orphan = registry.register(TestConsumer::following(id(9)));
        registry.assign(orphan, 2);

        let assigned = PlaybackDispatcher::new(&store, &registry, &events)
            .dispatch(DispatchPlan { dispatch_index: 6, playing: true });

        assert_eq!(assigned, 1);
        assert_eq!(registry.current_index(playing), Some(2));
        assert_eq!(registry.current_index(orphan), None);
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::Redraw { playing: true });
    }

    proptest! {
        #[test]
        fn resolved_index_is_always_in_bounds(
            len in 0usize..500,
            dispatch_index in any::<usize>(),
            start in 0usize..600,
            width in 0usize..600,
            use_range in any::<bool>(),
        ) {
            let lengths: HashMap<_, _> = [(id(1), len)].into();
            let consumer = if use_range {
                TestConsumer::with_range(id(1), start..start + width)
            } else {
                TestConsumer::following(id(1))
            };

            match resolve_index(consumer.as_ref(), &lengths, dispatch_index) {
                Some(idx) => prop_assert!(idx < len),
                None => prop_assert!(len == 0 || use_range),
            }
        }
    }

    #[test]
    fn consumer_trait_objects_resolve() {
        let consumer: Arc<dyn Consumer> = TestConsumer::following(id(1));
        let lengths: HashMap<_, _> = [(id(1), 3)].into();
        assert_eq!(resolve_index(consumer.as_ref(), &lengths, 7), Some(1));
    }
}
