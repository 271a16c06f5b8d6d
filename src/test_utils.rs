//! Test utilities: synthetic frames, scripted datagram sources and consumers
//!
//! Shared by unit tests, the connection scenario tests and the benchmarks.

#![cfg(any(test, feature = "benchmark"))]

#[cfg(test)]
use proptest::prelude::*;
use serde_json::json;
use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::codec;
use crate::config::EngineConfig;
use crate::connection::DatagramSource;
use crate::registry::Consumer;
use crate::types::{Actor, ActorMeta, DataSetId, Frame, Prop};

/// Deterministic frame `i` of a two-actor, one-prop scene at 60 fps.
///
/// Float values are binary fractions so they survive a JSON round trip exactly.
pub fn sample_frame(i: usize) -> Frame {
    let t = i as f64 / 64.0;
    let body = ActorMeta {
        has_body: true,
        has_left_glove: true,
        has_right_glove: true,
        ..Default::default()
    };
    let face = ActorMeta { has_face: true, ..Default::default() };

    Frame::new(
        60.0,
        t,
        vec![
            Actor::new("performer", [255, 128, 0], body).with_data(
                "body",
                json!({ "hip": { "position": { "x": t, "y": 1.0, "z": 0.5 } } }),
            ),
            Actor::new("face", [0, 64, 255], face)
                .with_data("face", json!({ "jawOpen": (i % 8) as f64 / 8.0 })),
        ],
        vec![Prop::new("camera", [10, 20, 30])
            .with_data("position", json!({ "x": 0.25, "y": t, "z": -1.5 }))],
    )
}

/// `n` consecutive sample frames.
pub fn sample_frames(n: usize) -> Vec<Frame> {
    (0..n).map(sample_frame).collect()
}

/// Wire datagram of [`sample_frame`].
pub fn sample_datagram(i: usize) -> Vec<u8> {
    codec::encode(&sample_frame(i)).unwrap_or_default()
}

#[cfg(test)]
fn arb_meta() -> impl Strategy<Value = ActorMeta> {
    any::<[bool; 4]>().prop_map(|[has_body, has_left_glove, has_right_glove, has_face]| {
        ActorMeta { has_body, has_left_glove, has_right_glove, has_face }
    })
}

/// Any finite `f64`, the only values JSON can carry.
#[cfg(test)]
fn arb_finite() -> impl Strategy<Value = f64> {
    use prop::num::f64::{NEGATIVE, NORMAL, POSITIVE, SUBNORMAL, ZERO};
    POSITIVE | NEGATIVE | NORMAL | SUBNORMAL | ZERO
}

#[cfg(test)]
fn arb_actor() -> impl Strategy<Value = Actor> {
    ("[a-z]{1,8}", any::<[u8; 3]>(), arb_meta(), arb_finite(), -1000i64..1000).prop_map(
        |(name, color, meta, x, id)| {
            Actor::new(name, color, meta).with_data("body", json!({ "hip": { "x": x, "id": id } }))
        },
    )
}

#[cfg(test)]
fn arb_prop() -> impl Strategy<Value = Prop> {
    ("[a-z]{1,8}", any::<[u8; 3]>(), arb_finite()).prop_map(|(name, color, y)| {
        Prop::new(name, color).with_data("position", json!({ "y": y }))
    })
}

/// Arbitrary frames with any finite timestamp and transform values.
#[cfg(test)]
pub fn arb_frame() -> impl Strategy<Value = Frame> {
    (
        prop::sample::select(vec![24.0f32, 30.0, 60.0, 100.0, 120.0]),
        arb_finite(),
        prop::collection::vec(arb_actor(), 0..3),
        prop::collection::vec(arb_prop(), 0..3),
    )
        .prop_map(|(fps, timestamp, actors, props)| Frame::new(fps, timestamp, actors, props))
}

/// Configuration with short timeouts, bound to an ephemeral loopback port.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        read_timeout_ms: 20,
        idle_read_timeout_ms: 10,
        no_connection_frame_ms: 1,
        ..EngineConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A consumer whose answers the test controls.
#[derive(Debug)]
pub struct TestConsumer {
    target: Option<DataSetId>,
    range: Option<Range<usize>>,
    alive: AtomicBool,
}

impl TestConsumer {
    /// Plays the whole of `data_set`.
    pub fn following(data_set: DataSetId) -> Arc<Self> {
        Arc::new(Self { target: Some(data_set), range: None, alive: AtomicBool::new(true) })
    }

    /// Alive but not assigned to any data-set.
    pub fn unassigned() -> Arc<Self> {
        Arc::new(Self { target: None, range: None, alive: AtomicBool::new(true) })
    }

    /// Loops over `range` of `data_set`.
    pub fn with_range(data_set: DataSetId, range: Range<usize>) -> Arc<Self> {
        Arc::new(Self { target: Some(data_set), range: Some(range), alive: AtomicBool::new(true) })
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

impl Consumer for TestConsumer {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn target_data_set(&self) -> Option<DataSetId> {
        self.target
    }

    fn sub_range(&self) -> Option<Range<usize>> {
        self.range.clone()
    }
}

/// One scripted outcome of [`ScriptedSource::recv`]
#[derive(Debug, Clone)]
pub enum Step {
    Timeout,
    Datagram(Vec<u8>),
    Error(io::ErrorKind),
}

/// A datagram source that replays a fixed script.
///
/// Once the script is used up every call behaves like a silent socket, unless
/// the source was built with [`ScriptedSource::looping`].
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    repeat_last: bool,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps.into_iter().collect()), repeat_last: false })
    }

    /// Like [`ScriptedSource::new`], but the last step repeats forever.
    pub fn looping(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps.into_iter().collect()), repeat_last: true })
    }

    /// Append more steps while the worker runs.
    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).push_back(step);
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl DatagramSource for ScriptedSource {
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let (step, repeated) = {
            let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
            match steps.len() {
                1 if self.repeat_last => (steps.front().cloned(), true),
                _ => (steps.pop_front(), false),
            }
        };
        if repeated {
            // keep a looping script from spinning the worker
            thread::sleep(Duration::from_millis(1));
        }
        match step {
            Some(Step::Datagram(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Some(len))
            }
            Some(Step::Error(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(Step::Timeout) => {
                thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
            None => {
                thread::sleep(timeout.min(Duration::from_millis(5)));
                Ok(None)
            }
        }
    }
}
