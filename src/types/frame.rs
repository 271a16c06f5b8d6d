//! Decoded motion-capture frame records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded motion-capture sample.
///
/// This is the fundamental data unit that flows through the system. Frames are
/// immutable once decoded and shared between threads behind an `Arc`; the
/// sequence number is implicit (the frame's position in its queue).
///
/// Per-actor and per-prop transform data stays opaque: everything beyond the
/// fields needed for schema detection is kept as raw JSON so a frame survives
/// a decode/encode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Sample rate reported by the sender
    #[serde(default)]
    pub fps: f32,

    /// Scene snapshot
    pub scene: Scene,

    /// Remaining top-level fields (protocol version and similar)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Scene snapshot carried by a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Wall-clock timestamp reported by the sender, in seconds
    #[serde(default)]
    pub timestamp: f64,

    #[serde(default)]
    pub actors: Vec<Actor>,

    #[serde(default)]
    pub props: Vec<Prop>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A captured performer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,

    /// Display color as RGB
    #[serde(default)]
    pub color: [u8; 3],

    /// Which parts of the rig this actor drives
    #[serde(default)]
    pub meta: ActorMeta,

    /// Body, finger and face sub-records, untouched
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Capability flags of an actor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorMeta {
    #[serde(default)]
    pub has_body: bool,
    #[serde(default)]
    pub has_left_glove: bool,
    #[serde(default)]
    pub has_right_glove: bool,
    #[serde(default)]
    pub has_face: bool,
}

/// A tracked rigid prop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prop {
    pub name: String,

    #[serde(default)]
    pub color: [u8; 3],

    /// Transform data, untouched
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Frame {
    /// Create a frame from its parts
    pub fn new(fps: f32, timestamp: f64, actors: Vec<Actor>, props: Vec<Prop>) -> Self {
        Self {
            fps,
            scene: Scene { timestamp, actors, props, extra: Map::new() },
            extra: Map::new(),
        }
    }

    /// Timestamp reported by the sender
    pub fn timestamp(&self) -> f64 {
        self.scene.timestamp
    }

    pub fn actors(&self) -> &[Actor] {
        &self.scene.actors
    }

    pub fn props(&self) -> &[Prop] {
        &self.scene.props
    }

    /// Look up an actor by name
    pub fn actor(&self, name: &str) -> Option<&Actor> {
        self.scene.actors.iter().find(|a| a.name == name)
    }

    /// Look up a prop by name
    pub fn prop(&self, name: &str) -> Option<&Prop> {
        self.scene.props.iter().find(|p| p.name == name)
    }
}

impl Actor {
    pub fn new(name: impl Into<String>, color: [u8; 3], meta: ActorMeta) -> Self {
        Self { name: name.into(), color, meta, data: Map::new() }
    }

    /// Attach an opaque sub-record such as `body` or `face`
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

impl Prop {
    pub fn new(name: impl Into<String>, color: [u8; 3]) -> Self {
        Self { name: name.into(), color, data: Map::new() }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}
