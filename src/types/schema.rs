//! Entity schema snapshots used for change detection

use serde::{Deserialize, Serialize};

use super::{ActorMeta, Frame};

/// The set of actors and props present in a stream, with the fields that
/// identify them.
///
/// Two frames with equal schemas differ only in per-frame transform values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct EntitySchema {
    pub actors: Vec<ActorSignature>,
    pub props: Vec<PropSignature>,
}

/// Identifying fields of an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ActorSignature {
    pub name: String,
    pub color: [u8; 3],
    pub has_body: bool,
    pub has_left_glove: bool,
    pub has_right_glove: bool,
    pub has_face: bool,
}

/// Identifying fields of a prop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct PropSignature {
    pub name: String,
    pub color: [u8; 3],
}

impl EntitySchema {
    /// The schema of a silent or disconnected stream
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extract the schema of a frame
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            actors: frame
                .actors()
                .iter()
                .map(|a| ActorSignature::new(&a.name, a.color, a.meta))
                .collect(),
            props: frame
                .props()
                .iter()
                .map(|p| PropSignature { name: p.name.clone(), color: p.color })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty() && self.props.is_empty()
    }

    /// Compare against a frame without allocating a new schema.
    pub fn matches(&self, frame: &Frame) -> bool {
        self.actors.len() == frame.actors().len()
            && self.props.len() == frame.props().len()
            && self.actors.iter().zip(frame.actors()).all(|(sig, actor)| {
                sig.name == actor.name && sig.color == actor.color && sig.meta() == actor.meta
            })
            && self
                .props
                .iter()
                .zip(frame.props())
                .all(|(sig, prop)| sig.name == prop.name && sig.color == prop.color)
    }
}

impl ActorSignature {
    fn new(name: &str, color: [u8; 3], meta: ActorMeta) -> Self {
        Self {
            name: name.to_string(),
            color,
            has_body: meta.has_body,
            has_left_glove: meta.has_left_glove,
            has_right_glove: meta.has_right_glove,
            has_face: meta.has_face,
        }
    }

    /// Capability flags as carried on the wire
    pub fn meta(&self) -> ActorMeta {
        ActorMeta {
            has_body: self.has_body,
            has_left_glove: self.has_left_glove,
            has_right_glove: self.has_right_glove,
            has_face: self.has_face,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, Prop};

    fn frame(actors: Vec<Actor>, props: Vec<Prop>) -> Frame {
        Frame::new(60.0, 0.0, actors, props)
    }

    fn body_only() -> ActorMeta {
        ActorMeta { has_body: true, ..ActorMeta::default() }
    }

    #[test]
    fn schema_of_frame_matches_itself() {
        let f =
            frame(vec![Actor::new("A", [1, 2, 3], body_only())], vec![Prop::new("P", [9, 9, 9])]);
        let schema = EntitySchema::from_frame(&f);
        assert!(schema.matches(&f));
        assert_eq!(schema.actors[0].meta(), body_only());
    }

    #[test]
    fn transform_changes_do_not_affect_schema() {
        let a = frame(vec![Actor::new("A", [1, 2, 3], body_only())], vec![]);
        let b = frame(
            vec![
                Actor::new("A", [1, 2, 3], body_only())
                    .with_data("body", serde_json::json!({ "hip": 1.0 })),
            ],
            vec![],
        );
        assert!(EntitySchema::from_frame(&a).matches(&b));
    }

    #[test]
    fn capability_color_name_and_count_changes_are_detected() {
        let base = frame(vec![Actor::new("A", [1, 2, 3], body_only())], vec![]);
        let schema = EntitySchema::from_frame(&base);

        let face = ActorMeta { has_face: true, ..body_only() };
        assert!(!schema.matches(&frame(vec![Actor::new("A", [1, 2, 3], face)], vec![])));
        assert!(!schema.matches(&frame(vec![Actor::new("A", [0, 2, 3], body_only())], vec![])));
        assert!(!schema.matches(&frame(vec![Actor::new("B", [1, 2, 3], body_only())], vec![])));
        assert!(!schema.matches(&frame(vec![], vec![])));
        assert!(!schema.matches(&frame(
            vec![Actor::new("A", [1, 2, 3], body_only())],
            vec![Prop::new("P", [0, 0, 0])]
        )));
    }

    #[test]
    fn empty_schema_matches_empty_frame() {
        assert!(EntitySchema::empty().matches(&frame(vec![], vec![])));
        assert!(EntitySchema::empty().is_empty());
    }
}
