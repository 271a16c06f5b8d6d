//! Core types for motion-capture stream data.
//!
//! - [`Frame`] is one decoded sample (scene snapshot with actors and props)
//! - [`DataSetId`] keys a buffered queue of frames and is derived from a
//!   [`DataSetDescriptor`] by content hash
//! - [`EntitySchema`] is the actor/prop roster used for change detection
//! - [`ConnectionStatus`] is the connection state machine
//! - [`UpdateRate`] controls how often hosts hear about redraws
//!
//! ## Usage Example
//!
//! ```rust
//! use mocap_live::types::{Actor, ActorMeta, EntitySchema, Frame};
//!
//! let meta = ActorMeta { has_body: true, ..ActorMeta::default() };
//! let frame = Frame::new(60.0, 1.5, vec![Actor::new("Performer", [255, 0, 0], meta)], vec![]);
//!
//! let schema = EntitySchema::from_frame(&frame);
//! assert!(schema.matches(&frame));
//! assert_eq!(schema.actors[0].name, "Performer");
//! ```

mod data_set;
mod frame;
mod schema;
mod status;
mod update_rate;

pub use data_set::{DataSetDescriptor, DataSetId};
pub use frame::{Actor, ActorMeta, Frame, Prop, Scene};
pub use schema::{ActorSignature, EntitySchema, PropSignature};
pub use status::ConnectionStatus;
pub use update_rate::UpdateRate;
