//! Buffering and playback of live motion-capture streams.
//!
//! mocap-live receives motion-capture frames over UDP, buffers them per
//! data-set and tells registered consumers which buffered frame to render,
//! either following the live edge or scrubbing through the recorded buffer.
//!
//! # Features
//!
//! - **Live buffering**: a background receiver appends every decoded frame
//! - **Clips**: recorded buffers save to and load from compressed clip files
//! - **Consumers**: anything implementing [`Consumer`] can follow a data-set,
//!   optionally looping over a sub-range of it
//! - **Notifications**: status, schema, buffer and redraw events as streams
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mocap_live::{Consumer, DataSetId, Engine, EngineConfig};
//!
//! struct Rig {
//!     data_set: DataSetId,
//! }
//!
//! impl Consumer for Rig {
//!     fn is_alive(&self) -> bool {
//!         true
//!     }
//!
//!     fn target_data_set(&self) -> Option<DataSetId> {
//!         Some(self.data_set)
//!     }
//! }
//!
//! fn main() -> mocap_live::Result<()> {
//!     let engine = Engine::new(EngineConfig::default())?;
//!     let rig = engine.register_consumer(Arc::new(Rig { data_set: engine.live_data_set() }));
//!
//!     engine.connect()?;
//!     engine.start_reception();
//!
//!     if let Some(idx) = engine.current_frame_index(rig) {
//!         let frame = engine.get_frame(engine.live_data_set(), idx);
//!         println!("render {:?}", frame.map(|f| f.timestamp()));
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire and storage formats
pub mod clip;
pub mod codec;
pub mod config;

// Buffering and dispatch
pub mod playback;
pub mod registry;
pub mod store;

// Connection and background worker
pub mod connection;
pub mod driver;
pub mod engine;
pub mod events;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

pub use config::EngineConfig;
pub use connection::{DatagramSource, UdpSource};
pub use engine::Engine;
pub use events::EngineEvent;
pub use playback::CursorState;
pub use registry::{Consumer, ConsumerHandle};
pub use store::ConnectOutcome;
