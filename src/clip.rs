//! Clip files on disk
//!
//! A clip file is exactly one batch blob (see [`crate::codec::encode_batch`]):
//! a little-endian `u32` uncompressed length followed by an LZ4 block holding a
//! JSON array of frames.
//!
//! ```rust,no_run
//! use mocap_live::clip;
//!
//! fn copy_clip() -> mocap_live::Result<()> {
//!     let frames = clip::load_clip("take_01.clip")?;
//!     println!("Clip holds {} frames", frames.len());
//!     clip::save_clip("take_01_copy.clip", &frames)?;
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::codec;
use crate::types::Frame;
use crate::{Result, StreamError};

/// Read every frame of a clip file, in order.
pub fn load_clip<P: AsRef<Path>>(path: P) -> Result<Vec<Frame>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Read clip file");

    let frames = codec::decode_batch(&bytes)?;
    info!(path = %path.display(), frames = frames.len(), "Loaded clip");
    Ok(frames)
}

/// Write frames to a clip file, replacing any existing file.
///
/// The blob is written next to the target and renamed into place so a failed
/// write never leaves a half-written clip behind.
pub fn save_clip<P, F>(path: P, frames: &[F]) -> Result<()>
where
    P: AsRef<Path>,
    F: std::borrow::Borrow<Frame>,
{
    let path = path.as_ref();
    let blob = codec::encode_batch(frames)?;

    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    fs::write(&staging, &blob).and_then(|()| fs::rename(&staging, path)).map_err(|e| {
        // a short write leaves a truncated staging file too
        if let Err(cleanup) = fs::remove_file(&staging) {
            debug!(error = %cleanup, "No staging file to remove");
        }
        StreamError::file_error(path.to_path_buf(), e)
    })?;

    info!(path = %path.display(), frames = frames.len(), bytes = blob.len(), "Saved clip");
    Ok(())
}
