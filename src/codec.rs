//! Frame codec for wire datagrams and clip blobs.
//!
//! Two encodings share the same JSON frame shape:
//!
//! - **Datagram**: one frame, JSON compressed as a streaming LZ4 frame. This is
//!   what the capture application sends, one UDP datagram per frame.
//! - **Batch**: a JSON array of frames compressed as a single LZ4 block with the
//!   uncompressed length prepended as a little-endian `u32`. This is the body
//!   of a clip file.
//!
//! Every failure (bad LZ4 header, truncated stream, malformed JSON) comes back
//! as [`StreamError::Decode`]. Nothing here panics on hostile input, so the
//! receive loop can drop one bad datagram and keep going.
//!
//! ```rust
//! use mocap_live::codec;
//! use mocap_live::types::Frame;
//!
//! # fn main() -> mocap_live::Result<()> {
//! let frames = vec![Frame::new(60.0, 0.0, vec![], vec![])];
//! let blob = codec::encode_batch(&frames)?;
//! assert_eq!(codec::decode_batch(&blob)?, frames);
//! # Ok(())
//! # }
//! ```

use std::borrow::Borrow;
use std::io::{Read, Write};

use lz4_flex::frame::{FrameDecoder, FrameEncoder};

use crate::types::Frame;
use crate::{Result, StreamError};

/// Default decompression limit for a single datagram.
pub const DEFAULT_MAX_DECODED_SIZE: usize = 4 * 1024 * 1024;

/// Upper bound accepted for the length prefix of a batch blob.
pub const MAX_BATCH_DECODED_SIZE: usize = 1 << 30;

const PREFIX_LEN: usize = 4;
const MAX_LZ4_RATIO: usize = 255;

/// Decode one datagram.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    decode_with_limit(bytes, DEFAULT_MAX_DECODED_SIZE)
}

/// Decode one datagram, refusing to inflate past `max_decoded` bytes.
pub fn decode_with_limit(bytes: &[u8], max_decoded: usize) -> Result<Frame> {
    let json = decompress_datagram(bytes, max_decoded)?;
    serde_json::from_slice(&json).map_err(|e| StreamError::decode_error("datagram JSON", e))
}

/// Encode one frame as a datagram payload.
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    let json =
        serde_json::to_vec(frame).map_err(|e| StreamError::encode_error("datagram JSON", e))?;

    let mut encoder = FrameEncoder::new(Vec::with_capacity(json.len() / 2));
    encoder.write_all(&json).map_err(|e| StreamError::encode_error("datagram LZ4", e))?;
    encoder.finish().map_err(|e| StreamError::encode_error("datagram LZ4", e))
}

/// Decode a batch blob into its ordered frames.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Frame>> {
    if bytes.len() < PREFIX_LEN {
        return Err(StreamError::decode_error(
            "batch header",
            format!("blob is {} bytes, shorter than its length prefix", bytes.len()),
        ));
    }

    let (prefix, body) = bytes.split_at(PREFIX_LEN);
    let expected = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if expected > MAX_BATCH_DECODED_SIZE {
        return Err(StreamError::decode_error(
            "batch header",
            format!("declared size {} exceeds limit {}", expected, MAX_BATCH_DECODED_SIZE),
        ));
    }
    // LZ4 cannot expand a block by more than ~255x
    if expected > body.len().saturating_mul(MAX_LZ4_RATIO).saturating_add(MAX_LZ4_RATIO) {
        return Err(StreamError::decode_error(
            "batch header",
            format!("declared size {} is impossible for {} compressed bytes", expected, body.len()),
        ));
    }

    let json = lz4_flex::block::decompress(body, expected)
        .map_err(|e| StreamError::decode_error("batch LZ4", e))?;
    if json.len() != expected {
        return Err(StreamError::decode_error(
            "batch LZ4",
            format!("expected {} bytes, inflated {}", expected, json.len()),
        ));
    }

    serde_json::from_slice(&json).map_err(|e| StreamError::decode_error("batch JSON", e))
}

/// Encode an ordered sequence of frames as a batch blob.
pub fn encode_batch<F: Borrow<Frame>>(frames: &[F]) -> Result<Vec<u8>> {
    let refs: Vec<&Frame> = frames.iter().map(Borrow::borrow).collect();
    let json = serde_json::to_vec(&refs).map_err(|e| StreamError::encode_error("batch JSON", e))?;
    if json.len() > MAX_BATCH_DECODED_SIZE {
        return Err(StreamError::encode_error(
            "batch",
            format!("{} bytes exceeds limit {}", json.len(), MAX_BATCH_DECODED_SIZE),
        ));
    }
    Ok(lz4_flex::block::compress_prepend_size(&json))
}

fn decompress_datagram(bytes: &[u8], max_decoded: usize) -> Result<Vec<u8>> {
    let mut json = Vec::with_capacity(bytes.len() * 4);
    FrameDecoder::new(bytes)
        .take(max_decoded as u64 + 1)
        .read_to_end(&mut json)
        .map_err(|e| StreamError::decode_error("datagram LZ4", e))?;

    if json.len() > max_decoded {
        return Err(StreamError::decode_error(
            "datagram LZ4",
            format!("inflates past the {} byte limit", max_decoded),
        ));
    }
    if json.is_empty() {
        return Err(StreamError::decode_error("datagram LZ4", "empty payload"));
    }
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_frame, sample_frame};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn batch_round_trip_preserves_order_and_content(
            frames in prop::collection::vec(arb_frame(), 1..8)
        ) {
            let blob = encode_batch(&frames).unwrap();
            let decoded = decode_batch(&blob).unwrap();
            prop_assert_eq!(&decoded, &frames);

            // a second cycle yields the same content again
            let again = decode_batch(&encode_batch(&decoded).unwrap()).unwrap();
            prop_assert_eq!(again, frames);
        }

        #[test]
        fn datagram_round_trip(frame in arb_frame()) {
            let bytes = encode(&frame).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), frame);
        }

        #[test]
        fn garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode(&bytes);
            let _ = decode_batch(&bytes);
        }
    }

    #[test]
    fn corrupt_header_is_a_decode_error() {
        let mut bytes = encode(&sample_frame(0)).unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(StreamError::Decode { .. })));
    }

    #[test]
    fn truncated_datagram_is_a_decode_error() {
        let bytes = encode(&sample_frame(3)).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(decode(truncated), Err(StreamError::Decode { .. })));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_all(b"{\"fps\": 60, \"scene\": [").unwrap();
        let bytes = encoder.finish().unwrap();
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("datagram JSON"), "got {err}");
    }

    #[test]
    fn oversized_datagram_is_rejected() {
        let bytes = encode(&sample_frame(1)).unwrap();
        assert!(decode_with_limit(&bytes, 16).is_err());
        assert!(decode_with_limit(&bytes, DEFAULT_MAX_DECODED_SIZE).is_ok());
    }

    #[test]
    fn batch_with_lying_prefix_is_rejected() {
        let mut blob = encode_batch(&[sample_frame(0), sample_frame(1)]).unwrap();
        let declared = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]);
        blob[..4].copy_from_slice(&(declared + 10).to_le_bytes());
        assert!(decode_batch(&blob).is_err());

        blob[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(decode_batch(&blob).is_err());
    }

    #[test]
    fn short_batch_is_rejected() {
        assert!(decode_batch(&[1, 2]).is_err());
    }

    #[test]
    fn shortest_float_text_parses_back_exactly() {
        let timestamps = [1823.3521453552403, 0.1 + 0.2, 9999.999999999998, 5e-324, f64::MAX];
        let frames: Vec<_> = timestamps
            .iter()
            .map(|t| Frame::new(60.0, *t, Vec::new(), Vec::new()))
            .collect();

        let decoded = decode_batch(&encode_batch(&frames).unwrap()).unwrap();
        for (frame, expected) in decoded.iter().zip(timestamps) {
            assert_eq!(frame.timestamp().to_bits(), expected.to_bits());
        }
        assert_eq!(decode(&encode(&frames[0]).unwrap()).unwrap().timestamp(), timestamps[0]);
    }

    #[test]
    fn empty_batch_round_trips() {
        let blob = encode_batch::<Frame>(&[]).unwrap();
        assert!(decode_batch(&blob).unwrap().is_empty());
    }
}
