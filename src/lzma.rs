//! One-shot raw LZMA2 block transform.
//!
//! Records and the container directory are compressed as bare LZMA2 streams
//! with no container framing of their own; the only out-of-band state is a
//! single property byte carrying the dictionary size in the standard LZMA2
//! encoding. Tuning mirrors the reference streams: preset 5 with
//! `lc=3 lp=0 pb=2`, nice length 32, and an 8 MiB dictionary.

use xz2::stream::{Action, Filters, LzmaOptions, Status, Stream};

use crate::error::{Error, Result};

/// Size of the property block preceding a compressed stream.
pub const PROP_SIZE: usize = 1;

/// Dictionary size used by the encoder.
const DICT_SIZE: u32 = 1 << 23;

/// Match length the encoder considers "good enough" to stop searching.
const NICE_LEN: u32 = 32;

const PRESET: u32 = 5;

/// Output-growth granularity for the process loop.
const CHUNK: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Dictionary-size property byte
// ─────────────────────────────────────────────────────────────────────────────

/// Encodes a dictionary size as the one-byte LZMA2 property.
///
/// Values 0..40 decode as `(2 | (p & 1)) << (p/2 + 11)`; 40 means 4 GiB − 1.
/// The result is the smallest property whose decoded size covers
/// `dict_size`.
pub fn dict_size_prop(dict_size: u32) -> u8 {
    for prop in 0u8..40 {
        let covered = (2u32 | u32::from(prop & 1)) << (prop / 2 + 11);
        if covered >= dict_size {
            return prop;
        }
    }
    40
}

/// Decodes the one-byte LZMA2 property back into a dictionary size.
pub fn prop_dict_size(prop: u8) -> Option<u32> {
    match prop {
        40 => Some(u32::MAX),
        p if p < 40 => Some((2u32 | u32::from(p & 1)) << (p / 2 + 11)),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Block transform
// ─────────────────────────────────────────────────────────────────────────────

fn encoder_options() -> Result<LzmaOptions> {
    let mut opts = LzmaOptions::new_preset(PRESET).map_err(Error::lzma)?;
    opts.dict_size(DICT_SIZE)
        .literal_context_bits(3)
        .literal_position_bits(0)
        .position_bits(2)
        .nice_len(NICE_LEN);
    Ok(opts)
}

/// Compresses `src`, appending the raw LZMA2 stream to `out`.
///
/// Returns the property byte to store alongside the stream.
pub fn compress_block(src: &[u8], out: &mut Vec<u8>) -> Result<u8> {
    let opts = encoder_options()?;
    let mut filters = Filters::new();
    filters.lzma2(&opts);
    let mut stream = Stream::new_raw_encoder(&filters).map_err(Error::lzma)?;
    run(&mut stream, src, out, usize::MAX)?;
    Ok(dict_size_prop(DICT_SIZE))
}

/// Decompresses a raw LZMA2 stream into `out` (cleared first).
///
/// `expected_len` is the decoded length declared on the wire; any other
/// outcome (shorter, longer, or a stream that does not terminate) is an
/// error, never a panic or an unbounded allocation.
pub fn decompress_block(src: &[u8], prop: u8, expected_len: usize, out: &mut Vec<u8>) -> Result<()> {
    let dict_size = prop_dict_size(prop)
        .ok_or_else(|| Error::CompressionFailed(format!("dictionary property {prop} out of range")))?;
    let mut opts = LzmaOptions::new_preset(PRESET).map_err(Error::lzma)?;
    opts.dict_size(dict_size);
    let mut filters = Filters::new();
    filters.lzma2(&opts);
    let mut stream = Stream::new_raw_decoder(&filters).map_err(Error::lzma)?;

    out.clear();
    out.try_reserve(expected_len + 1).map_err(|_| Error::AllocationFailed)?;
    run(&mut stream, src, out, expected_len)?;
    if out.len() != expected_len {
        return Err(Error::CompressionFailed(format!(
            "stream decoded to {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(())
}

/// Drives `stream` over all of `src`, appending output to `out`.
///
/// Stops at end-of-stream; fails if output exceeds `limit` or the stream
/// stalls (truncated or corrupt input).
fn run(stream: &mut Stream, src: &[u8], out: &mut Vec<u8>, limit: usize) -> Result<()> {
    loop {
        let consumed = stream.total_in() as usize;
        let produced = out.len();
        if produced > limit {
            return Err(Error::CompressionFailed("stream output exceeds its declared length".into()));
        }
        if out.capacity() == out.len() {
            out.try_reserve(CHUNK).map_err(|_| Error::AllocationFailed)?;
        }

        let action = if consumed == src.len() { Action::Finish } else { Action::Run };
        let status = stream.process_vec(&src[consumed..], out, action).map_err(Error::lzma)?;
        if matches!(status, Status::StreamEnd) {
            return Ok(());
        }
        if stream.total_in() as usize == consumed && out.len() == produced {
            return Err(Error::CompressionFailed("stream stalled before end-of-stream".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_byte_covers_standard_sizes() {
        assert_eq!(dict_size_prop(1 << 12), 0); // 4 KiB floor
        assert_eq!(dict_size_prop(1 << 23), 22); // 8 MiB
        assert_eq!(dict_size_prop((1 << 23) + 1), 23);
        assert_eq!(dict_size_prop(u32::MAX), 40);

        assert_eq!(prop_dict_size(0), Some(1 << 12));
        assert_eq!(prop_dict_size(22), Some(1 << 23));
        assert_eq!(prop_dict_size(23), Some(3 << 22));
        assert_eq!(prop_dict_size(40), Some(u32::MAX));
        assert_eq!(prop_dict_size(41), None);
    }

    #[test]
    fn block_roundtrip() {
        let src: Vec<u8> = (0..8192u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let mut compressed = Vec::new();
        let prop = compress_block(&src, &mut compressed).unwrap();
        assert!(!compressed.is_empty());

        let mut out = Vec::new();
        decompress_block(&compressed, prop, src.len(), &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn roundtrip_empty_block() {
        let mut compressed = Vec::new();
        let prop = compress_block(&[], &mut compressed).unwrap();
        let mut out = Vec::new();
        decompress_block(&compressed, prop, 0, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn compress_appends_after_existing_bytes() {
        let mut buf = vec![0xAA, 0xBB];
        compress_block(b"payload payload payload", &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0xAA, 0xBB]);
        assert!(buf.len() > 2);
    }

    #[test]
    fn declared_length_mismatch_is_an_error() {
        let src = b"0123456789 0123456789 0123456789".to_vec();
        let mut compressed = Vec::new();
        let prop = compress_block(&src, &mut compressed).unwrap();

        let mut out = Vec::new();
        assert!(decompress_block(&compressed, prop, src.len() - 1, &mut out).is_err());
        assert!(decompress_block(&compressed, prop, src.len() + 7, &mut out).is_err());
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let src = vec![7u8; 4096];
        let mut compressed = Vec::new();
        let prop = compress_block(&src, &mut compressed).unwrap();
        compressed.truncate(compressed.len() / 2);

        let mut out = Vec::new();
        assert!(decompress_block(&compressed, prop, src.len(), &mut out).is_err());
    }

    #[test]
    fn bad_property_byte_is_an_error() {
        let mut out = Vec::new();
        assert!(decompress_block(&[0u8; 16], 99, 16, &mut out).is_err());
    }
}
