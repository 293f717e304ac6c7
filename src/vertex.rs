//! Vertex-stream encoding through the lossless numeric codec.
//!
//! The vertex array travels as a one-dimensional sequence of scalars in one
//! of two element widths. `F64` consumes the doubles as-is and decodes them
//! bit-identically. `F32` narrows every scalar to `f32` first and widens
//! back on decode; it is the only lossy step in the whole pipeline, taken
//! solely when [`fits_in_f32`](crate::floatfit::fits_in_f32) proves it
//! harmless.

use q_compress::{auto_compress, auto_decompress};

use crate::error::{Error, Result};

/// Element width of the encoded vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexMode {
    /// Scalars narrowed to `f32` before encoding.
    F32,
    /// Scalars encoded as `f64`, bit-exact.
    #[default]
    F64,
}

/// Codec compression level for the vertex stream.
const COMPRESSION_LEVEL: usize = 6;

/// Encodes `verts` in the given mode, returning the codec blob.
///
/// An empty stream encodes to an empty blob; the codec is not invoked.
pub fn encode(verts: &[f64], mode: VertexMode) -> Result<Vec<u8>> {
    if verts.is_empty() {
        return Ok(Vec::new());
    }
    match mode {
        VertexMode::F32 => {
            let narrowed: Vec<f32> = verts.iter().map(|&v| v as f32).collect();
            Ok(auto_compress(&narrowed, COMPRESSION_LEVEL))
        }
        VertexMode::F64 => Ok(auto_compress(verts, COMPRESSION_LEVEL)),
    }
}

/// Decodes a blob produced by [`encode`] into `out` (cleared first).
///
/// `count` is the expected scalar count; a blob decoding to any other count
/// is rejected.
pub fn decode(src: &[u8], count: u32, mode: VertexMode, out: &mut Vec<f64>) -> Result<()> {
    out.clear();
    if count == 0 {
        return Ok(());
    }
    out.try_reserve(count as usize).map_err(|_| Error::AllocationFailed)?;

    match mode {
        VertexMode::F32 => {
            let narrowed: Vec<f32> = auto_decompress(src).map_err(Error::vertex_codec)?;
            if narrowed.len() != count as usize {
                return Err(Error::MalformedRecord("vertex blob decodes to the wrong scalar count"));
            }
            out.extend(narrowed.iter().map(|&v| f64::from(v)));
        }
        VertexMode::F64 => {
            let wide: Vec<f64> = auto_decompress(src).map_err(Error::vertex_codec)?;
            if wide.len() != count as usize {
                return Err(Error::MalformedRecord("vertex blob decodes to the wrong scalar count"));
            }
            out.extend_from_slice(&wide);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_mode_is_bit_exact() {
        let verts = [0.0, -0.0, 1.5, f64::MIN_POSITIVE, 12345.6789, -9.25e17];
        let blob = encode(&verts, VertexMode::F64).unwrap();
        let mut out = Vec::new();
        decode(&blob, verts.len() as u32, VertexMode::F64, &mut out).unwrap();
        assert_eq!(out.len(), verts.len());
        for (a, b) in verts.iter().zip(&out) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn f32_mode_loses_exactly_the_narrowing() {
        let verts = [1_000_000.1, 2_000_000.3, 1_500_000.7];
        let blob = encode(&verts, VertexMode::F32).unwrap();
        let mut out = Vec::new();
        decode(&blob, verts.len() as u32, VertexMode::F32, &mut out).unwrap();
        let expected: Vec<f64> = verts.iter().map(|&v| (v as f32) as f64).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn empty_stream_skips_the_codec() {
        let blob = encode(&[], VertexMode::F64).unwrap();
        assert!(blob.is_empty());
        let mut out = vec![1.0];
        decode(&blob, 0, VertexMode::F64, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_blob_is_an_error_not_a_panic() {
        let mut out = Vec::new();
        assert!(decode(&[0xFF, 0x00, 0x13, 0x37], 4, VertexMode::F64, &mut out).is_err());
    }

    #[test]
    fn wrong_count_is_rejected() {
        let verts = [1.5, 2.5, 3.5];
        let blob = encode(&verts, VertexMode::F64).unwrap();
        let mut out = Vec::new();
        let err = decode(&blob, 2, VertexMode::F64, &mut out).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }
}
