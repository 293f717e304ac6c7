//! Wire layout of an encoded record, little-endian throughout.
//!
//! ```text
//! EncodedRecord = u64 size_word | u8 prop | lzma2 stream     (compressed)
//!               | u64 size_word | packed payload             (bypassed)
//!
//!   size_word top bit: 1 ⇒ compression bypassed, payload follows verbatim
//!   size_word low 63:  packed payload length in bytes
//!
//! PackedPayload = scale     f64[3]   (24 B)
//!               | rotation  f64[4]   (32 B, quaternion x y z w)
//!               | position  f64[3]   (24 B)
//!               | vert_count u32     (scalar doubles, 3 per vertex)
//!               | ind_count  u32
//!               | packed_vert_len u64 (top bit: 1 ⇒ f32 vertex stream)
//!               | packed_ind_len  u64
//!               | vertex blob | index bitstream
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::vertex::VertexMode;

/// Flag bit shared by the size word and the packed-vertex length field.
pub(crate) const TOP_BIT: u64 = 1 << 63;

/// Length of the size word preceding every encoded record.
pub(crate) const SIZE_WORD_LEN: usize = 8;

/// Fixed payload header length.
pub(crate) const HEADER_LEN: usize = 104;

const OFF_SCALE: usize = 0;
const OFF_ROTATION: usize = 24;
const OFF_POSITION: usize = 56;
const OFF_VERT_COUNT: usize = 80;
const OFF_IND_COUNT: usize = 84;
const OFF_PACKED_VERT_LEN: usize = 88;
const OFF_PACKED_IND_LEN: usize = 96;

/// Affine transform stored with every record.
///
/// `rotation` is a quaternion in `x, y, z, w` order, expected to be unit
/// length on the write side; it is used verbatim to transform bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: [f64; 3],
    pub rotation: [f64; 4],
    pub position: [f64; 3],
}

impl Transform {
    /// Unit scale, identity rotation, zero translation.
    pub const IDENTITY: Transform = Transform {
        scale: [1.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        position: [0.0; 3],
    };
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

/// Parsed fixed header of a packed payload.
pub(crate) struct PayloadHeader {
    pub transform: Transform,
    pub vert_count: u32,
    pub ind_count: u32,
    pub packed_vert_len: usize,
    pub packed_ind_len: usize,
    pub vertex_mode: VertexMode,
}

/// Writes the fixed header into `buf[..HEADER_LEN]`.
pub(crate) fn write_header(
    buf: &mut [u8],
    transform: &Transform,
    vert_count: u32,
    ind_count: u32,
    packed_vert_word: u64,
    packed_ind_len: u64,
) {
    LittleEndian::write_f64_into(&transform.scale, &mut buf[OFF_SCALE..OFF_ROTATION]);
    LittleEndian::write_f64_into(&transform.rotation, &mut buf[OFF_ROTATION..OFF_POSITION]);
    LittleEndian::write_f64_into(&transform.position, &mut buf[OFF_POSITION..OFF_VERT_COUNT]);
    LittleEndian::write_u32(&mut buf[OFF_VERT_COUNT..OFF_IND_COUNT], vert_count);
    LittleEndian::write_u32(&mut buf[OFF_IND_COUNT..OFF_PACKED_VERT_LEN], ind_count);
    LittleEndian::write_u64(&mut buf[OFF_PACKED_VERT_LEN..OFF_PACKED_IND_LEN], packed_vert_word);
    LittleEndian::write_u64(&mut buf[OFF_PACKED_IND_LEN..HEADER_LEN], packed_ind_len);
}

/// Parses the fixed header from the front of `payload`.
pub(crate) fn parse_header(payload: &[u8]) -> Result<PayloadHeader> {
    if payload.len() < HEADER_LEN {
        return Err(Error::MalformedRecord("payload shorter than its fixed header"));
    }

    let mut transform = Transform::IDENTITY;
    LittleEndian::read_f64_into(&payload[OFF_SCALE..OFF_ROTATION], &mut transform.scale);
    LittleEndian::read_f64_into(&payload[OFF_ROTATION..OFF_POSITION], &mut transform.rotation);
    LittleEndian::read_f64_into(&payload[OFF_POSITION..OFF_VERT_COUNT], &mut transform.position);

    let vert_count = LittleEndian::read_u32(&payload[OFF_VERT_COUNT..OFF_IND_COUNT]);
    let ind_count = LittleEndian::read_u32(&payload[OFF_IND_COUNT..OFF_PACKED_VERT_LEN]);
    let packed_vert_word = LittleEndian::read_u64(&payload[OFF_PACKED_VERT_LEN..OFF_PACKED_IND_LEN]);
    let packed_ind_word = LittleEndian::read_u64(&payload[OFF_PACKED_IND_LEN..HEADER_LEN]);

    let vertex_mode = if packed_vert_word & TOP_BIT != 0 {
        VertexMode::F32
    } else {
        VertexMode::F64
    };
    let packed_vert_len = usize::try_from(packed_vert_word & !TOP_BIT)
        .map_err(|_| Error::MalformedRecord("packed vertex length exceeds the address space"))?;
    let packed_ind_len = usize::try_from(packed_ind_word)
        .map_err(|_| Error::MalformedRecord("packed index length exceeds the address space"))?;

    Ok(PayloadHeader {
        transform,
        vert_count,
        ind_count,
        packed_vert_len,
        packed_ind_len,
        vertex_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let transform = Transform {
            scale: [0.5, 2.0, -3.25],
            rotation: [0.0, 0.7071, 0.0, 0.7071],
            position: [10.0, -20.0, 30.5],
        };
        let mut buf = [0u8; HEADER_LEN];
        write_header(&mut buf, &transform, 9, 3, 17 | TOP_BIT, 2);

        let header = parse_header(&buf).unwrap();
        assert_eq!(header.transform, transform);
        assert_eq!(header.vert_count, 9);
        assert_eq!(header.ind_count, 3);
        assert_eq!(header.packed_vert_len, 17);
        assert_eq!(header.packed_ind_len, 2);
        assert_eq!(header.vertex_mode, VertexMode::F32);
    }

    #[test]
    fn clear_top_bit_means_f64() {
        let mut buf = [0u8; HEADER_LEN];
        write_header(&mut buf, &Transform::IDENTITY, 0, 0, 40, 0);
        let header = parse_header(&buf).unwrap();
        assert_eq!(header.vertex_mode, VertexMode::F64);
        assert_eq!(header.packed_vert_len, 40);
    }

    #[test]
    fn short_payload_is_rejected() {
        assert!(parse_header(&[0u8; HEADER_LEN - 1]).is_err());
    }
}
