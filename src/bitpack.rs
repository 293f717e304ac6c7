//! Minimum-width bit-packing for index streams.
//!
//! Every index travels as exactly `bits_per_index(vert_count)` bits, written
//! LSB-first into a little-endian bitstream: index `i` occupies bit positions
//! `[i·k, (i+1)·k)`, and bit `b` of a byte is bit `b` of the stream position
//! within that byte. The width derives from the scalar count of the vertex
//! array, so both sides compute it from fields already on the wire.

use crate::error::{Error, Result};

/// Bit width per index: the bit length of `vert_count` (0 for 0).
#[inline]
pub fn bits_per_index(vert_count: u32) -> u32 {
    32 - vert_count.leading_zeros()
}

/// Packed byte length for `ind_count` indices at the width implied by
/// `vert_count`.
#[inline]
pub fn packed_len(vert_count: u32, ind_count: u32) -> usize {
    let total_bits = u64::from(bits_per_index(vert_count)) * u64::from(ind_count);
    ((total_bits + 7) >> 3) as usize
}

/// Appends the packed form of `inds` to `out`.
///
/// Index bits above the width are dropped; callers are expected to pass
/// indices below `vert_count`, for which the width is lossless.
pub fn pack(vert_count: u32, inds: &[u32], out: &mut Vec<u8>) {
    let k = bits_per_index(vert_count);
    let start = out.len();
    out.resize(start + packed_len(vert_count, inds.len() as u32), 0);
    let bytes = &mut out[start..];

    let mut bit = 0usize;
    for &ind in inds {
        for shift in 0..k {
            let b = ((ind >> shift) & 1) as u8;
            bytes[bit >> 3] |= b << (bit & 7);
            bit += 1;
        }
    }
}

/// Rebuilds `ind_count` indices from `src` into `out` (cleared first).
///
/// Fails when `src` is shorter than the packed length implied by the counts.
pub fn unpack(vert_count: u32, ind_count: u32, src: &[u8], out: &mut Vec<u32>) -> Result<()> {
    if src.len() < packed_len(vert_count, ind_count) {
        return Err(Error::MalformedRecord("index bitstream shorter than its counts imply"));
    }
    let k = bits_per_index(vert_count);

    out.clear();
    out.try_reserve(ind_count as usize).map_err(|_| Error::AllocationFailed)?;

    let mut bit = 0usize;
    for _ in 0..ind_count {
        let mut ind = 0u32;
        for shift in 0..k {
            let b = u32::from((src[bit >> 3] >> (bit & 7)) & 1);
            ind |= b << shift;
            bit += 1;
        }
        out.push(ind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_is_bit_length_of_vert_count() {
        assert_eq!(bits_per_index(0), 0);
        assert_eq!(bits_per_index(1), 1);
        assert_eq!(bits_per_index(2), 2);
        assert_eq!(bits_per_index(3), 2);
        assert_eq!(bits_per_index(4), 3);
        assert_eq!(bits_per_index(255), 8);
        assert_eq!(bits_per_index(256), 9);
        assert_eq!(bits_per_index(u32::MAX), 32);
    }

    #[test]
    fn packed_len_rounds_bits_up_to_bytes() {
        // 9 vertices → 4 bits each; 5 indices → 20 bits → 3 bytes.
        assert_eq!(packed_len(9, 5), 3);
        assert_eq!(packed_len(9, 0), 0);
        assert_eq!(packed_len(0, 1000), 0);
    }

    #[test]
    fn roundtrip_various_widths() {
        for vert_count in [1u32, 2, 3, 7, 9, 100, 4097] {
            let inds: Vec<u32> = (0..97u32).map(|i| i * 31 % vert_count).collect();
            let mut packed = Vec::new();
            pack(vert_count, &inds, &mut packed);
            assert_eq!(packed.len(), packed_len(vert_count, inds.len() as u32));

            let mut out = Vec::new();
            unpack(vert_count, inds.len() as u32, &packed, &mut out).unwrap();
            assert_eq!(out, inds);
        }
    }

    #[test]
    fn zero_vert_count_packs_to_nothing() {
        let mut packed = Vec::new();
        pack(0, &[5, 6, 7], &mut packed);
        assert!(packed.is_empty());

        let mut out = Vec::new();
        unpack(0, 3, &packed, &mut out).unwrap();
        assert_eq!(out, vec![0, 0, 0]);
    }

    #[test]
    fn oversized_index_loses_high_bits() {
        // Width 2 (vert_count 3): 5 = 0b101 drops to 0b01.
        let mut packed = Vec::new();
        pack(3, &[5], &mut packed);
        let mut out = Vec::new();
        unpack(3, 1, &packed, &mut out).unwrap();
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn short_bitstream_is_rejected() {
        let mut out = Vec::new();
        let err = unpack(9, 5, &[0u8; 2], &mut out).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn bitstream_is_lsb_first_little_endian() {
        // vert_count 9 → 4 bits; indices 0x3, 0x5 pack to 0b0101_0011.
        let mut packed = Vec::new();
        pack(9, &[3, 5], &mut packed);
        assert_eq!(packed, vec![0b0101_0011]);
    }
}
