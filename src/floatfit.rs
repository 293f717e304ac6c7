//! Decides whether a vertex stream can travel as 32-bit floats.
//!
//! A record's vertices are narrowed to `f32` on the wire only when that is
//! provably harmless: every coordinate must sit inside the useful `f32`
//! magnitude window, and every triangle's area must survive the narrowing.
//! The decision feeds the top bit of the packed-vertex length field, so both
//! sides of the codec must agree bit-for-bit. That is why the square roots
//! below use the classic magic-seed reciprocal approximation instead of the
//! hardware instruction: the test has to reproduce the exact rounding of the
//! reference bitstream, not merely a close value.

const F32_MIN_POSITIVE: f64 = f32::MIN_POSITIVE as f64;
const F32_EPSILON: f64 = f32::EPSILON as f64;

/// Upper magnitude bound for narrowable values and areas (2^43).
const MAGNITUDE_CEIL: f64 = 8_796_093_022_208.0;

// ─────────────────────────────────────────────────────────────────────────────
// Magic-seed square roots
// ─────────────────────────────────────────────────────────────────────────────

/// Reciprocal square root: bit-level seed plus three Newton–Raphson rounds.
#[inline]
fn rsqrt64(v: f64) -> f64 {
    let x2 = v * 0.5;
    let i = 0x5FE6_EB50_C7B5_37A9u64.wrapping_sub(v.to_bits() >> 1);
    let mut y = f64::from_bits(i);
    y *= 1.5 - x2 * y * y;
    y *= 1.5 - x2 * y * y;
    y *= 1.5 - x2 * y * y;
    y
}

/// Single-precision variant of [`rsqrt64`].
#[inline]
fn rsqrt32(v: f32) -> f32 {
    let x2 = v * 0.5;
    let i = 0x5F37_59DFu32.wrapping_sub(v.to_bits() >> 1);
    let mut y = f32::from_bits(i);
    y *= 1.5 - x2 * y * y;
    y *= 1.5 - x2 * y * y;
    y *= 1.5 - x2 * y * y;
    y
}

#[inline]
pub(crate) fn sqrt64(v: f64) -> f64 {
    1.0 / rsqrt64(v)
}

#[inline]
pub(crate) fn sqrt32(v: f32) -> f32 {
    1.0 / rsqrt32(v)
}

// ─────────────────────────────────────────────────────────────────────────────
// Range test
// ─────────────────────────────────────────────────────────────────────────────

/// Returns `true` when the vertex stream may be narrowed to `f32`.
///
/// Two passes, both of which veto the narrow path:
///
/// 1. every scalar must have magnitude in `(f32::MIN_POSITIVE, 2^43)` and a
///    narrowing delta strictly above `f32::EPSILON`;
/// 2. every triangle area (half the cross-product magnitude of its edges)
///    must satisfy the same magnitude window, and the single-precision area
///    must differ from the double-precision one by strictly more than
///    `f32::EPSILON`.
///
/// A delta at or below epsilon rejects the narrow path in both passes, it
/// does not accept it. The comparison direction is part of the wire contract
/// with existing streams and must not be "fixed".
///
/// `verts` is a flat `x,y,z` scalar array; `inds` is walked in steps of
/// three and a trailing partial triple is ignored. An index pointing past
/// the vertex array forces the wide path.
pub fn fits_in_f32(verts: &[f64], inds: &[u32]) -> bool {
    for &v in verts {
        let wide = v.abs();
        if wide <= F32_MIN_POSITIVE || wide >= MAGNITUDE_CEIL {
            return false;
        }
        let narrow = wide as f32;
        if (wide - narrow as f64).abs() <= F32_EPSILON {
            return false;
        }
    }

    for tri in inds.chunks_exact(3) {
        let (Some(p0), Some(p1), Some(p2)) = (
            vertex_at(verts, tri[0]),
            vertex_at(verts, tri[1]),
            vertex_at(verts, tri[2]),
        ) else {
            return false;
        };

        let area64 = {
            let d0 = [p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]];
            let d1 = [p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]];
            let cx = d0[1] * d1[2] - d0[2] * d1[1];
            let cy = d0[2] * d1[0] - d0[0] * d1[2];
            let cz = d0[0] * d1[1] - d0[1] * d1[0];
            sqrt64(cx * cx + cy * cy + cz * cz) * 0.5
        };
        if area64 <= F32_MIN_POSITIVE || area64 >= MAGNITUDE_CEIL {
            return false;
        }

        let area32 = {
            let q0 = [p0[0] as f32, p0[1] as f32, p0[2] as f32];
            let q1 = [p1[0] as f32, p1[1] as f32, p1[2] as f32];
            let q2 = [p2[0] as f32, p2[1] as f32, p2[2] as f32];
            let d0 = [q1[0] - q0[0], q1[1] - q0[1], q1[2] - q0[2]];
            let d1 = [q2[0] - q0[0], q2[1] - q0[1], q2[2] - q0[2]];
            let cx = d0[1] * d1[2] - d0[2] * d1[1];
            let cy = d0[2] * d1[0] - d0[0] * d1[2];
            let cz = d0[0] * d1[1] - d0[1] * d1[0];
            sqrt32(cx * cx + cy * cy + cz * cz) * 0.5
        };

        if (area64 - area32 as f64).abs() <= F32_EPSILON {
            return false;
        }
    }

    true
}

#[inline]
fn vertex_at(verts: &[f64], index: u32) -> Option<&[f64]> {
    let base = index as usize * 3;
    verts.get(base..base + 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_sqrt_tracks_reference() {
        for v in [0.25, 1.0, 2.0, 4.0, 1e6, 3.5e12] {
            let rel = (sqrt64(v) - v.sqrt()).abs() / v.sqrt();
            assert!(rel < 1e-6, "sqrt64({v}) off by {rel}");
        }
        for v in [0.25f32, 1.0, 2.0, 4.0, 1e6] {
            let rel = (sqrt32(v) - v.sqrt()).abs() / v.sqrt();
            assert!(rel < 1e-4, "sqrt32({v}) off by {rel}");
        }
    }

    #[test]
    fn exactly_representable_scalars_take_the_wide_path() {
        // 1.0 narrows with zero delta, which vetoes the narrow path.
        let verts = [1.0; 9];
        assert!(!fits_in_f32(&verts, &[0, 1, 2]));
    }

    #[test]
    fn out_of_window_magnitudes_take_the_wide_path() {
        let tiny = [0.0, 1.5e6, 1.5e6, 1.0e6, 2.5e6, 1.1e6, 2.0e6, 1.0e6, 2.2e6];
        assert!(!fits_in_f32(&tiny, &[0, 1, 2]));

        let huge = [9.0e12, 1.5e6, 1.5e6, 1.0e6, 2.5e6, 1.1e6, 2.0e6, 1.0e6, 2.2e6];
        assert!(!fits_in_f32(&huge, &[0, 1, 2]));
    }

    #[test]
    fn megametre_scale_fractions_take_the_narrow_path() {
        // Around 1e6 a float ULP is ~0.06, so these fractional parts survive
        // the per-scalar delta test, and the triangle is large and skewed
        // enough that its area moves visibly under narrowing.
        let verts = [
            1_000_000.1, 2_000_000.3, 1_500_000.7,
            1_000_010.3, 2_000_020.9, 1_500_030.1,
            1_000_050.7, 2_000_001.1, 1_500_060.3,
        ];
        assert!(fits_in_f32(&verts, &[0, 1, 2]));
    }

    #[test]
    fn index_past_vertex_array_takes_the_wide_path() {
        let verts = [
            1_000_000.1, 2_000_000.3, 1_500_000.7,
            1_000_010.3, 2_000_020.9, 1_500_030.1,
            1_000_050.7, 2_000_001.1, 1_500_060.3,
        ];
        assert!(!fits_in_f32(&verts, &[0, 1, 7]));
    }

    #[test]
    fn trailing_partial_triple_is_ignored() {
        let verts = [
            1_000_000.1, 2_000_000.3, 1_500_000.7,
            1_000_010.3, 2_000_020.9, 1_500_030.1,
            1_000_050.7, 2_000_001.1, 1_500_060.3,
        ];
        assert!(fits_in_f32(&verts, &[0, 1, 2, 0, 1]));
    }
}
