//! E2E Suite 01: record one-shot encode/decode.
//!
//! Drives the record codec without the container: round-trips across vertex
//! modes and sizes, the f32 narrowing contract, and output-buffer reuse.

use geostream::{DecodedRecord, EncodeOptions, RecordDecoder, RecordEncoder, Transform, VertexMode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic mesh: coordinates spread around ±0.5, valid triangle
/// indices. Fractions at this scale narrow to f32 with deltas well under
/// epsilon, so these records travel in f64 mode and must be bit-exact.
fn random_mesh(rng: &mut ChaCha8Rng, tri_count: usize) -> (Vec<f64>, Vec<u32>) {
    let vert_count = (tri_count + 2).max(3);
    let verts: Vec<f64> = (0..vert_count * 3).map(|_| rng.gen::<f64>() - 0.5).collect();
    let inds: Vec<u32> = (0..tri_count * 3)
        .map(|_| rng.gen_range(0..vert_count as u32))
        .collect();
    (verts, inds)
}

fn random_transform(rng: &mut ChaCha8Rng) -> Transform {
    let mut rotation = [0.0f64; 4];
    for r in &mut rotation {
        *r = rng.gen::<f64>() - 0.5;
    }
    let norm = rotation.iter().map(|r| r * r).sum::<f64>().sqrt();
    if norm > 0.0 {
        for r in &mut rotation {
            *r /= norm;
        }
    } else {
        rotation = [0.0, 0.0, 0.0, 1.0];
    }
    Transform {
        scale: [rng.gen::<f64>() + 0.5, rng.gen::<f64>() + 0.5, rng.gen::<f64>() + 0.5],
        rotation,
        position: [rng.gen::<f64>() * 100.0, rng.gen::<f64>() * 100.0, rng.gen::<f64>() * 100.0],
    }
}

fn assert_bit_exact(record: &DecodedRecord<'_>, verts: &[f64], inds: &[u32]) {
    assert_eq!(record.verts.len(), verts.len());
    for (i, (a, b)) in verts.iter().zip(record.verts).enumerate() {
        assert_eq!(a.to_bits(), b.to_bits(), "vertex scalar {i} differs");
    }
    assert_eq!(record.inds, inds);
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trips
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn roundtrip_small_meshes() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut encoder = RecordEncoder::new();
    let mut decoder = RecordDecoder::new();

    for tri_count in [1usize, 2, 7, 33] {
        let (verts, inds) = random_mesh(&mut rng, tri_count);
        let transform = random_transform(&mut rng);

        let blob = encoder
            .encode(&transform, &verts, &inds, &EncodeOptions::default())
            .unwrap()
            .to_vec();
        let record = decoder.decode(&blob).unwrap();

        assert_eq!(record.transform, transform);
        assert_eq!(record.vertex_mode, VertexMode::F64);
        assert_bit_exact(&record, &verts, &inds);
    }
}

#[test]
fn roundtrip_large_mesh() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let (verts, inds) = random_mesh(&mut rng, 20_000);
    let transform = random_transform(&mut rng);

    let mut encoder = RecordEncoder::new();
    let blob = encoder
        .encode(&transform, &verts, &inds, &EncodeOptions::default())
        .unwrap()
        .to_vec();

    let mut decoder = RecordDecoder::new();
    let record = decoder.decode(&blob).unwrap();
    assert_bit_exact(&record, &verts, &inds);
}

#[test]
fn roundtrip_empty_and_degenerate() {
    let mut encoder = RecordEncoder::new();
    let mut decoder = RecordDecoder::new();

    // No geometry at all.
    let blob = encoder
        .encode(&Transform::IDENTITY, &[], &[], &EncodeOptions::default())
        .unwrap()
        .to_vec();
    let record = decoder.decode(&blob).unwrap();
    assert!(record.verts.is_empty());
    assert!(record.inds.is_empty());

    // Vertices with no indices, and a count that is not a multiple of three.
    let verts = [0.25, 0.5, 0.75, 1.0];
    let blob = encoder
        .encode(&Transform::IDENTITY, &verts, &[], &EncodeOptions::default())
        .unwrap()
        .to_vec();
    let record = decoder.decode(&blob).unwrap();
    assert_eq!(record.verts, &verts[..]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Vertex-mode selection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn narrowable_mesh_travels_as_f32() {
    // Megametre-scale coordinates with fractional parts: per-scalar
    // narrowing deltas and triangle-area drift both clear epsilon, so the
    // range test elects the narrow path on its own.
    let verts = vec![
        1_000_000.1, 2_000_000.3, 1_500_000.7,
        1_000_010.3, 2_000_020.9, 1_500_030.1,
        1_000_050.7, 2_000_001.1, 1_500_060.3,
    ];
    let inds = vec![0, 1, 2];

    let mut encoder = RecordEncoder::new();
    let blob = encoder
        .encode(&Transform::IDENTITY, &verts, &inds, &EncodeOptions::default())
        .unwrap()
        .to_vec();

    let mut decoder = RecordDecoder::new();
    let record = decoder.decode(&blob).unwrap();
    assert_eq!(record.vertex_mode, VertexMode::F32);

    // The loss is exactly the f64→f32→f64 narrowing, nothing more.
    let expected: Vec<f64> = verts.iter().map(|&v| (v as f32) as f64).collect();
    assert_eq!(record.verts, expected.as_slice());
    assert_eq!(record.inds, inds.as_slice());
}

#[test]
fn narrowing_preserves_triangle_areas_within_bound() {
    let verts = vec![
        1_000_000.1, 2_000_000.3, 1_500_000.7,
        1_000_010.3, 2_000_020.9, 1_500_030.1,
        1_000_050.7, 2_000_001.1, 1_500_060.3,
    ];
    let inds = vec![0, 1, 2];

    let mut encoder = RecordEncoder::new();
    let blob = encoder
        .encode(&Transform::IDENTITY, &verts, &inds, &EncodeOptions::default())
        .unwrap()
        .to_vec();
    let mut decoder = RecordDecoder::new();
    let record = decoder.decode(&blob).unwrap();
    assert_eq!(record.vertex_mode, VertexMode::F32);

    let area = |vs: &[f64]| {
        let p = |i: usize| [vs[i * 3], vs[i * 3 + 1], vs[i * 3 + 2]];
        let (a, b, c) = (p(0), p(1), p(2));
        let d0 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let d1 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let cx = d0[1] * d1[2] - d0[2] * d1[1];
        let cy = d0[2] * d1[0] - d0[0] * d1[2];
        let cz = d0[0] * d1[1] - d0[1] * d1[0];
        (cx * cx + cy * cy + cz * cz).sqrt() * 0.5
    };

    let original = area(&verts);
    let decoded = area(record.verts);
    let bound = f64::from(f32::EPSILON) * (original.abs() + 1.0);
    assert!(
        (original - decoded).abs() <= bound,
        "area drifted {original} -> {decoded}, bound {bound}"
    );
}

#[test]
fn force_f32_overrides_the_range_test() {
    // Sub-unity coordinates would normally stay f64.
    let verts = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
    let inds = vec![0, 1, 2];

    let options = EncodeOptions {
        force_f32: true,
        ..EncodeOptions::default()
    };
    let mut encoder = RecordEncoder::new();
    let blob = encoder
        .encode(&Transform::IDENTITY, &verts, &inds, &options)
        .unwrap()
        .to_vec();

    let mut decoder = RecordDecoder::new();
    let record = decoder.decode(&blob).unwrap();
    assert_eq!(record.vertex_mode, VertexMode::F32);
}

// ─────────────────────────────────────────────────────────────────────────────
// Buffer ownership
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn decoder_buffers_are_reused_across_records() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut encoder = RecordEncoder::new();
    let mut decoder = RecordDecoder::new();

    let mut blobs = Vec::new();
    let mut meshes = Vec::new();
    for tri_count in [5usize, 50, 3] {
        let (verts, inds) = random_mesh(&mut rng, tri_count);
        let transform = random_transform(&mut rng);
        blobs.push(
            encoder
                .encode(&transform, &verts, &inds, &EncodeOptions::default())
                .unwrap()
                .to_vec(),
        );
        meshes.push((verts, inds));
    }

    for (blob, (verts, inds)) in blobs.iter().zip(&meshes) {
        let record = decoder.decode(blob).unwrap();
        assert_bit_exact(&record, verts, inds);
    }
}
