#![no_main]
use libfuzzer_sys::fuzz_target;

use geostream::{EncodeOptions, RecordDecoder, RecordEncoder, Transform};

// Builds a mesh out of the fuzz input and checks that decode(encode(x))
// reproduces it. Inputs that select the f32 path are compared after the
// same narrowing the encoder applies.
fuzz_target!(|data: &[u8]| {
    // First byte picks the options; the rest splits into vertex scalars and
    // indices.
    let Some((&flags, rest)) = data.split_first() else { return };
    let options = EncodeOptions {
        encode_offset: if flags & 1 != 0 { 0 } else { 1 << 20 },
        force_f32: flags & 2 != 0,
    };

    let split = rest.len() / 2;
    let verts: Vec<f64> = rest[..split]
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    let inds: Vec<u32> = rest[split..]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()) % (verts.len().max(1) as u32))
        .collect();

    let mut encoder = RecordEncoder::new();
    let blob = match encoder.encode(&Transform::IDENTITY, &verts, &inds, &options) {
        Ok(blob) => blob.to_vec(),
        Err(_) => return,
    };

    let mut decoder = RecordDecoder::new();
    let record = decoder
        .decode(&blob)
        .expect("self-encoded record failed to decode");

    assert_eq!(record.inds, inds.as_slice());
    assert_eq!(record.verts.len(), verts.len());
    match record.vertex_mode {
        geostream::VertexMode::F64 => {
            for (a, b) in verts.iter().zip(record.verts) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        }
        geostream::VertexMode::F32 => {
            for (a, b) in verts.iter().zip(record.verts) {
                assert_eq!(((*a as f32) as f64).to_bits(), b.to_bits());
            }
        }
    }
});
