//! E2E Suite 03: error handling and corrupted input.
//!
//! Verifies that every failure surfaces as a typed error rather than a
//! panic, that a corrupted header slot is detected, that the compression
//! bypass engages on incompressible payloads, and that the scoped session
//! brackets preserve the first failure.

use std::io::{self, Cursor, Seek, Write};

use geostream::{
    read_scoped, write_scoped, EncodeOptions, Error, RecordDecoder, RecordEncoder, StreamReader,
    StreamWriter, Transform,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn write_one_record_container() -> Vec<u8> {
    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        w.emplace_geometry(
            "victim",
            &Transform::IDENTITY,
            &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9],
            &[0, 1, 2],
            &EncodeOptions::default(),
        )?;
        Ok(())
    })
    .unwrap();
    file
}

// ─────────────────────────────────────────────────────────────────────────────
// Corrupted containers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sentinel_header_slot_is_rejected() {
    let mut file = write_one_record_container();
    // A writer that never finalized leaves all-ones in the slot; forge that.
    file[..8].copy_from_slice(&u64::MAX.to_le_bytes());

    let mut reader = StreamReader::new();
    let err = reader.begin_read(Cursor::new(file)).unwrap_err();
    assert!(matches!(err, Error::MalformedHeader(_)), "got {err}");
}

#[test]
fn truncated_container_fails_with_io() {
    let file = write_one_record_container();
    let cut = file.len() / 2;

    let mut reader = StreamReader::new();
    let err = reader.begin_read(Cursor::new(file[..cut].to_vec())).unwrap_err();
    assert!(matches!(err, Error::IoFailed(_)), "got {err}");
}

#[test]
fn record_fetch_past_the_end_fails() {
    let file = write_one_record_container();
    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert!(matches!(r.geometry(1), Err(Error::IoFailed(_) | Error::MalformedRecord(_))));
        // The session survives a failed fetch.
        assert!(r.geometry(0).is_ok());
        Ok(())
    })
    .unwrap();
}

#[test]
fn flipped_record_bytes_fail_without_panicking() {
    let mut file = write_one_record_container();
    // Flip bytes inside the first record's compressed body (the record
    // starts at offset 8 with its own 8-byte size prefix).
    for b in &mut file[24..32] {
        *b ^= 0xA5;
    }

    let mut reader = StreamReader::new();
    let _ = read_scoped(&mut reader, Cursor::new(&file), |r| {
        match r.geometry(0) {
            Ok(_) => {} // flips can land in slack the codec never reads
            Err(Error::CompressionFailed(_) | Error::VertexCodecFailed(_) | Error::MalformedRecord(_)) => {}
            Err(other) => panic!("unexpected error kind: {other}"),
        }
        Ok(())
    });
}

#[test]
fn arbitrary_bytes_never_panic_the_record_decoder() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut decoder = RecordDecoder::new();
    for len in [0usize, 1, 7, 8, 9, 64, 1024] {
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let _ = decoder.decode(&data);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compression bypass
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn incompressible_payload_bypasses_with_zero_offset() {
    // Random bit patterns end up incompressible after the vertex codec, and
    // a random transform keeps even the fixed header noisy. With zero
    // slack, LZMA2's framing overhead tips the decision to bypass.
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let verts: Vec<f64> = (0..3000).map(|_| f64::from_bits(rng.gen::<u64>() | 1)).collect();
    let transform = Transform {
        scale: [rng.gen(), rng.gen(), rng.gen()],
        rotation: [rng.gen(), rng.gen(), rng.gen(), rng.gen()],
        position: [rng.gen(), rng.gen(), rng.gen()],
    };
    let options = EncodeOptions {
        encode_offset: 0,
        ..EncodeOptions::default()
    };

    let mut encoder = RecordEncoder::new();
    let blob = encoder.encode(&transform, &verts, &[], &options).unwrap();

    let word = u64::from_le_bytes(blob[..8].try_into().unwrap());
    assert_ne!(word & (1 << 63), 0, "expected the bypass flag");
    let declared = (word & !(1 << 63)) as usize;
    assert_eq!(blob.len(), 8 + declared, "bypassed payload is stored verbatim");

    // And it still round-trips.
    let blob = blob.to_vec();
    let mut decoder = RecordDecoder::new();
    let record = decoder.decode(&blob).unwrap();
    for (a, b) in verts.iter().zip(record.verts) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn default_offset_keeps_compression_for_ordinary_meshes() {
    let verts = vec![0.5; 300];
    let mut encoder = RecordEncoder::new();
    let blob = encoder
        .encode(&Transform::IDENTITY, &verts, &[0, 1, 2], &EncodeOptions::default())
        .unwrap();
    let word = u64::from_le_bytes(blob[..8].try_into().unwrap());
    assert_eq!(word & (1 << 63), 0, "repetitive payloads stay compressed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Session discipline
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reentrant_begin_fails_on_both_sides() {
    let mut writer = StreamWriter::new();
    writer.begin_write(Cursor::new(Vec::new())).unwrap();
    assert!(matches!(
        writer.begin_write(Cursor::new(Vec::new())).unwrap_err(),
        Error::ReentrantBegin
    ));

    let file = write_one_record_container();
    let mut reader = StreamReader::new();
    reader.begin_read(Cursor::new(file.clone())).unwrap();
    assert!(matches!(
        reader.begin_read(Cursor::new(file)).unwrap_err(),
        Error::ReentrantBegin
    ));
}

#[test]
fn writer_session_survives_a_failed_emplace() {
    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        let err = w
            .emplace_geometry("nul\0", &Transform::IDENTITY, &[], &[], &EncodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));

        // The instance stays in a defined state and accepts further calls.
        w.emplace_geometry(
            "fine",
            &Transform::IDENTITY,
            &[0.1, 0.2, 0.3],
            &[0],
            &EncodeOptions::default(),
        )?;
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert_eq!(r.geometry_count(), 1);
        assert_eq!(r.geometry_name(0).as_deref(), Some("fine"));
        Ok(())
    })
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// First-failure-wins across the scoped bracket
// ─────────────────────────────────────────────────────────────────────────────

/// Sink that fails every write after a budget is spent, so the finalizer
/// can be made to fail after the body already has.
struct RationedSink {
    inner: Cursor<Vec<u8>>,
    writes_left: usize,
}

impl io::Write for RationedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.writes_left == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "write budget exhausted"));
        }
        self.writes_left -= 1;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl io::Seek for RationedSink {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn body_error_is_preserved_when_the_finalizer_also_fails() {
    let sink = RationedSink {
        inner: Cursor::new(Vec::new()),
        writes_left: 1, // the begin sentinel spends it; end_write must fail
    };

    let mut writer = StreamWriter::new();
    let err = write_scoped(&mut writer, sink, |w| {
        w.emplace_geometry("nul\0", &Transform::IDENTITY, &[], &[], &EncodeOptions::default())?;
        Ok(())
    })
    .unwrap_err();

    // The body's name error, not the finalizer's I/O error.
    assert!(matches!(err, Error::MalformedRecord(_)), "got {err}");
}

#[test]
fn finalizer_error_surfaces_when_the_body_succeeds() {
    let sink = RationedSink {
        inner: Cursor::new(Vec::new()),
        writes_left: 1,
    };

    let mut writer = StreamWriter::new();
    let err = write_scoped(&mut writer, sink, |_| Ok(())).unwrap_err();
    assert!(matches!(err, Error::IoFailed(_)), "got {err}");
}
