//! E2E Suite 02: container write/read scenarios.
//!
//! Covers the file-level contract end to end: the empty container, single
//! and multi-record round-trips over memory and disk, direct fetch of a
//! later record, directory compression, bounding-box content, and the
//! self-referential header slot.

use std::io::{Cursor, Seek, SeekFrom, Write};

use geostream::{
    read_scoped, write_scoped, EncodeOptions, StreamReader, StreamWriter, Transform,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const DIR_COMPRESSED_BIT: u64 = 1 << 63;

fn random_mesh(rng: &mut ChaCha8Rng, tri_count: usize) -> (Vec<f64>, Vec<u32>) {
    let vert_count = (tri_count + 2).max(3);
    let verts: Vec<f64> = (0..vert_count * 3).map(|_| rng.gen::<f64>() - 0.5).collect();
    let inds: Vec<u32> = (0..tri_count * 3)
        .map(|_| rng.gen_range(0..vert_count as u32))
        .collect();
    (verts, inds)
}

fn header_slot(file: &[u8]) -> u64 {
    u64::from_le_bytes(file[..8].try_into().unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: empty container
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn empty_container_layout() {
    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |_| Ok(())).unwrap();

    // Header slot (8) + bare count (8): the 9-byte compressed preamble can
    // never beat an 8-byte directory, so the plain form is chosen.
    assert_eq!(file.len(), 16);
    assert_eq!(header_slot(&file), 8);
    assert_eq!(u64::from_le_bytes(file[8..16].try_into().unwrap()), 0);

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert_eq!(r.geometry_count(), 0);
        Ok(())
    })
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: one small record
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn single_record_roundtrip_with_aabb() {
    let verts = vec![0.5, 1.5, -2.5, 3.5, -1.0, 0.25, -4.0, 2.0, 6.0];
    let inds = vec![0, 1, 2];

    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        let ordinal = w.emplace_geometry(
            "lone triangle",
            &Transform::IDENTITY,
            &verts,
            &inds,
            &EncodeOptions::default(),
        )?;
        assert_eq!(ordinal, 1, "first emplacement reports a count of one");
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert_eq!(r.geometry_count(), 1);
        assert_eq!(r.geometry_name(0).as_deref(), Some("lone triangle"));

        // Identity transform: the box is the raw coordinate extremes.
        let aabb = r.geometry_aabb(0).unwrap();
        assert_eq!(aabb.min, [-4.0, -1.0, -2.5]);
        assert_eq!(aabb.max, [3.5, 2.0, 6.0]);

        let record = r.geometry(0)?;
        assert_eq!(record.verts, verts.as_slice());
        assert_eq!(record.inds, inds.as_slice());
        Ok(())
    })
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: direct fetch past earlier records
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn second_record_is_reachable_without_reading_the_first() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let (verts0, inds0) = random_mesh(&mut rng, 40);
    let (verts1, inds1) = random_mesh(&mut rng, 7);

    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        w.emplace_geometry("r0", &Transform::IDENTITY, &verts0, &inds0, &EncodeOptions::default())?;
        w.emplace_geometry("r1", &Transform::IDENTITY, &verts1, &inds1, &EncodeOptions::default())?;
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        // Fetch index 1 first: the skip walk must hop over record 0 by its
        // size prefix alone.
        let record = r.geometry(1)?;
        assert_eq!(record.verts, verts1.as_slice());
        assert_eq!(record.inds, inds1.as_slice());

        let record = r.geometry(0)?;
        assert_eq!(record.verts, verts0.as_slice());
        Ok(())
    })
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: many records, compressed directory, on-disk file
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn many_records_roundtrip_in_memory() {
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let meshes: Vec<(Vec<f64>, Vec<u32>)> = (0..8).map(|i| random_mesh(&mut rng, 3 + i * 11)).collect();

    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        for (i, (verts, inds)) in meshes.iter().enumerate() {
            let name = format!("mesh #{i}");
            let ordinal =
                w.emplace_geometry(&name, &Transform::IDENTITY, verts, inds, &EncodeOptions::default())?;
            assert_eq!(ordinal as usize, i + 1);
        }
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert_eq!(r.geometry_count(), meshes.len());
        for (i, (verts, inds)) in meshes.iter().enumerate() {
            assert_eq!(r.geometry_name(i).unwrap(), format!("mesh #{i}"));
            let record = r.geometry(i)?;
            assert_eq!(record.verts, verts.as_slice());
            assert_eq!(record.inds, inds.as_slice());
        }
        Ok(())
    })
    .unwrap();
}

#[test]
fn repetitive_names_compress_the_directory() {
    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        for i in 0..64 {
            let name = format!("terrain_patch_lod0_chunk_{i:04}");
            w.emplace_geometry(
                &name,
                &Transform::IDENTITY,
                &[0.5, 0.5, 0.5],
                &[0],
                &EncodeOptions::default(),
            )?;
        }
        Ok(())
    })
    .unwrap();

    let slot = header_slot(&file);
    assert_ne!(slot & DIR_COMPRESSED_BIT, 0, "64 near-identical names must compress");

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert_eq!(r.geometry_count(), 64);
        assert_eq!(r.geometry_name(63).unwrap(), "terrain_patch_lod0_chunk_0063");
        Ok(())
    })
    .unwrap();
}

#[test]
fn container_roundtrips_through_a_real_file() {
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let (verts, inds) = random_mesh(&mut rng, 100);

    let mut file = tempfile::tempfile().unwrap();

    let mut writer = StreamWriter::new();
    writer.begin_write(&mut file).unwrap();
    writer
        .emplace_geometry("on disk", &Transform::IDENTITY, &verts, &inds, &EncodeOptions::default())
        .unwrap();
    writer.end_write().unwrap();

    file.seek(SeekFrom::Start(0)).unwrap();
    let mut reader = StreamReader::new();
    reader.begin_read(&mut file).unwrap();
    assert_eq!(reader.geometry_count(), 1);
    assert_eq!(reader.geometry_name(0).as_deref(), Some("on disk"));
    let record = reader.geometry(0).unwrap();
    assert_eq!(record.verts, verts.as_slice());
    assert_eq!(record.inds, inds.as_slice());
    reader.end_read().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: header slot self-reference
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn header_slot_points_at_the_directory() {
    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        w.emplace_geometry(
            "pointer check",
            &Transform::IDENTITY,
            &[0.1, 0.2, 0.3],
            &[0],
            &EncodeOptions::default(),
        )?;
        Ok(())
    })
    .unwrap();

    let slot = header_slot(&file);
    let dir_pos = (slot & !DIR_COMPRESSED_BIT) as usize;
    assert!(dir_pos > 8 && dir_pos < file.len());

    if slot & DIR_COMPRESSED_BIT == 0 {
        // Plain directory starts with the record count.
        let count = u64::from_le_bytes(file[dir_pos..dir_pos + 8].try_into().unwrap());
        assert_eq!(count, 1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenario: transforms, bounding boxes, names
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn aabb_reflects_scale_rotation_translation() {
    let half = std::f64::consts::FRAC_1_SQRT_2;
    let transform = Transform {
        scale: [2.0, 1.0, 1.0],
        rotation: [0.0, 0.0, half, half], // quarter turn about +z
        position: [100.0, -50.0, 7.0],
    };
    // Two referenced vertices on the x axis; one decoy that no index uses.
    let verts = vec![1.0, 0.0, 0.0, 3.0, 0.0, 0.0, 999.0, 999.0, 999.0];
    let inds = vec![0, 1, 0];

    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        w.emplace_geometry("boxed", &transform, &verts, &inds, &EncodeOptions::default())?;
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        let aabb = r.geometry_aabb(0).unwrap();
        // (1,0,0)·scale → (2,0,0) → rotate → (0,2,0); (3,0,0) → (0,6,0).
        let eps = 1e-9;
        assert!((aabb.min[0] - 100.0).abs() < eps);
        assert!((aabb.min[1] - (-48.0)).abs() < eps);
        assert!((aabb.max[1] - (-44.0)).abs() < eps);
        assert!((aabb.min[2] - 7.0).abs() < eps);
        assert!((aabb.max[2] - 7.0).abs() < eps);
        Ok(())
    })
    .unwrap();
}

#[test]
fn prescaled_read_folds_scale_into_vertices() {
    let transform = Transform {
        scale: [2.0, 3.0, 4.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        position: [0.0; 3],
    };
    let verts = vec![1.0, 1.0, 1.0, 0.5, 0.5, 0.5];

    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        w.emplace_geometry("scaled", &transform, &verts, &[0, 1, 0], &EncodeOptions::default())?;
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        let record = r.geometry_prescaled(0)?;
        assert_eq!(record.transform.scale, [1.0; 3]);
        assert_eq!(record.verts, &[2.0, 3.0, 4.0, 1.0, 1.5, 2.0]);
        Ok(())
    })
    .unwrap();
}

#[test]
fn names_may_repeat_and_may_be_empty() {
    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        for name in ["dup", "", "dup"] {
            w.emplace_geometry(
                name,
                &Transform::IDENTITY,
                &[0.1, 0.2, 0.3],
                &[0],
                &EncodeOptions::default(),
            )?;
        }
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        assert_eq!(r.geometry_count(), 3);
        assert_eq!(r.geometry_name(0).as_deref(), Some("dup"));
        assert_eq!(r.geometry_name(1).as_deref(), Some(""));
        assert_eq!(r.geometry_name(2).as_deref(), Some("dup"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn non_ascii_names_roundtrip() {
    let names = ["mesh·α", "网格", "käyrä"];

    let mut writer = StreamWriter::new();
    let mut file = Vec::new();
    write_scoped(&mut writer, Cursor::new(&mut file), |w| {
        for name in names {
            w.emplace_geometry(
                name,
                &Transform::IDENTITY,
                &[0.1, 0.2, 0.3],
                &[0],
                &EncodeOptions::default(),
            )?;
        }
        Ok(())
    })
    .unwrap();

    let mut reader = StreamReader::new();
    read_scoped(&mut reader, Cursor::new(&file), |r| {
        for (i, name) in names.iter().enumerate() {
            assert_eq!(r.geometry_name(i).unwrap(), *name);
        }
        Ok(())
    })
    .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Containers back to back in one stream
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn container_may_start_at_a_nonzero_offset() {
    // The header slot is relative to wherever the write began; a container
    // embedded after a preamble must read back from that same offset.
    let mut buf = Cursor::new(Vec::new());
    buf.write_all(b"outer archive preamble").unwrap();
    let container_start = buf.stream_position().unwrap();

    let mut writer = StreamWriter::new();
    writer.begin_write(&mut buf).unwrap();
    writer
        .emplace_geometry(
            "embedded",
            &Transform::IDENTITY,
            &[0.5, 0.25, 0.125],
            &[0],
            &EncodeOptions::default(),
        )
        .unwrap();
    writer.end_write().unwrap();

    buf.seek(SeekFrom::Start(container_start)).unwrap();
    let mut reader = StreamReader::new();
    reader.begin_read(&mut buf).unwrap();
    assert_eq!(reader.geometry_count(), 1);
    let record = reader.geometry(0).unwrap();
    assert_eq!(record.verts, &[0.5, 0.25, 0.125]);
    reader.end_read().unwrap();
}
