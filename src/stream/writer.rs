//! Container writer: sentinel slot, record append, directory finalize.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::error::{Error, Result};
use crate::record::{EncodeOptions, RecordEncoder, Transform};
use crate::stream::directory::{self, Aabb, DIR_COMPRESSED_BIT, SENTINEL};
use crate::stream::handle::SinkHandle;

/// Streaming writer of a geometry container.
///
/// `begin_write` claims a handle and reserves the header slot;
/// `emplace_geometry` appends one size-prefixed encoded record per call and
/// grows the in-memory directory; `end_write` writes the directory, patches
/// the header slot to point at it, and returns the handle. Skipping
/// `end_write` leaves the sentinel slot in the file, which readers reject;
/// use [`write_scoped`](crate::stream::scope::write_scoped) to make the
/// finalize unskippable.
#[derive(Debug, Default)]
pub struct StreamWriter<H: SinkHandle> {
    handle: Option<H>,
    file_begin: u64,
    /// All record names back to back, one terminator each.
    names: Vec<u16>,
    aabbs: Vec<Aabb>,
    encoder: RecordEncoder,
    /// Scratch for the transformed copy of the current vertex array.
    transformed: Vec<f64>,
}

impl<H: SinkHandle> StreamWriter<H> {
    pub fn new() -> Self {
        Self {
            handle: None,
            file_begin: 0,
            names: Vec::new(),
            aabbs: Vec::new(),
            encoder: RecordEncoder::new(),
            transformed: Vec::new(),
        }
    }

    /// Number of records emplaced in the active session.
    pub fn geometry_count(&self) -> usize {
        self.aabbs.len()
    }

    /// Starts a write session at the handle's current position.
    ///
    /// Writes the all-ones sentinel into the header slot; `end_write`
    /// overwrites it with the directory offset once that is known.
    pub fn begin_write(&mut self, mut handle: H) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::ReentrantBegin);
        }
        self.file_begin = handle.tell()?;
        handle.write_all(&SENTINEL.to_le_bytes())?;
        self.names.clear();
        self.aabbs.clear();
        self.handle = Some(handle);
        Ok(())
    }

    /// Encodes and appends one record, and indexes it in the directory.
    ///
    /// Returns the running record count after the append (the first record
    /// returns 1). `name` may be empty but must not contain NUL. On failure
    /// the session stays usable, but bytes of a partial record may already
    /// be in the file.
    pub fn emplace_geometry(
        &mut self,
        name: &str,
        transform: &Transform,
        verts: &[f64],
        inds: &[u32],
        options: &EncodeOptions,
    ) -> Result<u64> {
        if name.chars().any(|c| c == '\0') {
            return Err(Error::MalformedRecord("record name contains NUL"));
        }

        let encoded = self.encoder.encode(transform, verts, inds, options)?;
        let handle = self.handle.as_mut().ok_or(Error::SessionInactive)?;
        handle.write_all(&(encoded.len() as u64).to_le_bytes())?;
        handle.write_all(encoded)?;

        let aabb = transform_bounds(transform, verts, inds, &mut self.transformed);
        self.names.extend(name.encode_utf16());
        self.names.push(0);
        self.aabbs.push(aabb);

        debug!(
            "emplaced record {} ({} bytes encoded)",
            self.aabbs.len() - 1,
            encoded.len()
        );
        Ok(self.aabbs.len() as u64)
    }

    /// Finalizes the container and returns the handle.
    ///
    /// Writes the directory (compressed when that is smaller), then patches
    /// the header slot with its offset and the compression flag, and seeks
    /// back past the directory.
    pub fn end_write(&mut self) -> Result<H> {
        let mut handle = self.handle.take().ok_or(Error::SessionInactive)?;
        Self::finish(&mut handle, self.file_begin, &self.names, &self.aabbs)?;
        Ok(handle)
    }

    fn finish(handle: &mut H, file_begin: u64, names: &[u16], aabbs: &[Aabb]) -> Result<()> {
        let mut header_pos = handle.tell()?;

        let image = directory::build_image(names, aabbs)?;
        let (bytes, compressed) = directory::encode_image(image)?;
        if compressed {
            header_pos |= DIR_COMPRESSED_BIT;
        }
        handle.write_all(&bytes)?;

        let last_pos = handle.tell()?;
        handle.seek_to(file_begin)?;
        let mut slot = [0u8; 8];
        LittleEndian::write_u64(&mut slot, header_pos);
        handle.write_all(&slot)?;
        handle.seek_to(last_pos)?;
        Ok(())
    }
}

/// Applies scale, quaternion rotation, and translation to every full vertex
/// triple, then takes the min/max over every referenced vertex.
///
/// The rotation uses `p' = p + 2·(qv × (qv×p + w·p))` with the quaternion
/// taken verbatim; indices past the vertex array and trailing partial
/// triples contribute nothing. With no indices the result is
/// [`Aabb::EMPTY`].
fn transform_bounds(transform: &Transform, verts: &[f64], inds: &[u32], scratch: &mut Vec<f64>) -> Aabb {
    let [qx, qy, qz, qw] = transform.rotation;

    scratch.clear();
    scratch.extend_from_slice(verts);
    for p in scratch.chunks_exact_mut(3) {
        let x = p[0] * transform.scale[0];
        let y = p[1] * transform.scale[1];
        let z = p[2] * transform.scale[2];

        let tx = qy * z - qz * y + qw * x;
        let ty = qz * x - qx * z + qw * y;
        let tz = qx * y - qy * x + qw * z;

        p[0] = x + 2.0 * (qy * tz - qz * ty) + transform.position[0];
        p[1] = y + 2.0 * (qz * tx - qx * tz) + transform.position[1];
        p[2] = z + 2.0 * (qx * ty - qy * tx) + transform.position[2];
    }

    let mut aabb = Aabb::EMPTY;
    for &ind in inds {
        let base = ind as usize * 3;
        if let Some(p) = scratch.get(base..base + 3) {
            aabb.cover([p[0], p[1], p[2]]);
        }
    }
    aabb
}
