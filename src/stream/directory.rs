//! The container's trailing directory: names and bounding boxes.
//!
//! Uncompressed image, little-endian:
//!
//! ```text
//! u64 count
//! (u16 char* + u16 0) × count      null-terminated UTF-16 names
//! (f64 min[3] | f64 max[3]) × count
//! ```
//!
//! When the LZMA2 form pays for itself the image is stored as
//! `{u32 src_size, u32 dest_size, u8 prop, stream}` instead, and the header
//! slot's top bit says so. The all-ones count is reserved as the
//! never-written sentinel, so a reader meeting it knows the writer never
//! finished.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::error::{Error, Result};
use crate::lzma;
use crate::stream::handle::{read_u16le, read_u64le, SourceHandle};

/// Value a header slot or record count holds before the writer patches it.
pub(crate) const SENTINEL: u64 = u64::MAX;

/// Flag bit of the header slot: directory image is compressed.
pub(crate) const DIR_COMPRESSED_BIT: u64 = 1 << 63;

/// Size of the `{src_size, dest_size, prop}` preamble of a compressed image.
pub(crate) const DIR_PREAMBLE: usize = 4 + 4 + lzma::PROP_SIZE;

/// Serialized size of one [`Aabb`].
pub(crate) const AABB_BYTES: usize = 48;

/// Axis-aligned bounding box of a record's transformed geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    /// The box no point has entered yet; any comparison will replace it.
    pub const EMPTY: Aabb = Aabb {
        min: [f64::MAX; 3],
        max: [-f64::MAX; 3],
    };

    /// Grows the box to cover `p`.
    #[inline]
    pub fn cover(&mut self, p: [f64; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_f64_into(&self.min, &mut buf[..24]);
        LittleEndian::write_f64_into(&self.max, &mut buf[24..AABB_BYTES]);
    }

    pub(crate) fn from_bytes(buf: &[u8; AABB_BYTES]) -> Self {
        let mut aabb = Aabb::EMPTY;
        LittleEndian::read_f64_into(&buf[..24], &mut aabb.min);
        LittleEndian::read_f64_into(&buf[24..], &mut aabb.max);
        aabb
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write side
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the uncompressed directory image.
///
/// `names` is the flat UTF-16 buffer with one terminator per record; the
/// record count comes from `aabbs`.
pub(crate) fn build_image(names: &[u16], aabbs: &[Aabb]) -> Result<Vec<u8>> {
    let len = 8 + names.len() * 2 + aabbs.len() * AABB_BYTES;
    let mut image = Vec::new();
    image.try_reserve(len).map_err(|_| Error::AllocationFailed)?;

    image.extend_from_slice(&(aabbs.len() as u64).to_le_bytes());

    let name_start = image.len();
    image.resize(name_start + names.len() * 2, 0);
    LittleEndian::write_u16_into(names, &mut image[name_start..]);

    for aabb in aabbs {
        let at = image.len();
        image.resize(at + AABB_BYTES, 0);
        aabb.write_to(&mut image[at..]);
    }
    Ok(image)
}

/// Wraps `image` for the file: the compressed form with its preamble when
/// strictly smaller, otherwise the image itself.
///
/// Returns the bytes to write and whether they are the compressed form.
pub(crate) fn encode_image(image: Vec<u8>) -> Result<(Vec<u8>, bool)> {
    let mut wrapped = Vec::new();
    wrapped
        .try_reserve(DIR_PREAMBLE + image.len())
        .map_err(|_| Error::AllocationFailed)?;
    wrapped.resize(DIR_PREAMBLE, 0);
    let prop = lzma::compress_block(&image, &mut wrapped)?;
    let dest_len = wrapped.len() - DIR_PREAMBLE;

    let compressible =
        image.len() <= u32::MAX as usize && dest_len <= u32::MAX as usize && wrapped.len() < image.len();
    if !compressible {
        debug!("directory: stored uncompressed ({} bytes)", image.len());
        return Ok((image, false));
    }

    debug!("directory: {} bytes -> {} compressed", image.len(), dest_len);
    LittleEndian::write_u32(&mut wrapped[..4], image.len() as u32);
    LittleEndian::write_u32(&mut wrapped[4..8], dest_len as u32);
    wrapped[8] = prop;
    Ok((wrapped, true))
}

// ─────────────────────────────────────────────────────────────────────────────
// Read side
// ─────────────────────────────────────────────────────────────────────────────

/// Directory contents as loaded by a reader.
#[derive(Debug, Default)]
pub(crate) struct DirectoryIndex {
    /// All names back to back, terminators stripped.
    pub names_raw: Vec<u16>,
    /// `(start, len)` of each name within `names_raw`.
    pub name_spans: Vec<(usize, usize)>,
    pub aabbs: Vec<Aabb>,
}

impl DirectoryIndex {
    pub(crate) fn clear(&mut self) {
        self.names_raw.clear();
        self.name_spans.clear();
        self.aabbs.clear();
    }
}

/// Parses an uncompressed directory image from `src` into `index`.
///
/// Works against the file handle directly or against an in-memory cursor
/// over a decompressed image; names are consumed character by character
/// until each record's terminator has been seen.
pub(crate) fn read_image<H: SourceHandle + ?Sized>(src: &mut H, index: &mut DirectoryIndex) -> Result<()> {
    index.clear();

    let count = read_u64le(src)?;
    if count == SENTINEL {
        return Err(Error::MalformedHeader("record count is the unwritten sentinel"));
    }
    let count = usize::try_from(count)
        .map_err(|_| Error::MalformedHeader("record count exceeds the address space"))?;

    index
        .name_spans
        .try_reserve(count)
        .map_err(|_| Error::AllocationFailed)?;
    index.aabbs.try_reserve(count).map_err(|_| Error::AllocationFailed)?;

    for _ in 0..count {
        let start = index.names_raw.len();
        loop {
            let c = read_u16le(src)?;
            if c == 0 {
                break;
            }
            index
                .names_raw
                .try_reserve(1)
                .map_err(|_| Error::AllocationFailed)?;
            index.names_raw.push(c);
        }
        index.name_spans.push((start, index.names_raw.len() - start));
    }

    for _ in 0..count {
        let mut buf = [0u8; AABB_BYTES];
        src.read_exact(&mut buf)?;
        index.aabbs.push(Aabb::from_bytes(&buf));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn utf16(s: &str) -> Vec<u16> {
        let mut out: Vec<u16> = s.encode_utf16().collect();
        out.push(0);
        out
    }

    #[test]
    fn aabb_bytes_roundtrip() {
        let aabb = Aabb {
            min: [-1.5, 0.0, 3.25],
            max: [2.5, 4.0, 9.75],
        };
        let mut buf = [0u8; AABB_BYTES];
        aabb.write_to(&mut buf);
        assert_eq!(Aabb::from_bytes(&buf), aabb);
    }

    #[test]
    fn cover_expands_from_empty() {
        let mut aabb = Aabb::EMPTY;
        aabb.cover([1.0, -2.0, 3.0]);
        aabb.cover([-1.0, 2.0, 0.0]);
        assert_eq!(aabb.min, [-1.0, -2.0, 0.0]);
        assert_eq!(aabb.max, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn image_roundtrip_with_names() {
        let mut names = utf16("first");
        names.extend(utf16("")); // empty names are legal
        names.extend(utf16("третий"));
        let aabbs = vec![
            Aabb { min: [0.0; 3], max: [1.0; 3] },
            Aabb { min: [-1.0; 3], max: [0.0; 3] },
            Aabb { min: [5.0; 3], max: [6.0; 3] },
        ];

        let image = build_image(&names, &aabbs).unwrap();
        let mut index = DirectoryIndex::default();
        read_image(&mut Cursor::new(image), &mut index).unwrap();

        assert_eq!(index.aabbs, aabbs);
        assert_eq!(index.name_spans.len(), 3);
        let name = |i: usize| {
            let (start, len) = index.name_spans[i];
            String::from_utf16_lossy(&index.names_raw[start..start + len])
        };
        assert_eq!(name(0), "first");
        assert_eq!(name(1), "");
        assert_eq!(name(2), "третий");
    }

    #[test]
    fn empty_image_is_eight_bytes() {
        let image = build_image(&[], &[]).unwrap();
        assert_eq!(image, 0u64.to_le_bytes());
    }

    #[test]
    fn tiny_image_stays_uncompressed() {
        let image = build_image(&[], &[]).unwrap();
        let (bytes, compressed) = encode_image(image.clone()).unwrap();
        assert!(!compressed);
        assert_eq!(bytes, image);
    }

    #[test]
    fn repetitive_image_compresses() {
        let names: Vec<u16> = (0..64)
            .flat_map(|_| utf16("geometry_chunk_instance"))
            .collect();
        let aabbs = vec![Aabb { min: [0.0; 3], max: [1.0; 3] }; 64];
        let image = build_image(&names, &aabbs).unwrap();

        let (bytes, compressed) = encode_image(image.clone()).unwrap();
        assert!(compressed);
        assert!(bytes.len() < image.len());

        // The wrapped form declares both sizes and decompresses back.
        let src_size = LittleEndian::read_u32(&bytes[..4]) as usize;
        let dest_size = LittleEndian::read_u32(&bytes[4..8]) as usize;
        assert_eq!(src_size, image.len());
        assert_eq!(dest_size, bytes.len() - DIR_PREAMBLE);

        let mut unpacked = Vec::new();
        crate::lzma::decompress_block(&bytes[DIR_PREAMBLE..], bytes[8], src_size, &mut unpacked).unwrap();
        assert_eq!(unpacked, image);
    }

    #[test]
    fn sentinel_count_is_rejected() {
        let image = SENTINEL.to_le_bytes();
        let mut index = DirectoryIndex::default();
        let err = read_image(&mut Cursor::new(image.to_vec()), &mut index).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }
}
