//! Container reader: directory load, O(1) lookups, record fetch.

use std::io::Cursor;

use log::debug;

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::lzma;
use crate::record::{DecodedRecord, RecordDecoder};
use crate::stream::directory::{self, Aabb, DirectoryIndex, DIR_COMPRESSED_BIT, SENTINEL};
use crate::stream::handle::{read_u32le, read_u64le, read_u8, SourceHandle};

/// Streaming reader of a geometry container.
///
/// `begin_read` loads the whole directory up front, so counts, names, and
/// bounding boxes answer from memory; record payloads stay in the file and
/// are fetched per [`geometry`](Self::geometry) call. The decoded views
/// alias reader-owned buffers and are invalidated by the next fetch.
#[derive(Debug, Default)]
pub struct StreamReader<H: SourceHandle> {
    handle: Option<H>,
    file_begin: u64,
    directory: DirectoryIndex,
    decoder: RecordDecoder,
    record_buf: ByteCursor,
}

impl<H: SourceHandle> StreamReader<H> {
    pub fn new() -> Self {
        Self {
            handle: None,
            file_begin: 0,
            directory: DirectoryIndex::default(),
            decoder: RecordDecoder::new(),
            record_buf: ByteCursor::new(),
        }
    }

    /// Starts a read session: parses the header slot, loads the directory,
    /// and seeks back to the first record.
    pub fn begin_read(&mut self, mut handle: H) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::ReentrantBegin);
        }

        let slot = read_u64le(&mut handle)?;
        self.file_begin = handle.tell()?;
        let compressed = slot & DIR_COMPRESSED_BIT != 0;
        let dir_pos = slot & !DIR_COMPRESSED_BIT;
        if dir_pos == SENTINEL & !DIR_COMPRESSED_BIT {
            return Err(Error::MalformedHeader("header slot still holds the unwritten sentinel"));
        }
        handle.seek_to(dir_pos)?;

        if compressed {
            let src_size = read_u32le(&mut handle)? as usize;
            let dest_size = read_u32le(&mut handle)? as usize;
            let prop = read_u8(&mut handle)?;

            let mut packed = Vec::new();
            packed.try_reserve(dest_size).map_err(|_| Error::AllocationFailed)?;
            packed.resize(dest_size, 0);
            handle.read_exact(&mut packed)?;

            let mut image = Vec::new();
            lzma::decompress_block(&packed, prop, src_size, &mut image)?;
            directory::read_image(&mut Cursor::new(image), &mut self.directory)?;
        } else {
            directory::read_image(&mut handle, &mut self.directory)?;
        }

        debug!("directory loaded: {} records", self.directory.aabbs.len());
        handle.seek_to(self.file_begin)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Ends the session and returns the handle. Directory lookups keep
    /// answering from memory afterwards; record fetches do not.
    pub fn end_read(&mut self) -> Result<H> {
        self.handle.take().ok_or(Error::SessionInactive)
    }

    /// Number of records in the container.
    pub fn geometry_count(&self) -> usize {
        self.directory.aabbs.len()
    }

    /// Record name, decoded from UTF-16. Unpaired surrogates are replaced.
    pub fn geometry_name(&self, index: usize) -> Option<String> {
        self.geometry_name_utf16(index).map(String::from_utf16_lossy)
    }

    /// Record name as raw UTF-16 units, terminator stripped.
    pub fn geometry_name_utf16(&self, index: usize) -> Option<&[u16]> {
        let &(start, len) = self.directory.name_spans.get(index)?;
        Some(&self.directory.names_raw[start..start + len])
    }

    /// World-space bounding box recorded for a record.
    pub fn geometry_aabb(&self, index: usize) -> Option<&Aabb> {
        self.directory.aabbs.get(index)
    }

    /// Fetches and decodes record `index`.
    ///
    /// Seeks to the first record and skips forward over `index` size
    /// prefixes; directory order is emplacement order, so this returns the
    /// `index`-th emplaced record.
    pub fn geometry(&mut self, index: usize) -> Result<DecodedRecord<'_>> {
        self.fetch_record(index)?;
        self.decoder.decode_parts(self.record_buf.as_slice())?;
        Ok(self.decoder.view())
    }

    /// Like [`geometry`](Self::geometry), but folds Scale into the vertex
    /// array and reports unit scale. The decoded `f64` view is replaced by
    /// the scaled one.
    pub fn geometry_prescaled(&mut self, index: usize) -> Result<DecodedRecord<'_>> {
        self.fetch_record(index)?;
        self.decoder.decode_parts(self.record_buf.as_slice())?;
        self.decoder.fold_scale();
        Ok(self.decoder.view())
    }

    fn fetch_record(&mut self, index: usize) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(Error::SessionInactive)?;
        handle.seek_to(self.file_begin)?;

        for _ in 0..index {
            let size = read_u64le(handle)?;
            let here = handle.tell()?;
            let next = here
                .checked_add(size)
                .ok_or(Error::MalformedRecord("record size overflows the file offset"))?;
            handle.seek_to(next)?;
        }

        let size = read_u64le(handle)?;
        let size = usize::try_from(size)
            .map_err(|_| Error::MalformedRecord("record size exceeds the address space"))?;
        self.record_buf.resize(size)?;
        handle.read_exact(self.record_buf.as_mut_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn begin_twice_is_reentrant() {
        // 16-byte empty container: slot = 8, count = 0.
        let mut file = Vec::new();
        file.extend_from_slice(&8u64.to_le_bytes());
        file.extend_from_slice(&0u64.to_le_bytes());

        let mut reader = StreamReader::new();
        reader.begin_read(Cursor::new(file.clone())).unwrap();
        let err = reader.begin_read(Cursor::new(file)).unwrap_err();
        assert!(matches!(err, Error::ReentrantBegin));
    }

    #[test]
    fn sentinel_slot_is_malformed() {
        let mut file = Vec::new();
        file.extend_from_slice(&u64::MAX.to_le_bytes());
        file.extend_from_slice(&0u64.to_le_bytes());

        let mut reader = StreamReader::new();
        let err = reader.begin_read(Cursor::new(file)).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn empty_container_reads_back_empty() {
        let mut file = Vec::new();
        file.extend_from_slice(&8u64.to_le_bytes());
        file.extend_from_slice(&0u64.to_le_bytes());

        let mut reader = StreamReader::new();
        reader.begin_read(Cursor::new(file)).unwrap();
        assert_eq!(reader.geometry_count(), 0);
        assert!(reader.geometry_name(0).is_none());
        assert!(reader.geometry_aabb(0).is_none());
        assert!(reader.geometry(0).is_err());
        reader.end_read().unwrap();
    }

    #[test]
    fn fetch_without_session_is_inactive() {
        let mut reader = StreamReader::<Cursor<Vec<u8>>>::new();
        assert!(matches!(reader.geometry(0).unwrap_err(), Error::SessionInactive));
    }
}
