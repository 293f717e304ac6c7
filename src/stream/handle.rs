//! Capability traits for the user-supplied file handle.
//!
//! The container needs exactly four operations (tell, absolute seek, and an
//! exact-length read or write), so that is the whole surface. Anything
//! `Write + Seek` writes a container; anything `Read + Seek` reads one,
//! which covers `std::fs::File` and in-memory `std::io::Cursor` buffers
//! alike. Transfers are all-or-nothing: a short read or write is a failure,
//! never a partial success.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Write-side handle: tell, absolute seek, exact-length write.
pub trait SinkHandle {
    fn tell(&mut self) -> io::Result<u64>;
    fn seek_to(&mut self, pos: u64) -> io::Result<()>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
}

impl<W: Write + Seek> SinkHandle for W {
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(self, buf)
    }
}

/// Read-side handle: tell, absolute seek, exact-length read.
pub trait SourceHandle {
    fn tell(&mut self) -> io::Result<u64>;
    fn seek_to(&mut self, pos: u64) -> io::Result<()>;
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;
}

impl<R: Read + Seek> SourceHandle for R {
    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(self, buf)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Little-endian field reads over a SourceHandle
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn read_u16le<H: SourceHandle + ?Sized>(h: &mut H) -> io::Result<u16> {
    let mut b = [0u8; 2];
    h.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

pub(crate) fn read_u32le<H: SourceHandle + ?Sized>(h: &mut H) -> io::Result<u32> {
    let mut b = [0u8; 4];
    h.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

pub(crate) fn read_u64le<H: SourceHandle + ?Sized>(h: &mut H) -> io::Result<u64> {
    let mut b = [0u8; 8];
    h.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

pub(crate) fn read_u8<H: SourceHandle + ?Sized>(h: &mut H) -> io::Result<u8> {
    let mut b = [0u8; 1];
    h.read_exact(&mut b)?;
    Ok(b[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_is_both_handle_kinds() {
        let mut buf = Cursor::new(Vec::new());
        SinkHandle::write_all(&mut buf, &0xDEAD_BEEF_u32.to_le_bytes()).unwrap();
        assert_eq!(SinkHandle::tell(&mut buf).unwrap(), 4);

        let mut buf = Cursor::new(buf.into_inner());
        assert_eq!(read_u32le(&mut buf).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn seek_then_tell_roundtrip() {
        let mut buf = Cursor::new(vec![0u8; 64]);
        SourceHandle::seek_to(&mut buf, 17).unwrap();
        assert_eq!(SourceHandle::tell(&mut buf).unwrap(), 17);
    }

    #[test]
    fn short_read_is_an_error() {
        let mut buf = Cursor::new(vec![1u8, 2]);
        assert!(read_u32le(&mut buf).is_err());
    }
}
