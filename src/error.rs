//! Error kinds shared by the record codec and the stream container.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors carry the
//! upstream message where one exists (LZMA, numeric codec, I/O) and format it
//! behind a stable per-subsystem prefix, so callers can log a single string
//! and still tell the failing layer apart.

use core::fmt;
use std::io;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure cases surfaced by encoding, decoding, and container I/O.
#[derive(Debug)]
pub enum Error {
    /// A buffer could not be grown to the required size.
    AllocationFailed,
    /// The general-purpose compressor reported an error.
    CompressionFailed(String),
    /// The vertex codec reported an error.
    VertexCodecFailed(String),
    /// A tell/seek/read/write on the user-supplied handle failed, including
    /// short transfers.
    IoFailed(io::Error),
    /// The container header or directory is unreadable.
    MalformedHeader(&'static str),
    /// An encoded record is truncated or internally inconsistent.
    MalformedRecord(&'static str),
    /// Vertex or index counts do not fit the 32-bit wire fields.
    RecordTooLarge,
    /// `begin_write`/`begin_read` was called while a session is active.
    ReentrantBegin,
    /// An operation that needs an active session was called outside one.
    SessionInactive,
}

impl Error {
    /// Wraps a compressor error, keeping its message.
    pub(crate) fn lzma(err: impl fmt::Display) -> Self {
        Error::CompressionFailed(err.to_string())
    }

    /// Wraps a vertex-codec error, keeping its message.
    pub(crate) fn vertex_codec(err: impl fmt::Display) -> Self {
        Error::VertexCodecFailed(err.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationFailed => f.write_str("allocation failed"),
            Error::CompressionFailed(msg) => write!(f, "lzma: {msg}"),
            Error::VertexCodecFailed(msg) => write!(f, "qcompress: {msg}"),
            Error::IoFailed(err) => write!(f, "io: {err}"),
            Error::MalformedHeader(msg) => write!(f, "malformed header: {msg}"),
            Error::MalformedRecord(msg) => write!(f, "malformed record: {msg}"),
            Error::RecordTooLarge => f.write_str("vertex or index count exceeds the 32-bit wire format"),
            Error::ReentrantBegin => f.write_str("a stream session is already active on this instance"),
            Error::SessionInactive => f.write_str("no stream session is active on this instance"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoFailed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_subsystem_prefixes() {
        assert_eq!(Error::lzma("SZ_ERROR_DATA").to_string(), "lzma: SZ_ERROR_DATA");
        assert_eq!(
            Error::vertex_codec("corrupt chunk").to_string(),
            "qcompress: corrupt chunk"
        );
    }

    #[test]
    fn io_errors_convert_and_expose_source() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err, Error::IoFailed(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
