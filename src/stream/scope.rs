//! Session brackets that make finalization unskippable.
//!
//! A container is only well-formed after `end_write` back-patches the header
//! slot, and a reader session should release its handle on every path. These
//! brackets run begin, the body, then end; end runs even when the body
//! failed. When both fail, the body's error wins: the finalizer usually
//! fails as a consequence of the first failure, and the root cause is the
//! one worth reporting. The suppressed finalizer error is logged.

use log::warn;

use crate::error::Result;
use crate::stream::handle::{SinkHandle, SourceHandle};
use crate::stream::reader::StreamReader;
use crate::stream::writer::StreamWriter;

/// Runs a write session: `begin_write`, `body`, then `end_write` regardless
/// of the body's outcome. The first failure is the one returned.
pub fn write_scoped<H, T, F>(writer: &mut StreamWriter<H>, handle: H, body: F) -> Result<T>
where
    H: SinkHandle,
    F: FnOnce(&mut StreamWriter<H>) -> Result<T>,
{
    writer.begin_write(handle)?;
    let body_result = body(writer);
    let end_result = writer.end_write();
    reconcile(body_result, end_result.map(drop))
}

/// Runs a read session: `begin_read`, `body`, then `end_read` regardless of
/// the body's outcome. The first failure is the one returned.
pub fn read_scoped<H, T, F>(reader: &mut StreamReader<H>, handle: H, body: F) -> Result<T>
where
    H: SourceHandle,
    F: FnOnce(&mut StreamReader<H>) -> Result<T>,
{
    reader.begin_read(handle)?;
    let body_result = body(reader);
    let end_result = reader.end_read();
    reconcile(body_result, end_result.map(drop))
}

fn reconcile<T>(body: Result<T>, end: Result<()>) -> Result<T> {
    match (body, end) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(end_err)) => Err(end_err),
        (Err(body_err), Ok(())) => Err(body_err),
        (Err(body_err), Err(end_err)) => {
            warn!("session finalizer also failed: {end_err}");
            Err(body_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn body_error_wins_over_finalizer_error() {
        let body: Result<()> = Err(Error::MalformedRecord("body failed"));
        let end: Result<()> = Err(Error::CompressionFailed("finalizer failed".into()));
        let out = reconcile(body, end).unwrap_err();
        assert!(matches!(out, Error::MalformedRecord("body failed")));
    }

    #[test]
    fn finalizer_error_surfaces_when_body_succeeds() {
        let end: Result<()> = Err(Error::CompressionFailed("finalizer failed".into()));
        let out = reconcile(Ok(7), end).unwrap_err();
        assert!(matches!(out, Error::CompressionFailed(_)));
    }

    #[test]
    fn both_ok_returns_the_body_value() {
        assert_eq!(reconcile(Ok(42), Ok(())).unwrap(), 42);
    }
}
