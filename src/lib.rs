//! Compressed record codec and stream container for triangle-mesh geometry.
//!
//! A *record* is one mesh: an affine transform (scale, quaternion rotation,
//! translation), a flat `f64` coordinate array, and a flat `u32` index
//! array. Records compress individually (vertices through a lossless
//! numeric codec with an automatic, provably-lossless narrowing to `f32`
//! when the data allows it, indices through minimum-width bit-packing, the
//! packed payload through LZMA2) and append to a single container file
//! whose trailing directory lists every record's name and world-space
//! bounding box behind a back-patched header slot.
//!
//! The two entry points are [`StreamWriter`] and [`StreamReader`], usually
//! driven through the [`write_scoped`] / [`read_scoped`] brackets so the
//! container is finalized on every exit path. [`RecordEncoder`] and
//! [`RecordDecoder`] are also usable standalone for callers that bring
//! their own framing.
//!
//! Everything on the wire is little-endian; the exact layouts live in the
//! module docs of [`record::layout`] and [`stream`].

pub mod bitpack;
pub mod cursor;
pub mod error;
pub mod floatfit;
pub mod lzma;
pub mod record;
pub mod stream;
pub mod vertex;

pub use cursor::ByteCursor;
pub use error::{Error, Result};
pub use floatfit::fits_in_f32;
pub use record::{DecodedRecord, EncodeOptions, RecordDecoder, RecordEncoder, Transform, DEFAULT_ENCODE_OFFSET};
pub use stream::{read_scoped, write_scoped, Aabb, SinkHandle, SourceHandle, StreamReader, StreamWriter};
pub use vertex::VertexMode;
