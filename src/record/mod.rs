//! Per-record codec: packed payload layout, encoder, and decoder.
//!
//! A record encodes in two stages. Packing lays the transform, counts, and
//! the two variable-length blobs (codec-compressed vertices, bit-packed
//! indices) into the fixed header-plus-tails form described in [`layout`].
//! The packed payload then runs through the LZMA2 block transform, unless
//! compression fails to pay for itself, in which case the payload is stored
//! verbatim behind a flagged size word.

pub mod decode;
pub mod encode;
pub mod layout;

pub use decode::{DecodedRecord, RecordDecoder};
pub use encode::{EncodeOptions, RecordEncoder, DEFAULT_ENCODE_OFFSET};
pub use layout::Transform;
