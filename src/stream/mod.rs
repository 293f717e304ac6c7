//! File-level container: header slot, record sequence, directory trailer.
//!
//! ```text
//! offset  size  field
//!   0      8    header slot: top bit = directory compressed;
//!                low 63 bits = absolute directory offset;
//!                all-ones until end_write back-patches it
//!   8      *    Record[0] … Record[N-1]
//!   ?      ?    directory, uncompressed or
//!                {u32 src_size, u32 dest_size, u8 prop, lzma2 stream}
//!
//! Record = u64 encoded_size | EncodedRecord[encoded_size]
//! ```
//!
//! Records land in emplacement order and the directory indexes them in the
//! same order, so the ordinal is the stable key; names need not be unique.
//! The directory offset is written last, which is what lets a reader find
//! the trailer in O(1) and also what makes an unfinalized file detectably
//! broken rather than silently short.

pub mod directory;
pub mod handle;
pub mod reader;
pub mod scope;
pub mod writer;

pub use directory::Aabb;
pub use handle::{SinkHandle, SourceHandle};
pub use reader::StreamReader;
pub use scope::{read_scoped, write_scoped};
pub use writer::StreamWriter;
