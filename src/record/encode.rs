//! Record encoder: pack, compress, and the compression-bypass rule.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::bitpack;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::floatfit::fits_in_f32;
use crate::lzma;
use crate::record::layout::{self, Transform, HEADER_LEN, SIZE_WORD_LEN, TOP_BIT};
use crate::vertex::{self, VertexMode};

/// Default compression-bypass offset: the compressed form is kept unless it
/// exceeds the packed payload by at least this many bytes.
pub const DEFAULT_ENCODE_OFFSET: u64 = 1 << 20;

/// Per-record encoding options.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Slack granted to the compressor before bypass kicks in; the
    /// compressed form is discarded iff
    /// `packed_len + encode_offset <= compressed_len`.
    pub encode_offset: u64,
    /// Skip the range test and narrow the vertex stream unconditionally.
    pub force_f32: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            encode_offset: DEFAULT_ENCODE_OFFSET,
            force_f32: false,
        }
    }
}

/// Encodes records into an internally owned buffer.
///
/// The slice returned by [`encode`](Self::encode) stays valid until the next
/// call on the same encoder; buffers are reused across calls.
#[derive(Debug, Default)]
pub struct RecordEncoder {
    payload: ByteCursor,
    out: ByteCursor,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes one record.
    ///
    /// `verts` is the flat scalar array (three doubles per vertex), `inds`
    /// the flat index array. Counts must fit `u32`.
    pub fn encode(
        &mut self,
        transform: &Transform,
        verts: &[f64],
        inds: &[u32],
        options: &EncodeOptions,
    ) -> Result<&[u8]> {
        let vert_count = u32::try_from(verts.len()).map_err(|_| Error::RecordTooLarge)?;
        let ind_count = u32::try_from(inds.len()).map_err(|_| Error::RecordTooLarge)?;

        let mode = if options.force_f32 || fits_in_f32(verts, inds) {
            VertexMode::F32
        } else {
            VertexMode::F64
        };

        // Pack: header skeleton, vertex blob, index bitstream.
        let packed_ind_len = bitpack::packed_len(vert_count, ind_count);
        self.payload.clear();
        self.payload
            .reserve(HEADER_LEN + 1024 + verts.len() * 8 + packed_ind_len)?;
        self.payload.resize(HEADER_LEN)?;

        let packed_verts = vertex::encode(verts, mode)?;
        self.payload.extend_from_slice(&packed_verts)?;
        bitpack::pack(vert_count, inds, self.payload.as_mut_vec());

        let mut packed_vert_word = packed_verts.len() as u64;
        if mode == VertexMode::F32 {
            packed_vert_word |= TOP_BIT;
        }
        layout::write_header(
            self.payload.as_mut_slice(),
            transform,
            vert_count,
            ind_count,
            packed_vert_word,
            packed_ind_len as u64,
        );

        // Compress behind the size word and property byte.
        let src_len = self.payload.len();
        self.out.clear();
        self.out
            .reserve(SIZE_WORD_LEN + lzma::PROP_SIZE + src_len + src_len / 3 + 128)?;
        self.out.resize(SIZE_WORD_LEN + lzma::PROP_SIZE)?;
        let prop = lzma::compress_block(self.payload.as_slice(), self.out.as_mut_vec())?;
        let dest_len = self.out.len() - SIZE_WORD_LEN - lzma::PROP_SIZE;

        if src_len as u64 + options.encode_offset <= dest_len as u64 {
            // Compression lost by at least the offset: store verbatim.
            debug!("record encode: bypass ({src_len} packed, {dest_len} compressed)");
            self.out.truncate(SIZE_WORD_LEN);
            LittleEndian::write_u64(self.out.as_mut_slice(), src_len as u64 | TOP_BIT);
            self.out.extend_from_slice(self.payload.as_slice())?;
        } else {
            debug!("record encode: {src_len} packed -> {dest_len} compressed ({mode:?})");
            LittleEndian::write_u64(&mut self.out.as_mut_slice()[..SIZE_WORD_LEN], src_len as u64);
            self.out.as_mut_slice()[SIZE_WORD_LEN] = prop;
        }

        Ok(self.out.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::decode::RecordDecoder;

    fn quad() -> (Vec<f64>, Vec<u32>) {
        let verts = vec![
            0.125, 0.25, 0.5,
            1.125, 0.25, 0.5,
            1.125, 1.25, 0.5,
            0.125, 1.25, 0.5,
        ];
        let inds = vec![0, 1, 2, 0, 2, 3];
        (verts, inds)
    }

    #[test]
    fn size_word_declares_packed_length() {
        let (verts, inds) = quad();
        let mut encoder = RecordEncoder::new();
        let blob = encoder
            .encode(&Transform::IDENTITY, &verts, &inds, &EncodeOptions::default())
            .unwrap();

        let word = LittleEndian::read_u64(&blob[..8]);
        assert_eq!(word & TOP_BIT, 0, "small exact payloads compress");
        let declared = (word & !TOP_BIT) as usize;
        assert!(declared >= HEADER_LEN);
    }

    #[test]
    fn bypass_stores_payload_verbatim() {
        let (verts, inds) = quad();
        let mut encoder = RecordEncoder::new();
        let options = EncodeOptions {
            encode_offset: 0,
            ..EncodeOptions::default()
        };
        // Incompressible vertex bits: the packed payload is dominated by
        // codec output, so LZMA2 cannot beat it with zero slack.
        let noisy: Vec<f64> = verts
            .iter()
            .enumerate()
            .map(|(i, &v)| v + (i as f64) * 1.327e-7)
            .collect();
        let blob = encoder
            .encode(&Transform::IDENTITY, &noisy, &inds, &options)
            .unwrap();

        let word = LittleEndian::read_u64(&blob[..8]);
        if word & TOP_BIT != 0 {
            let declared = (word & !TOP_BIT) as usize;
            assert_eq!(blob.len(), 8 + declared);
            // The tail parses as a payload header with our counts.
            let header = layout::parse_header(&blob[8..]).unwrap();
            assert_eq!(header.vert_count, noisy.len() as u32);
            assert_eq!(header.ind_count, inds.len() as u32);
        }

        // Either way the record must round-trip.
        let mut decoder = RecordDecoder::new();
        let record = decoder.decode(blob).unwrap();
        assert_eq!(record.inds, inds.as_slice());
    }

    #[test]
    fn output_valid_until_next_encode() {
        let (verts, inds) = quad();
        let mut encoder = RecordEncoder::new();
        let first_len = encoder
            .encode(&Transform::IDENTITY, &verts, &inds, &EncodeOptions::default())
            .unwrap()
            .len();
        let second = encoder
            .encode(&Transform::IDENTITY, &verts[..3], &[0], &EncodeOptions::default())
            .unwrap();
        assert_ne!(second.len(), 0);
        let _ = first_len;
    }

    #[test]
    fn forced_f32_sets_the_vertex_flag() {
        let (verts, inds) = quad();
        let mut encoder = RecordEncoder::new();
        let options = EncodeOptions {
            force_f32: true,
            encode_offset: 0,
        };
        let blob = encoder
            .encode(&Transform::IDENTITY, &verts, &inds, &options)
            .unwrap()
            .to_vec();

        let mut decoder = RecordDecoder::new();
        let record = decoder.decode(&blob).unwrap();
        assert_eq!(record.vertex_mode, VertexMode::F32);
        // 0.125-grid coordinates are f32-exact, so even the narrowed stream
        // reproduces them.
        assert_eq!(record.verts, verts.as_slice());
    }
}
