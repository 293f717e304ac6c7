//! Record decoder: size word, optional decompression, payload parse.

use byteorder::{ByteOrder, LittleEndian};

use crate::bitpack;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::lzma;
use crate::record::layout::{self, Transform, HEADER_LEN, SIZE_WORD_LEN, TOP_BIT};
use crate::vertex::{self, VertexMode};

/// Borrowed view of a decoded record.
///
/// `verts` and `inds` alias decoder-owned buffers and are invalidated by the
/// next decode on the same [`RecordDecoder`]; the lifetime enforces that.
#[derive(Debug)]
pub struct DecodedRecord<'a> {
    pub transform: Transform,
    /// Flat scalar array, three doubles per vertex.
    pub verts: &'a [f64],
    /// Flat index array.
    pub inds: &'a [u32],
    /// Width the vertex stream travelled with.
    pub vertex_mode: VertexMode,
}

/// Decodes records into internally owned, reused buffers.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    payload: ByteCursor,
    verts: Vec<f64>,
    inds: Vec<u32>,
    transform: Transform,
    vertex_mode: VertexMode,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one encoded record.
    pub fn decode(&mut self, data: &[u8]) -> Result<DecodedRecord<'_>> {
        self.decode_parts(data)?;
        Ok(self.view())
    }

    /// Parses `data` into the decoder's buffers without handing out a view.
    pub(crate) fn decode_parts(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < SIZE_WORD_LEN {
            return Err(Error::MalformedRecord("missing size word"));
        }
        let word = LittleEndian::read_u64(&data[..SIZE_WORD_LEN]);
        let bypassed = word & TOP_BIT != 0;
        let payload_len = usize::try_from(word & !TOP_BIT)
            .map_err(|_| Error::MalformedRecord("payload length exceeds the address space"))?;

        let payload: &[u8] = if bypassed {
            let tail = &data[SIZE_WORD_LEN..];
            if tail.len() < payload_len {
                return Err(Error::MalformedRecord("bypassed payload truncated"));
            }
            &tail[..payload_len]
        } else {
            if data.len() < SIZE_WORD_LEN + lzma::PROP_SIZE {
                return Err(Error::MalformedRecord("missing compressor property"));
            }
            let prop = data[SIZE_WORD_LEN];
            lzma::decompress_block(
                &data[SIZE_WORD_LEN + lzma::PROP_SIZE..],
                prop,
                payload_len,
                self.payload.as_mut_vec(),
            )?;
            self.payload.as_slice()
        };

        let header = layout::parse_header(payload)?;
        let vert_end = HEADER_LEN
            .checked_add(header.packed_vert_len)
            .ok_or(Error::MalformedRecord("packed vertex length overflows"))?;
        let ind_end = vert_end
            .checked_add(header.packed_ind_len)
            .ok_or(Error::MalformedRecord("packed index length overflows"))?;
        if ind_end > payload.len() {
            return Err(Error::MalformedRecord("packed blobs extend past the payload"));
        }
        if header.packed_ind_len != bitpack::packed_len(header.vert_count, header.ind_count) {
            return Err(Error::MalformedRecord("index bitstream length disagrees with its counts"));
        }

        vertex::decode(
            &payload[HEADER_LEN..vert_end],
            header.vert_count,
            header.vertex_mode,
            &mut self.verts,
        )?;
        bitpack::unpack(
            header.vert_count,
            header.ind_count,
            &payload[vert_end..ind_end],
            &mut self.inds,
        )?;

        self.transform = header.transform;
        self.vertex_mode = header.vertex_mode;
        Ok(())
    }

    /// Folds the decoded scale into the vertex buffer and reports unit scale.
    pub(crate) fn fold_scale(&mut self) {
        let scale = self.transform.scale;
        for p in self.verts.chunks_exact_mut(3) {
            p[0] *= scale[0];
            p[1] *= scale[1];
            p[2] *= scale[2];
        }
        self.transform.scale = [1.0; 3];
    }

    /// View of the last decoded record.
    pub(crate) fn view(&self) -> DecodedRecord<'_> {
        DecodedRecord {
            transform: self.transform,
            verts: &self.verts,
            inds: &self.inds,
            vertex_mode: self.vertex_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode::{EncodeOptions, RecordEncoder};

    fn sample_transform() -> Transform {
        Transform {
            scale: [2.0, 0.5, 1.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            position: [-4.0, 8.0, 0.25],
        }
    }

    #[test]
    fn roundtrip_preserves_everything_in_f64_mode() {
        let transform = sample_transform();
        let verts = vec![0.1, 0.2, 0.3, 1.1, 1.2, 1.3, 2.1, 2.2, 2.3];
        let inds = vec![0, 1, 2];

        let mut encoder = RecordEncoder::new();
        let blob = encoder
            .encode(&transform, &verts, &inds, &EncodeOptions::default())
            .unwrap()
            .to_vec();

        let mut decoder = RecordDecoder::new();
        let record = decoder.decode(&blob).unwrap();
        assert_eq!(record.transform, transform);
        assert_eq!(record.vertex_mode, VertexMode::F64);
        assert_eq!(record.verts, verts.as_slice());
        assert_eq!(record.inds, inds.as_slice());
    }

    #[test]
    fn empty_record_roundtrips() {
        let mut encoder = RecordEncoder::new();
        let blob = encoder
            .encode(&Transform::IDENTITY, &[], &[], &EncodeOptions::default())
            .unwrap()
            .to_vec();

        let mut decoder = RecordDecoder::new();
        let record = decoder.decode(&blob).unwrap();
        assert!(record.verts.is_empty());
        assert!(record.inds.is_empty());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut decoder = RecordDecoder::new();
        assert!(matches!(
            decoder.decode(&[1, 2, 3]).unwrap_err(),
            Error::MalformedRecord(_)
        ));
    }

    #[test]
    fn bypassed_record_with_short_tail_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&(200u64 | TOP_BIT).to_le_bytes());
        data.extend_from_slice(&[0u8; 50]);
        let mut decoder = RecordDecoder::new();
        assert!(decoder.decode(&data).is_err());
    }

    #[test]
    fn corrupt_compressed_stream_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&(HEADER_LEN as u64).to_le_bytes());
        data.push(22); // plausible dictionary property
        data.extend_from_slice(&[0x5A; 64]);
        let mut decoder = RecordDecoder::new();
        assert!(decoder.decode(&data).is_err());
    }

    #[test]
    fn fold_scale_multiplies_triples() {
        let transform = sample_transform();
        let verts = vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut encoder = RecordEncoder::new();
        let blob = encoder
            .encode(&transform, &verts, &[0, 1, 0], &EncodeOptions::default())
            .unwrap()
            .to_vec();

        let mut decoder = RecordDecoder::new();
        decoder.decode_parts(&blob).unwrap();
        decoder.fold_scale();
        let record = decoder.view();
        assert_eq!(record.transform.scale, [1.0; 3]);
        assert_eq!(record.verts, &[2.0, 0.5, 1.0, 4.0, 1.0, 2.0]);
    }
}
