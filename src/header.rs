use flate2::{Decompress, FlushDecompress, Status};

use crate::bitstream::{combine_bytes, BitReader};
use crate::DecodeError;

/// Decompressed dictionary size cap. Real grant dictionaries are tens to
/// low hundreds of bytes.
const MAX_DICTIONARY_BYTES: usize = 1 << 20;

const INFLATE_BUF_SIZE: usize = 4096;

/// Inflates the zlib-compressed word dictionary at the head of a grant
/// payload. The stream is self-delimiting; returns the NUL-separated word
/// list and the number of payload bytes the stream consumed, so the caller
/// can continue with the node section.
pub fn decode_dictionary(payload: &[u8]) -> Result<(Vec<String>, usize), DecodeError> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::new();
    let mut buf = [0u8; INFLATE_BUF_SIZE];
    let mut in_pos = 0usize;

    loop {
        let before_in = inflater.total_in() as usize;
        let before_out = inflater.total_out() as usize;

        let status = inflater
            .decompress(&payload[in_pos..], &mut buf, FlushDecompress::None)
            .map_err(|_| DecodeError::BadDictionary("invalid zlib stream"))?;

        let consumed = inflater.total_in() as usize - before_in;
        let produced = inflater.total_out() as usize - before_out;
        in_pos += consumed;

        if produced != 0 {
            if out.len() + produced > MAX_DICTIONARY_BYTES {
                return Err(DecodeError::BadDictionary("dictionary too large"));
            }
            out.extend_from_slice(&buf[..produced]);
        }

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if consumed == 0 && produced == 0 {
                    // no forward progress and no more input: cut mid-stream
                    return Err(DecodeError::TruncatedInput);
                }
            }
        }
    }

    let text = String::from_utf8(out)
        .map_err(|_| DecodeError::BadDictionary("dictionary is not UTF-8"))?;
    let words = text.split('\0').map(str::to_owned).collect();
    Ok((words, in_pos))
}

/// Reads the node count: one byte, either the literal count (< 128) or
/// 128 plus the number of big-endian count bytes that follow.
pub fn read_node_count(bits: &mut BitReader<'_>) -> Result<u64, DecodeError> {
    let first = bits.read_byte()?;
    if first < 128 {
        return Ok(first as u64);
    }
    let width = (first - 128) as usize;
    if width == 0 || width > 8 {
        return Err(DecodeError::MalformedHeader("bad node count width"));
    }
    let mut raw = [0u8; 8];
    for slot in raw.iter_mut().take(width) {
        *slot = bits.read_byte()?;
    }
    Ok(combine_bytes(&raw[..width]))
}
