use crate::DecodeError;

/// Sequential bit/byte cursor over a borrowed buffer. Byte reads are used
/// while the header is still byte-aligned; once the Huffman-coded region
/// starts, only bit reads advance the cursor.
pub struct BitReader<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u8, // bits already consumed from data[byte]
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, byte: 0, bit: 0 }
    }

    /// Next whole byte. Any partially consumed byte is abandoned first.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        if self.bit != 0 {
            self.bit = 0;
            self.byte += 1;
        }
        let b = *self
            .data
            .get(self.byte)
            .ok_or(DecodeError::TruncatedInput)?;
        self.byte += 1;
        Ok(b)
    }

    /// Next bit, most significant first.
    pub fn read_bit(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .data
            .get(self.byte)
            .ok_or(DecodeError::TruncatedInput)?;
        let bit = (b >> (7 - self.bit)) & 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
        }
        Ok(bit)
    }

    #[inline]
    pub fn has_bits(&self) -> bool {
        self.byte < self.data.len()
    }

    #[inline]
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() - self.byte) * 8 - self.bit as usize
    }
}

/// Big-endian accumulation of bytes into one unsigned value.
pub fn combine_bytes(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
