//! Participation bit vectors
//!
//! Layout: 2-byte big-endian bit count, then `ceil(n / 8)` bytes with bit
//! `i` at mask `0x80 >> (i % 8)` of byte `i / 8`.

/// Longest bit vector the 2-byte length prefix can describe
pub const MAX_BIT_VECTOR_LEN: usize = u16::MAX as usize;

const LENGTH_PREFIX: usize = 2;

pub struct BitVector;

impl BitVector {
    /// Encoded size for a vector of `bits` flags
    pub fn encoded_len(bits: usize) -> usize {
        LENGTH_PREFIX + bits.div_ceil(8)
    }

    /// Write `bits` into `dst` at `offset`, growing `dst` as needed.
    /// Returns the number of bytes written. Callers keep `bits` within
    /// [`MAX_BIT_VECTOR_LEN`].
    pub fn write_at(dst: &mut Vec<u8>, offset: usize, bits: &[bool]) -> usize {
        let len = Self::encoded_len(bits.len());
        if dst.len() < offset + len {
            dst.resize(offset + len, 0);
        }

        let region = &mut dst[offset..offset + len];
        region.fill(0);
        region[..LENGTH_PREFIX].copy_from_slice(&(bits.len() as u16).to_be_bytes());

        for (index, _) in bits.iter().enumerate().filter(|(_, set)| **set) {
            region[LENGTH_PREFIX + index / 8] |= 0x80 >> (index % 8);
        }

        len
    }

    pub fn encode(bits: &[bool]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_len(bits.len()));
        Self::write_at(&mut out, 0, bits);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_msb_first() {
        let bits = [true, true, true, false, false, false, false, false, true];
        assert_eq!(BitVector::encode(&bits), vec![0x00, 0x09, 0xE0, 0x80]);
    }

    #[test]
    fn test_empty_vector() {
        assert_eq!(BitVector::encode(&[]), vec![0x00, 0x00]);
        assert_eq!(BitVector::encoded_len(0), 2);
    }

    #[test]
    fn test_write_at_offset_overwrites_tail() {
        let mut buf = vec![0xFF; 6];
        let written = BitVector::write_at(&mut buf, 4, &[false, true]);
        assert_eq!(written, 3);
        assert_eq!(buf, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x02, 0x40]);
    }

    #[test]
    fn test_write_at_grows_and_keeps_prefix() {
        let bits = [true, false, true, true, false, false, true, false, false, true];
        let mut buf = vec![0xAA];
        let written = BitVector::write_at(&mut buf, 1, &bits);

        assert_eq!(written, 4);
        assert_eq!(buf, vec![0xAA, 0x00, 0x0A, 0xB2, 0x40]);
    }

    #[test]
    fn test_length_prefix_at_max() {
        let bits = vec![false; MAX_BIT_VECTOR_LEN];
        let encoded = BitVector::encode(&bits);

        assert_eq!(&encoded[..2], &[0xFF, 0xFF]);
        assert_eq!(encoded.len(), BitVector::encoded_len(MAX_BIT_VECTOR_LEN));
    }
}
