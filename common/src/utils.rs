//! Common Utilities
//!
//! Bit packing and the CRC polynomials of TS 38.212 Section 5.1 used by the
//! polar coded control channels

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// gCRC24C(D) = D^24 + D^23 + D^21 + D^20 + D^17 + D^15 + D^13 + D^12 + D^8 + D^4 + D^2 + D + 1
pub const CRC24C_POLY: u32 = 0xB2B117;
/// gCRC11(D) = D^11 + D^10 + D^9 + D^5 + 1
pub const CRC11_POLY: u32 = 0x621;
/// gCRC6(D) = D^6 + D^5 + 1
pub const CRC6_POLY: u32 = 0x21;

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bit-serial CRC over the first `num_bits` bits of `data` (MSB first).
///
/// The register is kept left-aligned in 32 bits, so the parity of a
/// `width`-bit CRC occupies the top `width` bits of the result.
fn crc_left_aligned(data: &[u8], num_bits: usize, poly: u32, width: u32) -> u32 {
    assert!(
        num_bits <= data.len() * 8,
        "CRC over {} bits requested from a {} byte buffer",
        num_bits,
        data.len()
    );
    let poly = poly << (32 - width);
    let mut crc: u32 = 0;

    for i in 0..num_bits {
        let bit = ((data[i / 8] >> (7 - (i % 8))) & 1) as u32;
        let feedback = (crc >> 31) ^ bit;
        crc <<= 1;
        if feedback != 0 {
            crc ^= poly;
        }
    }

    crc
}

/// CRC24C, left aligned (shift right by 8 for the parity bits)
pub fn crc24c(data: &[u8], num_bits: usize) -> u32 {
    crc_left_aligned(data, num_bits, CRC24C_POLY, 24)
}

/// CRC11, left aligned (shift right by 21 for the parity bits)
pub fn crc11(data: &[u8], num_bits: usize) -> u32 {
    crc_left_aligned(data, num_bits, CRC11_POLY, 11)
}

/// CRC6, left aligned (shift right by 26 for the parity bits)
pub fn crc6(data: &[u8], num_bits: usize) -> u32 {
    crc_left_aligned(data, num_bits, CRC6_POLY, 6)
}

/// Parity bits p_0..p_{L-1} of a bit sequence for the given CRC length.
///
/// Returns `None` for CRC lengths not used by polar coded channels.
pub fn crc_parity_bits(bits: &[u8], crc_len: usize) -> Option<Vec<u8>> {
    let packed = pack_bits(bits);
    let value = match crc_len {
        24 => crc24c(&packed, bits.len()) >> 8,
        11 => crc11(&packed, bits.len()) >> 21,
        6 => crc6(&packed, bits.len()) >> 26,
        _ => return None,
    };

    trace!("CRC{} over {} bits: {:#x}", crc_len, bits.len(), value);

    Some(
        (0..crc_len)
            .map(|i| ((value >> (crc_len - 1 - i)) & 1) as u8)
            .collect(),
    )
}

/// Pack bits (one per byte, 0/1) into bytes (MSB first)
pub fn pack_bits(bits: &[u8]) -> Bytes {
    let mut bytes = BytesMut::with_capacity((bits.len() + 7) / 8);

    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit & 1 != 0 {
                byte |= 1 << (7 - i);
            }
        }
        bytes.put_u8(byte);
    }

    bytes.freeze()
}

/// Unpack bytes into bits (MSB first)
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);

    for &byte in bytes {
        for i in 0..8 {
            bits.push((byte >> (7 - i)) & 1);
        }
    }

    bits
}

/// Pack bits into 32-bit words, bit `i` at position `i % 32` of word `i / 32`
pub fn pack_bits_u32(bits: &[u8]) -> Vec<u32> {
    let mut words = vec![0u32; (bits.len() + 31) / 32];
    for (i, &bit) in bits.iter().enumerate() {
        words[i / 32] |= ((bit & 1) as u32) << (i % 32);
    }
    words
}

/// Inverse of [`pack_bits_u32`] for the first `len` bits
pub fn unpack_bits_u32(words: &[u32], len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((words[i / 32] >> (i % 32)) & 1) as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        let data = vec![0x12, 0x34, 0xAB, 0xCD];
        assert_eq!(bytes_to_hex(&data), "12 34 ab cd");
    }

    #[test]
    fn test_crc_reference_values() {
        let data = b"123456789";
        assert_eq!(crc24c(data, 72), 0xf482_7900);
        assert_eq!(crc11(data, 72) >> 21, 0x5ca);
        assert_eq!(crc6(data, 72) >> 26, 0x15);
    }

    #[test]
    fn test_crc_partial_byte() {
        // Only the first 12 bits take part
        assert_eq!(crc24c(&[0xA5, 0xFF], 12) >> 8, 0x71480b);
        assert_eq!(crc24c(&[0xA5, 0xF0], 12), crc24c(&[0xA5, 0xFF], 12));
    }

    #[test]
    fn test_crc_of_appended_parity_is_zero() {
        let payload: Vec<u8> = unpack_bits(&[0x12, 0x34, 0x56]);
        for crc_len in [6, 11, 24] {
            let parity = crc_parity_bits(&payload, crc_len).unwrap();
            let mut codeword = payload.clone();
            codeword.extend_from_slice(&parity);
            let zero = crc_parity_bits(&codeword, crc_len).unwrap();
            assert!(zero.iter().all(|&b| b == 0), "CRC{} residue not zero", crc_len);
        }
        assert!(crc_parity_bits(&payload, 16).is_none());
    }

    #[test]
    fn test_bit_packing() {
        let bits = vec![1, 0, 1, 0, 1, 0, 1, 0];
        let packed = pack_bits(&bits);
        assert_eq!(packed[0], 0xAA); // 10101010

        let unpacked = unpack_bits(&packed);
        assert_eq!(unpacked[..8], bits[..]);
    }

    #[test]
    fn test_u32_word_packing() {
        let bits: Vec<u8> = (0..40).map(|i| ((0x123456u64 >> i) & 1) as u8).collect();
        let words = pack_bits_u32(&bits);
        assert_eq!(words, vec![0x0012_3456, 0]);
        assert_eq!(unpack_bits_u32(&words, 40), bits);
    }
}
