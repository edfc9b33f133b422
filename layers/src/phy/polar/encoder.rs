/// Polar encoding for 5G NR
/// Based on 3GPP TS 38.212 Sections 5.3.1, 5.4.1 and 7.3.2
///
/// Used by the loopback tool and the decoder tests to produce reference
/// codewords for any descriptor the decoders accept.

use common::{bytes_to_hex, pack_bits, unpack_bits_u32, MessageType, Rnti};
use tracing::trace;

use super::bits::{channel_interleave, interleave};
use super::params::CodeParameters;
use super::scl::rnti_scrambling_pattern;

/// Polar encoder
pub struct PolarEncoder;

impl PolarEncoder {
    /// Encode `payload` (bit i at position i % 32 of word i / 32) into E
    /// coded bits. `rnti` scrambles the CRC of a DCI and is ignored otherwise.
    pub fn encode(params: &CodeParameters, payload: &[u32], rnti: Rnti) -> Vec<u8> {
        assert!(
            payload.len() * 32 >= params.payload_bits,
            "{} payload words cannot hold {} bits",
            payload.len(),
            params.payload_bits
        );

        // 1. CRC attachment
        let mut b = unpack_bits_u32(payload, params.payload_bits);
        let parity = Self::crc_parity(params, &b, rnti);
        b.extend_from_slice(&parity);

        // 2. Interleave
        let c = interleave(&b, &params.interleaving_pattern);

        // 3. Allocate bits
        let u = Self::allocate(params, &c);

        // 4. Encode
        let mut d = u;
        Self::transform(&mut d, params.n_log);

        // 5. Rate match
        let e = interleave(&d, &params.rate_matching_pattern);

        trace!(
            "Polar encoded {:?}: K={} N={} E={}: {}",
            params.message_type,
            params.k,
            params.n,
            params.encoder_length,
            bytes_to_hex(&pack_bits(&e))
        );

        // 6. Coded bit interleaving (UCI)
        if params.i_bil {
            channel_interleave(&e)
        } else {
            e
        }
    }

    /// CRC parity as the GF(2) sum of the generator rows of the set bits.
    ///
    /// A DCI is preceded by 24 ones before the CRC and has its last 16
    /// parity bits scrambled with the RNTI.
    fn crc_parity(params: &CodeParameters, a: &[u8], rnti: Rnti) -> Vec<u8> {
        let p = params.crc_parity_bits;
        let offset = params.generator_row_offset();
        let rows = &params.crc_generator_matrix;

        let mut parity = vec![0u8; p];
        let set_rows = (0..offset).chain(
            a.iter()
                .enumerate()
                .filter(|(_, bit)| **bit == 1)
                .map(|(i, _)| i + offset),
        );
        for row in set_rows {
            for (acc, &g) in parity.iter_mut().zip(&rows[row]) {
                *acc ^= g;
            }
        }

        if params.message_type == MessageType::Dci {
            for (acc, mask) in parity.iter_mut().zip(rnti_scrambling_pattern(rnti, p)) {
                *acc ^= mask;
            }
        }

        parity
    }

    /// Place the interleaved bits on the information channels and compute
    /// the parity check bits with the 5-bit cyclic register
    fn allocate(params: &CodeParameters, c: &[u8]) -> Vec<u8> {
        let mut u = vec![0u8; params.n];
        let mut register = [0u8; 5];
        let mut bits = c.iter();

        for (i, out) in u.iter_mut().enumerate() {
            register.rotate_left(1);
            if params.information_bit_pattern[i] {
                *out = bits.next().copied().unwrap_or_default();
                register[0] ^= *out;
            } else if params.parity_check_bit_pattern[i] {
                *out = register[0];
            }
        }

        u
    }

    /// Polar transform d = u G_N in place
    pub fn transform(d: &mut [u8], n_log: usize) {
        let n = 1 << n_log;
        for s in 1..=n_log {
            let half_stage = 1 << (s - 1);
            let full_stage = 1 << s;

            for j in (0..n).step_by(full_stage) {
                for i in 0..half_stage {
                    d[j + i] ^= d[j + i + half_stage];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::polar::params::polar_params;

    #[test]
    fn test_transform_last_row_is_all_ones() {
        let mut d = vec![0u8; 32];
        d[31] = 1;
        PolarEncoder::transform(&mut d, 5);
        assert!(d.iter().all(|&b| b == 1));

        let mut d = vec![0u8; 32];
        d[0] = 1;
        PolarEncoder::transform(&mut d, 5);
        assert_eq!(d.iter().filter(|&&b| b == 1).count(), 1);
    }

    #[test]
    fn test_codeword_lengths() {
        for (message_type, length, level, expected) in [
            (MessageType::Pbch, 32, 0, 864),
            (MessageType::Dci, 40, 2, 216),
            (MessageType::Uci, 12, 4, 64),
        ] {
            let params = polar_params(message_type, length, level).unwrap();
            let coded = PolarEncoder::encode(&params, &[0x0ABC_DEF1, 0x5], Rnti(7));
            assert_eq!(coded.len(), expected);
        }
    }

    #[test]
    fn test_pbch_is_linear() {
        let params = polar_params(MessageType::Pbch, 32, 0).unwrap();
        assert!(PolarEncoder::encode(&params, &[0], Rnti::default())
            .iter()
            .all(|&b| b == 0));

        let x = PolarEncoder::encode(&params, &[0x1234_5678], Rnti::default());
        let y = PolarEncoder::encode(&params, &[0x0F0F_0F0F], Rnti::default());
        let sum = PolarEncoder::encode(&params, &[0x1234_5678 ^ 0x0F0F_0F0F], Rnti::default());
        let xor: Vec<u8> = x.iter().zip(&y).map(|(a, b)| a ^ b).collect();
        assert_eq!(xor, sum);
    }

    #[test]
    fn test_dci_crc_depends_on_rnti() {
        let params = polar_params(MessageType::Dci, 40, 1).unwrap();
        let a = PolarEncoder::encode(&params, &[0xDEAD_BEEF, 0x12], Rnti(0x1A2B));
        let b = PolarEncoder::encode(&params, &[0xDEAD_BEEF, 0x12], Rnti(0x1A2C));
        assert_ne!(a, b);

        // The prepended ones make the all-zero DCI a non-zero codeword
        let zero = PolarEncoder::encode(&params, &[0, 0], Rnti(0));
        assert!(zero.iter().any(|&b| b == 1));
    }

    #[test]
    fn test_crc_parity_matches_crc_functions() {
        let params = polar_params(MessageType::Uci, 30, 8).unwrap();
        let payload = 0x2BAD_F00Du32 & ((1 << 30) - 1);
        let bits = unpack_bits_u32(&[payload], 30);
        let parity = PolarEncoder::crc_parity(&params, &bits, Rnti::default());
        assert_eq!(Some(parity), common::crc_parity_bits(&bits, 11));
    }
}
