/// Fixed-point successive cancellation decoder
///
/// Single path decoding on int16 LLRs with min-sum updates, driven by the
/// linearized decoder tree of the descriptor. The CRC is not used to steer
/// the decode; its mismatch against the received parity is reported instead.

use common::{crc11, crc24c, crc6, pack_bits, MessageType};
use tracing::{debug, trace};

use super::bits::{derate_matching_i16, extract_information_bits};
use super::params::{polar_params, CodeParameters, DCI_CRC_ONES};
use crate::LayerError;

/// Result of a fixed-point decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPointDecode {
    /// Payload a_0..a_{A-1} as an A-bit integer with a_0 as its most
    /// significant bit, stored in little-endian 64-bit limbs
    pub payload: Vec<u64>,
    /// Computed CRC XOR received CRC; 0 on a match, the RNTI for a DCI
    /// decoded with the prepended ones
    pub crc_mismatch: u32,
}

impl FixedPointDecode {
    pub fn crc_passed(&self) -> bool {
        self.crc_mismatch == 0
    }

    /// Payload as bits a_0..a_{len-1}
    pub fn payload_bits(&self, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let position = len - 1 - i;
                self.payload
                    .get(position / 64)
                    .map_or(0, |limb| ((limb >> (position % 64)) & 1) as u8)
            })
            .collect()
    }
}

/// Decode int16 soft bits of a polar codeword.
///
/// `ones_flag` prepends 24 ones to the payload before recomputing the CRC,
/// as done for DCI.
pub fn decode_fixed_point(
    soft: &[i16],
    ones_flag: bool,
    message_type: MessageType,
    message_length: u16,
    aggregation_level: u8,
) -> Result<FixedPointDecode, LayerError> {
    let params = polar_params(message_type, message_length, aggregation_level)?;
    decode_fixed_point_with_params(&params, soft, ones_flag)
}

/// Fixed-point decode against an explicit descriptor
pub fn decode_fixed_point_with_params(
    params: &CodeParameters,
    soft: &[i16],
    ones_flag: bool,
) -> Result<FixedPointDecode, LayerError> {
    if soft.len() != params.encoder_length {
        return Err(LayerError::InvalidInputLength {
            expected: params.encoder_length,
            actual: soft.len(),
        });
    }

    let deinterleaved: Vec<i16>;
    let soft = match &params.channel_deinterleaving_pattern {
        Some(lut) => {
            deinterleaved = lut.iter().map(|&i| soft[i]).collect();
            &deinterleaved[..]
        }
        None => soft,
    };
    let llrs = derate_matching_i16(
        soft,
        &params.rate_matching_pattern,
        params.rate_matching_mode,
        params.n,
    );

    let u = params.decoder_tree.decode(&llrs);

    // Parity check positions carry no payload
    let c = extract_information_bits(&u, &params.information_bit_pattern);
    let mut b = vec![0u8; params.k];
    for (&bit, &i) in c.iter().zip(&params.interleaving_pattern) {
        b[i] = bit;
    }
    let (a, received) = b.split_at(params.payload_bits);

    let crc_mismatch = if params.crc_parity_bits == 0 {
        0
    } else {
        let received = received.iter().fold(0u32, |acc, &bit| (acc << 1) | bit as u32);
        compute_crc(a, params.crc_parity_bits, ones_flag)? ^ received
    };

    let payload = payload_limbs(a);
    trace!("Fixed-point payload {:x?} crc mismatch {:#x}", payload, crc_mismatch);
    debug!(
        "Fixed-point decoded {:?} A={} (CRC {})",
        params.message_type,
        params.payload_bits,
        if crc_mismatch == 0 { "ok" } else { "mismatch" }
    );

    Ok(FixedPointDecode {
        payload,
        crc_mismatch,
    })
}

/// CRC of the payload bits, optionally preceded by 24 ones
fn compute_crc(a: &[u8], crc_len: usize, ones_flag: bool) -> Result<u32, LayerError> {
    let mut bits = Vec::with_capacity(a.len() + DCI_CRC_ONES);
    if ones_flag {
        bits.resize(DCI_CRC_ONES, 1);
    }
    bits.extend_from_slice(a);
    let packed = pack_bits(&bits);

    match crc_len {
        24 => Ok(crc24c(&packed, bits.len()) >> 8),
        11 => Ok(crc11(&packed, bits.len()) >> 21),
        6 => Ok(crc6(&packed, bits.len()) >> 26),
        _ => Err(LayerError::InvalidConfiguration(format!(
            "unsupported CRC length {}",
            crc_len
        ))),
    }
}

/// Little-endian 64-bit limbs of the integer whose MSB is `bits[0]`
fn payload_limbs(bits: &[u8]) -> Vec<u64> {
    let len = bits.len();
    let mut limbs = vec![0u64; (len + 63) / 64];
    for (i, &bit) in bits.iter().enumerate() {
        let position = len - 1 - i;
        limbs[position / 64] |= (bit as u64) << (position % 64);
    }
    limbs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::polar::encoder::PolarEncoder;
    use crate::phy::polar::scl::decode_scl_with_params;
    use common::{unpack_bits_u32, Rnti};

    const RNTI: Rnti = Rnti(0x1A2B);

    const CONFIGS: [(MessageType, u16, u8); 8] = [
        (MessageType::Pbch, 24, 0),
        (MessageType::Pbch, 32, 0),
        (MessageType::Dci, 40, 1),
        (MessageType::Dci, 40, 8),
        (MessageType::Dci, 12, 2),
        (MessageType::Uci, 12, 4),
        (MessageType::Uci, 19, 16),
        (MessageType::Uci, 30, 8),
    ];

    fn bpsk(coded: &[u8], amplitude: i16) -> Vec<i16> {
        coded
            .iter()
            .map(|&b| if b == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn payload_words(bits: usize, seed: u32) -> Vec<u32> {
        let words = (bits + 31) / 32;
        let mut payload: Vec<u32> = (0..words as u32)
            .map(|w| seed.wrapping_add(w).wrapping_mul(0x2545_F491) ^ 0x9E37_79B9)
            .collect();
        if bits % 32 != 0 {
            payload[words - 1] &= (1 << (bits % 32)) - 1;
        }
        payload
    }

    fn expected_limbs(payload: &[u32], bits: usize) -> Vec<u64> {
        payload_limbs(&unpack_bits_u32(payload, bits))
    }

    fn garbage(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i * 7919) % 13) as i16 - 6).collect()
    }

    #[test]
    fn test_payload_limbs() {
        assert_eq!(payload_limbs(&[1, 0, 1, 1]), vec![0b1011]);

        let mut bits = vec![0u8; 70];
        bits[0] = 1;
        bits[69] = 1;
        assert_eq!(payload_limbs(&bits), vec![1, 1 << 5]);

        let decode = FixedPointDecode {
            payload: payload_limbs(&bits),
            crc_mismatch: 0,
        };
        assert_eq!(decode.payload_bits(70), bits);
    }

    #[test]
    fn test_noiseless_decode() {
        for (index, &(message_type, length, level)) in CONFIGS.iter().enumerate() {
            let params = polar_params(message_type, length, level).unwrap();
            let payload = payload_words(length as usize, index as u32);
            let coded = PolarEncoder::encode(&params, &payload, RNTI);
            let ones_flag = message_type == MessageType::Dci;

            for amplitude in [1000, i16::MAX] {
                let result = decode_fixed_point_with_params(&params, &bpsk(&coded, amplitude), ones_flag).unwrap();
                assert_eq!(result.payload, expected_limbs(&payload, length as usize));

                let expected_mismatch = if ones_flag { RNTI.value() as u32 } else { 0 };
                assert_eq!(result.crc_mismatch, expected_mismatch, "{:?} A={}", message_type, length);
            }
        }
    }

    #[test]
    fn test_agrees_with_list_decoder_of_size_one() {
        for (index, &(message_type, length, level)) in CONFIGS.iter().enumerate() {
            let params = polar_params(message_type, length, level).unwrap();
            let payload = payload_words(length as usize, 100 + index as u32);
            let coded = PolarEncoder::encode(&params, &payload, RNTI);

            let fixed = decode_fixed_point_with_params(&params, &bpsk(&coded, 1000), false).unwrap();
            let soft: Vec<f64> = coded.iter().map(|&b| if b == 0 { 50.0 } else { -50.0 }).collect();
            let float = decode_scl_with_params(&params, &soft, 1, RNTI).unwrap();

            assert_eq!(fixed.payload, expected_limbs(&float, length as usize));
        }
    }

    #[test]
    fn test_replay_is_independent_of_previous_call() {
        let params = CodeParameters::new(MessageType::Pbch, 32, 0).unwrap();
        assert!(!params.decoder_tree.is_linearized());

        let first = payload_words(32, 1);
        let second = payload_words(32, 2);
        assert_ne!(first, second);

        let coded = PolarEncoder::encode(&params, &first, RNTI);
        let result = decode_fixed_point_with_params(&params, &bpsk(&coded, 2000), false).unwrap();
        assert!(params.decoder_tree.is_linearized());
        assert_eq!(result.payload, expected_limbs(&first, 32));
        assert!(result.crc_passed());

        let coded = PolarEncoder::encode(&params, &second, RNTI);
        let result = decode_fixed_point_with_params(&params, &bpsk(&coded, 2000), false).unwrap();
        assert_eq!(result.payload, expected_limbs(&second, 32));
        assert!(result.crc_passed());
    }

    #[test]
    fn test_uci_without_crc() {
        let params = polar_params(MessageType::Uci, 8, 4).unwrap();
        let coded = PolarEncoder::encode(&params, &[0xA7], RNTI);
        let result = decode_fixed_point(&bpsk(&coded, 500), false, MessageType::Uci, 8, 4).unwrap();
        assert_eq!(result.payload, vec![0xE5]);
        assert_eq!(result.crc_mismatch, 0);
    }

    #[test]
    fn test_garbage_reports_crc_mismatch() {
        for &(message_type, length, level) in &CONFIGS {
            let params = polar_params(message_type, length, level).unwrap();
            let ones_flag = message_type == MessageType::Dci;
            let result =
                decode_fixed_point_with_params(&params, &garbage(params.encoder_length), ones_flag).unwrap();
            assert_ne!(result.crc_mismatch, 0, "{:?} A={}", message_type, length);
            if ones_flag {
                assert_ne!(result.crc_mismatch, RNTI.value() as u32);
            }
        }
    }

    #[test]
    fn test_wrong_input_length() {
        let result = decode_fixed_point(&[0; 10], true, MessageType::Dci, 40, 1);
        assert_eq!(
            result,
            Err(LayerError::InvalidInputLength {
                expected: 108,
                actual: 10
            })
        );
    }
}
