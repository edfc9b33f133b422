/// Polar code parameters per message type (TS 38.212 Sections 5.3.1, 5.4.1,
/// 7.1.4, 7.3.3 and 6.3.1.3)
///
/// A `CodeParameters` descriptor holds every table a decode needs. It is
/// immutable once built and shared through `Arc`, so decodes of the same
/// configuration can run in parallel on different threads.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use common::{crc_parity_bits, MessageType, PDCCH_AGGREGATION_LEVELS};
use tracing::debug;

use super::bits::{
    channel_deinterleaving_pattern, interleaving_pattern, rate_matching_frozen_set,
    rate_matching_pattern, RateMatchingMode,
};
use super::tables::{reliability_sequence, K_IL_MAX, NMIN_LOG};
use super::tree::DecoderTree;
use crate::LayerError;

/// Encoded length of the PBCH transport block (TS 38.212 Section 7.1.5)
pub const PBCH_ENCODED_LENGTH: usize = 864;
/// Coded bits per CCE: 6 REGs x 9 data REs x 2 bits
pub const DCI_BITS_PER_CCE: usize = 108;
/// Coded bits per PRB of PUCCH format 2: 8 data REs x 2 bits
pub const UCI_BITS_PER_PRB: usize = 16;

/// Length of the all-ones sequence prepended to a DCI before its CRC
pub const DCI_CRC_ONES: usize = 24;

/// Immutable description of one polar code configuration
#[derive(Debug)]
pub struct CodeParameters {
    pub message_type: MessageType,
    /// Mother code length N
    pub n: usize,
    /// log2 N
    pub n_log: usize,
    /// log2 N_max for the channel
    pub n_max_log: usize,
    /// Payload plus CRC length K
    pub k: usize,
    /// Payload length A
    pub payload_bits: usize,
    /// CRC length P
    pub crc_parity_bits: usize,
    /// log2 of the number of list candidates checked at the end of decoding
    pub crc_correction_bits: usize,
    /// Rate matched length E
    pub encoder_length: usize,
    /// Input bit interleaving enabled
    pub i_il: bool,
    /// Coded bit (channel) interleaving enabled
    pub i_bil: bool,
    /// Number of parity check bits
    pub n_pc: usize,
    /// Parity check bits placed on the minimum weight row
    pub n_pc_wm: usize,
    /// Bit channels carrying the K interleaved payload and CRC bits
    pub information_bit_pattern: Vec<bool>,
    /// Bit channels carrying parity check bits
    pub parity_check_bit_pattern: Vec<bool>,
    /// c'_k = c_{Π(k)}
    pub interleaving_pattern: Vec<usize>,
    /// e_k = d_{pattern[k]}
    pub rate_matching_pattern: Vec<usize>,
    pub rate_matching_mode: RateMatchingMode,
    /// Receive side LUT of the triangular interleaver (UCI only)
    pub channel_deinterleaving_pattern: Option<Vec<usize>>,
    /// Row i holds the CRC parity of the unit vector e_i. DCI adds 24 rows
    /// in front for the prepended ones.
    pub crc_generator_matrix: Vec<Vec<u8>>,
    pub decoder_tree: DecoderTree,
}

impl CodeParameters {
    pub fn new(
        message_type: MessageType,
        message_length: u16,
        aggregation_level: u8,
    ) -> Result<Self, LayerError> {
        let a = message_length as usize;
        if a == 0 {
            return Err(LayerError::InvalidConfiguration(
                "empty polar payload".to_string(),
            ));
        }

        let (n_max_log, i_il, i_bil, crc_len, n_pc, crc_correction_bits, e) = match message_type {
            MessageType::Pbch => (9, true, false, 24, 0, 3, PBCH_ENCODED_LENGTH),
            MessageType::Dci => {
                if !PDCCH_AGGREGATION_LEVELS.contains(&aggregation_level) {
                    return Err(LayerError::InvalidConfiguration(format!(
                        "invalid PDCCH aggregation level {}",
                        aggregation_level
                    )));
                }
                let e = DCI_BITS_PER_CCE * aggregation_level as usize;
                (9, true, false, 24, 0, 3, e)
            }
            MessageType::Uci => {
                if !(1..=16).contains(&aggregation_level) {
                    return Err(LayerError::InvalidConfiguration(format!(
                        "invalid PUCCH PRB count {}",
                        aggregation_level
                    )));
                }
                let e = UCI_BITS_PER_PRB * aggregation_level as usize;
                let (crc_len, n_pc) = match a {
                    0..=11 => (0, 0),
                    12..=19 => (6, 3),
                    _ => (11, 0),
                };
                (10, false, true, crc_len, n_pc, 3, e)
            }
        };

        let k = a + crc_len;
        let n_pc_wm = if n_pc > 0 && e + 3 > k + 192 { 1 } else { 0 };

        if i_il && k > K_IL_MAX {
            return Err(LayerError::InvalidConfiguration(format!(
                "K = {} exceeds the interleaver limit of {}",
                k, K_IL_MAX
            )));
        }

        let n_log = mother_code_length_log(k, e, n_max_log);
        let n = 1 << n_log;

        let frozen_tmp = rate_matching_frozen_set(k, n, e);
        let available = frozen_tmp.iter().filter(|&&f| !f).count();
        if k + n_pc > available {
            return Err(LayerError::InvalidConfiguration(format!(
                "K = {} with {} parity check bits does not fit N = {}, E = {}",
                k, n_pc, n, e
            )));
        }

        let (information_bit_pattern, parity_check_bit_pattern) =
            bit_channel_allocation(k, n_pc, n_pc_wm, &frozen_tmp);

        let generator_rows = match message_type {
            MessageType::Dci => a + DCI_CRC_ONES,
            _ => a,
        };
        let crc_generator_matrix = crc_generator_matrix(generator_rows, crc_len)?;

        let non_frozen: Vec<bool> = information_bit_pattern
            .iter()
            .zip(&parity_check_bit_pattern)
            .map(|(&info, &pc)| info || pc)
            .collect();

        let params = Self {
            message_type,
            n,
            n_log,
            n_max_log,
            k,
            payload_bits: a,
            crc_parity_bits: crc_len,
            crc_correction_bits,
            encoder_length: e,
            i_il,
            i_bil,
            n_pc,
            n_pc_wm,
            information_bit_pattern,
            parity_check_bit_pattern,
            interleaving_pattern: interleaving_pattern(k, i_il),
            rate_matching_pattern: rate_matching_pattern(k, n, e),
            rate_matching_mode: RateMatchingMode::select(k, n, e),
            channel_deinterleaving_pattern: i_bil.then(|| channel_deinterleaving_pattern(e)),
            crc_generator_matrix,
            decoder_tree: DecoderTree::build(&non_frozen),
        };

        debug!(
            "Polar parameters {:?}: A={} P={} K={} E={} N={} n_pc={} n_pc_wm={} {:?}",
            message_type,
            a,
            crc_len,
            k,
            e,
            n,
            n_pc,
            n_pc_wm,
            params.rate_matching_mode
        );

        Ok(params)
    }

    pub fn is_frozen(&self, index: usize) -> bool {
        !self.information_bit_pattern[index] && !self.parity_check_bit_pattern[index]
    }

    /// Offset of the payload rows in the CRC generator matrix
    pub fn generator_row_offset(&self) -> usize {
        match self.message_type {
            MessageType::Dci => DCI_CRC_ONES,
            _ => 0,
        }
    }
}

/// n of Section 5.3.1: the mother code length as a power of two
pub fn mother_code_length_log(k: usize, e: usize, n_max_log: usize) -> usize {
    let ceil_log2 = |x: usize| x.next_power_of_two().trailing_zeros() as usize;

    let e_log = ceil_log2(e);
    // E <= (9/8) 2^(ceil(log2 E) - 1) and K/E < 9/16
    let n1 = if e_log > 0 && 8 * e <= 9 * (1 << (e_log - 1)) && 16 * k < 9 * e {
        e_log - 1
    } else {
        e_log
    };
    let n2 = ceil_log2(8 * k);

    n1.min(n2).min(n_max_log).max(NMIN_LOG)
}

/// Information and parity check bit channels of Section 5.3.1.2.
///
/// Returns `(information, parity_check)` flags; exactly `k` information
/// channels and `n_pc` parity check channels are set.
fn bit_channel_allocation(
    k: usize,
    n_pc: usize,
    n_pc_wm: usize,
    frozen_tmp: &[bool],
) -> (Vec<bool>, Vec<bool>) {
    let n = frozen_tmp.len();
    let q: Vec<usize> = reliability_sequence(n)
        .into_iter()
        .filter(|&i| !frozen_tmp[i])
        .collect();

    // Q_I in ascending order of reliability
    let q_i = &q[q.len() - (k + n_pc)..];

    let mut information = vec![false; n];
    let mut parity_check = vec![false; n];
    for &i in q_i {
        information[i] = true;
    }

    if n_pc > 0 {
        for &i in &q_i[..n_pc - n_pc_wm] {
            parity_check[i] = true;
        }

        if n_pc_wm > 0 {
            // Minimum row weight among the K most reliable, most reliable on ties
            let candidates = &q_i[n_pc..];
            let min_weight = candidates
                .iter()
                .map(|i| i.count_ones())
                .min()
                .unwrap_or_default();
            if let Some(&i) = candidates.iter().rev().find(|i| i.count_ones() == min_weight) {
                parity_check[i] = true;
            }
        }

        for (info, &pc) in information.iter_mut().zip(&parity_check) {
            *info &= !pc;
        }
    }

    (information, parity_check)
}

/// CRC generator matrix: row i is the parity of the unit vector e_i
fn crc_generator_matrix(rows: usize, crc_len: usize) -> Result<Vec<Vec<u8>>, LayerError> {
    if crc_len == 0 {
        return Ok(Vec::new());
    }

    let mut unit = vec![0u8; rows];
    (0..rows)
        .map(|i| {
            unit[i] = 1;
            let row = crc_parity_bits(&unit, crc_len);
            unit[i] = 0;
            row.ok_or_else(|| {
                LayerError::InvalidConfiguration(format!("unsupported CRC length {}", crc_len))
            })
        })
        .collect()
}

type CacheKey = (MessageType, u16, u8);

/// Concurrent cache of code descriptors, one per configuration
#[derive(Debug, Default)]
pub struct PolarParamsCache {
    entries: RwLock<HashMap<CacheKey, Arc<CodeParameters>>>,
}

impl PolarParamsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a configuration, built on first use.
    ///
    /// The aggregation level does not affect PBCH and is ignored for it.
    pub fn get(
        &self,
        message_type: MessageType,
        message_length: u16,
        aggregation_level: u8,
    ) -> Result<Arc<CodeParameters>, LayerError> {
        let aggregation_level = match message_type {
            MessageType::Pbch => 0,
            _ => aggregation_level,
        };
        let key = (message_type, message_length, aggregation_level);

        if let Some(params) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(params));
        }

        // Built without the lock so other configurations stay available.
        // A racing builder of the same key loses and its copy is dropped.
        let params = Arc::new(CodeParameters::new(message_type, message_length, aggregation_level)?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(entries.entry(key).or_insert(params)))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map the signed message type used on the PHY interface
/// (0 PBCH, 1 DCI, -1 UCI) to a `MessageType`
pub fn message_type_from_repr(value: i8) -> Result<MessageType, LayerError> {
    MessageType::from_repr(value).ok_or(LayerError::UnsupportedMessageType(value))
}

/// Process-wide descriptor lookup
pub fn polar_params(
    message_type: MessageType,
    message_length: u16,
    aggregation_level: u8,
) -> Result<Arc<CodeParameters>, LayerError> {
    static CACHE: OnceLock<PolarParamsCache> = OnceLock::new();
    CACHE
        .get_or_init(PolarParamsCache::new)
        .get(message_type, message_length, aggregation_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_pbch_parameters() {
        let params = CodeParameters::new(MessageType::Pbch, 24, 0).unwrap();
        assert_eq!(params.k, 48);
        assert_eq!(params.n, 512);
        assert_eq!(params.encoder_length, 864);
        assert_eq!(params.rate_matching_mode, RateMatchingMode::Repetition);
        assert_eq!(params.crc_generator_matrix.len(), 24);
        assert_eq!(params.information_bit_pattern.iter().filter(|&&b| b).count(), 48);
        assert!(params.channel_deinterleaving_pattern.is_none());
    }

    #[test]
    fn test_message_type_from_repr() {
        assert_eq!(message_type_from_repr(0), Ok(MessageType::Pbch));
        assert_eq!(message_type_from_repr(1), Ok(MessageType::Dci));
        assert_eq!(message_type_from_repr(-1), Ok(MessageType::Uci));
        assert_eq!(message_type_from_repr(2), Err(LayerError::UnsupportedMessageType(2)));
    }

    #[test]
    fn test_dci_parameters() {
        let params = CodeParameters::new(MessageType::Dci, 40, 1).unwrap();
        assert_eq!(params.k, 64);
        assert_eq!(params.encoder_length, 108);
        assert_eq!(params.n, 128);
        assert_eq!(params.rate_matching_mode, RateMatchingMode::Shortening);
        assert_eq!(params.crc_generator_matrix.len(), 64);
        assert_eq!(params.generator_row_offset(), 24);

        assert!(CodeParameters::new(MessageType::Dci, 40, 3).is_err());
    }

    #[test]
    fn test_uci_parameters() {
        let small = CodeParameters::new(MessageType::Uci, 8, 4).unwrap();
        assert_eq!(small.crc_parity_bits, 0);
        assert!(small.crc_generator_matrix.is_empty());

        let pc = CodeParameters::new(MessageType::Uci, 19, 16).unwrap();
        assert_eq!(pc.crc_parity_bits, 6);
        assert_eq!(pc.n_pc, 3);
        assert_eq!(pc.n_pc_wm, 1);
        assert_eq!(pc.information_bit_pattern.iter().filter(|&&b| b).count(), 25);
        assert_eq!(pc.parity_check_bit_pattern.iter().filter(|&&b| b).count(), 3);
        assert!(pc
            .information_bit_pattern
            .iter()
            .zip(&pc.parity_check_bit_pattern)
            .all(|(&info, &pc)| !(info && pc)));
        assert_eq!(pc.channel_deinterleaving_pattern.as_ref().map(Vec::len), Some(256));

        let long = CodeParameters::new(MessageType::Uci, 30, 8).unwrap();
        assert_eq!(long.crc_parity_bits, 11);
        assert_eq!(long.n_pc, 0);
    }

    #[test]
    fn test_mother_code_length() {
        assert_eq!(mother_code_length_log(48, 864, 9), 9);
        assert_eq!(mother_code_length_log(64, 108, 9), 7);
        // Short blocks never go below N_min
        assert_eq!(mother_code_length_log(2, 16, 10), NMIN_LOG);
        // E slightly above a power of two with a low rate rounds down
        assert_eq!(mother_code_length_log(36, 288, 10), 8);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        assert!(matches!(
            CodeParameters::new(MessageType::Dci, 150, 16),
            Err(LayerError::InvalidConfiguration(_))
        ));
        assert!(CodeParameters::new(MessageType::Uci, 200, 1).is_err());
        assert!(CodeParameters::new(MessageType::Pbch, 0, 0).is_err());
    }

    #[test]
    fn test_cache_returns_shared_descriptor() {
        let cache = PolarParamsCache::new();
        let first = cache.get(MessageType::Dci, 40, 2).unwrap();
        let second = cache.get(MessageType::Dci, 40, 2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // PBCH ignores the aggregation level
        let pbch_a = cache.get(MessageType::Pbch, 32, 1).unwrap();
        let pbch_b = cache.get(MessageType::Pbch, 32, 8).unwrap();
        assert!(Arc::ptr_eq(&pbch_a, &pbch_b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_concurrent_access() {
        let cache = Arc::new(PolarParamsCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get(MessageType::Uci, 30, 8).unwrap())
            })
            .collect();

        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(descriptors.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_builds_distinct_configurations_in_parallel() {
        let cache = Arc::new(PolarParamsCache::new());
        let configs = [
            (MessageType::Pbch, 32, 0),
            (MessageType::Dci, 40, 4),
            (MessageType::Uci, 19, 16),
            (MessageType::Uci, 200, 16),
        ];
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let (message_type, length, level) = configs[i % configs.len()];
                thread::spawn(move || cache.get(message_type, length, level).unwrap())
            })
            .collect();

        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), configs.len());
        for (i, params) in descriptors.iter().enumerate() {
            let (message_type, length, level) = configs[i % configs.len()];
            assert!(Arc::ptr_eq(params, &cache.get(message_type, length, level).unwrap()));
            assert_eq!(params.payload_bits, length as usize);
        }
    }
}
