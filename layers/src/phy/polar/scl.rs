/// Successive cancellation list decoder with CRC-aided path selection
///
/// Floating point LLRs, exact f function, list pruning after every
/// information bit and early termination once every surviving path has
/// failed a CRC parity check.

use common::{pack_bits_u32, MessageType, Rnti};
use tracing::{debug, trace};

use super::bits::{derate_matching_f64, extract_information_bits};
use super::params::{polar_params, CodeParameters, DCI_CRC_ONES};
use crate::LayerError;

/// Default list size of the NR polar decoder
pub const NR_POLAR_DECODER_LISTSIZE: u8 = 8;

/// Length of the parity check cyclic shift register (Section 5.3.1.2)
const PC_REGISTER_LEN: usize = 5;

/// ln(1 + e^x) without overflow
#[inline]
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// log((e^(a+b) + 1) / (e^a + e^b)) in its overflow-free form
#[inline]
fn llr_f(a: f64, b: f64) -> f64 {
    let sign = if (a >= 0.0) == (b >= 0.0) { 1.0 } else { -1.0 };
    sign * a.abs().min(b.abs()) + (-(a + b).abs()).exp().ln_1p() - (-(a - b).abs()).exp().ln_1p()
}

#[inline]
fn llr_g(a: f64, b: f64, bit: u8) -> f64 {
    if bit == 0 {
        a + b
    } else {
        b - a
    }
}

/// CRC scrambling of a DCI: the RNTI lands on the last 16 parity bits
pub fn rnti_scrambling_pattern(rnti: Rnti, crc_len: usize) -> Vec<u8> {
    let rnti = rnti.value() as u32;
    (0..crc_len)
        .map(|i| {
            if (8..24).contains(&i) {
                ((rnti >> (23 - i)) & 1) as u8
            } else {
                0
            }
        })
        .collect()
}

/// One candidate of the list
#[derive(Debug, Clone)]
struct DecodePath {
    /// Partial sums, N rows of n + 1 stages
    bits: Vec<u8>,
    /// LLRs, N rows of n + 1 stages
    llrs: Vec<f64>,
    crc_checksum: Vec<u8>,
    path_metric: f64,
    crc_ok: bool,
    pc_register: [u8; PC_REGISTER_LEN],
}

/// Rows of the CRC generator reordered to the decoding order of the K bits
struct CrcTracker {
    rows: Vec<Vec<u8>>,
    /// Index of the last information bit contributing to each parity bit
    last_one: Vec<Option<usize>>,
    expected: Vec<u8>,
    initial: Vec<u8>,
}

impl CrcTracker {
    fn new(params: &CodeParameters, rnti: Rnti) -> Self {
        let a = params.payload_bits;
        let p = params.crc_parity_bits;
        let offset = params.generator_row_offset();
        let generator = &params.crc_generator_matrix;

        // Payload rows followed by identity rows for the parity bits
        let extended: Vec<Vec<u8>> = (0..params.k)
            .map(|i| {
                if i < a {
                    generator[i + offset].clone()
                } else {
                    (0..p).map(|j| (j == i - a) as u8).collect()
                }
            })
            .collect();
        let rows: Vec<Vec<u8>> = params
            .interleaving_pattern
            .iter()
            .map(|&i| extended[i].clone())
            .collect();

        let last_one = (0..p)
            .map(|j| rows.iter().rposition(|row| row[j] == 1))
            .collect();

        let (expected, initial) = match params.message_type {
            MessageType::Dci => {
                let initial = (0..p)
                    .map(|j| generator[..DCI_CRC_ONES].iter().fold(0, |acc, row| acc ^ row[j]))
                    .collect();
                (rnti_scrambling_pattern(rnti, p), initial)
            }
            _ => (vec![0; p], vec![0; p]),
        };

        Self {
            rows,
            last_one,
            expected,
            initial,
        }
    }
}

struct ListDecoder<'a> {
    params: &'a CodeParameters,
    stride: usize,
    paths: Vec<DecodePath>,
    bit_updated: Vec<bool>,
    llr_updated: Vec<bool>,
}

impl<'a> ListDecoder<'a> {
    fn new(params: &'a CodeParameters, channel_llrs: &[f64], initial_checksum: Vec<u8>) -> Self {
        let n = params.n;
        let stride = params.n_log + 1;
        let last = params.n_log;

        let mut bit_updated = vec![false; n * stride];
        let mut llr_updated = vec![false; n * stride];
        let mut llrs = vec![0.0; n * stride];
        for row in 0..n {
            llr_updated[row * stride + last] = true;
            bit_updated[row * stride] = params.is_frozen(row);
            llrs[row * stride + last] = channel_llrs[row];
        }

        let root = DecodePath {
            bits: vec![0; n * stride],
            llrs,
            crc_checksum: initial_checksum,
            path_metric: 0.0,
            crc_ok: true,
            pc_register: [0; PC_REGISTER_LEN],
        };

        Self {
            params,
            stride,
            paths: vec![root],
            bit_updated,
            llr_updated,
        }
    }

    fn update_bit(&mut self, row: usize, col: usize) {
        let stride = self.stride;
        let offset = 1 << (col - 1);
        let out = row * stride + col;

        if row % (2 * offset) >= offset {
            if !self.bit_updated[row * stride + col - 1] {
                self.update_bit(row, col - 1);
            }
            for path in &mut self.paths {
                path.bits[out] = path.bits[row * stride + col - 1];
            }
        } else {
            if !self.bit_updated[row * stride + col - 1] {
                self.update_bit(row, col - 1);
            }
            if !self.bit_updated[(row + offset) * stride + col - 1] {
                self.update_bit(row + offset, col - 1);
            }
            for path in &mut self.paths {
                path.bits[out] =
                    path.bits[row * stride + col - 1] ^ path.bits[(row + offset) * stride + col - 1];
            }
        }

        self.bit_updated[out] = true;
    }

    fn update_llr(&mut self, row: usize, col: usize) {
        let stride = self.stride;
        let offset = 1 << col;
        let out = row * stride + col;

        if row % (2 * offset) >= offset {
            let partner = row - offset;
            if !self.bit_updated[partner * stride + col] {
                self.update_bit(partner, col);
            }
            if !self.llr_updated[partner * stride + col + 1] {
                self.update_llr(partner, col + 1);
            }
            if !self.llr_updated[row * stride + col + 1] {
                self.update_llr(row, col + 1);
            }
            for path in &mut self.paths {
                path.llrs[out] = llr_g(
                    path.llrs[partner * stride + col + 1],
                    path.llrs[row * stride + col + 1],
                    path.bits[partner * stride + col],
                );
            }
        } else {
            let partner = row + offset;
            if !self.llr_updated[row * stride + col + 1] {
                self.update_llr(row, col + 1);
            }
            if !self.llr_updated[partner * stride + col + 1] {
                self.update_llr(partner, col + 1);
            }
            for path in &mut self.paths {
                path.llrs[out] = llr_f(path.llrs[row * stride + col + 1], path.llrs[partner * stride + col + 1]);
            }
        }

        self.llr_updated[out] = true;
    }

    /// Path indices by ascending metric, lower index first on ties
    fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.paths.len()).collect();
        order.sort_by(|&a, &b| self.paths[a].path_metric.total_cmp(&self.paths[b].path_metric));
        order
    }

    /// Keep the `list_size` most likely paths in ranking order
    fn prune(&mut self, list_size: usize) {
        if self.paths.len() <= list_size {
            return;
        }
        let order = self.ranking();
        let mut slots: Vec<Option<DecodePath>> = self.paths.drain(..).map(Some).collect();
        self.paths = order
            .iter()
            .take(list_size)
            .filter_map(|&i| slots[i].take())
            .collect();
    }

    fn decode(&mut self, list_size: usize, crc: &CrcTracker) -> Result<Vec<u8>, LayerError> {
        let params = self.params;
        let stride = self.stride;
        let mut info_index = 0;

        for row in 0..params.n {
            self.update_llr(row, 0);
            let at = row * stride;

            for path in &mut self.paths {
                path.pc_register.rotate_left(1);
            }

            if params.parity_check_bit_pattern[row] {
                for path in &mut self.paths {
                    let bit = path.pc_register[0];
                    path.bits[at] = bit;
                    let sign = if bit == 0 { -1.0 } else { 1.0 };
                    path.path_metric += softplus(sign * path.llrs[at]);
                }
                self.bit_updated[at] = true;
            } else if !params.information_bit_pattern[row] {
                for path in &mut self.paths {
                    path.path_metric += softplus(-path.llrs[at]);
                }
            } else {
                let generator_row = &crc.rows[info_index];
                let ones: Vec<DecodePath> = self
                    .paths
                    .iter()
                    .map(|path| {
                        let mut child = path.clone();
                        child.path_metric += softplus(path.llrs[at]);
                        child.bits[at] = 1;
                        for (c, &g) in child.crc_checksum.iter_mut().zip(generator_row) {
                            *c ^= g;
                        }
                        child.pc_register[0] ^= 1;
                        child
                    })
                    .collect();
                for path in &mut self.paths {
                    path.path_metric += softplus(-path.llrs[at]);
                    path.bits[at] = 0;
                }
                self.paths.extend(ones);
                self.bit_updated[at] = true;

                self.prune(list_size);

                for (j, last_one) in crc.last_one.iter().enumerate() {
                    if *last_one == Some(info_index) {
                        for path in &mut self.paths {
                            if path.crc_checksum[j] != crc.expected[j] {
                                path.crc_ok = false;
                            }
                        }
                    }
                }

                if self.paths.iter().all(|path| !path.crc_ok) {
                    debug!("SCL decoder: all candidates failed CRC at bit {}", row);
                    return Err(LayerError::AllCandidatesFailedCrc);
                }
                info_index += 1;
            }
        }

        let examined = list_size.min(1 << params.crc_correction_bits);
        let order = self.ranking();
        let best = order
            .iter()
            .take(examined)
            .map(|&i| &self.paths[i])
            .find(|path| path.crc_ok)
            .ok_or(LayerError::NoCandidatePassedCrc { examined })?;

        trace!("SCL decoder: selected path metric {:.3}", best.path_metric);

        Ok((0..params.n).map(|row| best.bits[row * stride]).collect())
    }
}

/// Decode a polar codeword with a list of `list_size` candidates.
///
/// `soft` carries E channel LLRs (positive favours bit 0). On success the
/// payload is returned as 32-bit words, bit i at position i % 32 of word i / 32.
pub fn decode_scl(
    soft: &[f64],
    list_size: u8,
    message_type: MessageType,
    message_length: u16,
    aggregation_level: u8,
) -> Result<Vec<u32>, LayerError> {
    let params = polar_params(message_type, message_length, aggregation_level)?;
    decode_scl_with_params(&params, soft, list_size, Rnti::default())
}

/// Decode a DCI whose CRC is scrambled with `rnti`
pub fn decode_scl_dci(
    soft: &[f64],
    list_size: u8,
    rnti: Rnti,
    message_length: u16,
    aggregation_level: u8,
) -> Result<Vec<u32>, LayerError> {
    let params = polar_params(MessageType::Dci, message_length, aggregation_level)?;
    decode_scl_with_params(&params, soft, list_size, rnti)
}

/// SCL decode against an explicit descriptor
pub fn decode_scl_with_params(
    params: &CodeParameters,
    soft: &[f64],
    list_size: u8,
    rnti: Rnti,
) -> Result<Vec<u32>, LayerError> {
    assert!(
        params.crc_parity_bits > 0,
        "SCL decoding requires CRC parity bits ({:?}, A = {})",
        params.message_type,
        params.payload_bits
    );
    if list_size == 0 {
        return Err(LayerError::InvalidConfiguration(
            "SCL list size must be positive".to_string(),
        ));
    }

    if soft.len() != params.encoder_length {
        return Err(LayerError::InvalidInputLength {
            expected: params.encoder_length,
            actual: soft.len(),
        });
    }

    let deinterleaved: Vec<f64>;
    let soft = match &params.channel_deinterleaving_pattern {
        Some(lut) => {
            deinterleaved = lut.iter().map(|&i| soft[i]).collect();
            &deinterleaved[..]
        }
        None => soft,
    };
    let channel_llrs = derate_matching_f64(
        soft,
        &params.rate_matching_pattern,
        params.rate_matching_mode,
        params.n,
    );

    let crc = CrcTracker::new(params, rnti);
    let mut decoder = ListDecoder::new(params, &channel_llrs, crc.initial.clone());
    let u = decoder.decode(list_size as usize, &crc)?;

    let c = extract_information_bits(&u, &params.information_bit_pattern);
    let mut b = vec![0u8; params.k];
    for (&bit, &i) in c.iter().zip(&params.interleaving_pattern) {
        b[i] = bit;
    }
    b.truncate(params.payload_bits);

    debug!(
        "SCL decoded {:?} A={} with L={}",
        params.message_type, params.payload_bits, list_size
    );

    Ok(pack_bits_u32(&b))
}
