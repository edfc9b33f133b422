/// Bit-level permutations for polar coding
///
/// Input bit interleaving (TS 38.212 Section 5.3.1.1), sub-block interleaving
/// and bit selection (Section 5.4.1.1/5.4.1.2) and the triangular coded-bit
/// interleaver (Section 5.4.1.3), together with the receive side inverses.

use super::tables::SUBBLOCK_INTERLEAVER_PATTERN;

/// Log-likelihood ratio assigned to shortened positions (known zero bits).
///
/// Finite so that the LLR recursion never sees `inf - inf`.
pub const SHORTENED_LLR_F64: f64 = 1.0e6;

/// Saturation bound of fixed-point soft values
pub const LLR_I16_MAX: i16 = i16::MAX;

/// Bit selection mode of Section 5.4.1.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateMatchingMode {
    /// E >= N
    Repetition,
    /// E < N and K/E <= 7/16
    Puncturing,
    /// E < N and K/E > 7/16
    Shortening,
}

impl RateMatchingMode {
    pub fn select(k: usize, n: usize, e: usize) -> Self {
        if e >= n {
            RateMatchingMode::Repetition
        } else if 16 * k <= 7 * e {
            RateMatchingMode::Puncturing
        } else {
            RateMatchingMode::Shortening
        }
    }
}

/// `output[i] = input[pattern[i]]`
pub fn interleave<T: Copy>(input: &[T], pattern: &[usize]) -> Vec<T> {
    pattern.iter().map(|&p| input[p]).collect()
}

/// `output[pattern[i]] = input[i]`
pub fn deinterleave<T: Copy + Default>(input: &[T], pattern: &[usize]) -> Vec<T> {
    let mut output = vec![T::default(); pattern.len()];
    for (&p, &value) in pattern.iter().zip(input) {
        output[p] = value;
    }
    output
}

/// Input bit interleaver Π(k) for K bits.
///
/// With `i_il` cleared the pattern is the identity.
pub fn interleaving_pattern(k: usize, i_il: bool) -> Vec<usize> {
    if !i_il {
        return (0..k).collect();
    }

    let offset = super::tables::K_IL_MAX - k;
    super::tables::INTERLEAVER_MAX_PATTERN
        .iter()
        .filter(|&&m| m >= offset)
        .map(|&m| m - offset)
        .collect()
}

/// Sub-block interleaver J(n) for a mother code of length N
pub fn subblock_interleaver_pattern(n: usize) -> Vec<usize> {
    let block = n / 32;
    (0..n)
        .map(|i| SUBBLOCK_INTERLEAVER_PATTERN[32 * i / n] * block + i % block)
        .collect()
}

/// Rate matching pattern: coded bit `e_k` is `d[pattern[k]]`
pub fn rate_matching_pattern(k: usize, n: usize, e: usize) -> Vec<usize> {
    let j = subblock_interleaver_pattern(n);
    match RateMatchingMode::select(k, n, e) {
        RateMatchingMode::Repetition => (0..e).map(|i| j[i % n]).collect(),
        RateMatchingMode::Puncturing => (0..e).map(|i| j[i + n - e]).collect(),
        RateMatchingMode::Shortening => (0..e).map(|i| j[i]).collect(),
    }
}

/// Bit channels pre-frozen by puncturing or shortening (Q_F,tmp)
pub fn rate_matching_frozen_set(k: usize, n: usize, e: usize) -> Vec<bool> {
    let mut frozen = vec![false; n];
    let j = subblock_interleaver_pattern(n);

    match RateMatchingMode::select(k, n, e) {
        RateMatchingMode::Repetition => {}
        RateMatchingMode::Puncturing => {
            for &idx in &j[..n - e] {
                frozen[idx] = true;
            }
            let prefix = if 4 * e >= 3 * n {
                (3 * n - 2 * e + 3) / 4
            } else {
                (9 * n - 4 * e + 15) / 16
            };
            for flag in frozen.iter_mut().take(prefix) {
                *flag = true;
            }
        }
        RateMatchingMode::Shortening => {
            for &idx in &j[e..] {
                frozen[idx] = true;
            }
        }
    }

    frozen
}

/// Undo bit selection on floating point LLRs, combining repetitions
pub fn derate_matching_f64(input: &[f64], pattern: &[usize], mode: RateMatchingMode, n: usize) -> Vec<f64> {
    let fill = match mode {
        RateMatchingMode::Shortening => SHORTENED_LLR_F64,
        _ => 0.0,
    };
    let mut output = vec![fill; n];

    for (&p, &llr) in pattern.iter().zip(input) {
        if mode == RateMatchingMode::Repetition {
            output[p] += llr;
        } else {
            output[p] = llr;
        }
    }

    output
}

/// Undo bit selection on fixed point LLRs, saturating at ±32767
pub fn derate_matching_i16(input: &[i16], pattern: &[usize], mode: RateMatchingMode, n: usize) -> Vec<i16> {
    let fill = match mode {
        RateMatchingMode::Shortening => LLR_I16_MAX,
        _ => 0,
    };
    let mut output = vec![fill; n];

    for (&p, &llr) in pattern.iter().zip(input) {
        let llr = llr.max(-LLR_I16_MAX);
        if mode == RateMatchingMode::Repetition {
            let sum = output[p] as i32 + llr as i32;
            output[p] = sum.clamp(-(LLR_I16_MAX as i32), LLR_I16_MAX as i32) as i16;
        } else {
            output[p] = llr;
        }
    }

    output
}

/// Side of the triangular interleaver: smallest T with T(T+1)/2 >= E
fn triangle_side(e: usize) -> usize {
    let mut t = 0;
    while t * (t + 1) / 2 < e {
        t += 1;
    }
    t
}

/// Triangular coded-bit interleaver of Section 5.4.1.3
pub fn channel_interleave<T: Copy>(input: &[T]) -> Vec<T> {
    let e = input.len();
    let t = triangle_side(e);

    // Row i of the triangle holds T - i entries, filled row by row
    let mut rows: Vec<Vec<Option<T>>> = Vec::with_capacity(t);
    let mut k = 0;
    for i in 0..t {
        let row = (0..t - i)
            .map(|_| {
                let value = input.get(k).copied();
                k += 1;
                value
            })
            .collect();
        rows.push(row);
    }

    let mut output = Vec::with_capacity(e);
    for j in 0..t {
        for row in rows.iter().take(t - j) {
            if let Some(value) = row[j] {
                output.push(value);
            }
        }
    }
    output
}

/// Receive side look-up table of the triangular interleaver.
///
/// `received[pattern[m]]` is the m-th coded bit before interleaving.
pub fn channel_deinterleaving_pattern(e: usize) -> Vec<usize> {
    let t = triangle_side(e);

    // Transmit position of every occupied cell, read column by column
    let mut cell_position = vec![vec![None; t]; t];
    let mut k = 0;
    for j in 0..t {
        for (i, row) in cell_position.iter_mut().enumerate().take(t - j) {
            if row_major_rank(i, j, t) < e {
                row[j] = Some(k);
                k += 1;
            }
        }
    }

    cell_position
        .iter()
        .enumerate()
        .flat_map(|(i, row)| row.iter().take(t - i).flatten().copied())
        .collect()
}

/// Row-major index of cell (i, j) of a triangle whose row i has T - i cells
fn row_major_rank(i: usize, j: usize, t: usize) -> usize {
    i * t - i * i.saturating_sub(1) / 2 + j
}

/// Bits of `u` at the positions flagged in `pattern`, in order
pub fn extract_information_bits(u: &[u8], pattern: &[bool]) -> Vec<u8> {
    u.iter()
        .zip(pattern)
        .filter(|(_, info)| **info)
        .map(|(bit, _)| *bit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaving_pattern_is_permutation() {
        for k in [18, 48, 56, 64, 164] {
            let mut pattern = interleaving_pattern(k, true);
            assert_eq!(pattern.len(), k);
            pattern.sort_unstable();
            assert_eq!(pattern, (0..k).collect::<Vec<_>>());
        }
        assert_eq!(interleaving_pattern(4, false), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_deinterleave_inverts_interleave() {
        let pattern = interleaving_pattern(56, true);
        let bits: Vec<u8> = (0..56).map(|i| (i * 7 % 3 == 0) as u8).collect();
        let interleaved = interleave(&bits, &pattern);
        assert_eq!(deinterleave(&interleaved, &pattern), bits);
    }

    #[test]
    fn test_rate_matching_modes() {
        assert_eq!(RateMatchingMode::select(56, 512, 864), RateMatchingMode::Repetition);
        assert_eq!(RateMatchingMode::select(36, 256, 216), RateMatchingMode::Puncturing);
        assert_eq!(RateMatchingMode::select(64, 128, 108), RateMatchingMode::Shortening);
    }

    #[test]
    fn test_rate_matching_frozen_set_sizes() {
        // Shortening freezes exactly the N - E dropped channels
        let frozen = rate_matching_frozen_set(64, 128, 108);
        assert_eq!(frozen.iter().filter(|&&f| f).count(), 20);

        // Puncturing freezes at least the N - E punctured channels
        let frozen = rate_matching_frozen_set(36, 256, 216);
        assert!(frozen.iter().filter(|&&f| f).count() >= 40);
        assert!(frozen[0]);

        let frozen = rate_matching_frozen_set(56, 512, 864);
        assert!(frozen.iter().all(|&f| !f));
    }

    #[test]
    fn test_repetition_pattern_covers_mother_code() {
        let pattern = rate_matching_pattern(56, 512, 864);
        assert_eq!(pattern.len(), 864);
        let mut seen = vec![false; 512];
        for &p in &pattern {
            seen[p] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_channel_deinterleaving_inverts_interleaver() {
        for e in [1, 6, 64, 100, 256] {
            let coded: Vec<usize> = (0..e).collect();
            let transmitted = channel_interleave(&coded);
            assert_eq!(transmitted.len(), e);
            let lut = channel_deinterleaving_pattern(e);
            let restored: Vec<usize> = lut.iter().map(|&p| transmitted[p]).collect();
            assert_eq!(restored, coded);
        }
    }

    #[test]
    fn test_derate_matching_i16_saturates() {
        let pattern = [0, 1, 0, 1];
        let out = derate_matching_i16(&[30000, -30000, 30000, i16::MIN], &pattern, RateMatchingMode::Repetition, 2);
        assert_eq!(out, vec![32767, -32767]);

        let out = derate_matching_i16(&[5], &[1], RateMatchingMode::Shortening, 2);
        assert_eq!(out, vec![32767, 5]);
    }

    #[test]
    fn test_derate_matching_f64_fill() {
        let out = derate_matching_f64(&[1.5], &[0], RateMatchingMode::Puncturing, 2);
        assert_eq!(out, vec![1.5, 0.0]);
        let out = derate_matching_f64(&[1.5], &[0], RateMatchingMode::Shortening, 2);
        assert_eq!(out, vec![1.5, SHORTENED_LLR_F64]);
    }

    #[test]
    fn test_extract_information_bits() {
        let u = [1, 0, 1, 1];
        let pattern = [false, true, true, false];
        assert_eq!(extract_information_bits(&u, &pattern), vec![0, 1]);
    }
}
