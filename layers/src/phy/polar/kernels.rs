/// Fixed-point butterfly kernels of the tree decoder
///
/// Every kernel has a scalar reference loop built from the per-element rule
/// and a 16-lane chunked variant written branch free so that the compiler
/// can keep whole chunks in vector registers. Both variants are bit-exact.

/// Lane count of the chunked kernels
pub const LANES: usize = 16;

/// Symmetric saturation bound of the int16 soft values
pub const LLR_MAX: i32 = 32767;

#[inline]
fn saturate(value: i32) -> i16 {
    value.clamp(-LLR_MAX, LLR_MAX) as i16
}

/// Min-sum check node update: sign(a) sign(b) min(|a|, |b|)
#[inline]
pub fn f_element(a: i16, b: i16) -> i16 {
    let magnitude = a.wrapping_abs().min(b.wrapping_abs());
    if (a ^ b) < 0 {
        magnitude.wrapping_neg()
    } else {
        magnitude
    }
}

/// Variable node update given the left hard decision: b - sign(beta) a
#[inline]
pub fn g_element(a: i16, b: i16, beta: i8) -> i16 {
    let a = if beta < 0 { a.wrapping_neg() } else { a };
    saturate(b as i32 - a as i32)
}

/// Variable node update when the left subtree is all frozen (beta = -1)
#[inline]
pub fn g_frozen_element(a: i16, b: i16) -> i16 {
    saturate(a as i32 + b as i32)
}

/// Partial sum of one butterfly in the ±1 domain: -1 encodes bit 0
#[inline]
pub fn beta_element(left: i8, right: i8) -> i8 {
    if left != right {
        1
    } else {
        -1
    }
}

/// Hard decision on a leaf LLR: bit 1 when the LLR is not positive
#[inline]
pub fn hard_decision(llr: i16) -> u8 {
    (llr <= 0) as u8
}

pub fn f_scalar(out: &mut [i16], a: &[i16], b: &[i16]) {
    for ((o, &a), &b) in out.iter_mut().zip(a).zip(b) {
        *o = f_element(a, b);
    }
}

pub fn g_scalar(out: &mut [i16], a: &[i16], b: &[i16], beta: &[i8]) {
    for (((o, &a), &b), &beta) in out.iter_mut().zip(a).zip(b).zip(beta) {
        *o = g_element(a, b, beta);
    }
}

pub fn g_frozen_scalar(out: &mut [i16], a: &[i16], b: &[i16]) {
    for ((o, &a), &b) in out.iter_mut().zip(a).zip(b) {
        *o = g_frozen_element(a, b);
    }
}

/// `out` holds 2 * len entries: the XOR half followed by a copy of `right`
pub fn beta_scalar(out: &mut [i8], left: &[i8], right: &[i8]) {
    let (lower, upper) = out.split_at_mut(left.len());
    for ((o, &l), &r) in lower.iter_mut().zip(left).zip(right) {
        *o = beta_element(l, r);
    }
    upper.copy_from_slice(right);
}

pub fn f_chunked(out: &mut [i16], a: &[i16], b: &[i16]) {
    let mut out_chunks = out.chunks_exact_mut(LANES);
    let mut a_chunks = a.chunks_exact(LANES);
    let mut b_chunks = b.chunks_exact(LANES);

    for ((o, a), b) in out_chunks.by_ref().zip(a_chunks.by_ref()).zip(b_chunks.by_ref()) {
        for lane in 0..LANES {
            // Conditional negation through the sign mask of a ^ b
            let mask = (a[lane] ^ b[lane]) >> 15;
            let magnitude = a[lane].wrapping_abs().min(b[lane].wrapping_abs());
            o[lane] = (magnitude ^ mask).wrapping_sub(mask);
        }
    }

    f_scalar(out_chunks.into_remainder(), a_chunks.remainder(), b_chunks.remainder());
}

pub fn g_chunked(out: &mut [i16], a: &[i16], b: &[i16], beta: &[i8]) {
    let mut out_chunks = out.chunks_exact_mut(LANES);
    let mut a_chunks = a.chunks_exact(LANES);
    let mut b_chunks = b.chunks_exact(LANES);
    let mut beta_chunks = beta.chunks_exact(LANES);

    for (((o, a), b), beta) in out_chunks
        .by_ref()
        .zip(a_chunks.by_ref())
        .zip(b_chunks.by_ref())
        .zip(beta_chunks.by_ref())
    {
        for lane in 0..LANES {
            let mask = (beta[lane] >> 7) as i16;
            let a = (a[lane] ^ mask).wrapping_sub(mask) as i32;
            o[lane] = (b[lane] as i32 - a).max(-LLR_MAX).min(LLR_MAX) as i16;
        }
    }

    g_scalar(
        out_chunks.into_remainder(),
        a_chunks.remainder(),
        b_chunks.remainder(),
        beta_chunks.remainder(),
    );
}

pub fn g_frozen_chunked(out: &mut [i16], a: &[i16], b: &[i16]) {
    let mut out_chunks = out.chunks_exact_mut(LANES);
    let mut a_chunks = a.chunks_exact(LANES);
    let mut b_chunks = b.chunks_exact(LANES);

    for ((o, a), b) in out_chunks.by_ref().zip(a_chunks.by_ref()).zip(b_chunks.by_ref()) {
        for lane in 0..LANES {
            o[lane] = (a[lane] as i32 + b[lane] as i32).max(-LLR_MAX).min(LLR_MAX) as i16;
        }
    }

    g_frozen_scalar(out_chunks.into_remainder(), a_chunks.remainder(), b_chunks.remainder());
}

pub fn beta_chunked(out: &mut [i8], left: &[i8], right: &[i8]) {
    let (lower, upper) = out.split_at_mut(left.len());
    let mut out_chunks = lower.chunks_exact_mut(LANES);
    let mut l_chunks = left.chunks_exact(LANES);
    let mut r_chunks = right.chunks_exact(LANES);

    for ((o, l), r) in out_chunks.by_ref().zip(l_chunks.by_ref()).zip(r_chunks.by_ref()) {
        for lane in 0..LANES {
            o[lane] = 2 * ((l[lane] != r[lane]) as i8) - 1;
        }
    }

    for ((o, &l), &r) in out_chunks
        .into_remainder()
        .iter_mut()
        .zip(l_chunks.remainder())
        .zip(r_chunks.remainder())
    {
        *o = beta_element(l, r);
    }
    upper.copy_from_slice(right);
}
