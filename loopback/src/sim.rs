//! Encode, AWGN channel and decode loop of one scenario

use std::f64::consts::PI;

use anyhow::Result;
use common::{unpack_bits_u32, MessageType, Rnti};
use layers::phy::polar::{
    decode_fixed_point_with_params, decode_scl_with_params, CodeParameters,
};
use layers::phy::{polar_params, PolarEncoder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::config::ScenarioConfig;

/// Block error counts at one Eb/N0 point
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PointResult {
    pub scenario: String,
    pub ebn0_db: f64,
    pub trials: usize,
    /// `None` when the code has no CRC to run the list decoder with
    pub scl_errors: Option<usize>,
    pub fixed_point_errors: usize,
}

impl PointResult {
    pub fn scl_bler(&self) -> Option<f64> {
        self.scl_errors.map(|errors| errors as f64 / self.trials as f64)
    }

    pub fn fixed_point_bler(&self) -> f64 {
        self.fixed_point_errors as f64 / self.trials as f64
    }
}

/// Standard normal sample by Box-Muller
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn random_payload(rng: &mut StdRng, bits: usize) -> Vec<u32> {
    let words = (bits + 31) / 32;
    let mut payload: Vec<u32> = (0..words).map(|_| rng.gen()).collect();
    if bits % 32 != 0 {
        if let Some(last) = payload.last_mut() {
            *last &= (1 << (bits % 32)) - 1;
        }
    }
    payload
}

/// Channel LLRs of BPSK over AWGN with noise variance `sigma2`
fn transmit(rng: &mut StdRng, coded: &[u8], sigma2: f64) -> Vec<f64> {
    let sigma = sigma2.sqrt();
    coded
        .iter()
        .map(|&bit| {
            let symbol = if bit == 0 { 1.0 } else { -1.0 };
            2.0 * (symbol + sigma * gaussian(rng)) / sigma2
        })
        .collect()
}

fn quantize(llrs: &[f64], scale: f64) -> Vec<i16> {
    llrs.iter()
        .map(|&llr| (llr * scale).round().clamp(-32767.0, 32767.0) as i16)
        .collect()
}

/// Run every Eb/N0 point of a scenario
pub fn run_scenario(scenario: &ScenarioConfig) -> Result<Vec<PointResult>> {
    let params = polar_params(
        scenario.message_type,
        scenario.payload_bits,
        scenario.aggregation_level,
    )?;
    let mut rng = StdRng::seed_from_u64(scenario.seed);

    scenario
        .ebn0_db
        .iter()
        .map(|&ebn0_db| run_point(scenario, &params, &mut rng, ebn0_db))
        .collect()
}

fn run_point(
    scenario: &ScenarioConfig,
    params: &CodeParameters,
    rng: &mut StdRng,
    ebn0_db: f64,
) -> Result<PointResult> {
    let a = params.payload_bits;
    let is_dci = params.message_type == MessageType::Dci;
    let rnti = if is_dci { Rnti(scenario.rnti) } else { Rnti::default() };
    let expected_mismatch = if is_dci { rnti.value() as u32 } else { 0 };

    let rate = a as f64 / params.encoder_length as f64;
    let esn0 = 10f64.powf(ebn0_db / 10.0) * rate;
    let sigma2 = 1.0 / (2.0 * esn0);

    let run_scl = params.crc_parity_bits > 0;
    let mut scl_errors = 0;
    let mut fixed_point_errors = 0;

    for _ in 0..scenario.trials {
        let payload = random_payload(rng, a);
        let coded = PolarEncoder::encode(params, &payload, rnti);
        let llrs = transmit(rng, &coded, sigma2);

        if run_scl {
            match decode_scl_with_params(params, &llrs, scenario.list_size, rnti) {
                Ok(decoded) if decoded == payload => {}
                Ok(_) => scl_errors += 1,
                Err(e) if e.is_decode_failure() => scl_errors += 1,
                Err(e) => return Err(e.into()),
            }
        }

        let soft = quantize(&llrs, scenario.fixed_point_scale);
        let decoded = decode_fixed_point_with_params(params, &soft, is_dci)?;
        if decoded.crc_mismatch != expected_mismatch
            || decoded.payload_bits(a) != unpack_bits_u32(&payload, a)
        {
            fixed_point_errors += 1;
        }
    }

    debug!(
        "{}: Eb/N0 {:.1} dB, SCL errors {}, fixed-point errors {}",
        scenario.name, ebn0_db, scl_errors, fixed_point_errors
    );

    Ok(PointResult {
        scenario: scenario.name.clone(),
        ebn0_db,
        trials: scenario.trials,
        scl_errors: run_scl.then_some(scl_errors),
        fixed_point_errors,
    })
}
