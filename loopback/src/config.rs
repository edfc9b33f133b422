//! Loopback Configuration
//!
//! Scenarios are read from TOML or YAML, chosen by file extension.

use anyhow::{anyhow, Context, Result};
use common::{MessageType, PDCCH_AGGREGATION_LEVELS};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopbackConfig {
    /// Scenarios run in parallel, one worker each
    #[serde(rename = "scenario")]
    pub scenarios: Vec<ScenarioConfig>,
}

/// One encode, channel, decode experiment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub message_type: MessageType,
    /// Payload length A in bits
    pub payload_bits: u16,
    /// CCEs for DCI, PRBs for UCI, ignored for PBCH
    #[serde(default = "default_aggregation_level")]
    pub aggregation_level: u8,
    #[serde(default = "default_list_size")]
    pub list_size: u8,
    /// Eb/N0 points in dB
    pub ebn0_db: Vec<f64>,
    /// Codewords per Eb/N0 point
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default)]
    pub seed: u64,
    /// RNTI scrambling the DCI CRC
    #[serde(default = "default_rnti")]
    pub rnti: u16,
    /// Scale from LLR to int16 soft bits for the fixed-point decoder
    #[serde(default = "default_fixed_point_scale")]
    pub fixed_point_scale: f64,
}

fn default_aggregation_level() -> u8 {
    1
}

fn default_list_size() -> u8 {
    layers::phy::NR_POLAR_DECODER_LISTSIZE
}

fn default_trials() -> usize {
    1000
}

fn default_rnti() -> u16 {
    0x4601
}

fn default_fixed_point_scale() -> f64 {
    64.0
}

impl LoopbackConfig {
    /// Load configuration from a `.toml`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents)?,
            Some("toml") => Self::from_toml_str(&contents)?,
            other => return Err(anyhow!("Unsupported configuration format: {:?}", other)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Reject scenarios the decoders cannot run
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(anyhow!("No scenarios configured"));
        }

        for scenario in &self.scenarios {
            if scenario.list_size == 0 {
                return Err(anyhow!("{}: list size must be positive", scenario.name));
            }
            if scenario.trials == 0 || scenario.ebn0_db.is_empty() {
                return Err(anyhow!("{}: nothing to simulate", scenario.name));
            }
            if scenario.message_type == MessageType::Dci
                && !PDCCH_AGGREGATION_LEVELS.contains(&scenario.aggregation_level)
            {
                return Err(anyhow!(
                    "{}: invalid aggregation level {}",
                    scenario.name,
                    scenario.aggregation_level
                ));
            }
            if scenario.fixed_point_scale <= 0.0 {
                return Err(anyhow!("{}: fixed point scale must be positive", scenario.name));
            }
        }

        Ok(())
    }
}
