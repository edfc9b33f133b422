//! Protocol Stack Layers Library
//!
//! This crate implements the channel coding part of the 5G NR physical layer
//! according to 3GPP TS 38.212.

pub mod phy;

use thiserror::Error;

/// Common errors for protocol layers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("All list entries have failed the CRC checks")]
    AllCandidatesFailedCrc,

    #[error("No CRC-passing candidate among the {examined} most likely paths")]
    NoCandidatePassedCrc { examined: usize },

    #[error("Invalid input length: expected {expected} soft bits, got {actual}")]
    InvalidInputLength { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(i8),
}

impl LayerError {
    /// Decode failures that upper layers recover from through HARQ
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            LayerError::AllCandidatesFailedCrc | LayerError::NoCandidatePassedCrc { .. }
        )
    }
}
