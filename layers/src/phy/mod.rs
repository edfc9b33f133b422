//! Physical Layer (PHY) Submodules
//!
//! Channel coding for the polar coded control channels of 5G NR
//! according to 3GPP TS 38.212.

pub mod polar;

// Re-export commonly used types
pub use polar::{
    decode_fixed_point, decode_scl, decode_scl_dci, polar_params, CodeParameters,
    FixedPointDecode, PolarEncoder, PolarParamsCache, NR_POLAR_DECODER_LISTSIZE,
};
