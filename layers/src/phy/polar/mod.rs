//! Polar Coding for the 5G NR Control Channels
//!
//! Implements 3GPP TS 38.212 polar decoding for PBCH, DCI and UCI:
//! - Code parameter derivation and a shared descriptor cache
//! - CRC-aided successive cancellation list (SCL) decoding on f64 LLRs
//! - A fixed-point successive cancellation decoder on int16 LLRs that
//!   replays a linearized schedule of the decoder tree
//! - A reference encoder for loopback testing

pub mod bits;
pub mod encoder;
pub mod fixed_point;
pub mod kernels;
pub mod params;
pub mod scl;
pub mod tables;
pub mod tree;

pub use encoder::PolarEncoder;
pub use fixed_point::{decode_fixed_point, decode_fixed_point_with_params, FixedPointDecode};
pub use params::{message_type_from_repr, polar_params, CodeParameters, PolarParamsCache};
pub use scl::{
    decode_scl, decode_scl_dci, decode_scl_with_params, rnti_scrambling_pattern,
    NR_POLAR_DECODER_LISTSIZE,
};
