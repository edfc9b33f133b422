//! Common Types for 5G GNodeB
//!
//! Defines fundamental types shared by the channel coding layers

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// System Information RNTI
    pub const SI: Self = Self(0xFFFF);
    /// Paging RNTI
    pub const P: Self = Self(0xFFFE);

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Polar coded control message type (TS 38.212 Section 7.1, 7.3, 6.3.1)
///
/// The discriminants follow the signed convention used on the PHY
/// interface: 0 = PBCH, 1 = DCI, -1 = UCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Broadcast channel (MIB)
    Pbch = 0,
    /// Downlink control information on PDCCH
    Dci = 1,
    /// Uplink control information on PUCCH
    Uci = -1,
}

impl MessageType {
    /// Decode the signed wire representation
    pub fn from_repr(value: i8) -> Option<Self> {
        <Self as FromPrimitive>::from_i8(value)
    }

    /// Signed wire representation
    pub fn repr(&self) -> i8 {
        self.to_i8().unwrap_or_default()
    }
}

/// PDCCH aggregation levels (number of CCEs)
pub const PDCCH_AGGREGATION_LEVELS: [u8; 5] = [1, 2, 4, 8, 16];
