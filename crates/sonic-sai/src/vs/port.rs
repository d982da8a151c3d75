//! Port attribute validation for the virtual switch.

use crate::attr::{find_attr, AttrValue, Attribute};
use crate::error::{SaiError, SaiResult};
use crate::meta::port_attr;

/// Port speed in Mbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortSpeed(u32);

impl PortSpeed {
    /// 1 Gigabit Ethernet
    pub const GE_1: Self = PortSpeed(1_000);
    /// 10 Gigabit Ethernet
    pub const GE_10: Self = PortSpeed(10_000);
    /// 25 Gigabit Ethernet
    pub const GE_25: Self = PortSpeed(25_000);
    /// 40 Gigabit Ethernet
    pub const GE_40: Self = PortSpeed(40_000);
    /// 50 Gigabit Ethernet
    pub const GE_50: Self = PortSpeed(50_000);
    /// 100 Gigabit Ethernet
    pub const GE_100: Self = PortSpeed(100_000);
    /// 200 Gigabit Ethernet
    pub const GE_200: Self = PortSpeed(200_000);
    /// 400 Gigabit Ethernet
    pub const GE_400: Self = PortSpeed(400_000);
    /// 800 Gigabit Ethernet
    pub const GE_800: Self = PortSpeed(800_000);

    const SUPPORTED: [PortSpeed; 9] = [
        Self::GE_1,
        Self::GE_10,
        Self::GE_25,
        Self::GE_40,
        Self::GE_50,
        Self::GE_100,
        Self::GE_200,
        Self::GE_400,
        Self::GE_800,
    ];

    pub const fn from_mbps(mbps: u32) -> Self {
        PortSpeed(mbps)
    }

    pub const fn as_mbps(&self) -> u32 {
        self.0
    }

    /// Returns true if the simulated MAC supports this speed.
    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }
}

/// Lane counts a single port may be built from.
const VALID_LANE_COUNTS: [usize; 4] = [1, 2, 4, 8];

const MIN_MTU: u32 = 64;
const MAX_MTU: u32 = 16383;

pub fn validate_lanes(lanes: &[u32]) -> SaiResult<()> {
    if lanes.is_empty() {
        return Err(SaiError::invalid_parameter("lanes cannot be empty"));
    }
    if !VALID_LANE_COUNTS.contains(&lanes.len()) {
        return Err(SaiError::invalid_parameter(format!(
            "unsupported lane count {}",
            lanes.len()
        )));
    }
    let mut sorted = lanes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != lanes.len() {
        return Err(SaiError::invalid_parameter("duplicate lane in lane list"));
    }
    Ok(())
}

pub fn validate_speed(speed: PortSpeed) -> SaiResult<()> {
    if !speed.is_supported() {
        return Err(SaiError::invalid_parameter(format!(
            "invalid speed: {} Mbps",
            speed.as_mbps()
        )));
    }
    Ok(())
}

pub fn validate_mtu(mtu: u32) -> SaiResult<()> {
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(SaiError::invalid_parameter(format!(
            "invalid MTU: {} (must be {}-{})",
            mtu, MIN_MTU, MAX_MTU
        )));
    }
    Ok(())
}

/// Checks the value constraints of port attributes in a create or set call.
pub fn validate_port_attrs(attrs: &[Attribute]) -> SaiResult<()> {
    if let Some(AttrValue::U32List(lanes)) = find_attr(attrs, port_attr::HW_LANE_LIST) {
        validate_lanes(lanes)?;
    }
    if let Some(AttrValue::U32(speed)) = find_attr(attrs, port_attr::SPEED) {
        validate_speed(PortSpeed::from_mbps(*speed))?;
    }
    if let Some(AttrValue::U32(mtu)) = find_attr(attrs, port_attr::MTU) {
        validate_mtu(*mtu)?;
    }
    Ok(())
}
