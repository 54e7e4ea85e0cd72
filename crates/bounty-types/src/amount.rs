use serde::{Deserialize, Serialize};
use std::fmt;

pub const RTC_DECIMALS: u32 = 6;
pub const RTC_BASE_UNIT: u64 = 1_000_000; // 10^6 micro-RTC

/// Reward amount in micro-RTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RewardAmount(u64);

impl RewardAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_rtc(rtc: u64) -> Self {
        Self(rtc.saturating_mul(RTC_BASE_UNIT))
    }

    pub fn from_micro(units: u64) -> Self {
        Self(units)
    }

    pub fn to_rtc(&self) -> f64 {
        self.0 as f64 / RTC_BASE_UNIT as f64
    }

    pub fn to_micro(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Floor of `percent`% of this amount. Computed in u128 so large
    /// rewards cannot overflow.
    pub fn percent(&self, percent: u8) -> Self {
        Self(((self.0 as u128 * percent as u128) / 100) as u64)
    }
}

impl fmt::Display for RewardAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} RTC", self.to_rtc())
    }
}

impl std::iter::Sum for RewardAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc.saturating_add(x))
    }
}
