//! Brightness control for Hue lights.

use serde::{Deserialize, Serialize};

/// Brightness level on the bridge's 0-254 scale.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(from = "u16", into = "u8")]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Default for Brightness {
    fn default() -> Self {
        Self::new()
    }
}

impl Brightness {
    pub const MAX: u8 = 254;

    /// Full brightness.
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is above 254.
    pub fn create(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Brightness { value })
    }

    /// Clamps values above 254.
    pub fn saturating(value: u16) -> Self {
        Brightness {
            value: value.min(u16::from(Self::MAX)) as u8,
        }
    }

    /// Absolute difference between two levels.
    pub fn delta(&self, other: &Brightness) -> u8 {
        self.value.abs_diff(other.value)
    }
}

impl From<u16> for Brightness {
    fn from(value: u16) -> Self {
        Self::saturating(value)
    }
}

impl From<Brightness> for u8 {
    fn from(brightness: Brightness) -> Self {
        brightness.value
    }
}
