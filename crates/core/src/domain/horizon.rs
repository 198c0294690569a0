use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Forecast horizon in whole years, as picked on the slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    years: u32,
}

impl Horizon {
    pub const MIN_YEARS: u32 = 1;
    pub const MAX_YEARS: u32 = 4;

    // Flat 365 days per year, leap years are not accounted for.
    pub const DAYS_PER_YEAR: u32 = 365;

    pub fn new(years: u32) -> anyhow::Result<Self> {
        ensure!(
            (Self::MIN_YEARS..=Self::MAX_YEARS).contains(&years),
            "horizon must be {}..={} years (got {years})",
            Self::MIN_YEARS,
            Self::MAX_YEARS
        );
        Ok(Self { years })
    }

    /// Slider semantics: anything outside the bounds snaps to the nearest end.
    pub fn clamped(years: i64) -> Self {
        let years = years.clamp(Self::MIN_YEARS as i64, Self::MAX_YEARS as i64) as u32;
        Self { years }
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    pub fn days(&self) -> u32 {
        self.years * Self::DAYS_PER_YEAR
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Self {
            years: Self::MIN_YEARS,
        }
    }
}
