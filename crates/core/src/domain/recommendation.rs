use crate::ingest::types::PriceBar;
use serde::{Deserialize, Serialize};

/// Naive profit/loss verdict over the loaded history window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "difference", rename_all = "snake_case")]
pub enum Recommendation {
    Profit(f64),
    Loss(f64),
    Unchanged,
}

impl Recommendation {
    /// Compares the last close against the first close. `None` for an empty history.
    pub fn from_history(bars: &[PriceBar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;
        Some(Self::from_difference(last.close - first.close))
    }

    pub fn from_difference(diff: f64) -> Self {
        if diff > 0.0 {
            Self::Profit(diff)
        } else if diff < 0.0 {
            Self::Loss(diff.abs())
        } else {
            Self::Unchanged
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Profit(diff) => format!(
                "The stock has shown a profit of {diff:.2} USD. You may consider buying."
            ),
            Self::Loss(diff) => format!(
                "The stock has shown a loss of {diff:.2} USD. You may consider not buying."
            ),
            Self::Unchanged => "The stock price remains unchanged. Consider evaluating other factors before making a decision.".to_string(),
        }
    }
}
