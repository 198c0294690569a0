use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Company metadata. Every field is optional; providers omit them freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub short_name: Option<String>,
    pub sector: Option<String>,
    pub currency: Option<String>,
    pub market_cap: Option<u64>,
    pub long_business_summary: Option<String>,
}

/// One daily OHLCV record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[cfg(test)]
impl PriceBar {
    pub(crate) fn flat(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1_000,
        }
    }
}

/// Downloaded daily history for one ticker, ascending by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub bars: Vec<PriceBar>,
}

impl PriceHistory {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Last `n` rows, fewer when the table is shorter.
    pub fn tail(&self, n: usize) -> &[PriceBar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_handles_short_tables() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let history = PriceHistory::new(vec![PriceBar::flat(d, 1.0), PriceBar::flat(d, 2.0)]);
        assert_eq!(history.tail(5).len(), 2);
        assert_eq!(history.tail(1)[0].close, 2.0);
        assert_eq!(PriceHistory::default().tail(5).len(), 0);
    }
}
