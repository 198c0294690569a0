use crate::domain::ticker::Ticker;
use crate::ingest::types::{PriceBar, PriceHistory, QuoteSnapshot};
use anyhow::Result;
use chrono::NaiveDate;
use std::future::Future;
use std::time::Duration;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Company metadata ("ticker info").
    async fn fetch_quote(&self, ticker: &Ticker) -> Result<QuoteSnapshot>;

    /// Bars for the most recent trading session, most recent last. May be empty.
    async fn fetch_recent_bars(&self, ticker: &Ticker) -> Result<Vec<PriceBar>>;

    /// Daily bars in `[start, end)`, ascending by date.
    async fn download(&self, ticker: &Ticker, start: NaiveDate, end: NaiveDate)
        -> Result<PriceHistory>;
}

/// Runs `op` up to `attempts` times with exponential backoff between failures.
pub(crate) async fn with_retries<T, F, Fut>(attempts: u32, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                let delay = backoff(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "{what} failed; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

const MAX_BACKOFF_SECS: u64 = 60;

/// 1s, 2s, 4s, ... before retry number `attempt`, capped at a minute.
fn backoff(attempt: u32) -> Duration {
    let secs = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory provider that counts every call.
    #[derive(Default)]
    pub(crate) struct StubProvider {
        pub quote: QuoteSnapshot,
        pub recent: Vec<PriceBar>,
        pub history: Vec<PriceBar>,
        pub unknown: HashSet<String>,
        pub quote_calls: AtomicUsize,
        pub recent_calls: AtomicUsize,
        pub download_calls: AtomicUsize,
        pub downloaded: Mutex<Vec<String>>,
    }

    impl StubProvider {
        pub(crate) fn with_history(history: Vec<PriceBar>) -> Self {
            Self {
                recent: history.last().cloned().into_iter().collect(),
                history,
                ..Default::default()
            }
        }

        pub(crate) fn total_calls(&self) -> usize {
            self.quote_calls.load(Ordering::SeqCst)
                + self.recent_calls.load(Ordering::SeqCst)
                + self.download_calls.load(Ordering::SeqCst)
        }

        fn check(&self, ticker: &Ticker) -> Result<()> {
            anyhow::ensure!(
                !self.unknown.contains(ticker.as_str()),
                "Not Found: Quote not found for symbol: {ticker}"
            );
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for StubProvider {
        fn provider_name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_quote(&self, ticker: &Ticker) -> Result<QuoteSnapshot> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            self.check(ticker)?;
            Ok(self.quote.clone())
        }

        async fn fetch_recent_bars(&self, ticker: &Ticker) -> Result<Vec<PriceBar>> {
            self.recent_calls.fetch_add(1, Ordering::SeqCst);
            self.check(ticker)?;
            Ok(self.recent.clone())
        }

        async fn download(
            &self,
            ticker: &Ticker,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<PriceHistory> {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            self.downloaded
                .lock()
                .map_err(|_| anyhow::anyhow!("stub lock poisoned"))?
                .push(ticker.to_string());
            self.check(ticker)?;
            let bars = self
                .history
                .iter()
                .filter(|b| b.date >= start && b.date < end)
                .cloned()
                .collect();
            Ok(PriceHistory::new(bars))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let out = with_retries(3, "flaky op", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            anyhow::ensure!(n >= 2, "attempt {n} failed");
            Ok(n)
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(7), Duration::from_secs(60));
        assert_eq!(backoff(65), Duration::from_secs(60));
        assert_eq!(backoff(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn single_attempt_returns_first_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let res: Result<()> = with_retries(1, "op", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("boom"))
        })
        .await;
        assert_eq!(res.unwrap_err().to_string(), "boom");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
