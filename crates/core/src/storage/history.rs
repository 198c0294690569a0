use crate::domain::ticker::Ticker;
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::PriceHistory;
use anyhow::Context;
use chrono::NaiveDate;
use moka::future::Cache;
use std::sync::Arc;

/// Process-wide memo of downloaded price histories, keyed by ticker.
///
/// A ticker is downloaded at most once for the lifetime of the cache: concurrent first
/// lookups for the same symbol wait on a single download, later lookups are served from
/// memory. Failed downloads are not stored. There is no expiry; entries only leave through
/// [`HistoryCache::clear`] or, when a capacity is configured, through eviction.
#[derive(Clone)]
pub struct HistoryCache {
    entries: Cache<Ticker, Arc<PriceHistory>>,
}

impl HistoryCache {
    pub fn unbounded() -> Self {
        Self {
            entries: Cache::builder().build(),
        }
    }

    pub fn with_capacity(max_tickers: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_tickers).build(),
        }
    }

    pub fn from_capacity(capacity: Option<u64>) -> Self {
        match capacity {
            Some(max) => Self::with_capacity(max),
            None => Self::unbounded(),
        }
    }

    /// Returns the stored history for `ticker` or downloads `[start, end)` and stores it.
    pub async fn load(
        &self,
        provider: &dyn MarketDataProvider,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Arc<PriceHistory>> {
        self.entries
            .try_get_with(ticker.clone(), async {
                tracing::info!(%ticker, provider = provider.provider_name(), "history cache miss");
                provider
                    .download(ticker, start, end)
                    .await
                    .map(Arc::new)
                    .with_context(|| format!("failed to download {ticker}"))
            })
            .await
            .map_err(|err| anyhow::anyhow!("{err:#}"))
    }

    pub async fn contains(&self, ticker: &Ticker) -> bool {
        self.entries.get(ticker).await.is_some()
    }

    /// Drops every stored history; the next lookup per ticker downloads again.
    pub fn clear(&self) {
        tracing::info!("clearing history cache");
        self.entries.invalidate_all();
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::provider::stub::StubProvider;
    use crate::ingest::types::PriceBar;
    use std::sync::atomic::Ordering;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn stub() -> StubProvider {
        StubProvider::with_history(vec![PriceBar::flat(day(2), 10.0), PriceBar::flat(day(3), 11.0)])
    }

    #[tokio::test]
    async fn same_ticker_downloads_once() {
        let provider = stub();
        let cache = HistoryCache::unbounded();
        let ticker = Ticker::parse("tsla").unwrap();

        let first = cache.load(&provider, &ticker, day(1), day(31)).await.unwrap();
        let second = cache.load(&provider, &ticker, day(1), day(31)).await.unwrap();

        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn distinct_tickers_download_separately() {
        let provider = stub();
        let cache = HistoryCache::unbounded();

        for symbol in ["TSLA", "AAPL", "TSLA", "AAPL"] {
            let ticker = Ticker::parse(symbol).unwrap();
            cache.load(&provider, &ticker, day(1), day(31)).await.unwrap();
        }

        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 2);
        assert_eq!(*provider.downloaded.lock().unwrap(), vec!["TSLA", "AAPL"]);
    }

    #[tokio::test]
    async fn concurrent_first_loads_share_one_download() {
        let provider = stub();
        let cache = HistoryCache::unbounded();
        let ticker = Ticker::parse("MSFT").unwrap();

        let (a, b) = tokio::join!(
            cache.load(&provider, &ticker, day(1), day(31)),
            cache.load(&provider, &ticker, day(1), day(31)),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_memoized() {
        let mut provider = stub();
        provider.unknown.insert("NOPE".to_string());
        let cache = HistoryCache::unbounded();
        let ticker = Ticker::parse("nope").unwrap();

        let err = cache
            .load(&provider, &ticker, day(1), day(31))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to download NOPE"));
        assert!(!cache.contains(&ticker).await);

        let _ = cache.load(&provider, &ticker, day(1), day(31)).await;
        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_forces_a_new_download() {
        let provider = stub();
        let cache = HistoryCache::unbounded();
        let ticker = Ticker::parse("TSLA").unwrap();

        cache.load(&provider, &ticker, day(1), day(31)).await.unwrap();
        cache.clear();
        assert!(!cache.contains(&ticker).await);
        cache.load(&provider, &ticker, day(1), day(31)).await.unwrap();

        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 2);
    }
    #[tokio::test]
    async fn bounded_cache_respects_capacity() {
        let provider = stub();
        let cache = HistoryCache::with_capacity(2);

        for symbol in ["AAA", "BBB", "CCC", "DDD", "EEE"] {
            let ticker = Ticker::parse(symbol).unwrap();
            cache.load(&provider, &ticker, day(1), day(31)).await.unwrap();
        }
        cache.entries.run_pending_tasks().await;

        assert_eq!(provider.download_calls.load(Ordering::SeqCst), 5);
        assert!(cache.entries.entry_count() <= 2);
    }
}
