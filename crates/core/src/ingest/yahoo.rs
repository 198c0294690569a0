use crate::config::Settings;
use crate::domain::ticker::Ticker;
use crate::ingest::provider::{with_retries, MarketDataProvider};
use crate::ingest::types::{PriceBar, PriceHistory, QuoteSnapshot};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";
const DEFAULT_RETRIES: u32 = 1;

// Yahoo answers 429 to the default reqwest agent.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const SUMMARY_MODULES: &str = "price,assetProfile";

/// Yahoo Finance chart + quoteSummary client.
#[derive(Debug)]
pub struct YahooClient {
    http: reqwest::Client,
    chart_base_url: String,
    summary_base_url: String,
    cookie_url: String,
    retries: u32,

    // quoteSummary needs a crumb bound to the session cookie; fetched once per process.
    crumb_cache: tokio::sync::Mutex<Option<String>>,
}

impl YahooClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let chart_base_url = settings
            .data_provider_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let summary_base_url = settings
            .data_provider_summary_base_url
            .clone()
            .unwrap_or_else(|| chart_base_url.clone());
        let cookie_url = settings
            .data_provider_cookie_url
            .clone()
            .unwrap_or_else(|| DEFAULT_COOKIE_URL.to_string());
        let retries = settings.data_provider_retries.unwrap_or(DEFAULT_RETRIES);

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true);
        if let Some(secs) = settings.data_provider_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            chart_base_url,
            summary_base_url,
            cookie_url,
            retries,
            crumb_cache: tokio::sync::Mutex::new(None),
        })
    }

    async fn get_crumb_cached(&self) -> Result<String> {
        let mut guard = self.crumb_cache.lock().await;
        if let Some(crumb) = guard.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.fetch_crumb().await?;
        *guard = Some(crumb.clone());
        Ok(crumb)
    }

    async fn fetch_crumb(&self) -> Result<String> {
        // The cookie endpoint answers 404 but still sets the session cookie.
        let _ = self
            .http
            .get(&self.cookie_url)
            .send()
            .await
            .context("Yahoo cookie request failed")?;

        let url = endpoint(&self.summary_base_url, &["v1", "test", "getcrumb"])?;
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("Yahoo crumb request failed")?;
        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo crumb response")?;
        if !status.is_success() {
            anyhow::bail!("Yahoo crumb HTTP {status}: {text}");
        }

        let crumb = text.trim().to_string();
        anyhow::ensure!(!crumb.is_empty(), "Yahoo returned an empty crumb");
        tracing::debug!("obtained Yahoo crumb");
        Ok(crumb)
    }

    async fn fetch_quote_once(&self, ticker: &Ticker) -> Result<QuoteSnapshot> {
        let crumb = self.get_crumb_cached().await?;
        let url = endpoint(
            &self.summary_base_url,
            &["v10", "finance", "quoteSummary", ticker.as_str()],
        )?;

        let res = self
            .http
            .get(url)
            .query(&[("modules", SUMMARY_MODULES), ("crumb", crumb.as_str())])
            .send()
            .await
            .context("Yahoo quoteSummary request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo quoteSummary response")?;

        if status == StatusCode::UNAUTHORIZED {
            // Stale crumb; the next attempt performs the handshake again.
            *self.crumb_cache.lock().await = None;
            anyhow::bail!("Yahoo quoteSummary HTTP {status}: {text}");
        }

        parse_quote_summary(status, &text)
    }

    async fn fetch_chart(&self, ticker: &Ticker, query: &[(&str, String)]) -> Result<Vec<PriceBar>> {
        let url = endpoint(
            &self.chart_base_url,
            &["v8", "finance", "chart", ticker.as_str()],
        )?;

        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .context("Yahoo chart request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Yahoo chart response")?;

        parse_chart(status, &text)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_quote(&self, ticker: &Ticker) -> Result<QuoteSnapshot> {
        with_retries(self.retries, "Yahoo quote fetch", || self.fetch_quote_once(ticker)).await
    }

    async fn fetch_recent_bars(&self, ticker: &Ticker) -> Result<Vec<PriceBar>> {
        let query = [
            ("range", "1d".to_string()),
            ("interval", "1d".to_string()),
        ];
        with_retries(self.retries, "Yahoo recent bars fetch", || {
            self.fetch_chart(ticker, &query)
        })
        .await
    }

    async fn download(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceHistory> {
        let query = [
            ("period1", midnight_utc_timestamp(start).to_string()),
            ("period2", midnight_utc_timestamp(end).to_string()),
            ("interval", "1d".to_string()),
        ];

        let t0 = std::time::Instant::now();
        let bars = with_retries(self.retries, "Yahoo history download", || {
            self.fetch_chart(ticker, &query)
        })
        .await?;

        // The chart endpoint may append the session in progress past `period2`.
        let bars: Vec<PriceBar> = bars
            .into_iter()
            .filter(|b| b.date >= start && b.date < end)
            .collect();

        tracing::info!(
            %ticker,
            %start,
            %end,
            rows = bars.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "downloaded price history"
        );

        Ok(PriceHistory::new(bars))
    }
}

fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .with_context(|| format!("invalid market data base url: {base_url}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("market data base url cannot be a base: {base_url}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn midnight_utc_timestamp(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct YahooError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

impl YahooError {
    fn into_error(self) -> anyhow::Error {
        anyhow::anyhow!("{}: {}", self.code, self.description)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteIndicator>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteIndicator {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn parse_chart(status: StatusCode, text: &str) -> Result<Vec<PriceBar>> {
    let envelope = match serde_json::from_str::<ChartEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(err) if !status.is_success() => {
            anyhow::bail!("Yahoo chart HTTP {status}: {text} ({err})")
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Yahoo chart response is not valid JSON: {text}"))
        }
    };

    if let Some(err) = envelope.chart.error {
        return Err(err.into_error());
    }
    if !status.is_success() {
        anyhow::bail!("Yahoo chart HTTP {status}: {text}");
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        anyhow::bail!("Yahoo chart response has no result");
    };

    let offset = result.meta.gmtoffset;
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(Vec::new());
    };

    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        // Holidays and halted sessions come back as all-null rows.
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp(ts + offset, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        let volume = at(&quote.volume, i).unwrap_or(0.0).max(0.0) as u64;

        bars.push(PriceBar {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    asset_profile: Option<AssetProfileModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    market_cap: Option<RawNumber>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfileModule {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    long_business_summary: Option<String>,
}

/// `{"raw": 123, "fmt": "123"}`; Yahoo sends `{}` when the value is unknown.
#[derive(Debug, Deserialize)]
struct RawNumber {
    #[serde(default)]
    raw: Option<f64>,
}

fn parse_quote_summary(status: StatusCode, text: &str) -> Result<QuoteSnapshot> {
    let envelope = match serde_json::from_str::<QuoteSummaryEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(err) if !status.is_success() => {
            anyhow::bail!("Yahoo quoteSummary HTTP {status}: {text} ({err})")
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Yahoo quoteSummary response is not valid JSON: {text}"))
        }
    };

    if let Some(err) = envelope.quote_summary.error {
        return Err(err.into_error());
    }
    if !status.is_success() {
        anyhow::bail!("Yahoo quoteSummary HTTP {status}: {text}");
    }

    let result = envelope
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .context("Yahoo quoteSummary response has no result")?;

    let price = result.price;
    let profile = result.asset_profile;
    let non_blank = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

    Ok(QuoteSnapshot {
        short_name: non_blank(price.as_ref().and_then(|p| p.short_name.clone())),
        currency: non_blank(price.as_ref().and_then(|p| p.currency.clone())),
        market_cap: price
            .as_ref()
            .and_then(|p| p.market_cap.as_ref())
            .and_then(|m| m.raw)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64),
        sector: non_blank(profile.as_ref().and_then(|p| p.sector.clone())),
        long_business_summary: non_blank(
            profile.and_then(|p| p.long_business_summary),
        ),
    })
}
