use super::page::{Block, Page};
use crate::chart;
use crate::domain::horizon::Horizon;
use crate::domain::recommendation::Recommendation;
use crate::domain::ticker::Ticker;
use crate::forecast::{ForecastRow, Forecaster, Seasonality, TrainingRow};
use crate::ingest::provider::MarketDataProvider;
use crate::ingest::types::{PriceBar, PriceHistory, QuoteSnapshot};
use crate::storage::HistoryCache;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;

pub const APP_TITLE: &str = "Stock Forecast App";
pub const TICKER_LABEL: &str = "Enter stock symbol (e.g., TSLA)";
pub const YEARS_LABEL: &str = "Years of prediction:";
pub const EMPTY_TICKER_WARNING: &str = "Please enter a valid stock symbol.";
pub const NO_CURRENT_PRICE_WARNING: &str =
    "Current price information is not available for this stock.";
pub const LOADING: &str = "Loading data...";
pub const LOADING_DONE: &str = "Loading data... done!";
pub const ERROR_PREFIX: &str = "An error occurred while fetching stock information: ";

const PLACEHOLDER: &str = "N/A";
const DESCRIPTION_CHARS: usize = 400;
const TAIL_ROWS: usize = 5;

/// Renders the dashboard for one `{ticker, horizon}` interaction.
///
/// Cheap to share: the provider sits behind an `Arc` and the history memo is itself a
/// shared handle, so one instance serves every request of the process.
pub struct Dashboard {
    provider: Arc<dyn MarketDataProvider>,
    history: HistoryCache,
    history_start: NaiveDate,
}

impl Dashboard {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        history: HistoryCache,
        history_start: NaiveDate,
    ) -> Self {
        Self {
            provider,
            history,
            history_start,
        }
    }

    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    /// Runs the whole pass. Never fails: the first error ends the pass and is reported as the
    /// last block of the page, after whatever was rendered before it.
    pub async fn render(&self, input: &str, horizon: Horizon, today: NaiveDate) -> Page {
        let mut page = Page::new();
        page.title(APP_TITLE);
        page.push(Block::TextInput {
            name: "ticker".to_string(),
            label: TICKER_LABEL.to_string(),
            value: input.to_string(),
        });

        let Some(ticker) = Ticker::parse(input) else {
            page.warning(EMPTY_TICKER_WARNING);
            return page;
        };

        let started = Instant::now();
        match self.render_ticker(&mut page, &ticker, horizon, today).await {
            Ok(()) => tracing::info!(
                %ticker,
                years = horizon.years(),
                blocks = page.blocks.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dashboard rendered"
            ),
            Err(err) => {
                tracing::error!(%ticker, error = %format!("{err:#}"), "dashboard render failed");
                page.error(format!("{ERROR_PREFIX}{err:#}"));
            }
        }
        page
    }

    async fn render_ticker(
        &self,
        page: &mut Page,
        ticker: &Ticker,
        horizon: Horizon,
        today: NaiveDate,
    ) -> Result<()> {
        let quote = self
            .provider
            .fetch_quote(ticker)
            .await
            .with_context(|| format!("failed to fetch quote for {ticker}"))?;
        let currency = quote.currency.as_deref().unwrap_or("");

        page.subheader(format!(
            "{} ({ticker})",
            quote.short_name.as_deref().unwrap_or(PLACEHOLDER)
        ));
        page.field("Sector", quote.sector.as_deref().unwrap_or(PLACEHOLDER));

        let recent = self
            .provider
            .fetch_recent_bars(ticker)
            .await
            .with_context(|| format!("failed to fetch current price for {ticker}"))?;
        match recent.last() {
            Some(bar) => {
                page.field("Current Price", format!("{currency} {}", bar.close));
            }
            None => {
                page.warning(NO_CURRENT_PRICE_WARNING);
            }
        }

        let market_cap = quote
            .market_cap
            .map(|cap| cap.to_string())
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        page.field("Market Cap", format!("{currency} {market_cap}"));
        page.field("Description", description(&quote));

        page.push(Block::Slider {
            name: "years".to_string(),
            label: YEARS_LABEL.to_string(),
            min: Horizon::MIN_YEARS,
            max: Horizon::MAX_YEARS,
            value: horizon.years(),
        });

        let loading = page.text(LOADING);
        let history = self
            .history
            .load(self.provider.as_ref(), ticker, self.history_start, today)
            .await?;
        page.set_text(loading, LOADING_DONE);

        page.subheader("Raw data");
        page.push(history_table(&history));
        page.push(Block::Chart {
            figure: chart::raw_price_figure(&history.bars)?,
        });

        let (model, forecast) = fit_forecast(&history, horizon)?;
        tracing::debug!(
            %ticker,
            history_rows = history.len(),
            forecast_rows = forecast.len(),
            "forecast computed"
        );

        page.subheader("Forecast data");
        page.push(forecast_table(&model.seasonalities(), &forecast));

        page.text(format!("Forecast plot for {} years", horizon.years()));
        page.push(Block::Chart {
            figure: chart::forecast_figure(&history.bars, &forecast)?,
        });

        page.text("Forecast components");
        page.push(Block::Image {
            alt: format!("{ticker} forecast components"),
            svg: chart::components_svg(&model, &forecast)?,
        });

        match Recommendation::from_history(&history.bars) {
            Some(rec @ Recommendation::Profit(_)) => page.success(rec.message()),
            Some(rec @ Recommendation::Loss(_)) => page.error(rec.message()),
            Some(rec @ Recommendation::Unchanged) => page.warning(rec.message()),
            None => return Ok(()),
        };
        Ok(())
    }
}

/// Summary cut to its first 400 characters; the ellipsis is always appended.
fn description(quote: &QuoteSnapshot) -> String {
    let summary = quote
        .long_business_summary
        .as_deref()
        .unwrap_or(PLACEHOLDER);
    let mut out: String = summary.chars().take(DESCRIPTION_CHARS).collect();
    out.push_str("...");
    out
}

/// Fits a fresh model on the closes and predicts `horizon` days past the last observation.
pub fn fit_forecast(
    history: &PriceHistory,
    horizon: Horizon,
) -> Result<(Forecaster, Vec<ForecastRow>)> {
    let training: Vec<TrainingRow> = history
        .bars
        .iter()
        .map(|b| TrainingRow {
            ds: b.date,
            y: b.close,
        })
        .collect();

    let mut model = Forecaster::default();
    model.fit(&training)?;
    let future = model.make_future_dataframe(horizon.days())?;
    let forecast = model.predict(&future)?;
    Ok((model, forecast))
}

fn num(v: f64) -> String {
    format!("{v:.6}")
}

fn history_table(history: &PriceHistory) -> Block {
    let columns = ["Date", "Open", "High", "Low", "Close", "Volume"];
    let rows = history
        .tail(TAIL_ROWS)
        .iter()
        .map(|b: &PriceBar| {
            vec![
                b.date.to_string(),
                num(b.open),
                num(b.high),
                num(b.low),
                num(b.close),
                b.volume.to_string(),
            ]
        })
        .collect();
    Block::Table {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

fn forecast_table(seasonalities: &[Seasonality], forecast: &[ForecastRow]) -> Block {
    let has = |s: Seasonality| seasonalities.contains(&s);
    let mut columns = vec![
        "ds",
        "trend",
        "yhat_lower",
        "yhat_upper",
        "trend_lower",
        "trend_upper",
    ];
    if has(Seasonality::Weekly) {
        columns.push("weekly");
    }
    if has(Seasonality::Yearly) {
        columns.push("yearly");
    }
    columns.push("yhat");

    let start = forecast.len().saturating_sub(TAIL_ROWS);
    let rows = forecast[start..]
        .iter()
        .map(|r| {
            let mut row = vec![
                r.ds.to_string(),
                num(r.trend),
                num(r.yhat_lower),
                num(r.yhat_upper),
                num(r.trend_lower),
                num(r.trend_upper),
            ];
            if has(Seasonality::Weekly) {
                row.push(r.weekly.map(num).unwrap_or_default());
            }
            if has(Seasonality::Yearly) {
                row.push(r.yearly.map(num).unwrap_or_default());
            }
            row.push(num(r.yhat));
            row
        })
        .collect();

    Block::Table {
        columns: columns.into_iter().map(String::from).collect(),
        rows,
    }
}
