use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockcast_core::dashboard::{render_html, Dashboard};
use stockcast_core::domain::horizon::Horizon;
use stockcast_core::ingest::yahoo::YahooClient;
use stockcast_core::storage::HistoryCache;

#[derive(Debug, Parser)]
#[command(name = "stockcast_worker", about = "Render one stock forecast report offline")]
struct Args {
    /// Stock symbol, e.g. TSLA.
    #[arg(long)]
    ticker: String,

    /// Years of prediction.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=4))]
    years: u32,

    /// History end date, exclusive (YYYY-MM-DD). Defaults to today's local date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Output file. Writes to stdout when absent.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Emit the page as JSON instead of HTML.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockcast_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref())?;
    let horizon = Horizon::new(args.years)?;

    let provider = YahooClient::from_settings(&settings)?;
    let dashboard = Dashboard::new(
        Arc::new(provider),
        HistoryCache::unbounded(),
        settings.history_start()?,
    );

    let page = dashboard.render(&args.ticker, horizon, as_of_date).await;

    let rendered = if args.json {
        serde_json::to_string_pretty(&page).context("serialize page failed")?
    } else {
        render_html(&page)
    };

    match &args.out {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("write {} failed", path.display()))?;
            tracing::info!(path = %path.display(), blocks = page.blocks.len(), "report written");
        }
        None => std::io::stdout()
            .write_all(rendered.as_bytes())
            .context("write stdout failed")?,
    }

    if let Some(err) = page.errors().next() {
        let err = anyhow::anyhow!("{err}");
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(ticker = %args.ticker, %as_of_date, error = %err, "report rendered with an error");
        return Err(err);
    }
    Ok(())
}

fn init_sentry(settings: &stockcast_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("--as-of-date must be YYYY-MM-DD (got {s})"));
    }
    Ok(chrono::Local::now().date_naive())
}
