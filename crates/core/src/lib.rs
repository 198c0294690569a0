pub mod chart;
pub mod dashboard;
pub mod domain;
pub mod forecast;
pub mod ingest;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use chrono::NaiveDate;

    pub const DEFAULT_HISTORY_START: &str = "2015-01-01";

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub data_provider_base_url: Option<String>,
        pub data_provider_summary_base_url: Option<String>,
        pub data_provider_cookie_url: Option<String>,
        pub data_provider_timeout_secs: Option<u64>,
        pub data_provider_retries: Option<u32>,
        pub history_start: Option<String>,
        pub history_cache_capacity: Option<u64>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                data_provider_base_url: non_empty_var("DATA_PROVIDER_BASE_URL"),
                data_provider_summary_base_url: non_empty_var("DATA_PROVIDER_SUMMARY_BASE_URL"),
                data_provider_cookie_url: non_empty_var("DATA_PROVIDER_COOKIE_URL"),
                data_provider_timeout_secs: parse_var("DATA_PROVIDER_TIMEOUT_SECS")?,
                data_provider_retries: parse_var("DATA_PROVIDER_RETRIES")?,
                history_start: non_empty_var("HISTORY_START"),
                history_cache_capacity: parse_var("HISTORY_CACHE_CAPACITY")?,
                sentry_dsn: non_empty_var("SENTRY_DSN"),
            })
        }

        /// First date of every history download.
        pub fn history_start(&self) -> anyhow::Result<NaiveDate> {
            let raw = self
                .history_start
                .as_deref()
                .unwrap_or(DEFAULT_HISTORY_START);
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .with_context(|| format!("HISTORY_START must be YYYY-MM-DD (got {raw})"))
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        non_empty_var(key)
            .map(|s| s.trim().parse::<T>())
            .transpose()
            .with_context(|| format!("{key} is not a valid number"))
    }

}
