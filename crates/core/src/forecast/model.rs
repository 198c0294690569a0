use super::linalg::NormalEquations;
use super::{ForecastError, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

pub const YEARLY_PERIOD_DAYS: f64 = 365.25;
pub const WEEKLY_PERIOD_DAYS: f64 = 7.0;

// Tiny ridge on every penalized coefficient so exactly collinear columns stay solvable.
const RIDGE_FLOOR: f64 = 1e-9;
const PILOT_PENALTY: f64 = 1e-6;
// Noise variance floor in scaled units, i.e. a noise sd of 0.1% of the largest value.
const MIN_NOISE_VAR: f64 = 1e-6;

/// One observation: date and value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub ds: NaiveDate,
    pub y: f64,
}

/// One predicted row, in the units of the training values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub ds: NaiveDate,
    pub trend: f64,
    pub trend_lower: f64,
    pub trend_upper: f64,
    pub weekly: Option<f64>,
    pub yearly: Option<f64>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seasonality {
    Weekly,
    Yearly,
}

impl Seasonality {
    pub fn period_days(&self) -> f64 {
        match self {
            Self::Weekly => WEEKLY_PERIOD_DAYS,
            Self::Yearly => YEARLY_PERIOD_DAYS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Yearly => "yearly",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub n_changepoints: usize,
    /// Share of the history (by rows) in which changepoints are placed.
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub yearly_fourier_order: usize,
    pub weekly_fourier_order: usize,
    pub interval_width: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_fourier_order: 10,
            weekly_fourier_order: 3,
            interval_width: 0.8,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ForecastError::InvalidConfig(msg.to_string()));
        if !(0.0..=1.0).contains(&self.changepoint_range) {
            return invalid("changepoint_range must be within [0, 1]");
        }
        if !(self.changepoint_prior_scale > 0.0) {
            return invalid("changepoint_prior_scale must be positive");
        }
        if !(self.seasonality_prior_scale > 0.0) {
            return invalid("seasonality_prior_scale must be positive");
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return invalid("interval_width must be within (0, 1)");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FittedModel {
    start: NaiveDate,
    t_scale: f64,
    y_scale: f64,
    changepoints_t: Vec<f64>,
    seasonalities: Vec<(Seasonality, usize)>,
    // [offset, rate, rate deltas.., seasonal coefficients..], scaled units.
    beta: Vec<f64>,
    sigma_obs: f64,
    history: Vec<TrainingRow>,
}

impl FittedModel {
    fn n_changepoints(&self) -> usize {
        self.changepoints_t.len()
    }

    fn t_of(&self, ds: NaiveDate) -> f64 {
        (ds - self.start).num_days() as f64 / self.t_scale
    }

    fn trend_scaled(&self, t: f64) -> f64 {
        let mut trend = self.beta[0] + self.beta[1] * t;
        for (j, cp) in self.changepoints_t.iter().enumerate() {
            if t > *cp {
                trend += self.beta[2 + j] * (t - cp);
            }
        }
        trend
    }

    fn seasonal_scaled(&self, ds: NaiveDate) -> Vec<(Seasonality, f64)> {
        let mut offset = 2 + self.n_changepoints();
        let day = days_since_epoch(ds);
        let mut out = Vec::with_capacity(self.seasonalities.len());
        for (seasonality, order) in &self.seasonalities {
            let coefs = &self.beta[offset..offset + 2 * order];
            let value: f64 = fourier_terms(day, seasonality.period_days(), *order)
                .zip(coefs)
                .map(|(x, c)| x * c)
                .sum();
            out.push((*seasonality, value));
            offset += 2 * order;
        }
        out
    }

    /// Variance (scaled units) of the trend at `t` from changepoints that may occur after
    /// the history ends: rate changes arrive at the in-sample changepoint rate with
    /// Laplace-distributed size matching the mean fitted change.
    fn trend_variance(&self, t: f64) -> f64 {
        let horizon = t - 1.0;
        let n = self.n_changepoints();
        if horizon <= 0.0 || n == 0 {
            return 0.0;
        }
        let mean_abs_delta =
            self.beta[2..2 + n].iter().map(|d| d.abs()).sum::<f64>() / n as f64;
        let laplace_var = 2.0 * mean_abs_delta * mean_abs_delta;
        n as f64 * laplace_var * horizon.powi(3) / 3.0
    }
}

/// Trend + seasonality model. A fitted instance is bound to the history it was fit on.
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ModelConfig,
    fitted: Option<FittedModel>,
}

impl Forecaster {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn fit(&mut self, rows: &[TrainingRow]) -> Result<()> {
        if self.fitted.is_some() {
            return Err(ForecastError::AlreadyFitted);
        }
        self.config.validate()?;

        let mut history: Vec<TrainingRow> =
            rows.iter().filter(|r| r.y.is_finite()).copied().collect();
        if history.len() < 2 {
            return Err(ForecastError::InsufficientData);
        }
        history.sort_by_key(|r| r.ds);

        let start = history[0].ds;
        let end = history[history.len() - 1].ds;
        let span_days = (end - start).num_days();
        if span_days <= 0 {
            return Err(ForecastError::DegenerateHistory);
        }
        let t_scale = span_days as f64;

        let y_scale = history.iter().map(|r| r.y.abs()).fold(0.0, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let t: Vec<f64> = history
            .iter()
            .map(|r| (r.ds - start).num_days() as f64 / t_scale)
            .collect();
        let y: Vec<f64> = history.iter().map(|r| r.y / y_scale).collect();

        let changepoints_t = place_changepoints(&t, &self.config);
        let seasonalities = self.detect_seasonalities(&history, span_days);

        let mut model = FittedModel {
            start,
            t_scale,
            y_scale,
            changepoints_t,
            seasonalities,
            beta: Vec::new(),
            sigma_obs: 0.0,
            history,
        };

        let n_cp = model.n_changepoints();
        let n_seasonal: usize = model.seasonalities.iter().map(|(_, o)| 2 * o).sum();
        let dim = 2 + n_cp + n_seasonal;

        let mut design = vec![0.0; y.len() * dim];
        let mut equations = NormalEquations::new(dim);
        for (i, obs) in model.history.iter().enumerate() {
            let row = &mut design[i * dim..(i + 1) * dim];
            fill_features(row, t[i], obs.ds, &model.changepoints_t, &model.seasonalities);
            equations.accumulate(row, y[i]);
        }

        // Pilot fit estimates the noise level that weights the priors of the final fit.
        let pilot = equations.solve(&penalties(dim, n_cp, PILOT_PENALTY, PILOT_PENALTY))?;
        let dof = (y.len() as f64 - dim as f64).max(1.0);
        let noise_var = (residual_sum_of_squares(&design, &y, &pilot) / dof).max(MIN_NOISE_VAR);

        let delta_penalty = noise_var / self.config.changepoint_prior_scale.powi(2);
        let seasonal_penalty = noise_var / self.config.seasonality_prior_scale.powi(2);
        let beta = equations.solve(&penalties(dim, n_cp, delta_penalty, seasonal_penalty))?;

        model.sigma_obs = (residual_sum_of_squares(&design, &y, &beta) / y.len() as f64).sqrt();
        model.beta = beta;

        tracing::debug!(
            rows = model.history.len(),
            changepoints = n_cp,
            seasonalities = ?model.seasonalities,
            sigma_obs = model.sigma_obs,
            "forecast model fitted"
        );

        self.fitted = Some(model);
        Ok(())
    }

    /// History dates followed by `periods` consecutive days after the last one.
    pub fn make_future_dataframe(&self, periods: u32) -> Result<Vec<NaiveDate>> {
        let model = self.fitted("make_future_dataframe")?;
        let mut dates: Vec<NaiveDate> = model.history.iter().map(|r| r.ds).collect();
        dates.dedup();

        let last = dates[dates.len() - 1];
        dates.extend((1..=periods as i64).map(|d| last + Duration::days(d)));
        Ok(dates)
    }

    pub fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<ForecastRow>> {
        let model = self.fitted("predict")?;
        let z = interval_z(self.config.interval_width)?;
        let ys = model.y_scale;

        let rows = dates
            .iter()
            .map(|&ds| {
                let t = model.t_of(ds);
                let trend = model.trend_scaled(t) * ys;
                let trend_sd = model.trend_variance(t).sqrt() * ys;
                let total_sd = (trend_sd.powi(2) + (model.sigma_obs * ys).powi(2)).sqrt();

                let mut weekly = None;
                let mut yearly = None;
                let mut yhat = trend;
                for (seasonality, value) in model.seasonal_scaled(ds) {
                    let value = value * ys;
                    yhat += value;
                    match seasonality {
                        Seasonality::Weekly => weekly = Some(value),
                        Seasonality::Yearly => yearly = Some(value),
                    }
                }

                ForecastRow {
                    ds,
                    trend,
                    trend_lower: trend - z * trend_sd,
                    trend_upper: trend + z * trend_sd,
                    weekly,
                    yearly,
                    yhat,
                    yhat_lower: yhat - z * total_sd,
                    yhat_upper: yhat + z * total_sd,
                }
            })
            .collect();

        Ok(rows)
    }

    /// Seasonalities enabled by the last fit.
    pub fn seasonalities(&self) -> Vec<Seasonality> {
        self.fitted
            .as_ref()
            .map(|m| m.seasonalities.iter().map(|(s, _)| *s).collect())
            .unwrap_or_default()
    }

    pub fn changepoints(&self) -> Vec<NaiveDate> {
        let Some(model) = self.fitted.as_ref() else {
            return Vec::new();
        };
        model
            .changepoints_t
            .iter()
            .map(|t| model.start + Duration::days((t * model.t_scale).round() as i64))
            .collect()
    }

    /// One full cycle of a seasonal component, starting on Sunday 2017-01-01.
    pub fn seasonal_profile(&self, seasonality: Seasonality) -> Result<Vec<(NaiveDate, f64)>> {
        let model = self.fitted("seasonal_profile")?;
        let days = seasonality.period_days().floor() as i64;
        let origin = NaiveDate::from_ymd_opt(2017, 1, 1)
            .ok_or_else(|| ForecastError::InvalidConfig("invalid profile origin".to_string()))?;

        let profile = (0..days)
            .map(|d| {
                let ds = origin + Duration::days(d);
                let value = model
                    .seasonal_scaled(ds)
                    .into_iter()
                    .find(|(s, _)| *s == seasonality)
                    .map(|(_, v)| v * model.y_scale)
                    .unwrap_or(0.0);
                (ds, value)
            })
            .collect();
        Ok(profile)
    }

    fn fitted(&self, op: &'static str) -> Result<&FittedModel> {
        self.fitted.as_ref().ok_or(ForecastError::NotFitted(op))
    }

    fn detect_seasonalities(
        &self,
        history: &[TrainingRow],
        span_days: i64,
    ) -> Vec<(Seasonality, usize)> {
        let mut out = Vec::new();

        let min_gap = history
            .windows(2)
            .map(|w| (w[1].ds - w[0].ds).num_days())
            .filter(|d| *d > 0)
            .min()
            .unwrap_or(i64::MAX);

        if span_days >= 14 && min_gap < 7 && self.config.weekly_fourier_order > 0 {
            out.push((Seasonality::Weekly, self.config.weekly_fourier_order));
        }
        if span_days >= 730 && self.config.yearly_fourier_order > 0 {
            out.push((Seasonality::Yearly, self.config.yearly_fourier_order));
        }
        out
    }
}

/// Potential changepoints spread evenly over the first `changepoint_range` of the rows.
fn place_changepoints(t: &[f64], config: &ModelConfig) -> Vec<f64> {
    let hist_size = (t.len() as f64 * config.changepoint_range).floor() as usize;
    let mut n = config.n_changepoints;
    if n + 1 > hist_size {
        n = hist_size.saturating_sub(1);
    }
    if n == 0 {
        return Vec::new();
    }

    let last = (hist_size - 1) as f64;
    (1..=n)
        .map(|i| {
            let idx = (i as f64 * last / n as f64).round() as usize;
            t[idx]
        })
        .collect()
}

/// Offset and base rate are left free; the `[1, t]` block is full rank once two dates differ.
fn penalties(dim: usize, n_cp: usize, delta: f64, seasonal: f64) -> Vec<f64> {
    (0..dim)
        .map(|i| {
            if i < 2 {
                0.0
            } else if i < 2 + n_cp {
                delta + RIDGE_FLOOR
            } else {
                seasonal + RIDGE_FLOOR
            }
        })
        .collect()
}

fn fill_features(
    row: &mut [f64],
    t: f64,
    ds: NaiveDate,
    changepoints_t: &[f64],
    seasonalities: &[(Seasonality, usize)],
) {
    row[0] = 1.0;
    row[1] = t;
    for (j, cp) in changepoints_t.iter().enumerate() {
        row[2 + j] = (t - cp).max(0.0);
    }
    let mut offset = 2 + changepoints_t.len();
    let day = days_since_epoch(ds);
    for (seasonality, order) in seasonalities {
        for (k, x) in fourier_terms(day, seasonality.period_days(), *order).enumerate() {
            row[offset + k] = x;
        }
        offset += 2 * order;
    }
}

fn residual_sum_of_squares(design: &[f64], y: &[f64], beta: &[f64]) -> f64 {
    design
        .chunks_exact(beta.len())
        .zip(y)
        .map(|(row, y)| {
            let fitted: f64 = row.iter().zip(beta).map(|(x, b)| x * b).sum();
            (y - fitted).powi(2)
        })
        .sum()
}

/// `[sin(2π·1·d/P), cos(2π·1·d/P), .., sin(2π·N·d/P), cos(2π·N·d/P)]`
fn fourier_terms(day: f64, period: f64, order: usize) -> impl Iterator<Item = f64> {
    (1..=order).flat_map(move |k| {
        let angle = 2.0 * PI * k as f64 * day / period;
        [angle.sin(), angle.cos()]
    })
}

fn days_since_epoch(ds: NaiveDate) -> f64 {
    ds.signed_duration_since(NaiveDate::default()).num_days() as f64
}

fn interval_z(width: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::InvalidConfig(format!("standard normal: {e}")))?;
    Ok(normal.inverse_cdf(0.5 + width / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily(start: NaiveDate, n: usize, f: impl Fn(usize, NaiveDate) -> f64) -> Vec<TrainingRow> {
        (0..n)
            .map(|i| {
                let ds = start + Duration::days(i as i64);
                TrainingRow { ds, y: f(i, ds) }
            })
            .collect()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    #[test]
    fn recovers_linear_trend() {
        let rows = daily(start(), 400, |i, _| 10.0 + 0.5 * i as f64);
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();

        let future = m.make_future_dataframe(30).unwrap();
        let forecast = m.predict(&future).unwrap();
        let last = forecast.last().unwrap();
        let expected = 10.0 + 0.5 * 429.0;
        assert!(
            (last.yhat - expected).abs() / expected < 0.01,
            "yhat {} vs {expected}",
            last.yhat
        );
    }

    #[test]
    fn future_frame_appends_calendar_days() {
        let rows = daily(start(), 300, |i, _| 50.0 + (i % 5) as f64);
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();

        let future = m.make_future_dataframe(365).unwrap();
        assert_eq!(future.len(), 300 + 365);
        let last_observed = rows.last().unwrap().ds;
        assert_eq!(future.iter().filter(|d| **d > last_observed).count(), 365);
        assert_eq!(future[300], last_observed + Duration::days(1));
    }

    #[test]
    fn picks_up_weekly_cycle() {
        let rows = daily(start(), 200, |_, ds| {
            100.0 + 3.0 * (2.0 * PI * days_since_epoch(ds) / 7.0).sin()
        });
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        assert_eq!(m.seasonalities(), vec![Seasonality::Weekly]);

        let forecast = m.predict(&[rows[10].ds]).unwrap();
        let expected = 3.0 * (2.0 * PI * days_since_epoch(rows[10].ds) / 7.0).sin();
        let weekly = forecast[0].weekly.unwrap();
        assert!((weekly - expected).abs() < 0.2, "weekly {weekly} vs {expected}");

        let profile = m.seasonal_profile(Seasonality::Weekly).unwrap();
        assert_eq!(profile.len(), 7);
        let (lo, hi) = profile
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
        assert!(hi - lo > 5.0);
    }

    #[test]
    fn enables_yearly_with_two_years_and_skips_weekly_for_weekly_samples() {
        let rows: Vec<TrainingRow> = (0..120)
            .map(|i| TrainingRow {
                ds: start() + Duration::weeks(i),
                y: 20.0 + i as f64,
            })
            .collect();
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        assert_eq!(m.seasonalities(), vec![Seasonality::Yearly]);
    }

    #[test]
    fn intervals_bracket_and_widen_with_horizon() {
        // Slope change at day 250 plus a 3-day wobble the seasonalities cannot absorb.
        let rows = daily(start(), 500, |i, _| {
            let trend = if i < 250 {
                100.0 + 0.1 * i as f64
            } else {
                125.0 + 0.3 * (i - 250) as f64
            };
            trend + if i % 3 == 0 { 1.5 } else { -0.75 }
        });
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        let future = m.make_future_dataframe(400).unwrap();
        let forecast = m.predict(&future).unwrap();

        for row in &forecast {
            assert!(row.yhat_lower <= row.yhat && row.yhat <= row.yhat_upper);
            assert!(row.trend_lower <= row.trend && row.trend <= row.trend_upper);
        }

        let width = |r: &ForecastRow| r.yhat_upper - r.yhat_lower;
        let first_future = &forecast[500];
        let last_future = forecast.last().unwrap();
        assert!(width(last_future) > width(first_future));
        assert_eq!(forecast[10].trend_lower, forecast[10].trend);
    }

    #[test]
    fn rejects_short_history() {
        let mut m = Forecaster::default();
        let one = daily(start(), 1, |_, _| 1.0);
        assert_eq!(m.fit(&one), Err(ForecastError::InsufficientData));
        assert_eq!(
            m.fit(&[]).unwrap_err().to_string(),
            "Dataframe has less than 2 non-NaN rows."
        );

        let nan = vec![
            TrainingRow { ds: start(), y: 1.0 },
            TrainingRow { ds: start() + Duration::days(1), y: f64::NAN },
        ];
        assert_eq!(m.fit(&nan), Err(ForecastError::InsufficientData));
    }

    #[test]
    fn rejects_single_date_history() {
        let rows = vec![
            TrainingRow { ds: start(), y: 1.0 },
            TrainingRow { ds: start(), y: 2.0 },
        ];
        assert_eq!(
            Forecaster::default().fit(&rows),
            Err(ForecastError::DegenerateHistory)
        );
    }

    #[test]
    fn refuses_to_refit_or_predict_unfitted() {
        let m = Forecaster::default();
        assert_eq!(
            m.predict(&[start()]),
            Err(ForecastError::NotFitted("predict"))
        );

        let rows = daily(start(), 30, |i, _| i as f64);
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        assert_eq!(m.fit(&rows), Err(ForecastError::AlreadyFitted));
    }

    #[test]
    fn changepoints_stay_in_first_80_percent() {
        let rows = daily(start(), 100, |i, _| i as f64);
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        let cps = m.changepoints();
        assert_eq!(cps.len(), 25);
        assert!(cps.iter().all(|d| *d <= rows[79].ds));
        assert!(cps.iter().all(|d| *d > rows[0].ds));
    }

    #[test]
    fn short_history_gets_fewer_changepoints() {
        let rows = daily(start(), 10, |i, _| i as f64);
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        assert_eq!(m.changepoints().len(), 7);
    }

    #[test]
    fn constant_weekday_history_stays_flat_on_weekends() {
        use chrono::{Datelike, Weekday};

        let monday = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let rows: Vec<TrainingRow> = daily(monday, 800, |_, _| 100.0)
            .into_iter()
            .filter(|r| !matches!(r.ds.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        let mut m = Forecaster::default();
        m.fit(&rows).unwrap();
        assert_eq!(m.seasonalities(), vec![Seasonality::Weekly, Seasonality::Yearly]);

        let future = m.make_future_dataframe(365).unwrap();
        let forecast = m.predict(&future).unwrap();
        let weekends: Vec<&ForecastRow> = forecast
            .iter()
            .filter(|r| matches!(r.ds.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        assert!(weekends.len() > 100);
        for row in forecast.iter() {
            assert!((row.yhat - 100.0).abs() < 0.05, "{} yhat {}", row.ds, row.yhat);
            assert!(row.weekly.unwrap().abs() < 0.05, "{} weekly {:?}", row.ds, row.weekly);
        }
    }

    #[test]
    fn rejects_bad_interval_width() {
        let mut m = Forecaster::new(ModelConfig {
            interval_width: 1.5,
            ..Default::default()
        });
        let rows = daily(start(), 30, |i, _| i as f64);
        assert!(matches!(m.fit(&rows), Err(ForecastError::InvalidConfig(_))));
    }
}
