//! Additive trend + seasonality forecasting model.
//!
//! The model follows the usual decomposable layout: a piecewise linear trend with
//! automatically placed changepoints plus Fourier-series seasonalities, fitted by
//! penalised least squares. Uncertainty intervals combine observation noise with the
//! trend uncertainty implied by future changepoints.

mod error;
mod linalg;
mod model;

pub use error::{ForecastError, Result};
pub use model::{
    ForecastRow, Forecaster, ModelConfig, Seasonality, TrainingRow, WEEKLY_PERIOD_DAYS,
    YEARLY_PERIOD_DAYS,
};
