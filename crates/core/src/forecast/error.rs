use thiserror::Error;

/// Errors raised while fitting or evaluating a [`crate::forecast::Forecaster`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// Fewer than two usable observations.
    #[error("Dataframe has less than 2 non-NaN rows.")]
    InsufficientData,

    /// All observations fall on the same date, so time cannot be scaled.
    #[error("history spans a single date; at least two distinct dates are required")]
    DegenerateHistory,

    #[error("model can only be fit once; create a new instance")]
    AlreadyFitted,

    #[error("model must be fit before calling {0}")]
    NotFitted(&'static str),

    /// The penalised normal equations were not positive definite.
    #[error("normal equations are singular (pivot {0})")]
    Singular(usize),

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
