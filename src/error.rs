use thiserror::Error;

/// Problems with the run parameters, detected before any worker starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid base URL {0}")]
    InvalidBaseUrl(String),

    #[error("at least one ramp stage is required")]
    NoStages,

    #[error("max concurrency ({max_concurrency}) must be at least the number of stages ({stages})")]
    ConcurrencyBelowStages { max_concurrency: usize, stages: usize },

    #[error("login percentage must be between 0 and 100, got {0}")]
    LoginPercentage(u8),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("login percentage is {0}% but the catalog has no login endpoint")]
    MissingLoginEndpoint(u8),

    #[error("login percentage is {0}% but the catalog has no regular endpoints")]
    NoRegularEndpoints(u8),

    #[error("the catalog has more than one login endpoint")]
    DuplicateLoginEndpoint,

    #[error("at least one iteration is required")]
    NoIterations,

    #[error("invalid endpoint definition: {0}")]
    InvalidEndpoint(String),
}
