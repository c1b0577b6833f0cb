//! Error types of the odometry pipeline.

/// Failure of a single solver invocation. Always recoverable: the registration
/// controller may retry with relaxed options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolverError {
    #[error("too few residuals: {found} < {required}")]
    TooFewResiduals { found: usize, required: usize },

    /// The normal equations are not positive definite.
    #[error("degenerate normal equations")]
    Degenerate,

    #[error("pose update diverged")]
    Diverged,
}

/// Why a frame was not registered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistrationError {
    #[error("not enough keypoints after sampling: {found} < {required}")]
    SamplingDegenerate { found: usize, required: usize },

    #[error("solver did not converge: {0}")]
    SolverNonConvergence(#[from] SolverError),

    #[error("registration rejected: {0}")]
    QualityRejected(String),

    #[error("registration failed after {attempts} attempts: {last}")]
    AttemptsExhausted {
        attempts: usize,
        last: Box<RegistrationError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid option `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot parse options: {0}")]
    Parse(String),

    #[error("unknown profile `{0}`, expected `driving` or `slow_outdoor`")]
    UnknownProfile(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parse(error.to_string())
    }
}
