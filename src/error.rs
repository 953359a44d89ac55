use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("missing frequency source")]
    MissingFrequencySource,

    #[error("cannot {operation} while the phaseogram is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("fit error: {0}")]
    Fit(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl TimingError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        TimingError::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, TimingError>;

/// Rejects NaN and infinities.
pub(crate) fn require_finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TimingError::invalid(name, value, "must be finite"))
    }
}

/// Rejects non-finite and non-positive values.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64> {
    require_finite(name, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(TimingError::invalid(name, value, "must be > 0"))
    }
}
