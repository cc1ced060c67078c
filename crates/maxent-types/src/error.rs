use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaxEntError {
    #[error("Shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("{what} must be strictly positive, found {value} at index {index}")]
    NonPositive {
        what: &'static str,
        index: usize,
        value: f64,
    },

    #[error("{what} must be finite, found {value} at index {index}")]
    NonFinite {
        what: &'static str,
        index: usize,
        value: f64,
    },

    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MaxEntError {
    /// True for every variant raised by input validation before a
    /// reconstruction starts.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, MaxEntError::Io(_) | MaxEntError::Json(_))
    }
}

pub type MaxEntResult<T> = Result<T, MaxEntError>;
