//! Error types for insurance-predictor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("Username already exists!")]
    DuplicateUser(String),

    #[error("{0}")]
    WeakPassword(String),

    #[error("Username does not exist!")]
    UnknownUser(String),

    #[error("Incorrect password!")]
    BadCredentials,

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Shape mismatch: model expects {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("History store read error: {0}")]
    StoreReadError(String),

    /// Present but syntactically empty store. Callers report "no records".
    #[error("No predictions found!")]
    StoreEmpty,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PredictorError {
    /// Stable machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateUser(_) => "DUPLICATE_USER",
            Self::WeakPassword(_) => "WEAK_PASSWORD",
            Self::UnknownUser(_) => "UNKNOWN_USER",
            Self::BadCredentials => "BAD_CREDENTIALS",
            Self::DatasetError(_) => "DATASET_ERROR",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::StoreReadError(_) => "STORE_READ_ERROR",
            Self::StoreEmpty => "STORE_EMPTY",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;
