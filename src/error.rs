use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoanError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: f64, reason: &'static str },

    #[error("loan {0} not found")]
    LoanNotFound(String),

    #[error("receipt {0} not found")]
    ReceiptNotFound(String),

    #[error("store rejected {operation}: {reason}")]
    Store {
        operation: &'static str,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "serde")]
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LoanError>;
