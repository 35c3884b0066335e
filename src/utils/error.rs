//! Crate-wide error types.
//!
//! Mirrors the constructor-per-failure-kind style used throughout the
//! service layer: callers build an error with a short factory function
//! instead of constructing enum variants by hand.

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn dataset_not_found(msg: impl Into<String>) -> Self {
        Self::DatasetNotFound(msg.into())
    }

    pub fn corrupt_index(msg: impl Into<String>) -> Self {
        Self::CorruptIndex(msg.into())
    }

    pub fn table_not_found(msg: impl Into<String>) -> Self {
        Self::TableNotFound(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
