//! Error types for the metric store

use std::fmt;

/// Result type alias for metric store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while building or using the metric store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// History size must hold at least one point
    InvalidHistorySize(usize),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidHistorySize(size) => {
                write!(f, "invalid history size {size}: must be at least 1")
            }
        }
    }
}

impl std::error::Error for StorageError {}
