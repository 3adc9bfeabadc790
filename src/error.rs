//! Error types for the circulation core

use thiserror::Error;

/// Stable error codes, used as process exit status by the command line front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    StorageUnavailable = 3,
    NoSuchData = 4,
    InvalidCredentials = 5,
    BookBorrowed = 7,
    Duplicate = 8,
    LoanExpired = 9,
    MaxRenewsReached = 11,
    BadValue = 18,
    InvalidFormat = 20,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Book {0} is already borrowed")]
    AlreadyBorrowed(String),

    #[error("Loan expired on {0}, it can no longer be renewed")]
    AlreadyExpired(String),

    #[error("Loan has already been renewed once")]
    RenewalLimitExceeded,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Code reported to the caller for this error kind
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::DuplicateKey(_) => ErrorCode::Duplicate,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AppError::AlreadyBorrowed(_) => ErrorCode::BookBorrowed,
            AppError::AlreadyExpired(_) => ErrorCode::LoanExpired,
            AppError::RenewalLimitExceeded => ErrorCode::MaxRenewsReached,
            AppError::InvalidFormat(_) => ErrorCode::InvalidFormat,
            AppError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ErrorCode::Failure
            }
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::StorageUnavailable(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_is_storage_unavailable() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
        assert_eq!(err.code(), ErrorCode::StorageUnavailable);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        assert_eq!(AppError::RenewalLimitExceeded.code() as u8, 11);
        assert_eq!(AppError::AlreadyBorrowed("B1".into()).code() as u8, 7);
        assert_ne!(
            AppError::DuplicateKey("x".into()).code(),
            AppError::NotFound("x".into()).code()
        );
    }
}
