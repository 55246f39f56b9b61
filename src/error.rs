//! Error types for SHELF.

use thiserror::Error;

/// Common error type for SHELF.
#[derive(Error, Debug)]
pub enum ShelfError {
    /// Database error.
    ///
    /// This is a generic database error that wraps errors from sqlx.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A name is empty or unsafe after sanitization.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// An item already exists at the target path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Chunk assembly failed.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// An upload exceeds the configured size limit.
    #[error("too large: {0}")]
    TooLarge(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for ShelfError {
    fn from(e: sqlx::Error) -> Self {
        ShelfError::Database(e.to_string())
    }
}

/// Result type alias for SHELF operations.
pub type Result<T> = std::result::Result<T, ShelfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_name_display() {
        let err = ShelfError::InvalidName("..".to_string());
        assert_eq!(err.to_string(), "invalid name: ..");
    }

    #[test]
    fn test_already_exists_display() {
        let err = ShelfError::AlreadyExists("docs/report.pdf".to_string());
        assert_eq!(err.to_string(), "already exists: docs/report.pdf");
    }

    #[test]
    fn test_not_found_display() {
        let err = ShelfError::NotFound("item".to_string());
        assert_eq!(err.to_string(), "item not found");
    }

    #[test]
    fn test_assembly_error_display() {
        let err = ShelfError::Assembly("chunk 3 missing".to_string());
        assert_eq!(err.to_string(), "assembly error: chunk 3 missing");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ShelfError = io_err.into();
        assert!(matches!(err, ShelfError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(ShelfError::Auth("test".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
