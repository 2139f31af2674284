//! Error types for Picshare

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PicshareError>;

#[derive(Error, Debug)]
pub enum PicshareError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Validation(String),

    #[error("Username already exists")]
    UsernameTaken,

    #[error("No authenticated session")]
    NoSession,

    #[error("Malformed document: {0}")]
    Mapping(#[from] serde_json::Error),
}

impl PicshareError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PicshareError::Validation(_) | PicshareError::UsernameTaken => 3,
            PicshareError::NoSession => 2,
            PicshareError::Backend(BackendError::Authentication(_)) => 2,
            PicshareError::Backend(_) => 1,
            PicshareError::Config(_) => 1,
            PicshareError::Database(_) => 1,
            PicshareError::Mapping(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures reported by the remote gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_validation() {
        let error = PicshareError::Validation("Please fill in all fields".to_string());
        assert_eq!(error.exit_code(), 3);
        assert_eq!(PicshareError::UsernameTaken.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication() {
        let error = PicshareError::Backend(BackendError::Authentication("bad password".to_string()));
        assert_eq!(error.exit_code(), 2);
        assert_eq!(PicshareError::NoSession.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_backend() {
        let error = PicshareError::Backend(BackendError::Network("timeout".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = PicshareError::Config(ConfigError::MissingField("backend.database_path".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_username_taken_message() {
        assert_eq!(PicshareError::UsernameTaken.to_string(), "Username already exists");
    }

    #[test]
    fn test_validation_message_is_bare() {
        let error = PicshareError::Validation("Invalid email".to_string());
        assert_eq!(error.to_string(), "Invalid email");
    }

    #[test]
    fn test_error_message_formatting_backend() {
        let error: PicshareError = BackendError::NotFound("posts/abc".to_string()).into();
        assert_eq!(error.to_string(), "Backend error: Document not found: posts/abc");
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        let error: PicshareError = db_error.into();

        match error {
            PicshareError::Database(_) => {}
            _ => panic!("Expected PicshareError::Database"),
        }
    }
}
