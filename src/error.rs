use thiserror::Error;

/// Error types for brain-scrape.
///
/// Only conditions that stop a run (or that must reach the caller) are
/// represented here. A single field that cannot be extracted is never an
/// error: it is logged and shows up in the record's `missing_fields`.
#[derive(Error, Debug)]
pub enum ScrapeError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration file: {path}")]
    InvalidConfig { path: String },

    // Session errors
    #[error("Page session could not be started: {message}")]
    SessionStart { message: String },

    #[error("Browser feature not enabled, rebuild with `--features browser` or use the http backend")]
    BrowserUnavailable,

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Invalid product URL: {url}")]
    InvalidUrl { url: String },

    #[error("No product found for query: {query}")]
    ProductNotFound { query: String },

    // Output errors
    #[error("Output path cannot be created: {path}: {message}")]
    OutputPath { path: String, message: String },

    #[error("File write failed: {path}: {message}")]
    FileWrite { path: String, message: String },

    #[error("File read failed: {path}: {message}")]
    FileRead { path: String, message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Migration failed: {version}")]
    Migration { version: i32 },
}

impl ScrapeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a session start error
    pub fn session(message: impl Into<String>) -> Self {
        Self::SessionStart { message: message.into() }
    }

    /// Create a navigation error
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Fatal errors end the run before any record is written
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::InvalidConfig { .. }
                | Self::SessionStart { .. }
                | Self::BrowserUnavailable
                | Self::Navigation { .. }
                | Self::InvalidUrl { .. }
                | Self::ProductNotFound { .. }
                | Self::OutputPath { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::InvalidConfig { .. } => "configuration",
            Self::SessionStart { .. } | Self::BrowserUnavailable => "session",
            Self::Navigation { .. } | Self::InvalidUrl { .. } | Self::ProductNotFound { .. } => "navigation",
            Self::OutputPath { .. } | Self::FileWrite { .. } | Self::FileRead { .. } => "file",
            Self::Database { .. } | Self::Migration { .. } => "database",
        }
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            "configuration" => 78,
            "navigation" => 2,
            "session" => 69,
            "file" => 74,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for ScrapeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = ScrapeError::config("Invalid setting");
        assert_eq!(error.category(), "configuration");
        assert!(error.is_fatal());
        assert_eq!(error.exit_code(), 78);
    }

    #[test]
    fn test_propagated_errors_are_not_fatal() {
        let error = ScrapeError::database("disk I/O error");
        assert!(!error.is_fatal());
        assert_eq!(error.category(), "database");

        let error = ScrapeError::FileWrite {
            path: "results/last_product.json".to_string(),
            message: "read-only file system".to_string(),
        };
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_navigation_message() {
        let error = ScrapeError::navigation("https://brain.com.ua/ukr/p1", "timeout");
        assert_eq!(error.to_string(), "Navigation to https://brain.com.ua/ukr/p1 failed: timeout");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = ScrapeError::ProductNotFound {
            query: "iPhone".to_string(),
        }
        .into();
        let scrape_err = err.downcast_ref::<ScrapeError>().unwrap();
        assert!(scrape_err.is_fatal());
    }
}
