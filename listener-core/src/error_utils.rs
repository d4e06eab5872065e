use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Feed(e) => {
                error!("Feed error details: {:?}", e);
            }
            CoreError::Storage(e) => {
                error!("Storage error details: {:?}", e);
            }
            CoreError::Notifier(e) => {
                error!("Notifier error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Feed(e) => e.is_retryable(),
            CoreError::Storage(e) => e.is_retryable(),
            CoreError::Notifier(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            CoreError::Io(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Feed(FeedError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            CoreError::Feed(e) => e.retry_after(),
            CoreError::Storage(e) => e.retry_after(),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Feed(e) => e.user_friendly_message(),
            CoreError::Storage(e) => e.user_friendly_message(),
            CoreError::Notifier(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { .. } => {
                "Invalid input provided. Please check your input and try again.".to_string()
            }
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Feed(_) => "FEED".to_string(),
            CoreError::Storage(_) => "STORAGE".to_string(),
            CoreError::Notifier(_) => "NOTIFIER".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for FeedError {
    fn log_error(&self) -> &Self {
        error!("FeedError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FeedError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            FeedError::RateLimitExceeded { .. } => true,
            FeedError::RequestTimeout => true,
            FeedError::ConnectionFailed { .. } => true,
            FeedError::InvalidResponse { .. } => true,
            FeedError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FeedError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            FeedError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            FeedError::Forbidden { resource } => format!(
                "Access denied to {}. The subreddit may be private or banned.",
                resource
            ),
            FeedError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found.", subreddit)
            }
            FeedError::InvalidToken => {
                "Reddit authentication token is invalid. Re-authenticating.".to_string()
            }
            FeedError::RequestTimeout => "Request to Reddit timed out.".to_string(),
            _ => "Reddit API error occurred. Retrying shortly.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FeedError::AuthenticationFailed { .. } => "FEED_AUTH_FAILED".to_string(),
            FeedError::RateLimitExceeded { .. } => "FEED_RATE_LIMIT".to_string(),
            FeedError::Forbidden { .. } => "FEED_FORBIDDEN".to_string(),
            FeedError::SubredditNotFound { .. } => "FEED_SUBREDDIT_NOT_FOUND".to_string(),
            FeedError::InvalidToken => "FEED_INVALID_TOKEN".to_string(),
            FeedError::RequestTimeout => "FEED_TIMEOUT".to_string(),
            FeedError::ConnectionFailed { .. } => "FEED_CONNECTION_FAILED".to_string(),
            FeedError::InvalidResponse { .. } => "FEED_INVALID_RESPONSE".to_string(),
            FeedError::ServerError { .. } => "FEED_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for StorageError {
    fn log_error(&self) -> &Self {
        error!("StorageError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StorageError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::DatabaseLocked | StorageError::ConnectionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StorageError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StorageError::ConnectionFailed { .. } => {
                "Seen-item database connection failed.".to_string()
            }
            StorageError::DatabaseLocked => "Seen-item database is temporarily busy.".to_string(),
            StorageError::CorruptRecord { id, .. } => {
                format!("Stored record for item {} could not be read.", id)
            }
            _ => "Seen-item database error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            StorageError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            StorageError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            StorageError::DatabaseLocked => "DB_LOCKED".to_string(),
            StorageError::CorruptRecord { .. } => "DB_CORRUPT_RECORD".to_string(),
            StorageError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for NotifierError {
    fn log_error(&self) -> &Self {
        error!("NotifierError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("NotifierError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        // Every failed alert is retried on re-delivery of its item.
        true
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            NotifierError::Timeout { notifier, seconds } => format!(
                "{} did not respond within {} seconds. The alert will be retried.",
                notifier, seconds
            ),
            NotifierError::Rejected {
                notifier,
                status_code,
            } => format!(
                "{} rejected the alert (status {}). The alert will be retried.",
                notifier, status_code
            ),
            _ => "Alert could not be delivered. It will be retried.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            NotifierError::DeliveryFailed { .. } => "NOTIFY_DELIVERY_FAILED".to_string(),
            NotifierError::Rejected { .. } => "NOTIFY_REJECTED".to_string(),
            NotifierError::Timeout { .. } => "NOTIFY_TIMEOUT".to_string(),
            NotifierError::Unavailable { .. } => "NOTIFY_UNAVAILABLE".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need the operator to fix them
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::InvalidFormat { .. } | ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
            ConfigError::PermissionDenied { .. } => {
                "Permission denied accessing configuration. Please check file permissions."
                    .to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::PermissionDenied { .. } => "CONFIG_PERMISSION_DENIED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
