//! Error type definitions for the EPG gateway
//!
//! A hierarchical error system: `AppError` at the top, with dedicated enums
//! for upstream sources and the persistence layer.

use std::fmt;

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Source handling errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors, fatal to provider construction
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// External service errors
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// A schedule synchronization phase failed
    #[error("{phase} failed: {source}")]
    SyncPhase {
        phase: SyncPhase,
        #[source]
        source: Box<AppError>,
    },

    /// The operation was cancelled by the caller
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The batched network phases of an incremental schedule sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    ChangeDetection,
    ScheduleFetch,
    MetadataFetch,
    ArtworkFetch,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::ChangeDetection => "change detection",
            SyncPhase::ScheduleFetch => "schedule fetch",
            SyncPhase::MetadataFetch => "metadata fetch",
            SyncPhase::ArtworkFetch => "artwork fetch",
        };
        f.write_str(label)
    }
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Constraint violations (unique, foreign key, etc.)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// Snapshot file could not be read or written
    #[error("Storage IO failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Source handling specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network connection timeouts
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Authentication failures
    #[error("Authentication failed: {source_type} - {message}")]
    AuthenticationFailed { source_type: String, message: String },

    /// Invalid source configuration
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    /// Parsing errors for source data
    #[error("Parse error: {source_type} - {message}")]
    ParseError { source_type: String, message: String },

    /// Unsupported source features
    #[error("Unsupported feature: {feature} for {source_type}")]
    UnsupportedFeature { feature: String, source_type: String },

    /// HTTP errors from external sources
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Application level error code reported by the upstream service
    #[error("Upstream error {code}: {message}")]
    Upstream { code: i64, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create an external service error
    pub fn external_service<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a source error
    pub fn source_error<S: Into<String>>(message: S) -> Self {
        Self::Source(SourceError::InvalidConfig {
            field: "general".to_string(),
            message: message.into(),
        })
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Wrap an error with the sync phase it occurred in
    pub fn in_phase(self, phase: SyncPhase) -> Self {
        Self::SyncPhase {
            phase,
            source: Box::new(self),
        }
    }

    /// The sync phase this error was raised in, if any
    pub fn phase(&self) -> Option<SyncPhase> {
        match self {
            Self::SyncPhase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl SourceError {
    /// Create an authentication failed error
    pub fn auth_failed<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::AuthenticationFailed {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }
}
