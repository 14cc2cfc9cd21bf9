//! Centralized error handling for the EPG gateway
//!
//! This module unifies error types across the guide providers, the
//! synchronization service and the persistence collaborators so that callers
//! get one consistent error surface.
//!
//! # Error Categories
//!
//! - **Configuration Errors**: missing credentials, malformed provider settings
//! - **Source Errors**: upstream guide service connectivity and parsing
//! - **Repository Errors**: persistence collaborator failures
//! - **Sync Phase Errors**: a failed batched call wrapped with the phase it belongs to
//!
//! # Usage
//!
//! ```rust
//! use epg_gateway::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("username is required"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Repository Results
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
