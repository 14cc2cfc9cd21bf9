//! Service layer
//!
//! Business logic that ties providers, persistence and metrics together.

pub mod guide_sync;

pub use guide_sync::{ChannelStateFailure, SyncContext, SyncReport, SyncSettings};
