//! Persistence collaborators
//!
//! The engine reads and writes guide sources, guide channels, programmes and
//! lineups through the traits in [`traits`]. [`memory::MemoryGuideStore`] is
//! the bundled implementation, kept in memory and snapshotted to JSON.

pub mod memory;
pub mod traits;

pub use memory::{MemoryGuideStore, StoreSnapshot};
pub use traits::{GuideChannelRepository, GuideSourceRepository, GuideStore, LineupRepository, ProgrammeRepository};
