//! Repository trait definitions
//!
//! The synchronization engine never talks to a database directly. It reads
//! and writes through these traits, one per aggregate, so the relational
//! layer of the gateway and the in-memory store used by the CLI and tests
//! are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryResult;
use crate::models::{
    Channel, GuideSource, GuideSourceChannel, Lineup, LineupChannel, ProgrammeContainer, ProviderData,
    VideoSourceTrack,
};

/// Guide sources and their opaque refresh state
#[async_trait]
pub trait GuideSourceRepository: Send + Sync {
    async fn find_guide_source(&self, id: Uuid) -> RepositoryResult<Option<GuideSource>>;

    async fn list_guide_sources(&self) -> RepositoryResult<Vec<GuideSource>>;

    /// Insert or replace a guide source, keeping stored state when the
    /// incoming record carries none
    async fn upsert_guide_source(&self, source: GuideSource) -> RepositoryResult<()>;

    /// Store the bytes returned by a provider refresh, verbatim
    async fn save_provider_state(
        &self,
        id: Uuid,
        state: Vec<u8>,
        refreshed_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;
}

/// Canonical guide channels per guide source
#[async_trait]
pub trait GuideChannelRepository: Send + Sync {
    async fn find_guide_channel(&self, id: Uuid) -> RepositoryResult<Option<GuideSourceChannel>>;

    /// Channels of a guide source; with `active_only`, only those a lineup
    /// channel references
    async fn list_guide_channels(
        &self,
        guide_source_id: Uuid,
        active_only: bool,
    ) -> RepositoryResult<Vec<GuideSourceChannel>>;

    /// Upsert the refreshed catalog by canonical id
    ///
    /// Existing per-channel provider data is preserved; it is only replaced
    /// through [`GuideChannelRepository::save_channel_state`].
    async fn upsert_guide_channels(&self, guide_source_id: Uuid, channels: &[Channel]) -> RepositoryResult<usize>;

    async fn save_channel_state(
        &self,
        guide_source_id: Uuid,
        xmltv_id: &str,
        state: ProviderData,
    ) -> RepositoryResult<()>;
}

/// Programmes produced by guide providers
#[async_trait]
pub trait ProgrammeRepository: Send + Sync {
    /// Programmes linked to the active channels of a guide source
    async fn active_programmes(&self, guide_source_id: Uuid) -> RepositoryResult<Vec<ProgrammeContainer>>;

    /// Upsert by (channel, programme id, start)
    async fn upsert_programmes(
        &self,
        guide_source_id: Uuid,
        programmes: &[ProgrammeContainer],
    ) -> RepositoryResult<usize>;
}

/// Operator lineups and the video tracks they reference
#[async_trait]
pub trait LineupRepository: Send + Sync {
    async fn find_lineup(&self, id: Uuid) -> RepositoryResult<Option<Lineup>>;

    async fn list_lineup_channels(&self, lineup_id: Uuid) -> RepositoryResult<Vec<LineupChannel>>;

    async fn find_video_track(&self, id: Uuid) -> RepositoryResult<Option<VideoSourceTrack>>;
}

/// Everything the synchronization context needs from persistence
pub trait GuideStore: GuideSourceRepository + GuideChannelRepository + ProgrammeRepository + LineupRepository {}

impl<T> GuideStore for T where
    T: GuideSourceRepository + GuideChannelRepository + ProgrammeRepository + LineupRepository
{
}
