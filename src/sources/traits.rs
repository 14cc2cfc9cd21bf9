//! Guide provider trait definitions
//!
//! Every guide provider exposes the same capability set. Lineup discovery and
//! subscription live in the [`LineupCapability`] sub-trait; it is always
//! implemented, but callers must check [`GuideProvider::supports_lineups`]
//! before relying on it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::AppResult;
use crate::models::{
    AvailableLineup, Channel, CoverageArea, ProgrammeContainer, ProviderConfiguration, ProviderData,
    ProviderKind,
};

/// Counters describing the work a `schedule` call performed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub stations_checked: usize,
    pub station_days_fetched: usize,
    pub programs_fetched: usize,
    pub artwork_fetched: usize,
    pub airings_skipped: usize,
    pub unchanged_dropped: usize,
}

/// Result of a `schedule` call
#[derive(Debug, Clone, Default)]
pub struct ScheduleOutcome {
    /// New opaque state per canonical channel id, to persist on the channel
    pub channel_state: HashMap<String, ProviderData>,
    /// Programmes that are new or changed relative to the inputs
    pub programmes: Vec<ProgrammeContainer>,
    pub stats: ScheduleStats,
}

/// Regional lineup discovery and account subscription
#[async_trait]
pub trait LineupCapability: Send + Sync {
    /// Regions where lineups can be discovered
    async fn lineup_coverage(&mut self) -> AppResult<Vec<CoverageArea>>;

    /// Lineups offered for a country and postal code
    async fn available_lineups(
        &mut self,
        country_code: &str,
        postal_code: &str,
    ) -> AppResult<Vec<AvailableLineup>>;

    /// Channels carried by a lineup, without subscribing to it
    async fn preview_lineup_channels(&mut self, lineup_id: &str) -> AppResult<Vec<Channel>>;

    /// Add a lineup to the account; `false` when the provider declined
    async fn subscribe_to_lineup(&mut self, lineup_id: &str) -> AppResult<bool>;

    /// Remove a lineup from the account; `false` when the provider declined
    async fn unsubscribe_from_lineup(&mut self, lineup_id: &str) -> AppResult<bool>;
}

/// Core guide provider trait
///
/// Instances are stateful and not safe for concurrent mutation; the
/// synchronization context confines each one behind a mutex.
#[async_trait]
pub trait GuideProvider: LineupCapability {
    /// Human label, side-effect free
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// The last-known channel catalog; never performs network I/O
    fn channels(&self) -> AppResult<Vec<Channel>>;

    /// Backing settings, for persistence round-trips
    fn configuration(&self) -> &ProviderConfiguration;

    /// Pull the top-level catalog and update [`GuideProvider::channels`]
    ///
    /// `last_state` is the value returned by a previous refresh; `None`
    /// forces a full pull. Returns the new opaque state.
    async fn refresh(
        &mut self,
        last_state: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<u8>>;

    /// Fetch programme data for `days_to_get` days starting today
    async fn schedule(
        &mut self,
        days_to_get: u32,
        input_channels: &[Channel],
        input_programmes: &[ProgrammeContainer],
        cancel: &CancellationToken,
    ) -> AppResult<ScheduleOutcome>;

    fn supports_lineups(&self) -> bool {
        false
    }
}
