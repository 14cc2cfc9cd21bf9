//! Lineup composition
//!
//! Projects the operator's lineup channels into the records the virtual tuner
//! publishes. Each lineup channel is joined with its video track and guide
//! channel; a missing reference fails that channel only.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LineupConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{ComposedLineupChannel, Lineup, LineupChannel, TunerLineupEntry};
use crate::repositories::{GuideChannelRepository, LineupRepository};

/// A lineup channel that could not be composed
#[derive(Debug, Clone, PartialEq)]
pub struct LineupChannelFailure {
    pub lineup_channel_id: Uuid,
    pub channel_number: String,
    pub error: String,
}

/// Result of composing a whole lineup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineupComposition {
    pub entries: Vec<TunerLineupEntry>,
    pub failures: Vec<LineupChannelFailure>,
}

/// Playback URL a tuner client uses for a channel number
pub fn playback_url(listen_address: &str, port: u16, channel_number: &str) -> String {
    format!("http://{listen_address}:{port}/auto/v{channel_number}")
}

/// Join one lineup channel with the entities it references
///
/// A lineup without its own address or port uses `defaults`.
pub async fn compose_channel<S>(
    store: &S,
    lineup: &Lineup,
    lineup_channel: &LineupChannel,
    defaults: &LineupConfig,
) -> AppResult<ComposedLineupChannel>
where
    S: LineupRepository + GuideChannelRepository + ?Sized,
{
    let video_track = store
        .find_video_track(lineup_channel.video_track_id)
        .await?
        .ok_or_else(|| AppError::not_found("video track", lineup_channel.video_track_id.to_string()))?;
    let guide_channel = store
        .find_guide_channel(lineup_channel.guide_channel_id)
        .await?
        .ok_or_else(|| AppError::not_found("guide channel", lineup_channel.guide_channel_id.to_string()))?;

    Ok(ComposedLineupChannel {
        lineup_channel: lineup_channel.clone(),
        video_track,
        guide_channel,
        listen_address: if lineup.listen_address.trim().is_empty() {
            defaults.listen_address.clone()
        } else {
            lineup.listen_address.clone()
        },
        port: if lineup.port == 0 { defaults.port } else { lineup.port },
    })
}

impl ComposedLineupChannel {
    /// The published tuner record; DRM is always off
    pub fn tuner_entry(&self) -> TunerLineupEntry {
        let guide_name = if self.lineup_channel.title.trim().is_empty() {
            self.guide_channel
                .channel()
                .ok()
                .map(|c| c.name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.video_track.name.clone())
        } else {
            self.lineup_channel.title.clone()
        };

        TunerLineupEntry {
            guide_number: self.lineup_channel.channel_number.clone(),
            guide_name,
            url: playback_url(&self.listen_address, self.port, &self.lineup_channel.channel_number),
            hd: self.lineup_channel.hd,
            favorite: self.lineup_channel.favorite,
            drm: false,
        }
    }
}

/// Compose every channel of a lineup
///
/// A missing lineup is an error; a channel whose video track or guide
/// channel cannot be loaded is reported in `failures` and skipped.
pub async fn compose_lineup<S>(store: &S, lineup_id: Uuid, defaults: &LineupConfig) -> AppResult<LineupComposition>
where
    S: LineupRepository + GuideChannelRepository + ?Sized,
{
    let lineup = store
        .find_lineup(lineup_id)
        .await?
        .ok_or_else(|| AppError::not_found("lineup", lineup_id.to_string()))?;
    let channels = store.list_lineup_channels(lineup_id).await?;

    let mut composition = LineupComposition::default();
    for lineup_channel in &channels {
        match compose_channel(store, &lineup, lineup_channel, defaults).await {
            Ok(composed) => composition.entries.push(composed.tuner_entry()),
            Err(e) => {
                warn!(
                    "Lineup '{}': skipping channel {} ({}): {}",
                    lineup.name, lineup_channel.channel_number, lineup_channel.id, e
                );
                composition.failures.push(LineupChannelFailure {
                    lineup_channel_id: lineup_channel.id,
                    channel_number: lineup_channel.channel_number.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    debug!(
        "Composed lineup '{}': {} entries, {} failures",
        lineup.name,
        composition.entries.len(),
        composition.failures.len()
    );
    Ok(composition)
}
