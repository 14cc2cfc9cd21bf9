//! Persistence-side join entities and the published tuner lineup record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Channel, ProviderConfiguration, ProviderData};
use crate::errors::RepositoryError;

/// A configured guide source and its opaque refresh state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideSource {
    pub id: Uuid,
    pub configuration: ProviderConfiguration,
    /// Bytes returned by the provider's last refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl GuideSource {
    pub fn new(id: Uuid, configuration: ProviderConfiguration) -> Self {
        Self {
            id,
            configuration,
            provider_state: None,
            last_refreshed_at: None,
        }
    }
}

/// A playable stream from a video provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSourceTrack {
    pub id: Uuid,
    pub video_source_id: Uuid,
    pub name: String,
    /// Key used by the stream relay to fetch the stream
    pub stream_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// A guide channel as persisted for a guide source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideSourceChannel {
    pub id: Uuid,
    pub guide_source_id: Uuid,
    /// Canonical `Channel::id`
    pub xmltv_id: String,
    /// The canonical channel, stored as JSON
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<ProviderData>,
}

impl GuideSourceChannel {
    pub fn from_channel(id: Uuid, guide_source_id: Uuid, channel: &Channel) -> Result<Self, RepositoryError> {
        let mut stored = channel.clone();
        let provider_data = stored.provider_data.take();
        Ok(Self {
            id,
            guide_source_id,
            xmltv_id: channel.id.clone(),
            data: serde_json::to_value(&stored)?,
            provider_data,
        })
    }

    /// The canonical channel with the per-channel provider data reattached
    pub fn channel(&self) -> Result<Channel, RepositoryError> {
        let mut channel: Channel = serde_json::from_value(self.data.clone())?;
        channel.provider_data = self.provider_data.clone();
        Ok(channel)
    }
}

/// An operator-defined tuner lineup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lineup {
    pub id: Uuid,
    pub name: String,
    pub listen_address: String,
    pub port: u16,
}

/// The numbering and branding the operator assigned to one lineup slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineupChannel {
    pub id: Uuid,
    pub lineup_id: Uuid,
    pub title: String,
    pub channel_number: String,
    pub video_track_id: Uuid,
    pub guide_channel_id: Uuid,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub hd: bool,
}

/// A lineup channel joined with the entities it references
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedLineupChannel {
    pub lineup_channel: LineupChannel,
    pub video_track: VideoSourceTrack,
    pub guide_channel: GuideSourceChannel,
    pub listen_address: String,
    pub port: u16,
}

/// One entry of the virtual tuner's `lineup.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct TunerLineupEntry {
    pub guide_number: String,
    pub guide_name: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "HD", with = "flag")]
    pub hd: bool,
    #[serde(with = "flag")]
    pub favorite: bool,
    #[serde(rename = "DRM", with = "flag")]
    pub drm: bool,
}

/// Tuner clients expect 0/1 integers for flags
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(deserializer)? != 0)
    }
}
