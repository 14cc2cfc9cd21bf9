//! In-memory guide store with an optional JSON snapshot file
//!
//! Backs the CLI and the integration tests. All data lives behind one
//! `tokio::sync::RwLock`; `persist` writes the whole snapshot through a
//! temporary file and a rename so a crash never leaves a truncated file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{GuideChannelRepository, GuideSourceRepository, LineupRepository, ProgrammeRepository};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{
    Channel, GuideSource, GuideSourceChannel, Lineup, LineupChannel, ProgrammeContainer, ProviderData,
    VideoSourceTrack,
};
use crate::utils::deterministic_uuid::generate_guide_channel_uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub guide_sources: BTreeMap<Uuid, GuideSource>,
    #[serde(default)]
    pub guide_channels: BTreeMap<Uuid, GuideSourceChannel>,
    /// guide source id -> programmes
    #[serde(default)]
    pub programmes: BTreeMap<Uuid, Vec<ProgrammeContainer>>,
    #[serde(default)]
    pub lineups: BTreeMap<Uuid, Lineup>,
    #[serde(default)]
    pub lineup_channels: Vec<LineupChannel>,
    #[serde(default)]
    pub video_tracks: BTreeMap<Uuid, VideoSourceTrack>,
}

impl StoreSnapshot {
    fn active_channel_ids(&self) -> HashSet<Uuid> {
        self.lineup_channels.iter().map(|lc| lc.guide_channel_id).collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryGuideStore {
    inner: RwLock<StoreSnapshot>,
    path: Option<PathBuf>,
}

impl MemoryGuideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading it when the file exists
    pub async fn open<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            let snapshot: StoreSnapshot = serde_json::from_slice(&content)?;
            info!(
                "Loaded guide store from {}: {} guide sources, {} channels",
                path.display(),
                snapshot.guide_sources.len(),
                snapshot.guide_channels.len()
            );
            snapshot
        } else {
            debug!("No guide store at {}, starting empty", path.display());
            StoreSnapshot::default()
        };

        Ok(Self {
            inner: RwLock::new(snapshot),
            path: Some(path),
        })
    }

    /// Write the snapshot file; a no-op for purely in-memory stores
    pub async fn persist(&self) -> RepositoryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = {
            let snapshot = self.inner.read().await;
            serde_json::to_vec_pretty(&*snapshot)?
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;
        debug!("Persisted guide store to {}", path.display());
        Ok(())
    }

    pub async fn insert_lineup(&self, lineup: Lineup) {
        self.inner.write().await.lineups.insert(lineup.id, lineup);
    }

    pub async fn insert_lineup_channel(&self, channel: LineupChannel) {
        let mut inner = self.inner.write().await;
        inner.lineup_channels.retain(|existing| existing.id != channel.id);
        inner.lineup_channels.push(channel);
    }

    pub async fn insert_video_track(&self, track: VideoSourceTrack) {
        self.inner.write().await.video_tracks.insert(track.id, track);
    }

    /// All stored programmes of a guide source, active or not
    pub async fn programmes(&self, guide_source_id: Uuid) -> Vec<ProgrammeContainer> {
        self.inner
            .read()
            .await
            .programmes
            .get(&guide_source_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl GuideSourceRepository for MemoryGuideStore {
    async fn find_guide_source(&self, id: Uuid) -> RepositoryResult<Option<GuideSource>> {
        Ok(self.inner.read().await.guide_sources.get(&id).cloned())
    }

    async fn list_guide_sources(&self) -> RepositoryResult<Vec<GuideSource>> {
        Ok(self.inner.read().await.guide_sources.values().cloned().collect())
    }

    async fn upsert_guide_source(&self, source: GuideSource) -> RepositoryResult<()> {
        let mut inner = self.inner.write().await;
        match inner.guide_sources.get_mut(&source.id) {
            Some(existing) => {
                existing.configuration = source.configuration;
                if source.provider_state.is_some() {
                    existing.provider_state = source.provider_state;
                    existing.last_refreshed_at = source.last_refreshed_at;
                }
            }
            None => {
                inner.guide_sources.insert(source.id, source);
            }
        }
        Ok(())
    }

    async fn save_provider_state(
        &self,
        id: Uuid,
        state: Vec<u8>,
        refreshed_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut inner = self.inner.write().await;
        let source = inner
            .guide_sources
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::RecordNotFound {
                table: "guide_sources".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            })?;
        source.provider_state = Some(state);
        source.last_refreshed_at = Some(refreshed_at);
        Ok(())
    }
}

#[async_trait]
impl GuideChannelRepository for MemoryGuideStore {
    async fn find_guide_channel(&self, id: Uuid) -> RepositoryResult<Option<GuideSourceChannel>> {
        Ok(self.inner.read().await.guide_channels.get(&id).cloned())
    }

    async fn list_guide_channels(
        &self,
        guide_source_id: Uuid,
        active_only: bool,
    ) -> RepositoryResult<Vec<GuideSourceChannel>> {
        let inner = self.inner.read().await;
        let active = inner.active_channel_ids();
        Ok(inner
            .guide_channels
            .values()
            .filter(|c| c.guide_source_id == guide_source_id)
            .filter(|c| !active_only || active.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn upsert_guide_channels(&self, guide_source_id: Uuid, channels: &[Channel]) -> RepositoryResult<usize> {
        let mut inner = self.inner.write().await;
        for channel in channels {
            let id = generate_guide_channel_uuid(&guide_source_id, &channel.id);
            let mut stored = GuideSourceChannel::from_channel(id, guide_source_id, channel)?;
            if let Some(existing) = inner.guide_channels.get(&id)
                && stored.provider_data.is_none()
            {
                stored.provider_data = existing.provider_data.clone();
            }
            inner.guide_channels.insert(id, stored);
        }
        Ok(channels.len())
    }

    async fn save_channel_state(
        &self,
        guide_source_id: Uuid,
        xmltv_id: &str,
        state: ProviderData,
    ) -> RepositoryResult<()> {
        let id = generate_guide_channel_uuid(&guide_source_id, xmltv_id);
        let mut inner = self.inner.write().await;
        let channel = inner
            .guide_channels
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::RecordNotFound {
                table: "guide_channels".to_string(),
                field: "xmltv_id".to_string(),
                value: xmltv_id.to_string(),
            })?;
        channel.provider_data = Some(state);
        Ok(())
    }
}

#[async_trait]
impl ProgrammeRepository for MemoryGuideStore {
    async fn active_programmes(&self, guide_source_id: Uuid) -> RepositoryResult<Vec<ProgrammeContainer>> {
        let inner = self.inner.read().await;
        let active = inner.active_channel_ids();
        let channels: HashSet<&str> = inner
            .guide_channels
            .values()
            .filter(|c| c.guide_source_id == guide_source_id && active.contains(&c.id))
            .map(|c| c.xmltv_id.as_str())
            .collect();

        Ok(inner
            .programmes
            .get(&guide_source_id)
            .map(|programmes| {
                programmes
                    .iter()
                    .filter(|p| channels.contains(p.programme.channel.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_programmes(
        &self,
        guide_source_id: Uuid,
        programmes: &[ProgrammeContainer],
    ) -> RepositoryResult<usize> {
        let mut inner = self.inner.write().await;
        let stored = inner.programmes.entry(guide_source_id).or_default();
        let mut index: HashMap<_, usize> = stored.iter().enumerate().map(|(i, p)| (p.key(), i)).collect();

        for programme in programmes {
            match index.get(&programme.key()) {
                Some(&position) => stored[position] = programme.clone(),
                None => {
                    index.insert(programme.key(), stored.len());
                    stored.push(programme.clone());
                }
            }
        }
        Ok(programmes.len())
    }
}

#[async_trait]
impl LineupRepository for MemoryGuideStore {
    async fn find_lineup(&self, id: Uuid) -> RepositoryResult<Option<Lineup>> {
        Ok(self.inner.read().await.lineups.get(&id).cloned())
    }

    async fn list_lineup_channels(&self, lineup_id: Uuid) -> RepositoryResult<Vec<LineupChannel>> {
        Ok(self
            .inner
            .read()
            .await
            .lineup_channels
            .iter()
            .filter(|lc| lc.lineup_id == lineup_id)
            .cloned()
            .collect())
    }

    async fn find_video_track(&self, id: Uuid) -> RepositoryResult<Option<VideoSourceTrack>> {
        Ok(self.inner.read().await.video_tracks.get(&id).cloned())
    }
}
