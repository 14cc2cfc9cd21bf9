//! Guide synchronization service
//!
//! [`SyncContext`] is the one object callers hold: it owns the store, the
//! provider factory, settings, metrics and the live provider instances keyed
//! by guide source id. Each provider sits behind its own mutex so a guide
//! source is synchronized by one task at a time while different sources run
//! concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, GuideConfig, GuideSourceConfig, LineupConfig};
use crate::errors::{AppError, AppResult};
use crate::lineup::{self, LineupComposition};
use crate::matcher::{ChannelMatcher, MatchSettings};
use crate::models::{AvailableLineup, Channel, CoverageArea, GuideSource, ProviderConfiguration};
use crate::observability::GuideMetrics;
use crate::repositories::GuideStore;
use crate::sources::{GuideProvider, GuideProviderFactory, ProviderSettings, ScheduleStats};
use crate::utils::HttpClientFactory;

type SharedProvider = Arc<Mutex<Box<dyn GuideProvider>>>;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub days_to_get: u32,
    /// Only schedule channels a lineup channel references
    pub only_active_channels: bool,
}

impl SyncSettings {
    pub fn from_config(config: &GuideConfig) -> Self {
        Self {
            days_to_get: config.days_to_get,
            only_active_channels: config.only_active_channels,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&GuideConfig::default())
    }
}

/// A per-channel state write that failed; the rest of the run still counts
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStateFailure {
    pub channel_id: String,
    pub error: String,
}

/// Outcome of one synchronization run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub guide_source_id: Uuid,
    pub guide_source_name: String,
    /// Channels in the refreshed catalog
    pub channels_refreshed: usize,
    /// Channels handed to `schedule`
    pub channels_scheduled: usize,
    pub programmes_upserted: usize,
    pub channel_states_saved: usize,
    pub channel_state_failures: Vec<ChannelStateFailure>,
    pub stats: ScheduleStats,
    pub duration: Duration,
}

pub struct SyncContext {
    store: Arc<dyn GuideStore>,
    factory: GuideProviderFactory,
    settings: SyncSettings,
    matcher: ChannelMatcher,
    metrics: GuideMetrics,
    lineup_defaults: LineupConfig,
    providers: Mutex<HashMap<Uuid, SharedProvider>>,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn GuideStore>,
        factory: GuideProviderFactory,
        settings: SyncSettings,
        matcher: ChannelMatcher,
        metrics: GuideMetrics,
    ) -> Self {
        Self {
            store,
            factory,
            settings,
            matcher,
            metrics,
            lineup_defaults: LineupConfig::default(),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Address and port for lineups stored without their own
    pub fn with_lineup_defaults(mut self, defaults: LineupConfig) -> Self {
        self.lineup_defaults = defaults;
        self
    }

    pub fn from_config(config: &Config, store: Arc<dyn GuideStore>, metrics: GuideMetrics) -> Self {
        let factory = GuideProviderFactory::new(
            HttpClientFactory::from_config(&config.http),
            ProviderSettings::from_config(&config.guide),
        );
        Self::new(
            store,
            factory,
            SyncSettings::from_config(&config.guide),
            ChannelMatcher::new(MatchSettings::from_config(&config.matcher)),
            metrics,
        )
        .with_lineup_defaults(config.lineup.clone())
    }

    pub fn store(&self) -> &Arc<dyn GuideStore> {
        &self.store
    }

    /// Insert or update a guide source, keeping its stored refresh state
    ///
    /// A live provider for the source is dropped so the next call rebuilds it
    /// from the new configuration.
    pub async fn register_guide_source(&self, id: Uuid, configuration: ProviderConfiguration) -> AppResult<()> {
        debug!("Registering guide source '{}' ({})", configuration.name, id);
        self.store
            .upsert_guide_source(GuideSource::new(id, configuration))
            .await?;
        self.providers.lock().await.remove(&id);
        Ok(())
    }

    pub async fn register_guide_sources(&self, sources: &[GuideSourceConfig]) -> AppResult<()> {
        for source in sources {
            self.register_guide_source(source.source_id(), source.provider.clone())
                .await?;
        }
        Ok(())
    }

    /// Use a prebuilt provider for a registered guide source instead of the factory
    pub async fn attach_provider(&self, id: Uuid, provider: Box<dyn GuideProvider>) {
        self.providers
            .lock()
            .await
            .insert(id, Arc::new(Mutex::new(provider)));
    }

    async fn guide_source(&self, id: Uuid) -> AppResult<GuideSource> {
        self.store
            .find_guide_source(id)
            .await?
            .ok_or_else(|| AppError::not_found("guide source", id.to_string()))
    }

    /// The live provider for a guide source, created on first use
    async fn provider(&self, id: Uuid) -> AppResult<SharedProvider> {
        let mut providers = self.providers.lock().await;
        if let Some(provider) = providers.get(&id) {
            return Ok(provider.clone());
        }

        let source = self.guide_source(id).await?;
        let provider: SharedProvider = Arc::new(Mutex::new(self.factory.get_provider(&source.configuration)?));
        providers.insert(id, provider.clone());
        Ok(provider)
    }

    /// Refresh then schedule one guide source and persist the results
    pub async fn synchronize(&self, id: Uuid, cancel: &CancellationToken) -> AppResult<SyncReport> {
        let source = self.guide_source(id).await?;
        let name = source.configuration.name.clone();
        let span = info_span!("guide_sync", guide_source = %name, guide_source_id = %id);

        let result = async {
            let provider = self.provider(id).await?;
            let mut provider = provider.lock().await;
            self.run(&source, &mut **provider, cancel).await
        }
        .instrument(span)
        .await;

        match &result {
            Ok(report) => {
                self.metrics.record_success(&name, report);
                info!(
                    "Synchronized guide source '{}' in {:?}: {} channels scheduled, {} programmes upserted, {} channel state failures",
                    name,
                    report.duration,
                    report.channels_scheduled,
                    report.programmes_upserted,
                    report.channel_state_failures.len()
                );
            }
            Err(e) => {
                self.metrics.record_failure(&name);
                error!("Synchronization of guide source '{}' failed: {}", name, e);
            }
        }
        result
    }

    /// Synchronize every stored guide source concurrently
    pub async fn synchronize_all(&self, cancel: &CancellationToken) -> AppResult<Vec<(Uuid, AppResult<SyncReport>)>> {
        let sources = self.store.list_guide_sources().await?;
        let runs = sources.iter().map(|source| async move {
            let result = self.synchronize(source.id, cancel).await;
            (source.id, result)
        });
        Ok(join_all(runs).await)
    }

    async fn run(
        &self,
        source: &GuideSource,
        provider: &mut dyn GuideProvider,
        cancel: &CancellationToken,
    ) -> AppResult<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport {
            guide_source_id: source.id,
            guide_source_name: source.configuration.name.clone(),
            ..Default::default()
        };

        let state = provider.refresh(source.provider_state.as_deref(), cancel).await?;
        self.store.save_provider_state(source.id, state, Utc::now()).await?;

        let catalog = provider.channels()?;
        report.channels_refreshed = catalog.len();
        self.store.upsert_guide_channels(source.id, &catalog).await?;

        let stored = self
            .store
            .list_guide_channels(source.id, self.settings.only_active_channels)
            .await?;
        let mut input_channels = Vec::with_capacity(stored.len());
        for guide_channel in stored {
            match guide_channel.channel() {
                Ok(channel) => input_channels.push(channel),
                Err(e) => warn!("Skipping unreadable guide channel {}: {}", guide_channel.xmltv_id, e),
            }
        }
        report.channels_scheduled = input_channels.len();

        let input_programmes = self.store.active_programmes(source.id).await?;
        debug!(
            "Scheduling {} channels with {} known programmes",
            input_channels.len(),
            input_programmes.len()
        );
        let outcome = provider
            .schedule(self.settings.days_to_get, &input_channels, &input_programmes, cancel)
            .await?;
        report.stats = outcome.stats;

        // Programmes land before the channel caches move forward
        if !outcome.programmes.is_empty() {
            report.programmes_upserted = self.store.upsert_programmes(source.id, &outcome.programmes).await?;
        }

        let states: BTreeMap<_, _> = outcome.channel_state.into_iter().collect();
        for (channel_id, state) in states {
            match self.store.save_channel_state(source.id, &channel_id, state).await {
                Ok(()) => report.channel_states_saved += 1,
                Err(e) => {
                    warn!("Failed to save provider state for channel {}: {}", channel_id, e);
                    report.channel_state_failures.push(ChannelStateFailure {
                        channel_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    /// Rank the stored channels of a guide source by name similarity
    pub async fn match_channels(&self, id: Uuid, name: &str) -> AppResult<Vec<Channel>> {
        let source = self.guide_source(id).await?;
        let stored = self.store.list_guide_channels(id, false).await?;
        let channels: Vec<Channel> = stored
            .iter()
            .filter_map(|c| match c.channel() {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!("Skipping unreadable guide channel {}: {}", c.xmltv_id, e);
                    None
                }
            })
            .collect();

        let matches = self.matcher.find(&channels, name);
        debug!(
            "Matched '{}' against {} channels of guide source '{}': {} results",
            name,
            channels.len(),
            source.configuration.name,
            matches.len()
        );
        Ok(matches)
    }

    pub async fn supports_lineups(&self, id: Uuid) -> AppResult<bool> {
        let provider = self.provider(id).await?;
        let provider = provider.lock().await;
        Ok(provider.supports_lineups())
    }

    pub async fn lineup_coverage(&self, id: Uuid) -> AppResult<Vec<CoverageArea>> {
        let provider = self.provider(id).await?;
        let mut provider = provider.lock().await;
        if !provider.supports_lineups() {
            debug!("Guide source {} has no lineup support", id);
            return Ok(Vec::new());
        }
        provider.lineup_coverage().await
    }

    pub async fn available_lineups(
        &self,
        id: Uuid,
        country_code: &str,
        postal_code: &str,
    ) -> AppResult<Vec<AvailableLineup>> {
        let provider = self.provider(id).await?;
        let mut provider = provider.lock().await;
        if !provider.supports_lineups() {
            return Ok(Vec::new());
        }
        provider.available_lineups(country_code, postal_code).await
    }

    pub async fn preview_lineup_channels(&self, id: Uuid, lineup_id: &str) -> AppResult<Vec<Channel>> {
        let provider = self.provider(id).await?;
        let mut provider = provider.lock().await;
        if !provider.supports_lineups() {
            return Ok(Vec::new());
        }
        provider.preview_lineup_channels(lineup_id).await
    }

    pub async fn subscribe_to_lineup(&self, id: Uuid, lineup_id: &str) -> AppResult<bool> {
        let provider = self.provider(id).await?;
        let mut provider = provider.lock().await;
        if !provider.supports_lineups() {
            return Ok(false);
        }
        provider.subscribe_to_lineup(lineup_id).await
    }

    pub async fn unsubscribe_from_lineup(&self, id: Uuid, lineup_id: &str) -> AppResult<bool> {
        let provider = self.provider(id).await?;
        let mut provider = provider.lock().await;
        if !provider.supports_lineups() {
            return Ok(false);
        }
        provider.unsubscribe_from_lineup(lineup_id).await
    }

    pub async fn compose_lineup(&self, lineup_id: Uuid) -> AppResult<LineupComposition> {
        lineup::compose_lineup(self.store.as_ref(), lineup_id, &self.lineup_defaults).await
    }
}
