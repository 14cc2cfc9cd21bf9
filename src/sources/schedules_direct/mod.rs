//! Schedules Direct guide provider
//!
//! Remote schedule service client with the full capability set:
//!
//! - **Refresh**: pulls account status and subscribed lineups, reusing lineup
//!   snapshots whose `modified` stamp is unchanged
//! - **Schedule**: incremental, hash based change detection per
//!   (station, date), see [`sync`]
//! - **Lineups**: coverage, discovery, preview and account subscription
//!
//! Canonical channel ids have the form `I<number>.<stationID>.schedulesdirect.org`.

pub mod api;
pub mod artwork;
pub mod sync;
pub mod transform;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::api::{ChannelMapEntry, Headend, HttpSchedulesDirectApi, SchedulesDirectApi, Station, TokenRequest};
use super::traits::{GuideProvider, LineupCapability, ScheduleOutcome};
use super::{ProviderSettings, ensure_not_cancelled};
use crate::config::defaults::DEFAULT_SCHEDULES_DIRECT_BASE_URL;
use crate::errors::{AppError, AppResult, SourceError};
use crate::models::{
    AvailableLineup, Channel, CoverageArea, Logo, ProgrammeContainer, ProviderConfiguration, ProviderData,
    ProviderKind,
};
use crate::utils::HttpClientFactory;

pub const CHANNEL_ID_SUFFIX: &str = "schedulesdirect.org";

const TOKEN_LIFETIME_HOURS: i64 = 23;

/// Canonical channel id for a provider channel number and station
///
/// Dots inside the number become dashes so the station id is always the
/// second dot-delimited segment.
pub fn channel_id(number: &str, station_id: &str) -> String {
    format!("I{}.{}.{}", number.replace('.', "-"), station_id, CHANNEL_ID_SUFFIX)
}

/// Short station id encoded in a canonical channel id
pub fn station_from_channel_id(channel_id: &str) -> Option<&str> {
    channel_id.split('.').nth(1).filter(|s| !s.is_empty())
}

/// Opaque refresh state: the last seen snapshot of every subscribed lineup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RefreshState {
    lineups: BTreeMap<String, LineupSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LineupSnapshot {
    modified: String,
    map: Vec<ChannelMapEntry>,
    stations: Vec<Station>,
}

fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

pub struct SchedulesDirectProvider {
    configuration: ProviderConfiguration,
    api: Arc<dyn SchedulesDirectApi>,
    settings: ProviderSettings,
    base_url: String,
    username: String,
    password_hash: String,
    token: Option<(String, DateTime<Utc>)>,
    channels: Vec<Channel>,
    stations: HashMap<String, Station>,
    /// station -> date -> schedule hash, as of the last committed sync
    cache: HashMap<String, BTreeMap<String, String>>,
    today: fn() -> NaiveDate,
}

impl SchedulesDirectProvider {
    /// Build a provider talking to the real service
    pub fn from_configuration(
        configuration: ProviderConfiguration,
        http_factory: &HttpClientFactory,
        settings: ProviderSettings,
    ) -> AppResult<Self> {
        let base_url = configuration
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEDULES_DIRECT_BASE_URL.to_string());
        let client = http_factory.create_client_for_service(api::SERVICE_NAME)?;
        let api = Arc::new(HttpSchedulesDirectApi::new(client, &base_url));
        Self::new(configuration, api, settings)
    }

    /// Build a provider over any API implementation
    ///
    /// Fails with a configuration error when credentials are missing.
    pub fn new(
        configuration: ProviderConfiguration,
        api: Arc<dyn SchedulesDirectApi>,
        settings: ProviderSettings,
    ) -> AppResult<Self> {
        let username = configuration
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::configuration(format!("guide source '{}' requires a username", configuration.name))
            })?;
        let password = configuration
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AppError::configuration(format!("guide source '{}' requires a password", configuration.name))
            })?;
        let password_hash = hex::encode(Sha1::digest(password.as_bytes()));
        let base_url = configuration
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEDULES_DIRECT_BASE_URL.to_string());

        Ok(Self {
            configuration,
            api,
            settings,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password_hash,
            token: None,
            channels: Vec::new(),
            stations: HashMap::new(),
            cache: HashMap::new(),
            today: today_utc,
        })
    }

    /// Replace the clock used to anchor the schedule date window
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Return a valid token, logging in when missing or older than 23 hours
    async fn ensure_token(&mut self) -> AppResult<String> {
        if let Some((token, issued_at)) = &self.token
            && Utc::now() - *issued_at < Duration::hours(TOKEN_LIFETIME_HOURS)
        {
            return Ok(token.clone());
        }

        debug!("Requesting Schedules Direct token for guide source '{}'", self.configuration.name);
        let response = self
            .api
            .token(&TokenRequest {
                username: self.username.clone(),
                password: self.password_hash.clone(),
            })
            .await?;

        match response.token.filter(|t| response.code == 0 && !t.is_empty()) {
            Some(token) => {
                self.token = Some((token.clone(), Utc::now()));
                Ok(token)
            }
            None => Err(AppError::Source(SourceError::auth_failed(
                api::SERVICE_NAME,
                response
                    .message
                    .unwrap_or_else(|| format!("token request failed with code {}", response.code)),
            ))),
        }
    }

    fn decode_refresh_state(&self, last_state: Option<&[u8]>) -> Option<RefreshState> {
        let bytes = last_state.filter(|b| !b.is_empty())?;
        match ProviderData::from_bytes(bytes).and_then(|data| data.decode(ProviderKind::SchedulesDirect)) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(
                    "Ignoring unreadable refresh state for guide source '{}': {}",
                    self.configuration.name, e
                );
                None
            }
        }
    }

    fn build_channels(state: &RefreshState) -> (Vec<Channel>, HashMap<String, Station>) {
        let mut stations = HashMap::new();
        for snapshot in state.lineups.values() {
            for station in &snapshot.stations {
                stations
                    .entry(station.station_id.clone())
                    .or_insert_with(|| station.clone());
            }
        }

        let mut seen = HashSet::new();
        let mut channels = Vec::new();
        for (lineup_id, snapshot) in &state.lineups {
            for entry in &snapshot.map {
                let number = entry.number();
                let id = channel_id(&number, &entry.station_id);
                if !seen.insert(id.clone()) {
                    continue;
                }
                let station = stations.get(&entry.station_id);
                channels.push(Channel {
                    id,
                    name: station.map(|s| s.name.clone()).unwrap_or_default(),
                    number,
                    call_sign: station.map(|s| s.callsign.clone()).unwrap_or_default(),
                    logos: station.map(station_logos).unwrap_or_default(),
                    lineup: lineup_id.clone(),
                    affiliate: station.and_then(|s| s.affiliate.clone()).unwrap_or_default(),
                    provider_data: None,
                });
            }
        }
        (channels, stations)
    }

    async fn change_lineup(&mut self, lineup_id: &str, subscribe: bool) -> AppResult<bool> {
        let token = self.ensure_token().await?;
        let result = if subscribe {
            self.api.add_lineup(&token, lineup_id).await
        } else {
            self.api.delete_lineup(&token, lineup_id).await
        };
        let action = if subscribe { "subscribe to" } else { "unsubscribe from" };
        match result {
            Ok(response) if response.code == 0 => {
                info!(
                    "Guide source '{}': {} lineup {} ({} changes remaining)",
                    self.configuration.name,
                    if subscribe { "subscribed to" } else { "unsubscribed from" },
                    lineup_id,
                    response
                        .changes_remaining
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                );
                Ok(true)
            }
            Ok(response) => {
                warn!(
                    "Guide source '{}': could not {} lineup {}: {}",
                    self.configuration.name,
                    action,
                    lineup_id,
                    response.message.unwrap_or(response.response)
                );
                Ok(false)
            }
            Err(AppError::Source(SourceError::Upstream { code, message })) => {
                warn!(
                    "Guide source '{}': could not {} lineup {}: code {} {}",
                    self.configuration.name, action, lineup_id, code, message
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn station_logos(station: &Station) -> Vec<Logo> {
    let to_logo = |l: &api::StationLogo| Logo {
        url: l.url.clone(),
        width: l.width.unwrap_or_default(),
        height: l.height.unwrap_or_default(),
    };
    if station.station_logo.is_empty() {
        station.logo.iter().map(to_logo).collect()
    } else {
        station.station_logo.iter().map(to_logo).collect()
    }
}

#[async_trait]
impl LineupCapability for SchedulesDirectProvider {
    async fn lineup_coverage(&mut self) -> AppResult<Vec<CoverageArea>> {
        let token = self.ensure_token().await?;
        let countries = self.api.countries(&token).await?;
        let mut areas: Vec<CoverageArea> = countries
            .into_iter()
            .flat_map(|(region, countries)| {
                countries.into_iter().map(move |c| CoverageArea {
                    region: region.clone(),
                    country: c.full_name,
                    short_name: c.short_name,
                    postal_code_example: c.postal_code_example,
                    postal_code_pattern: c.postal_code,
                    one_postal_code: c.one_postal_code,
                })
            })
            .collect();
        areas.sort_by(|a, b| a.region.cmp(&b.region).then_with(|| a.country.cmp(&b.country)));
        Ok(areas)
    }

    async fn available_lineups(
        &mut self,
        country_code: &str,
        postal_code: &str,
    ) -> AppResult<Vec<AvailableLineup>> {
        let token = self.ensure_token().await?;
        let headends = self.api.headends(&token, country_code, postal_code).await?;
        Ok(headends
            .into_iter()
            .flat_map(|headend| {
                let Headend {
                    headend: name,
                    transport,
                    location,
                    lineups,
                } = headend;
                lineups.into_iter().map(move |l| AvailableLineup {
                    id: l.lineup,
                    name: l.name,
                    transport: transport.clone(),
                    location: location.clone(),
                    headend: name.clone(),
                })
            })
            .collect())
    }

    async fn preview_lineup_channels(&mut self, lineup_id: &str) -> AppResult<Vec<Channel>> {
        let token = self.ensure_token().await?;
        let preview = self.api.preview_lineup(&token, lineup_id).await?;
        // Previews carry no station ids, so these are not guide channels
        Ok(preview
            .into_iter()
            .map(|p| Channel {
                id: String::new(),
                name: p.name,
                number: p.channel,
                call_sign: p.callsign,
                logos: Vec::new(),
                lineup: lineup_id.to_string(),
                affiliate: p.affiliate.unwrap_or_default(),
                provider_data: None,
            })
            .collect())
    }

    async fn subscribe_to_lineup(&mut self, lineup_id: &str) -> AppResult<bool> {
        self.change_lineup(lineup_id, true).await
    }

    async fn unsubscribe_from_lineup(&mut self, lineup_id: &str) -> AppResult<bool> {
        self.change_lineup(lineup_id, false).await
    }
}

#[async_trait]
impl GuideProvider for SchedulesDirectProvider {
    fn name(&self) -> &str {
        &self.configuration.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::SchedulesDirect
    }

    fn channels(&self) -> AppResult<Vec<Channel>> {
        Ok(self.channels.clone())
    }

    fn configuration(&self) -> &ProviderConfiguration {
        &self.configuration
    }

    async fn refresh(&mut self, last_state: Option<&[u8]>, cancel: &CancellationToken) -> AppResult<Vec<u8>> {
        ensure_not_cancelled(cancel, "schedules direct refresh")?;
        let previous = self.decode_refresh_state(last_state).unwrap_or_default();

        let token = self.ensure_token().await?;
        let status = self.api.status(&token).await?;
        if status.code != 0 {
            return Err(AppError::Source(SourceError::Upstream {
                code: status.code,
                message: "account status unavailable".to_string(),
            }));
        }

        let mut state = RefreshState::default();
        let mut reused = 0usize;
        for lineup in status.lineups.iter().filter(|l| !l.is_deleted) {
            if let Some(snapshot) = previous.lineups.get(&lineup.lineup)
                && !lineup.modified.is_empty()
                && snapshot.modified == lineup.modified
            {
                state.lineups.insert(lineup.lineup.clone(), snapshot.clone());
                reused += 1;
                continue;
            }

            ensure_not_cancelled(cancel, "schedules direct refresh")?;
            let response = self.api.lineup(&token, &lineup.lineup).await?;
            let modified = if lineup.modified.is_empty() {
                response.metadata.map(|m| m.modified).unwrap_or_default()
            } else {
                lineup.modified.clone()
            };
            state.lineups.insert(
                lineup.lineup.clone(),
                LineupSnapshot {
                    modified,
                    map: response.map,
                    stations: response.stations,
                },
            );
        }

        let (channels, stations) = Self::build_channels(&state);
        info!(
            "Refreshed guide source '{}': {} lineups ({} unchanged), {} channels",
            self.configuration.name,
            state.lineups.len(),
            reused,
            channels.len()
        );
        self.channels = channels;
        self.stations = stations;

        ProviderData::encode(ProviderKind::SchedulesDirect, &state)?.to_bytes()
    }

    async fn schedule(
        &mut self,
        days_to_get: u32,
        input_channels: &[Channel],
        input_programmes: &[ProgrammeContainer],
        cancel: &CancellationToken,
    ) -> AppResult<ScheduleOutcome> {
        self.synchronize(days_to_get, input_channels, input_programmes, cancel)
            .await
    }

    fn supports_lineups(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_is_stable_and_station_is_second_segment() {
        let first = channel_id("4.1", "10001");
        let second = channel_id("4.1", "10001");
        assert_eq!(first, second);
        assert_eq!(first, "I4-1.10001.schedulesdirect.org");
        assert_eq!(station_from_channel_id(&first), Some("10001"));
    }

    #[test]
    fn test_station_from_malformed_id() {
        assert_eq!(station_from_channel_id("nodots"), None);
        assert_eq!(station_from_channel_id("I4..schedulesdirect.org"), None);
    }

    #[test]
    fn test_station_logos_prefer_station_logo_list() {
        let station = Station {
            station_id: "1".into(),
            logo: Some(api::StationLogo {
                url: "old.png".into(),
                ..Default::default()
            }),
            station_logo: vec![api::StationLogo {
                url: "new.png".into(),
                width: Some(360),
                height: Some(270),
            }],
            ..Default::default()
        };
        let logos = station_logos(&station);
        assert_eq!(logos.len(), 1);
        assert_eq!(logos[0].url, "new.png");
        assert_eq!(logos[0].width, 360);
    }
}
