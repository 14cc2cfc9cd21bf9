//! Incremental schedule synchronization
//!
//! Each (station, date) pair has a hash on the service. A sync asks for all
//! hashes in the window in one call, compares them with the cache carried in
//! each channel's provider data and fetches only the pairs that changed:
//!
//! 1. change detection: one `schedules/md5` call
//! 2. schedule fetch: one `schedules` call for the flagged pairs
//! 3. metadata fetch: `programs` in batches
//! 4. artwork fetch: `metadata/programs` in batches
//!
//! New hashes are staged and only committed once every phase succeeded, and
//! only for pairs the service actually returned a schedule for. When nothing
//! changed no fetch is made and every channel keeps its previous state.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{Airing, Artwork, ProgramInfo, Station, StationDates, StationMd5s};
use super::transform::transform_airing;
use super::{SchedulesDirectProvider, artwork, station_from_channel_id};
use crate::errors::{AppResult, SyncPhase};
use crate::models::{Channel, ProgrammeContainer, ProviderData, ProviderKind};
use crate::sources::ensure_not_cancelled;
use crate::sources::traits::ScheduleOutcome;
use crate::utils::UrlUtils;

/// date (`YYYY-MM-DD`) -> schedule hash for one station
pub type StationCache = BTreeMap<String, String>;

/// Hashes attached to every emitted programme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammeHashes {
    pub airing_md5: String,
    pub program_md5: String,
}

/// What a sync has to fetch, and the hashes to commit once it did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchPlan {
    /// station -> flagged dates, window order
    pub fetch: BTreeMap<String, Vec<String>>,
    /// station -> date -> new hash for flagged dates the service hashed
    pub staged: HashMap<String, StationCache>,
}

impl FetchPlan {
    pub fn is_empty(&self) -> bool {
        self.fetch.is_empty()
    }

    pub fn station_days(&self) -> usize {
        self.fetch.values().map(Vec::len).sum()
    }
}

/// `days` consecutive dates starting at `today`
pub fn date_window(today: NaiveDate, days: u32) -> Vec<String> {
    (0..i64::from(days))
        .map(|offset| (today + Duration::days(offset)).format("%Y-%m-%d").to_string())
        .collect()
}

/// Compare upstream hashes with the cache
///
/// A station without a cache is flagged for the whole window, but only its
/// valid hashes are staged. Otherwise a date is flagged when the service
/// reports a valid hash that differs from the cached one, and dates the
/// service reports an error for are left alone.
pub fn plan_fetches<'a>(
    dates: &[String],
    stations: impl IntoIterator<Item = &'a String>,
    previous: &HashMap<String, StationCache>,
    upstream: &HashMap<String, StationMd5s>,
) -> FetchPlan {
    let mut plan = FetchPlan::default();

    for station in stations {
        let cached = previous.get(station);
        let reported = upstream.get(station);
        let mut flagged = Vec::new();
        let mut staged = StationCache::new();

        for date in dates {
            let hash = reported.and_then(|r| r.hash_for(date));
            match (cached, hash) {
                (None, hash) => {
                    flagged.push(date.clone());
                    if let Some(hash) = hash {
                        staged.insert(date.clone(), hash.to_string());
                    }
                }
                (Some(cache), Some(hash)) if cache.get(date).map(String::as_str) != Some(hash) => {
                    flagged.push(date.clone());
                    staged.insert(date.clone(), hash.to_string());
                }
                _ => {}
            }
        }

        if !flagged.is_empty() {
            plan.fetch.insert(station.clone(), flagged);
        }
        if !staged.is_empty() {
            plan.staged.insert(station.clone(), staged);
        }
    }

    plan
}

impl SchedulesDirectProvider {
    fn decode_cache(&self, channel: &Channel) -> Option<StationCache> {
        let data = channel.provider_data.as_ref().filter(|d| !d.is_empty())?;
        match data.decode::<StationCache>(ProviderKind::SchedulesDirect) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(
                    "Ignoring unreadable schedule cache on channel {} of guide source '{}': {}",
                    channel.id, self.configuration.name, e
                );
                None
            }
        }
    }

    pub(super) async fn synchronize(
        &mut self,
        days_to_get: u32,
        input_channels: &[Channel],
        input_programmes: &[ProgrammeContainer],
        cancel: &CancellationToken,
    ) -> AppResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::default();
        let dates = date_window((self.today)(), days_to_get);
        if dates.is_empty() {
            return Ok(outcome);
        }

        let mut station_channels: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut previous: HashMap<String, StationCache> = HashMap::new();
        let mut previous_state: HashMap<String, ProviderData> = HashMap::new();

        for channel in input_channels {
            let Some(station) = station_from_channel_id(&channel.id) else {
                warn!(
                    "Skipping channel with unparsable id '{}' in guide source '{}'",
                    channel.id, self.configuration.name
                );
                continue;
            };
            let ids = station_channels.entry(station.to_string()).or_default();
            if !ids.contains(&channel.id) {
                ids.push(channel.id.clone());
            }

            match self.decode_cache(channel) {
                Some(cache) => {
                    previous.entry(station.to_string()).or_insert(cache);
                    if let Some(data) = &channel.provider_data {
                        previous_state.insert(channel.id.clone(), data.clone());
                    }
                }
                None => {
                    if let Some(cache) = self.cache.get(station) {
                        previous.entry(station.to_string()).or_insert_with(|| cache.clone());
                    }
                }
            }
        }

        if station_channels.is_empty() {
            return Ok(outcome);
        }
        outcome.stats.stations_checked = station_channels.len();

        ensure_not_cancelled(cancel, "schedule change detection")?;
        let token = self
            .ensure_token()
            .await
            .map_err(|e| e.in_phase(SyncPhase::ChangeDetection))?;
        let request: Vec<StationDates> = station_channels
            .keys()
            .map(|station| StationDates {
                station_id: station.clone(),
                dates: dates.clone(),
            })
            .collect();
        let upstream = self
            .api
            .schedule_md5s(&token, &request)
            .await
            .map_err(|e| e.in_phase(SyncPhase::ChangeDetection))?;

        let plan = plan_fetches(&dates, station_channels.keys(), &previous, &upstream);
        if plan.is_empty() {
            debug!(
                "Guide source '{}': no schedule changes across {} stations",
                self.configuration.name,
                station_channels.len()
            );
            for (station, ids) in &station_channels {
                for id in ids {
                    let state = match previous_state.get(id) {
                        Some(data) => data.clone(),
                        None => ProviderData::encode(
                            ProviderKind::SchedulesDirect,
                            &previous.get(station).cloned().unwrap_or_default(),
                        )?,
                    };
                    outcome.channel_state.insert(id.clone(), state);
                }
            }
            return Ok(outcome);
        }

        ensure_not_cancelled(cancel, "schedule fetch")?;
        outcome.stats.station_days_fetched = plan.station_days();
        let request: Vec<StationDates> = plan
            .fetch
            .iter()
            .map(|(station, dates)| StationDates {
                station_id: station.clone(),
                dates: dates.clone(),
            })
            .collect();
        let schedules = self
            .api
            .schedules(&token, &request)
            .await
            .map_err(|e| e.in_phase(SyncPhase::ScheduleFetch))?;

        let mut fetched: HashSet<(String, String)> = HashSet::new();
        let mut airings: Vec<(String, Airing)> = Vec::new();
        for schedule in schedules {
            if schedule.code != 0 {
                warn!(
                    "Guide source '{}': no schedule for station {} (code {}): {}",
                    self.configuration.name,
                    schedule.station_id,
                    schedule.code,
                    schedule.message.unwrap_or_default()
                );
                continue;
            }
            if let Some(metadata) = &schedule.metadata
                && !metadata.start_date.is_empty()
            {
                fetched.insert((schedule.station_id.clone(), metadata.start_date.clone()));
            }
            for airing in schedule.programs {
                airings.push((schedule.station_id.clone(), airing));
            }
        }

        let program_ids: BTreeSet<String> = airings.iter().map(|(_, a)| a.program_id.clone()).collect();
        let programs = self.fetch_programs(&token, &program_ids, cancel).await?;
        outcome.stats.programs_fetched = programs.len();

        let artwork_keys: BTreeSet<String> = programs
            .values()
            .filter(|p| p.declares_artwork())
            .flat_map(|p| artwork::lookup_keys(&p.program_id))
            .collect();
        let artwork = self.fetch_artwork(&token, &artwork_keys, cancel).await?;
        outcome.stats.artwork_fetched = artwork.len();

        let known: HashMap<(String, String, DateTime<Utc>), &ProviderData> = input_programmes
            .iter()
            .filter_map(|c| c.provider_data.as_ref().map(|data| (c.key(), data)))
            .collect();
        let image_base = UrlUtils::endpoint(&self.base_url, "image");
        let unknown_station = Station::default();

        for (station_id, airing) in &airings {
            let Some(channel_ids) = station_channels.get(station_id) else {
                continue;
            };
            let Some(program) = programs.get(&airing.program_id) else {
                debug!(
                    "Skipping airing of {} on station {}: no program metadata",
                    airing.program_id, station_id
                );
                outcome.stats.airings_skipped += 1;
                continue;
            };
            let station = self.stations.get(station_id).unwrap_or(&unknown_station);
            let images = artwork::resolve_artwork(&airing.program_id, &artwork);
            let hashes = ProviderData::encode(
                ProviderKind::SchedulesDirect,
                &ProgrammeHashes {
                    airing_md5: airing.md5.clone(),
                    program_md5: program.md5.clone(),
                },
            )?;

            for channel_id in channel_ids {
                let programme = transform_airing(channel_id, airing, program, &images, station, &image_base);
                let container = ProgrammeContainer {
                    programme,
                    provider_data: Some(hashes.clone()),
                };
                if known.get(&container.key()).is_some_and(|data| **data == hashes) {
                    outcome.stats.unchanged_dropped += 1;
                    continue;
                }
                outcome.programmes.push(container);
            }
        }

        // Refetched stations only carry dates still inside the window
        let window: HashSet<&str> = dates.iter().map(String::as_str).collect();
        let mut committed: HashMap<String, StationCache> = HashMap::new();
        for station in station_channels.keys() {
            let mut cache = previous.get(station).cloned().unwrap_or_default();
            if plan.fetch.contains_key(station) {
                cache.retain(|date, _| window.contains(date.as_str()));
            }
            if let Some(staged) = plan.staged.get(station) {
                for (date, hash) in staged {
                    if fetched.contains(&(station.clone(), date.clone())) {
                        cache.insert(date.clone(), hash.clone());
                    }
                }
            }
            committed.insert(station.clone(), cache);
        }

        for (station, ids) in &station_channels {
            let untouched = !plan.fetch.contains_key(station);
            for id in ids {
                let state = match previous_state.get(id) {
                    Some(data) if untouched => data.clone(),
                    _ => ProviderData::encode(
                        ProviderKind::SchedulesDirect,
                        &committed.get(station).cloned().unwrap_or_default(),
                    )?,
                };
                outcome.channel_state.insert(id.clone(), state);
            }
        }
        self.cache.extend(committed);

        info!(
            "Guide source '{}': fetched {} station days, {} programs, {} artwork sets; {} programmes emitted",
            self.configuration.name,
            outcome.stats.station_days_fetched,
            outcome.stats.programs_fetched,
            outcome.stats.artwork_fetched,
            outcome.programmes.len()
        );
        Ok(outcome)
    }

    async fn fetch_programs(
        &self,
        token: &str,
        program_ids: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> AppResult<HashMap<String, ProgramInfo>> {
        let ids: Vec<String> = program_ids.iter().cloned().collect();
        let mut programs = HashMap::new();
        for chunk in ids.chunks(self.settings.program_batch_size.max(1)) {
            ensure_not_cancelled(cancel, "program metadata fetch")?;
            let batch = self
                .api
                .programs(token, chunk)
                .await
                .map_err(|e| e.in_phase(SyncPhase::MetadataFetch))?;
            for program in batch {
                if program.code != 0 {
                    debug!("Program {} unavailable (code {})", program.program_id, program.code);
                    continue;
                }
                programs.insert(program.program_id.clone(), program);
            }
        }
        Ok(programs)
    }

    async fn fetch_artwork(
        &self,
        token: &str,
        keys: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> AppResult<HashMap<String, Vec<Artwork>>> {
        let keys: Vec<String> = keys.iter().cloned().collect();
        let mut artwork: HashMap<String, Vec<Artwork>> = HashMap::new();
        for chunk in keys.chunks(self.settings.artwork_batch_size.max(1)) {
            ensure_not_cancelled(cancel, "artwork fetch")?;
            let batch = self
                .api
                .program_artwork(token, chunk)
                .await
                .map_err(|e| e.in_phase(SyncPhase::ArtworkFetch))?;
            for entry in batch {
                let program_id = entry.program_id.clone();
                let images = entry.images();
                if !images.is_empty() {
                    artwork.entry(program_id).or_default().extend(images);
                }
            }
        }
        Ok(artwork)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::schedules_direct::api::DayMd5;

    fn dates(values: &[&str]) -> Vec<String> {
        values.iter().map(|d| d.to_string()).collect()
    }

    fn reported(days: &[(&str, &str)]) -> StationMd5s {
        StationMd5s::Dates(
            days.iter()
                .map(|(date, md5)| {
                    (
                        date.to_string(),
                        DayMd5 {
                            md5: md5.to_string(),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_date_window() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(
            date_window(today, 3),
            vec!["2024-02-28", "2024-02-29", "2024-03-01"]
        );
        assert!(date_window(today, 0).is_empty());
    }

    #[test]
    fn test_station_without_cache_is_fetched_for_whole_window() {
        let window = dates(&["2024-01-01", "2024-01-02"]);
        let stations = vec!["10001".to_string()];
        let mut upstream = HashMap::new();
        upstream.insert("10001".to_string(), reported(&[("2024-01-01", "a")]));

        let plan = plan_fetches(&window, &stations, &HashMap::new(), &upstream);
        assert_eq!(plan.fetch["10001"], window);
        assert_eq!(plan.station_days(), 2);
        assert_eq!(plan.staged["10001"].len(), 1);
    }

    #[test]
    fn test_only_changed_dates_are_flagged() {
        let window = dates(&["2024-01-01", "2024-01-02", "2024-01-03"]);
        let stations = vec!["10001".to_string(), "10002".to_string()];
        let mut previous = HashMap::new();
        previous.insert(
            "10001".to_string(),
            StationCache::from([
                ("2024-01-01".to_string(), "a".to_string()),
                ("2024-01-02".to_string(), "b".to_string()),
                ("2024-01-03".to_string(), "c".to_string()),
            ]),
        );
        previous.insert(
            "10002".to_string(),
            StationCache::from([("2024-01-01".to_string(), "x".to_string())]),
        );
        let mut upstream = HashMap::new();
        upstream.insert(
            "10001".to_string(),
            reported(&[("2024-01-01", "a"), ("2024-01-02", "B"), ("2024-01-03", "c")]),
        );
        upstream.insert("10002".to_string(), reported(&[("2024-01-01", "x")]));

        let plan = plan_fetches(&window, &stations, &previous, &upstream);
        assert_eq!(plan.fetch.len(), 1);
        assert_eq!(plan.fetch["10001"], dates(&["2024-01-02"]));
        assert_eq!(plan.staged["10001"]["2024-01-02"], "B");
    }

    #[test]
    fn test_station_without_cache_fetches_error_coded_dates_without_caching_them() {
        let window = dates(&["2024-01-01", "2024-01-02"]);
        let stations = vec!["10001".to_string()];
        let mut upstream = HashMap::new();
        upstream.insert(
            "10001".to_string(),
            StationMd5s::Dates(HashMap::from([
                (
                    "2024-01-01".to_string(),
                    DayMd5 {
                        code: 7100,
                        md5: "z".to_string(),
                        ..Default::default()
                    },
                ),
                (
                    "2024-01-02".to_string(),
                    DayMd5 {
                        md5: "b".to_string(),
                        ..Default::default()
                    },
                ),
            ])),
        );

        let plan = plan_fetches(&window, &stations, &HashMap::new(), &upstream);
        assert_eq!(plan.fetch["10001"], window);
        assert_eq!(
            plan.staged["10001"],
            StationCache::from([("2024-01-02".to_string(), "b".to_string())])
        );
    }

    #[test]
    fn test_error_coded_dates_are_not_flagged() {
        let window = dates(&["2024-01-01"]);
        let stations = vec!["10001".to_string()];
        let mut previous = HashMap::new();
        previous.insert(
            "10001".to_string(),
            StationCache::from([("2024-01-01".to_string(), "a".to_string())]),
        );
        let mut upstream = HashMap::new();
        upstream.insert(
            "10001".to_string(),
            StationMd5s::Dates(HashMap::from([(
                "2024-01-01".to_string(),
                DayMd5 {
                    code: 7100,
                    md5: "z".to_string(),
                    ..Default::default()
                },
            )])),
        );

        assert!(plan_fetches(&window, &stations, &previous, &upstream).is_empty());
    }
}
