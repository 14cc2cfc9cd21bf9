#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::json;

use epg_gateway::errors::{AppError, AppResult, SourceError};
use epg_gateway::models::{Channel, ProviderConfiguration};
use epg_gateway::sources::ProviderSettings;
use epg_gateway::sources::schedules_direct::api::{
    Airing, Artwork, ArtworkData, ChangeLineupResponse, ChannelMapEntry, Country, DayMd5, Headend, LineupResponse,
    PreviewChannel, ProgramArtwork, ProgramInfo, ScheduleMetadata, SchedulesDirectApi, Station, StationDates,
    StationMd5s, StationSchedule, StatusLineup, StatusResponse, TokenRequest, TokenResponse,
};
use epg_gateway::sources::schedules_direct::{SchedulesDirectProvider, channel_id};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Token,
    Status,
    Lineup(String),
    Preview(String),
    Headends(String, String),
    Countries,
    AddLineup(String),
    DeleteLineup(String),
    Md5(Vec<StationDates>),
    Schedules(Vec<StationDates>),
    Programs(Vec<String>),
    Artwork(Vec<String>),
}

/// Upstream data served by the fake
#[derive(Default)]
pub struct FakeState {
    /// station -> date -> hash
    pub hashes: HashMap<String, HashMap<String, String>>,
    /// (station, date) -> airings
    pub airings: HashMap<(String, String), Vec<Airing>>,
    pub programs: HashMap<String, ProgramInfo>,
    pub artwork: HashMap<String, Vec<Artwork>>,
    /// lineup id -> (modified, lineup)
    pub lineups: Vec<(String, String, LineupResponse)>,
    pub fail_md5s: bool,
    pub fail_schedules: bool,
    pub fail_programs: bool,
    pub fail_artwork: bool,
    pub reject_lineup_changes: bool,
    pub calls: Vec<Call>,
}

/// Records every call and answers from [`FakeState`]
#[derive(Default)]
pub struct FakeSchedulesDirectApi {
    state: Mutex<FakeState>,
}

impl FakeSchedulesDirectApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn take_calls(&self) -> Vec<Call> {
        self.with(|s| std::mem::take(&mut s.calls))
    }

    pub fn set_hash(&self, station: &str, date: &str, hash: &str) {
        self.with(|s| {
            s.hashes
                .entry(station.to_string())
                .or_default()
                .insert(date.to_string(), hash.to_string());
        });
    }

    pub fn add_airing(&self, station: &str, date: &str, airing: Airing) {
        self.with(|s| {
            s.airings
                .entry((station.to_string(), date.to_string()))
                .or_default()
                .push(airing);
        });
    }

    pub fn add_program(&self, program: ProgramInfo) {
        self.with(|s| {
            s.programs.insert(program.program_id.clone(), program);
        });
    }

    fn record(&self, call: Call) {
        self.with(|s| s.calls.push(call));
    }
}

#[async_trait]
impl SchedulesDirectApi for FakeSchedulesDirectApi {
    async fn token(&self, _request: &TokenRequest) -> AppResult<TokenResponse> {
        self.record(Call::Token);
        Ok(TokenResponse {
            code: 0,
            message: Some("OK".to_string()),
            token: Some("fake-token".to_string()),
        })
    }

    async fn status(&self, _token: &str) -> AppResult<StatusResponse> {
        self.record(Call::Status);
        Ok(self.with(|s| StatusResponse {
            code: 0,
            lineups: s
                .lineups
                .iter()
                .map(|(id, modified, _)| StatusLineup {
                    lineup: id.clone(),
                    modified: modified.clone(),
                    is_deleted: false,
                })
                .collect(),
        }))
    }

    async fn lineup(&self, _token: &str, lineup_id: &str) -> AppResult<LineupResponse> {
        self.record(Call::Lineup(lineup_id.to_string()));
        self.with(|s| {
            s.lineups
                .iter()
                .find(|(id, _, _)| id == lineup_id)
                .map(|(_, _, lineup)| lineup.clone())
                .ok_or_else(|| AppError::not_found("lineup", lineup_id))
        })
    }

    async fn preview_lineup(&self, _token: &str, lineup_id: &str) -> AppResult<Vec<PreviewChannel>> {
        self.record(Call::Preview(lineup_id.to_string()));
        Ok(vec![PreviewChannel {
            channel: "4".to_string(),
            name: "KNBC".to_string(),
            callsign: "KNBC".to_string(),
            affiliate: Some("NBC".to_string()),
        }])
    }

    async fn headends(&self, _token: &str, country: &str, postal_code: &str) -> AppResult<Vec<Headend>> {
        self.record(Call::Headends(country.to_string(), postal_code.to_string()));
        Ok(serde_json::from_value(json!([{
            "headend": "NY67791",
            "transport": "Cable",
            "location": "New York",
            "lineups": [
                {"lineup": "USA-NY67791-X", "name": "Example Cable", "uri": "/20141201/lineups/USA-NY67791-X"}
            ]
        }]))?)
    }

    async fn countries(&self, _token: &str) -> AppResult<HashMap<String, Vec<Country>>> {
        self.record(Call::Countries);
        Ok(serde_json::from_value(json!({
            "North America": [
                {"fullName": "United States", "shortName": "USA", "postalCodeExample": "12345", "postalCode": "/\\d{5}/"}
            ],
            "Europe": [
                {"fullName": "United Kingdom", "shortName": "GBR", "postalCodeExample": "E1 6AN", "postalCode": "/.*/", "onePostalCode": true}
            ]
        }))?)
    }

    async fn add_lineup(&self, _token: &str, lineup_id: &str) -> AppResult<ChangeLineupResponse> {
        self.record(Call::AddLineup(lineup_id.to_string()));
        self.lineup_change_response()
    }

    async fn delete_lineup(&self, _token: &str, lineup_id: &str) -> AppResult<ChangeLineupResponse> {
        self.record(Call::DeleteLineup(lineup_id.to_string()));
        self.lineup_change_response()
    }

    async fn schedule_md5s(&self, _token: &str, request: &[StationDates]) -> AppResult<HashMap<String, StationMd5s>> {
        self.record(Call::Md5(request.to_vec()));
        if self.with(|s| s.fail_md5s) {
            return Err(unavailable());
        }
        Ok(self.with(|s| {
            request
                .iter()
                .map(|entry| {
                    let known = s.hashes.get(&entry.station_id);
                    let days: HashMap<String, DayMd5> = entry
                        .dates
                        .iter()
                        .filter_map(|date| {
                            known.and_then(|k| k.get(date)).map(|md5| {
                                (
                                    date.clone(),
                                    DayMd5 {
                                        code: 0,
                                        message: Some("OK".to_string()),
                                        md5: md5.clone(),
                                    },
                                )
                            })
                        })
                        .collect();
                    (entry.station_id.clone(), StationMd5s::Dates(days))
                })
                .collect()
        }))
    }

    async fn schedules(&self, _token: &str, request: &[StationDates]) -> AppResult<Vec<StationSchedule>> {
        self.record(Call::Schedules(request.to_vec()));
        self.with(|s| {
            if s.fail_schedules {
                return Err(unavailable());
            }
            let mut schedules = Vec::new();
            for entry in request {
                for date in &entry.dates {
                    let Some(md5) = s.hashes.get(&entry.station_id).and_then(|h| h.get(date)) else {
                        continue;
                    };
                    schedules.push(StationSchedule {
                        station_id: entry.station_id.clone(),
                        programs: s
                            .airings
                            .get(&(entry.station_id.clone(), date.clone()))
                            .cloned()
                            .unwrap_or_default(),
                        metadata: Some(ScheduleMetadata {
                            modified: "2024-03-01T00:00:00Z".to_string(),
                            md5: md5.clone(),
                            start_date: date.clone(),
                        }),
                        code: 0,
                        message: None,
                    });
                }
            }
            Ok(schedules)
        })
    }

    async fn programs(&self, _token: &str, program_ids: &[String]) -> AppResult<Vec<ProgramInfo>> {
        self.record(Call::Programs(program_ids.to_vec()));
        if self.with(|s| s.fail_programs) {
            return Err(unavailable());
        }
        Ok(self.with(|s| program_ids.iter().filter_map(|id| s.programs.get(id).cloned()).collect()))
    }

    async fn program_artwork(&self, _token: &str, program_ids: &[String]) -> AppResult<Vec<ProgramArtwork>> {
        self.record(Call::Artwork(program_ids.to_vec()));
        if self.with(|s| s.fail_artwork) {
            return Err(unavailable());
        }
        Ok(self.with(|s| {
            program_ids
                .iter()
                .map(|id| ProgramArtwork {
                    program_id: id.clone(),
                    data: match s.artwork.get(id) {
                        Some(images) => ArtworkData::Images(images.clone()),
                        None => ArtworkData::Error(json!({"code": 5000, "message": "No artwork"})),
                    },
                })
                .collect()
        }))
    }
}

fn unavailable() -> AppError {
    AppError::Source(SourceError::Http {
        status: 503,
        message: "service unavailable".to_string(),
    })
}

impl FakeSchedulesDirectApi {
    fn lineup_change_response(&self) -> AppResult<ChangeLineupResponse> {
        if self.with(|s| s.reject_lineup_changes) {
            return Err(AppError::Source(SourceError::Upstream {
                code: 2100,
                message: "Lineup already in account".to_string(),
            }));
        }
        Ok(ChangeLineupResponse {
            code: 0,
            response: "OK".to_string(),
            message: Some("Added lineup.".to_string()),
            changes_remaining: Some(5),
        })
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

/// `days` dates from [`today`]
pub fn window(days: i64) -> Vec<String> {
    (0..days)
        .map(|d| (today() + Duration::days(d)).format("%Y-%m-%d").to_string())
        .collect()
}

pub fn sd_configuration() -> ProviderConfiguration {
    ProviderConfiguration {
        name: "Schedules Direct".to_string(),
        provider: "schedulesdirect".to_string(),
        username: Some("user".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    }
}

pub fn provider(api: Arc<FakeSchedulesDirectApi>) -> SchedulesDirectProvider {
    provider_with(api, ProviderSettings::default())
}

pub fn provider_with(api: Arc<FakeSchedulesDirectApi>, settings: ProviderSettings) -> SchedulesDirectProvider {
    SchedulesDirectProvider::new(sd_configuration(), api, settings)
        .unwrap()
        .with_clock(today)
}

/// A provider whose date window starts at `today`
pub fn provider_at(api: Arc<FakeSchedulesDirectApi>, today: fn() -> NaiveDate) -> SchedulesDirectProvider {
    SchedulesDirectProvider::new(sd_configuration(), api, ProviderSettings::default())
        .unwrap()
        .with_clock(today)
}

pub fn sd_channel(number: &str, station: &str) -> Channel {
    Channel {
        id: channel_id(number, station),
        name: format!("Station {station}"),
        number: number.to_string(),
        ..Default::default()
    }
}

pub fn airing(program_id: &str, date: &str, hour: u32, md5: &str) -> Airing {
    serde_json::from_value(json!({
        "programID": program_id,
        "airDateTime": format!("{date}T{hour:02}:00:00Z"),
        "duration": 1800,
        "md5": md5,
        "new": true
    }))
    .unwrap()
}

pub fn program(program_id: &str, md5: &str) -> ProgramInfo {
    serde_json::from_value(json!({
        "programID": program_id,
        "titles": [{"title120": format!("Title {program_id}")}],
        "entityType": "Episode",
        "md5": md5
    }))
    .unwrap()
}

pub fn lineup_response(entries: &[(&str, &str, &str)]) -> LineupResponse {
    LineupResponse {
        map: entries
            .iter()
            .map(|(station, number, _)| ChannelMapEntry {
                station_id: station.to_string(),
                channel: Some(number.to_string()),
                ..Default::default()
            })
            .collect(),
        stations: entries
            .iter()
            .map(|(station, _, callsign)| Station {
                station_id: station.to_string(),
                name: format!("{callsign} Network"),
                callsign: callsign.to_string(),
                broadcast_language: vec!["en".to_string()],
                ..Default::default()
            })
            .collect(),
        metadata: None,
    }
}
