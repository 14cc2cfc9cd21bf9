//! Schedules Direct JSON API client
//!
//! Wire types for the 20141201 API and the [`SchedulesDirectApi`] seam the
//! provider talks through. The token is passed per call so the provider owns
//! its lifetime.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult, SourceError};
use crate::utils::StandardHttpClient;
use crate::utils::url::UrlUtils;

pub const SERVICE_NAME: &str = "schedulesdirect";

#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub username: String,
    /// SHA-1 hex digest of the account password
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub lineups: Vec<StatusLineup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLineup {
    pub lineup: String,
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMapEntry {
    #[serde(rename = "stationID")]
    pub station_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atsc_major: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atsc_minor: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uhf_vhf: Option<u32>,
}

impl ChannelMapEntry {
    /// Provider channel number: explicit channel, else ATSC major-minor, else RF channel
    pub fn number(&self) -> String {
        if let Some(channel) = self.channel.as_deref().filter(|c| !c.is_empty()) {
            return channel.to_string();
        }
        match (self.atsc_major, self.atsc_minor, self.uhf_vhf) {
            (Some(major), Some(minor), _) => format!("{major}-{minor}"),
            (_, _, Some(rf)) => rf.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StationLogo {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    #[serde(rename = "stationID")]
    pub station_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub callsign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliate: Option<String>,
    #[serde(default)]
    pub broadcast_language: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<StationLogo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub station_logo: Vec<StationLogo>,
    #[serde(default)]
    pub is_radio_station: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineupMetadata {
    #[serde(default)]
    pub lineup: String,
    #[serde(default)]
    pub modified: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineupResponse {
    #[serde(default)]
    pub map: Vec<ChannelMapEntry>,
    #[serde(default)]
    pub stations: Vec<Station>,
    #[serde(default)]
    pub metadata: Option<LineupMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewChannel {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub callsign: String,
    #[serde(default)]
    pub affiliate: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadendLineup {
    pub lineup: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Headend {
    #[serde(default)]
    pub headend: String,
    #[serde(default)]
    pub transport: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub lineups: Vec<HeadendLineup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub postal_code_example: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub one_postal_code: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLineupResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub changes_remaining: Option<i64>,
}

/// A station and the dates requested for it
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StationDates {
    #[serde(rename = "stationID")]
    pub station_id: String,
    #[serde(rename = "date")]
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayMd5 {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub md5: String,
}

/// The service answers `[]` for stations it holds no data for
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StationMd5s {
    Dates(HashMap<String, DayMd5>),
    Empty(Vec<serde_json::Value>),
}

impl StationMd5s {
    /// The hash for a date, if the service reported one without an error code
    pub fn hash_for(&self, date: &str) -> Option<&str> {
        match self {
            StationMd5s::Dates(days) => days
                .get(date)
                .filter(|day| day.code == 0 && !day.md5.is_empty())
                .map(|day| day.md5.as_str()),
            StationMd5s::Empty(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiringRating {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Multipart {
    #[serde(default)]
    pub part_number: u32,
    #[serde(default)]
    pub total_parts: u32,
}

/// One scheduled broadcast of a program on a station
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Airing {
    #[serde(rename = "programID")]
    pub program_id: String,
    pub air_date_time: DateTime<Utc>,
    /// Seconds
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub premiere: bool,
    #[serde(default)]
    pub signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_premiere_or_finale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_tape_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ratings: Vec<AiringRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipart: Option<Multipart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_properties: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMetadata {
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub start_date: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationSchedule {
    #[serde(rename = "stationID")]
    pub station_id: String,
    #[serde(default)]
    pub programs: Vec<Airing>,
    #[serde(default)]
    pub metadata: Option<ScheduleMetadata>,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramTitle {
    #[serde(rename = "title120", default)]
    pub title120: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDescription {
    #[serde(default)]
    pub description_language: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramDescriptions {
    #[serde(rename = "description1000", default)]
    pub description1000: Vec<ProgramDescription>,
    #[serde(rename = "description100", default)]
    pub description100: Vec<ProgramDescription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMetadata {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub season: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub episode: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_seasons: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_episodes: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub character_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentRating {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QualityRating {
    #[serde(default)]
    pub ratings_body: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub max_rating: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub quality_rating: Vec<QualityRating>,
}

/// Extended program metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgramInfo {
    #[serde(rename = "programID")]
    pub program_id: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub titles: Vec<ProgramTitle>,
    #[serde(rename = "episodeTitle150", default)]
    pub episode_title150: Option<String>,
    #[serde(default)]
    pub descriptions: ProgramDescriptions,
    #[serde(default)]
    pub original_air_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(rename = "keyWords", default)]
    pub keywords: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub metadata: Vec<BTreeMap<String, EpisodeMetadata>>,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default)]
    pub show_type: String,
    #[serde(default)]
    pub has_image_artwork: bool,
    #[serde(default)]
    pub has_episode_artwork: bool,
    #[serde(default)]
    pub has_season_artwork: bool,
    #[serde(default)]
    pub has_series_artwork: bool,
    #[serde(default)]
    pub has_movie_artwork: bool,
    #[serde(default)]
    pub cast: Vec<Person>,
    #[serde(default)]
    pub crew: Vec<Person>,
    #[serde(default)]
    pub content_rating: Vec<ContentRating>,
    #[serde(default)]
    pub movie: Option<Movie>,
    #[serde(default)]
    pub md5: String,
}

impl ProgramInfo {
    pub fn declares_artwork(&self) -> bool {
        self.has_image_artwork
            || self.has_episode_artwork
            || self.has_season_artwork
            || self.has_series_artwork
            || self.has_movie_artwork
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artwork {
    pub uri: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

/// Artwork lookups return either a list or an error object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArtworkData {
    Images(Vec<Artwork>),
    Error(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramArtwork {
    #[serde(rename = "programID")]
    pub program_id: String,
    pub data: ArtworkData,
}

impl ProgramArtwork {
    pub fn images(self) -> Vec<Artwork> {
        match self.data {
            ArtworkData::Images(images) => images,
            ArtworkData::Error(_) => Vec::new(),
        }
    }
}

/// Numbers that arrive either as JSON numbers or numeric strings
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("number out of range: {n}"))),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("not a number: {s}"))),
        Some(other) => Err(de::Error::custom(format!("unexpected value: {other}"))),
    }
}

/// The remote schedule service, one method per endpoint
#[async_trait]
pub trait SchedulesDirectApi: Send + Sync {
    async fn token(&self, request: &TokenRequest) -> AppResult<TokenResponse>;

    async fn status(&self, token: &str) -> AppResult<StatusResponse>;

    async fn lineup(&self, token: &str, lineup_id: &str) -> AppResult<LineupResponse>;

    async fn preview_lineup(&self, token: &str, lineup_id: &str) -> AppResult<Vec<PreviewChannel>>;

    async fn headends(&self, token: &str, country: &str, postal_code: &str) -> AppResult<Vec<Headend>>;

    async fn countries(&self, token: &str) -> AppResult<HashMap<String, Vec<Country>>>;

    async fn add_lineup(&self, token: &str, lineup_id: &str) -> AppResult<ChangeLineupResponse>;

    async fn delete_lineup(&self, token: &str, lineup_id: &str) -> AppResult<ChangeLineupResponse>;

    async fn schedule_md5s(
        &self,
        token: &str,
        request: &[StationDates],
    ) -> AppResult<HashMap<String, StationMd5s>>;

    async fn schedules(&self, token: &str, request: &[StationDates]) -> AppResult<Vec<StationSchedule>>;

    async fn programs(&self, token: &str, program_ids: &[String]) -> AppResult<Vec<ProgramInfo>>;

    async fn program_artwork(&self, token: &str, program_ids: &[String]) -> AppResult<Vec<ProgramArtwork>>;
}

/// Error body returned alongside non-2xx statuses
#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

/// reqwest-backed implementation
pub struct HttpSchedulesDirectApi {
    client: StandardHttpClient,
    base_url: String,
}

impl HttpSchedulesDirectApi {
    pub fn new(client: StandardHttpClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call<B, T>(&self, method: Method, path: &str, token: Option<&str>, body: Option<&B>) -> AppResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: serde::de::DeserializeOwned,
    {
        let url = UrlUtils::endpoint(&self.base_url, path);
        let headers: Vec<(&str, &str)> = token.map(|t| vec![("token", t)]).unwrap_or_default();
        self.client
            .send_json(method, &url, &headers, body)
            .await
            .map_err(Self::upstream_error)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, token: Option<&str>) -> AppResult<T> {
        self.call::<(), T>(Method::GET, path, token, None).await
    }

    /// Surface the service's own error code when the body carries one
    fn upstream_error(error: AppError) -> AppError {
        if let AppError::Source(SourceError::Http { status, message }) = &error
            && let Ok(body) = serde_json::from_str::<ServiceError>(message)
            && body.code != 0
        {
            let detail = body.message.or(body.response).unwrap_or_default();
            debug!("Schedules Direct returned HTTP {} with code {}", status, body.code);
            if *status == 401 || *status == 403 {
                return AppError::Source(SourceError::auth_failed(SERVICE_NAME, detail));
            }
            return AppError::Source(SourceError::Upstream {
                code: body.code,
                message: detail,
            });
        }
        error
    }
}

#[async_trait]
impl SchedulesDirectApi for HttpSchedulesDirectApi {
    async fn token(&self, request: &TokenRequest) -> AppResult<TokenResponse> {
        self.call(Method::POST, "token", None, Some(request)).await
    }

    async fn status(&self, token: &str) -> AppResult<StatusResponse> {
        self.get("status", Some(token)).await
    }

    async fn lineup(&self, token: &str, lineup_id: &str) -> AppResult<LineupResponse> {
        let path = format!("lineups/{}", urlencoding::encode(lineup_id));
        self.get(&path, Some(token)).await
    }

    async fn preview_lineup(&self, token: &str, lineup_id: &str) -> AppResult<Vec<PreviewChannel>> {
        let path = format!("lineups/preview/{}", urlencoding::encode(lineup_id));
        self.get(&path, Some(token)).await
    }

    async fn headends(&self, token: &str, country: &str, postal_code: &str) -> AppResult<Vec<Headend>> {
        let path = format!(
            "headends?country={}&postalcode={}",
            urlencoding::encode(country),
            urlencoding::encode(postal_code)
        );
        self.get(&path, Some(token)).await
    }

    async fn countries(&self, token: &str) -> AppResult<HashMap<String, Vec<Country>>> {
        self.get("available/countries", Some(token)).await
    }

    async fn add_lineup(&self, token: &str, lineup_id: &str) -> AppResult<ChangeLineupResponse> {
        let path = format!("lineups/{}", urlencoding::encode(lineup_id));
        self.call::<(), _>(Method::PUT, &path, Some(token), None).await
    }

    async fn delete_lineup(&self, token: &str, lineup_id: &str) -> AppResult<ChangeLineupResponse> {
        let path = format!("lineups/{}", urlencoding::encode(lineup_id));
        self.call::<(), _>(Method::DELETE, &path, Some(token), None).await
    }

    async fn schedule_md5s(
        &self,
        token: &str,
        request: &[StationDates],
    ) -> AppResult<HashMap<String, StationMd5s>> {
        self.call(Method::POST, "schedules/md5", Some(token), Some(request)).await
    }

    async fn schedules(&self, token: &str, request: &[StationDates]) -> AppResult<Vec<StationSchedule>> {
        self.call(Method::POST, "schedules", Some(token), Some(request)).await
    }

    async fn programs(&self, token: &str, program_ids: &[String]) -> AppResult<Vec<ProgramInfo>> {
        self.call(Method::POST, "programs", Some(token), Some(program_ids)).await
    }

    async fn program_artwork(&self, token: &str, program_ids: &[String]) -> AppResult<Vec<ProgramArtwork>> {
        self.call(Method::POST, "metadata/programs", Some(token), Some(program_ids))
            .await
    }
}
