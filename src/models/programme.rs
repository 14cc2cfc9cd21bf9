//! Canonical programme representation, modelled on XMLTV `<programme>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderData;

/// A text value with an optional language tag
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LangText {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl LangText {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            lang: None,
        }
    }

    pub fn with_lang<S: Into<String>>(value: S, lang: Option<String>) -> Self {
        Self {
            value: value.into(),
            lang,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credit {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directors: Vec<Credit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<Credit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writers: Vec<Credit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub producers: Vec<Credit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presenters: Vec<Credit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guests: Vec<Credit>,
}

impl Credits {
    pub fn is_empty(&self) -> bool {
        self.directors.is_empty()
            && self.actors.is_empty()
            && self.writers.is_empty()
            && self.producers.is_empty()
            && self.presenters.is_empty()
            && self.guests.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpisodeNumber {
    pub system: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Video {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Audio {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stereo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtitle {
    /// "teletext", "onscreen" or "deaf-signed"
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviouslyShown {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Icon {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A content or star rating; `system` names the rating authority
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rating {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// Canonical programme
///
/// `new` and `previously_shown` are mutually exclusive: a programme flagged
/// new never carries a previously-shown annotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Programme {
    /// Foreign key to `Channel::id`
    pub channel: String,
    pub id: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<DateTime<Utc>>,
    #[serde(default)]
    pub titles: Vec<LangText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_titles: Vec<LangText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<LangText>,
    #[serde(default, skip_serializing_if = "Credits::is_empty")]
    pub credits: Credits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<LangText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<LangText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<LangText>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episode_numbers: Vec<EpisodeNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Audio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previously_shown: Option<PreviouslyShown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premiere: Option<LangText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chance: Option<LangText>,
    #[serde(default)]
    pub new: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtitles: Vec<Subtitle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ratings: Vec<Rating>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub star_ratings: Vec<Rating>,
}

impl Programme {
    /// An otherwise empty programme for `channel` starting at `start`
    pub fn new<C: Into<String>, I: Into<String>>(channel: C, id: I, start: DateTime<Utc>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
            start,
            stop: None,
            titles: Vec::new(),
            secondary_titles: Vec::new(),
            descriptions: Vec::new(),
            credits: Credits::default(),
            date: None,
            categories: Vec::new(),
            keywords: Vec::new(),
            languages: Vec::new(),
            icons: Vec::new(),
            episode_numbers: Vec::new(),
            video: None,
            audio: None,
            previously_shown: None,
            premiere: None,
            last_chance: None,
            new: false,
            subtitles: Vec::new(),
            ratings: Vec::new(),
            star_ratings: Vec::new(),
        }
    }

    /// First title, if any
    pub fn title(&self) -> Option<&str> {
        self.titles.first().map(|t| t.value.as_str())
    }

    /// Episode number for a given numbering system
    pub fn episode_number(&self, system: &str) -> Option<&str> {
        self.episode_numbers
            .iter()
            .find(|e| e.system == system)
            .map(|e| e.value.as_str())
    }
}

/// A canonical programme plus opaque provider bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgrammeContainer {
    pub programme: Programme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<ProviderData>,
}

impl ProgrammeContainer {
    pub fn new(programme: Programme) -> Self {
        Self {
            programme,
            provider_data: None,
        }
    }

    /// Identity used for upserts: (channel, programme id, start)
    pub fn key(&self) -> (String, String, DateTime<Utc>) {
        (
            self.programme.channel.clone(),
            self.programme.id.clone(),
            self.programme.start,
        )
    }
}
