//! Canonical, provider-neutral data model
//!
//! Every guide provider produces and consumes these shapes. Provider specific
//! bookkeeping rides along in [`ProviderData`] so the canonical types never
//! need to know its layout.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub mod lineup;
pub mod programme;
pub mod provider_data;

pub use lineup::*;
pub use programme::*;
pub use provider_data::ProviderData;

/// Which provider implementation produced a piece of data
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ProviderKind {
    #[strum(to_string = "schedulesdirect", serialize = "schedules_direct", serialize = "schedules-direct")]
    SchedulesDirect,
    #[strum(to_string = "xmltv")]
    Xmltv,
}

impl ProviderKind {
    /// Resolve a configuration discriminator, defaulting to the static
    /// XMLTV provider for anything unrecognised.
    pub fn from_discriminator(value: &str) -> Self {
        value.trim().parse().unwrap_or(ProviderKind::Xmltv)
    }
}

/// Provider-agnostic settings for one guide provider
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfiguration {
    pub name: String,
    /// Case-insensitive discriminator selecting the implementation
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Override for the remote service endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Path or http(s) URL of a static XMLTV document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmltv_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ProviderConfiguration {
    pub fn kind(&self) -> ProviderKind {
        ProviderKind::from_discriminator(&self.provider)
    }
}

impl fmt::Debug for ProviderConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfiguration")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("base_url", &self.base_url)
            .field("xmltv_url", &self.xmltv_url)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Channel artwork
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Logo {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Provider-neutral EPG channel
///
/// `id` is built by the provider and stays stable across refreshes for the
/// same physical channel so persistence can upsert on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub call_sign: String,
    #[serde(default)]
    pub logos: Vec<Logo>,
    #[serde(default)]
    pub lineup: String,
    #[serde(default)]
    pub affiliate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<ProviderData>,
}

/// A region in which a provider offers discoverable lineups
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverageArea {
    pub region: String,
    pub country: String,
    pub short_name: String,
    #[serde(default)]
    pub postal_code_example: String,
    #[serde(default)]
    pub postal_code_pattern: String,
    #[serde(default)]
    pub one_postal_code: bool,
}

/// A lineup an account could subscribe to
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableLineup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub transport: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub headend: String,
}
