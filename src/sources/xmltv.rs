//! Static XMLTV guide provider
//!
//! Loads a whole XMLTV document from a local path or an http(s) URL. The
//! refresh state is the SHA-256 of the (decompressed) document so an
//! unchanged file is not parsed twice.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ensure_not_cancelled;
use super::traits::{GuideProvider, LineupCapability, ScheduleOutcome};
use crate::errors::{AppError, AppResult, SourceError};
use crate::models::{
    AvailableLineup, Channel, CoverageArea, Programme, ProgrammeContainer, ProviderConfiguration, ProviderKind,
};
use crate::utils::xmltv_parser::{XmltvChannel, parse_xmltv_document};
use crate::utils::{DecompressingHttpClient, DecompressionService, HttpClientFactory, UrlUtils};

const SERVICE_NAME: &str = "xmltv";

pub struct XmltvProvider {
    configuration: ProviderConfiguration,
    location: String,
    http: Arc<dyn DecompressingHttpClient>,
    content_hash: Option<String>,
    channels: Vec<Channel>,
    programmes: Vec<Programme>,
}

impl XmltvProvider {
    pub fn from_configuration(
        configuration: ProviderConfiguration,
        http_factory: &HttpClientFactory,
    ) -> AppResult<Self> {
        let client = http_factory.create_client_for_service(SERVICE_NAME)?;
        Self::new(configuration, Arc::new(client))
    }

    pub fn new(configuration: ProviderConfiguration, http: Arc<dyn DecompressingHttpClient>) -> AppResult<Self> {
        let location = configuration
            .xmltv_url
            .clone()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                AppError::configuration(format!("guide source '{}' requires an xmltv_url", configuration.name))
            })?;

        Ok(Self {
            configuration,
            location,
            http,
            content_hash: None,
            channels: Vec::new(),
            programmes: Vec::new(),
        })
    }

    async fn load(&self) -> AppResult<Vec<u8>> {
        if UrlUtils::is_remote(&self.location) {
            return self.http.fetch_bytes(&self.location).await;
        }

        let path = self.location.strip_prefix("file://").unwrap_or(&self.location);
        let raw = tokio::fs::read(path).await?;
        DecompressionService::decompress(Bytes::from(raw))
            .map_err(|e| AppError::source_error(format!("Failed to decompress {path}: {e}")))
    }
}

/// Canonical channel for an XMLTV `<channel>` element
///
/// The second display name doubles as the channel number when it looks like one.
fn to_channel(channel: XmltvChannel) -> Channel {
    let name = channel
        .display_names
        .first()
        .cloned()
        .unwrap_or_else(|| channel.id.clone());
    let number = channel
        .display_names
        .get(1)
        .filter(|n| looks_like_number(n))
        .cloned()
        .unwrap_or_default();

    Channel {
        id: channel.id,
        name,
        number,
        logos: channel.icons,
        ..Default::default()
    }
}

fn looks_like_number(value: &str) -> bool {
    !value.is_empty()
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

#[async_trait]
impl LineupCapability for XmltvProvider {
    async fn lineup_coverage(&mut self) -> AppResult<Vec<CoverageArea>> {
        Ok(Vec::new())
    }

    async fn available_lineups(
        &mut self,
        _country_code: &str,
        _postal_code: &str,
    ) -> AppResult<Vec<AvailableLineup>> {
        Ok(Vec::new())
    }

    async fn preview_lineup_channels(&mut self, _lineup_id: &str) -> AppResult<Vec<Channel>> {
        Ok(Vec::new())
    }

    async fn subscribe_to_lineup(&mut self, _lineup_id: &str) -> AppResult<bool> {
        Ok(false)
    }

    async fn unsubscribe_from_lineup(&mut self, _lineup_id: &str) -> AppResult<bool> {
        Ok(false)
    }
}

#[async_trait]
impl GuideProvider for XmltvProvider {
    fn name(&self) -> &str {
        &self.configuration.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Xmltv
    }

    fn channels(&self) -> AppResult<Vec<Channel>> {
        Ok(self.channels.clone())
    }

    fn configuration(&self) -> &ProviderConfiguration {
        &self.configuration
    }

    async fn refresh(&mut self, _last_state: Option<&[u8]>, cancel: &CancellationToken) -> AppResult<Vec<u8>> {
        ensure_not_cancelled(cancel, "xmltv refresh")?;
        let content = self.load().await?;
        let hash = hex::encode(Sha256::digest(&content));

        if self.content_hash.as_deref() == Some(hash.as_str()) {
            debug!("XMLTV document for guide source '{}' unchanged", self.configuration.name);
            return Ok(hash.into_bytes());
        }

        ensure_not_cancelled(cancel, "xmltv refresh")?;
        let text = String::from_utf8(content).map_err(|e| {
            AppError::Source(SourceError::parse(SERVICE_NAME, format!("document is not UTF-8: {e}")))
        })?;
        let document = tokio::task::spawn_blocking(move || parse_xmltv_document(&text))
            .await
            .map_err(|e| AppError::internal(format!("XMLTV parse task failed: {e}")))??;

        self.channels = document.channels.into_iter().map(to_channel).collect();
        self.programmes = document.programmes;
        self.content_hash = Some(hash.clone());

        info!(
            "Loaded XMLTV guide source '{}' from {}: {} channels, {} programmes",
            self.configuration.name,
            UrlUtils::obfuscate_credentials(&self.location),
            self.channels.len(),
            self.programmes.len()
        );
        Ok(hash.into_bytes())
    }

    async fn schedule(
        &mut self,
        _days_to_get: u32,
        input_channels: &[Channel],
        _input_programmes: &[ProgrammeContainer],
        cancel: &CancellationToken,
    ) -> AppResult<ScheduleOutcome> {
        ensure_not_cancelled(cancel, "xmltv schedule")?;
        let wanted: HashSet<&str> = input_channels.iter().map(|c| c.id.as_str()).collect();

        let programmes: Vec<ProgrammeContainer> = self
            .programmes
            .iter()
            .filter(|p| wanted.contains(p.channel.as_str()))
            .cloned()
            .map(ProgrammeContainer::new)
            .collect();

        debug!(
            "XMLTV guide source '{}': {} of {} programmes belong to {} requested channels",
            self.configuration.name,
            programmes.len(),
            self.programmes.len(),
            wanted.len()
        );
        Ok(ScheduleOutcome {
            programmes,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="hbo.us">
    <display-name>HBO</display-name>
    <display-name>501</display-name>
    <icon src="http://logos.example/hbo.png" width="100" height="50"/>
  </channel>
  <channel id="espn.us">
    <display-name>ESPN</display-name>
    <display-name>Sports</display-name>
  </channel>
  <programme start="20240101120000 +0000" stop="20240101130000 +0000" channel="hbo.us">
    <title>Movie</title>
  </programme>
  <programme start="20240101120000 +0000" stop="20240101123000 +0000" channel="espn.us">
    <title>Highlights</title>
  </programme>
</tv>"#;

    fn provider_for(path: &str) -> XmltvProvider {
        let configuration = ProviderConfiguration {
            name: "file".to_string(),
            provider: "xmltv".to_string(),
            xmltv_url: Some(path.to_string()),
            ..Default::default()
        };
        XmltvProvider::from_configuration(configuration, &HttpClientFactory::default()).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_loads_channels_and_hash_state() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();
        let mut provider = provider_for(file.path().to_str().unwrap());
        let cancel = CancellationToken::new();

        let state = provider.refresh(None, &cancel).await.unwrap();
        assert_eq!(state.len(), 64);

        let channels = provider.channels().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "hbo.us");
        assert_eq!(channels[0].name, "HBO");
        assert_eq!(channels[0].number, "501");
        assert_eq!(channels[0].logos[0].width, 100);
        assert_eq!(channels[1].number, "");

        let again = provider.refresh(Some(&state), &cancel).await.unwrap();
        assert_eq!(state, again);
    }

    #[tokio::test]
    async fn test_restarted_provider_reloads_catalog_from_stored_state() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();
        let cancel = CancellationToken::new();
        let state = provider_for(file.path().to_str().unwrap())
            .refresh(None, &cancel)
            .await
            .unwrap();

        let mut restarted = provider_for(file.path().to_str().unwrap());
        let again = restarted.refresh(Some(&state), &cancel).await.unwrap();
        assert_eq!(state, again);
        assert_eq!(restarted.channels().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_schedule_filters_by_channel_membership() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();
        let mut provider = provider_for(file.path().to_str().unwrap());
        let cancel = CancellationToken::new();
        provider.refresh(None, &cancel).await.unwrap();

        let wanted = vec![Channel {
            id: "espn.us".to_string(),
            ..Default::default()
        }];
        let outcome = provider.schedule(7, &wanted, &[], &cancel).await.unwrap();
        assert_eq!(outcome.programmes.len(), 1);
        assert_eq!(outcome.programmes[0].programme.channel, "espn.us");
        assert!(outcome.channel_state.is_empty());
    }

    #[tokio::test]
    async fn test_lineup_methods_are_noops() {
        let mut provider = provider_for("/nonexistent.xml");
        assert!(!provider.supports_lineups());
        assert!(provider.lineup_coverage().await.unwrap().is_empty());
        assert!(provider.available_lineups("USA", "10001").await.unwrap().is_empty());
        assert!(!provider.subscribe_to_lineup("USA-NY-X").await.unwrap());
        assert!(!provider.unsubscribe_from_lineup("USA-NY-X").await.unwrap());
    }

    #[test]
    fn test_missing_location_is_configuration_error() {
        let configuration = ProviderConfiguration {
            name: "empty".to_string(),
            ..Default::default()
        };
        let result = XmltvProvider::from_configuration(configuration, &HttpClientFactory::default());
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[test]
    fn test_number_detection() {
        assert!(looks_like_number("501"));
        assert!(looks_like_number("4.1"));
        assert!(!looks_like_number("Sports"));
        assert!(!looks_like_number(""));
    }
}
