//! Guide provider factory
//!
//! Creates the concrete provider for a `ProviderConfiguration` from its
//! case-insensitive `provider` discriminator. An unrecognised discriminator
//! falls back to the static XMLTV provider, so configurations written for a
//! newer release keep loading.

use tracing::{debug, warn};

use super::ProviderSettings;
use super::schedules_direct::SchedulesDirectProvider;
use super::traits::GuideProvider;
use super::xmltv::XmltvProvider;
use crate::errors::AppResult;
use crate::models::{ProviderConfiguration, ProviderKind};
use crate::utils::HttpClientFactory;

/// Factory for creating guide providers
///
/// ```ignore
/// let factory = GuideProviderFactory::new(HttpClientFactory::default(), ProviderSettings::default());
/// let mut provider = factory.get_provider(&configuration)?;
/// provider.refresh(None, &CancellationToken::new()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct GuideProviderFactory {
    http_factory: HttpClientFactory,
    settings: ProviderSettings,
}

impl GuideProviderFactory {
    pub fn new(http_factory: HttpClientFactory, settings: ProviderSettings) -> Self {
        Self {
            http_factory,
            settings,
        }
    }

    /// Create the provider selected by `configuration.provider`
    ///
    /// # Errors
    /// Returns a configuration error when the selected provider is missing a
    /// required setting (credentials, document location).
    pub fn get_provider(&self, configuration: &ProviderConfiguration) -> AppResult<Box<dyn GuideProvider>> {
        let kind = configuration.kind();
        if kind == ProviderKind::Xmltv
            && !configuration.provider.trim().is_empty()
            && !configuration.provider.trim().eq_ignore_ascii_case("xmltv")
        {
            warn!(
                "Unknown guide provider '{}' for guide source '{}', using xmltv",
                configuration.provider, configuration.name
            );
        }
        debug!("Creating {} provider for guide source '{}'", kind, configuration.name);

        match kind {
            ProviderKind::SchedulesDirect => Ok(Box::new(SchedulesDirectProvider::from_configuration(
                configuration.clone(),
                &self.http_factory,
                self.settings.clone(),
            )?)),
            ProviderKind::Xmltv => Ok(Box::new(XmltvProvider::from_configuration(
                configuration.clone(),
                &self.http_factory,
            )?)),
        }
    }

    /// Provider kinds with a registered implementation
    pub fn supported_kinds() -> Vec<ProviderKind> {
        vec![ProviderKind::SchedulesDirect, ProviderKind::Xmltv]
    }
}
