//! Guide providers
//!
//! Every guide provider implements [`GuideProvider`]: a channel catalog pulled
//! by `refresh` and programme data pulled by `schedule`. Providers that can
//! discover and subscribe to regional lineups say so through
//! `supports_lineups()`; callers check it before touching the
//! [`LineupCapability`] methods.
//!
//! - [`schedules_direct`]: remote subscription schedule service, incremental
//! - [`xmltv`]: static XMLTV document, passthrough

pub mod factory;
pub mod schedules_direct;
pub mod traits;
pub mod xmltv;

pub use factory::GuideProviderFactory;
pub use schedules_direct::SchedulesDirectProvider;
pub use traits::{GuideProvider, LineupCapability, ScheduleOutcome, ScheduleStats};
pub use xmltv::XmltvProvider;

use tokio_util::sync::CancellationToken;

use crate::config::GuideConfig;
use crate::errors::{AppError, AppResult};

/// Provider tuning shared by every guide source
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Upper bound on program ids per metadata request
    pub program_batch_size: usize,
    /// Upper bound on program ids per artwork request
    pub artwork_batch_size: usize,
}

impl ProviderSettings {
    pub fn from_config(config: &GuideConfig) -> Self {
        Self {
            program_batch_size: config.program_batch_size.max(1),
            artwork_batch_size: config.artwork_batch_size.max(1),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self::from_config(&GuideConfig::default())
    }
}

pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken, operation: &str) -> AppResult<()> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled(operation));
    }
    Ok(())
}
