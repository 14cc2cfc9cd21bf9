/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Guide synchronization defaults
pub const DEFAULT_DAYS_TO_GET: u32 = 7;
pub const DEFAULT_PROGRAM_BATCH_SIZE: usize = 5000;
pub const DEFAULT_ARTWORK_BATCH_SIZE: usize = 500;
pub const DEFAULT_ONLY_ACTIVE_CHANNELS: bool = true;

// HTTP client defaults
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "2m";

// Virtual tuner lineup defaults
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_LINEUP_PORT: u16 = 6077;

// Channel matcher defaults
pub const DEFAULT_MATCHER_BAG_SIZE: usize = 2;
pub const DEFAULT_MATCHER_MAX_RESULTS: usize = 5;

// Storage defaults
pub const DEFAULT_STATE_FILE: &str = "./data/epg-gateway-state.json";

// Remote schedule service defaults
pub const DEFAULT_SCHEDULES_DIRECT_BASE_URL: &str = "https://json.schedulesdirect.org/20141201";
