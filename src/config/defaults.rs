//! Configuration default values
//!
//! All default values for configuration options live here so they can be
//! changed in one place.

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Catalog ingestion defaults
pub const DEFAULT_PLAYLIST_URL: &str = "https://iptv-org.github.io/iptv/index.m3u";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

// Validation defaults
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 4;
pub const DEFAULT_ENSURE_FRESH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_POOL_WIDTH: usize = 10;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_MAX_MANIFEST_BYTES: usize = 256 * 1024;
pub const DEFAULT_USER_AGENT: &str = concat!("iptv-catalog/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_SWEEP_ENABLED: bool = true;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 40;

// Query defaults
pub const DEFAULT_PAGE_SIZE: u32 = 24;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
