/// Delay between two delivery attempts while a destination is not ready.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

/// Environment variable holding the whole configuration bundle (inline JSON or a file path).
pub const CONFIG_ENV_VAR: &str = "ANALYTICS_DISPATCH_CONFIG";
pub const GA4_TRACKING_ID_ENV_VAR: &str = "GA4_TRACKING_ID";
pub const META_TRACKING_ID_ENV_VAR: &str = "META_TRACKING_ID";
pub const TIKTOK_TRACKING_ID_ENV_VAR: &str = "TIKTOK_TRACKING_ID";
pub const POLL_INTERVAL_ENV_VAR: &str = "ANALYTICS_DISPATCH_POLL_INTERVAL_MS";

pub const GTAG_SCRIPT_URL: &str = "https://www.googletagmanager.com/gtag/js";
pub const META_PIXEL_SCRIPT_FRAGMENT: &str = "connect.facebook.net/en_US/fbevents.js";
pub const TIKTOK_PIXEL_MARKER_ATTRIBUTE: &str = "data-id";
