//! Readiness-gated delivery of analytics events to third-party tracking pixels.
//!
//! Each destination gets one [`DestinationAdapter`] per [`DestinationRegistry`]. Adapters ask a
//! [`ScriptLoader`] to bootstrap the vendor script, queue events until the loader reports
//! completion and then forward them, in submission order, to the vendor global through
//! [`VendorGlobals`].

mod adapter;
mod api;
mod config;
mod constants;
pub mod error;
mod event;
mod gtag;
mod loader;
mod meta_pixel;
mod tiktok_pixel;
mod transport;
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod web;

pub use adapter::{
    Destination, DestinationAdapter, DestinationId, DispatchContext, DispatchSettings,
    TrackingAdapter,
};
pub use api::DestinationRegistry;
pub use config::AnalyticsConfig;
pub use constants::{
    CONFIG_ENV_VAR, DEFAULT_POLL_INTERVAL_MS, GA4_TRACKING_ID_ENV_VAR, META_TRACKING_ID_ENV_VAR,
    POLL_INTERVAL_ENV_VAR, TIKTOK_TRACKING_ID_ENV_VAR,
};
pub use error::{DeliveryResult, DispatchError, DispatchErrorCode, DispatchResult};
pub use event::{AnalyticsEvent, EventParams};
pub use gtag::{GoogleAnalytics, GoogleAnalyticsConfig};
pub use loader::{
    HeadlessScriptLoader, LoadCallback, ScriptLoader, ScriptMatcher, ScriptPlacement,
    ScriptRequest, ScriptSource, ScriptStatus, ScriptTag,
};
pub use meta_pixel::{MetaPixel, MetaPixelConfig};
pub use tiktok_pixel::{TikTokPixel, TikTokPixelConfig};
pub use transport::{RecordingGlobals, VendorCall, VendorGlobals};
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use web::{BrowserGlobals, BrowserScriptLoader};
