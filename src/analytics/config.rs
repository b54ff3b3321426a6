use serde::{Deserialize, Serialize};

use crate::analytics::adapter::{DestinationId, DispatchSettings};
use crate::analytics::constants::{
    CONFIG_ENV_VAR, GA4_TRACKING_ID_ENV_VAR, META_TRACKING_ID_ENV_VAR, POLL_INTERVAL_ENV_VAR,
    TIKTOK_TRACKING_ID_ENV_VAR,
};
use crate::analytics::error::{invalid_config, DispatchResult};
use crate::analytics::gtag::GoogleAnalyticsConfig;
use crate::analytics::meta_pixel::MetaPixelConfig;
use crate::analytics::tiktok_pixel::TikTokPixelConfig;
use crate::platform::environment::{env_value, json_object_from_env};

/// Per-destination configuration bundle. Destinations left as `None` are not set up.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(rename = "GA", default, skip_serializing_if = "Option::is_none")]
    pub google_analytics: Option<GoogleAnalyticsConfig>,
    #[serde(rename = "META", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaPixelConfig>,
    #[serde(rename = "TIKTOK", default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<TikTokPixelConfig>,
    #[serde(default)]
    pub settings: DispatchSettings,
}

impl AnalyticsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_google_analytics(mut self, config: GoogleAnalyticsConfig) -> Self {
        self.google_analytics = Some(config);
        self
    }

    pub fn with_meta(mut self, config: MetaPixelConfig) -> Self {
        self.meta = Some(config);
        self
    }

    pub fn with_tiktok(mut self, config: TikTokPixelConfig) -> Self {
        self.tiktok = Some(config);
        self
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Parses and validates a JSON bundle such as
    /// `{"GA": {"measurementId": "G-1"}, "settings": {"pollIntervalMs": 250}}`.
    pub fn from_json_str(raw: &str) -> DispatchResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| invalid_config(format!("invalid analytics config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the bundle from the process environment.
    ///
    /// `ANALYTICS_DISPATCH_CONFIG` wins when set (inline JSON or a path to a JSON file).
    /// Otherwise each destination is enabled by its own tracking id variable.
    pub fn from_env() -> DispatchResult<Self> {
        let mut config = match json_object_from_env(CONFIG_ENV_VAR) {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| invalid_config(format!("invalid {CONFIG_ENV_VAR}: {err}")))?,
            None if env_value(CONFIG_ENV_VAR).is_some() => {
                return Err(invalid_config(format!(
                    "{CONFIG_ENV_VAR} is neither a JSON object nor a readable JSON file"
                )))
            }
            None => Self {
                google_analytics: env_value(GA4_TRACKING_ID_ENV_VAR).map(GoogleAnalyticsConfig::new),
                meta: env_value(META_TRACKING_ID_ENV_VAR).map(MetaPixelConfig::new),
                tiktok: env_value(TIKTOK_TRACKING_ID_ENV_VAR).map(TikTokPixelConfig::new),
                settings: DispatchSettings::default(),
            },
        };

        if let Some(raw) = env_value(POLL_INTERVAL_ENV_VAR) {
            config.settings.poll_interval_ms = raw.parse().map_err(|_| {
                invalid_config(format!("{POLL_INTERVAL_ENV_VAR} must be a number of milliseconds"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        let ids = [
            (DestinationId::GoogleAnalytics, self.google_analytics.as_ref().map(|c| &c.measurement_id)),
            (DestinationId::Meta, self.meta.as_ref().map(|c| &c.measurement_id)),
            (DestinationId::TikTok, self.tiktok.as_ref().map(|c| &c.measurement_id)),
        ];
        for (destination, id) in ids {
            if id.is_some_and(|id| id.trim().is_empty()) {
                return Err(invalid_config(format!(
                    "{destination} measurementId must not be empty"
                )));
            }
        }
        if self.settings.poll_interval_ms == 0 {
            return Err(invalid_config("pollIntervalMs must be greater than zero"));
        }
        Ok(())
    }

    /// Destinations present in the bundle.
    pub fn destinations(&self) -> Vec<DestinationId> {
        let mut ids = Vec::new();
        if self.google_analytics.is_some() {
            ids.push(DestinationId::GoogleAnalytics);
        }
        if self.meta.is_some() {
            ids.push(DestinationId::Meta);
        }
        if self.tiktok.is_some() {
            ids.push(DestinationId::TikTok);
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.destinations().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 5] = [
        CONFIG_ENV_VAR,
        GA4_TRACKING_ID_ENV_VAR,
        META_TRACKING_ID_ENV_VAR,
        TIKTOK_TRACKING_ID_ENV_VAR,
        POLL_INTERVAL_ENV_VAR,
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn parses_full_bundle() {
        let config = AnalyticsConfig::from_json_str(
            r#"{
                "GA": {"measurementId": "G-TEST"},
                "META": {"measurementId": "1234", "userId": "user-1"},
                "TIKTOK": {"measurementId": "TT-1"},
                "settings": {"pollIntervalMs": 250}
            }"#,
        )
        .unwrap();

        assert_eq!(config.google_analytics, Some(GoogleAnalyticsConfig::new("G-TEST")));
        assert_eq!(
            config.meta,
            Some(MetaPixelConfig::new("1234").with_user_id("user-1"))
        );
        assert_eq!(config.tiktok, Some(TikTokPixelConfig::new("TT-1")));
        assert_eq!(config.settings.poll_interval_ms, 250);
        assert_eq!(
            config.destinations(),
            vec![
                DestinationId::GoogleAnalytics,
                DestinationId::Meta,
                DestinationId::TikTok
            ]
        );
    }

    #[test]
    fn missing_destinations_and_settings_default() {
        let config = AnalyticsConfig::from_json_str(r#"{"TIKTOK": {"measurementId": "TT-1"}}"#)
            .unwrap();
        assert!(config.google_analytics.is_none());
        assert!(config.meta.is_none());
        assert_eq!(config.settings, DispatchSettings::default());
        assert_eq!(config.destinations(), vec![DestinationId::TikTok]);
        assert!(AnalyticsConfig::from_json_str("{}").unwrap().is_empty());
    }

    #[test]
    fn rejects_invalid_bundles() {
        let err = AnalyticsConfig::from_json_str("not json").unwrap_err();
        assert_eq!(err.code_str(), "analytics/invalid-config");

        let err = AnalyticsConfig::from_json_str(r#"{"GA": {"measurementId": "  "}}"#).unwrap_err();
        assert!(err.message().contains("GA measurementId"));

        let err =
            AnalyticsConfig::from_json_str(r#"{"settings": {"pollIntervalMs": 0}}"#).unwrap_err();
        assert_eq!(err.code_str(), "analytics/invalid-config");
    }

    #[test]
    fn serializes_with_destination_keys() {
        let config = AnalyticsConfig::new().with_google_analytics(GoogleAnalyticsConfig::new("G-1"));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"GA": {"measurementId": "G-1"}, "settings": {"pollIntervalMs": 500}})
        );
    }

    #[test]
    fn env_sources_bundle_and_tracking_ids() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|poison| poison.into_inner());
        clear_env();

        std::env::set_var(GA4_TRACKING_ID_ENV_VAR, "G-ENV");
        std::env::set_var(TIKTOK_TRACKING_ID_ENV_VAR, " TT-ENV ");
        let config = AnalyticsConfig::from_env().unwrap();
        assert_eq!(config.google_analytics, Some(GoogleAnalyticsConfig::new("G-ENV")));
        assert!(config.meta.is_none());
        assert_eq!(config.tiktok, Some(TikTokPixelConfig::new("TT-ENV")));

        std::env::set_var(CONFIG_ENV_VAR, r#"{"META": {"measurementId": "M-ENV"}}"#);
        std::env::set_var(POLL_INTERVAL_ENV_VAR, "1000");
        let config = AnalyticsConfig::from_env().unwrap();
        assert!(config.google_analytics.is_none());
        assert_eq!(config.meta, Some(MetaPixelConfig::new("M-ENV")));
        assert_eq!(config.settings.poll_interval_ms, 1_000);

        std::env::set_var(CONFIG_ENV_VAR, "/definitely/not/a/config.json");
        assert!(AnalyticsConfig::from_env().is_err());

        clear_env();
    }
}
