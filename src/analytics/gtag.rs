//! Google Analytics 4 through the global `gtag` function.
//!
//! The bootstrap defines a `dataLayer`-backed `gtag` stub before the library script is inserted,
//! so calls made while `gtag/js` is still downloading are buffered by Google's own queue.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::form_urlencoded;

use crate::analytics::adapter::{Destination, DestinationId};
use crate::analytics::constants::GTAG_SCRIPT_URL;
use crate::analytics::event::AnalyticsEvent;
use crate::analytics::loader::{ScriptMatcher, ScriptPlacement, ScriptRequest, ScriptSource};
use crate::analytics::transport::VendorCall;
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@analytics-dispatch/ga"));

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAnalyticsConfig {
    pub measurement_id: String,
}

impl GoogleAnalyticsConfig {
    pub fn new(measurement_id: impl Into<String>) -> Self {
        Self {
            measurement_id: measurement_id.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GoogleAnalytics {
    measurement_id: String,
}

impl GoogleAnalytics {
    pub fn script_url(&self) -> String {
        let id: String = form_urlencoded::byte_serialize(self.measurement_id.as_bytes()).collect();
        format!("{GTAG_SCRIPT_URL}?id={id}")
    }

    fn bootstrap(&self) -> String {
        let id = Value::String(self.measurement_id.clone());
        format!(
            "window.dataLayer = window.dataLayer || [];\n\
             if (typeof window.gtag !== 'function') {{\n\
             \x20 window.gtag = function gtag() {{ window.dataLayer.push(arguments); }};\n\
             \x20 window.gtag('js', new Date());\n\
             \x20 window.gtag('config', {id});\n\
             }}\n"
        )
    }
}

impl Destination for GoogleAnalytics {
    type Config = GoogleAnalyticsConfig;

    const ID: DestinationId = DestinationId::GoogleAnalytics;

    fn from_config(config: &Self::Config) -> Self {
        Self {
            measurement_id: config.measurement_id.clone(),
        }
    }

    fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    fn script_request(&self) -> ScriptRequest {
        let src = self.script_url();
        ScriptRequest {
            destination: Self::ID,
            matcher: ScriptMatcher::SourceEquals(src.clone()),
            source: ScriptSource::External {
                src,
                async_load: true,
            },
            attributes: Vec::new(),
            prelude: Some(self.bootstrap()),
            placement: ScriptPlacement::Head,
        }
    }

    fn vendor_call(&self, event: &AnalyticsEvent) -> VendorCall {
        VendorCall::Function {
            global: "gtag".into(),
            args: vec![json!("event"), json!(event.name()), event.params_value()],
        }
    }

    fn logger() -> &'static Logger {
        &LOGGER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(id: &str) -> GoogleAnalytics {
        GoogleAnalytics::from_config(&GoogleAnalyticsConfig::new(id))
    }

    #[test]
    fn script_url_carries_measurement_id() {
        assert_eq!(
            destination("G-TEST-ID").script_url(),
            "https://www.googletagmanager.com/gtag/js?id=G-TEST-ID"
        );
        assert_eq!(
            destination("G 1&x").script_url(),
            "https://www.googletagmanager.com/gtag/js?id=G+1%26x"
        );
    }

    #[test]
    fn script_request_detects_exact_source() {
        let request = destination("G-TEST-ID").script_request();
        assert_eq!(request.destination, DestinationId::GoogleAnalytics);
        assert_eq!(
            request.matcher,
            ScriptMatcher::SourceEquals("https://www.googletagmanager.com/gtag/js?id=G-TEST-ID".into())
        );
        assert!(matches!(
            request.source,
            ScriptSource::External { async_load: true, .. }
        ));
        let prelude = request.prelude.unwrap();
        assert!(prelude.contains("window.dataLayer = window.dataLayer || [];"));
        assert!(prelude.contains("window.gtag('config', \"G-TEST-ID\");"));
    }

    #[test]
    fn event_maps_to_gtag_event_command() {
        let event = AnalyticsEvent::new("purchase")
            .with_param("transaction_id", "T12345")
            .with_param("value", 250.0)
            .with_id("ignored-by-ga");

        let call = destination("G-TEST-ID").vendor_call(&event);

        assert_eq!(
            call,
            VendorCall::Function {
                global: "gtag".into(),
                args: vec![
                    json!("event"),
                    json!("purchase"),
                    json!({"transaction_id": "T12345", "value": 250.0}),
                ],
            }
        );
    }

    #[test]
    fn config_uses_camel_case_keys() {
        let config: GoogleAnalyticsConfig =
            serde_json::from_str(r#"{"measurementId":"G-123"}"#).unwrap();
        assert_eq!(config, GoogleAnalyticsConfig::new("G-123"));
    }
}
