//! TikTok Pixel through the `ttq` namespace object.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analytics::adapter::{Destination, DestinationId};
use crate::analytics::constants::TIKTOK_PIXEL_MARKER_ATTRIBUTE;
use crate::analytics::event::AnalyticsEvent;
use crate::analytics::loader::{ScriptMatcher, ScriptPlacement, ScriptRequest, ScriptSource};
use crate::analytics::transport::VendorCall;
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@analytics-dispatch/tiktok"));

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TikTokPixelConfig {
    pub measurement_id: String,
}

impl TikTokPixelConfig {
    pub fn new(measurement_id: impl Into<String>) -> Self {
        Self {
            measurement_id: measurement_id.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TikTokPixel {
    measurement_id: String,
}

impl TikTokPixel {
    /// Value of the marker attribute identifying this pixel's bootstrap script.
    pub fn marker(&self) -> String {
        format!("tiktok-pixel-{}", self.measurement_id)
    }

    fn bootstrap(&self) -> String {
        let id = Value::String(self.measurement_id.clone());
        format!(
            "!function (w, d, t) {{\n\
             \x20 w.TiktokAnalyticsObject=t;var ttq=w[t]=w[t]||[];\
             ttq.methods=[\"page\",\"track\",\"identify\",\"instances\",\"debug\",\"on\",\"off\",\
             \"once\",\"ready\",\"alias\",\"group\",\"enableCookie\",\"disableCookie\"],\
             ttq.setAndDefer=function(t,e){{t[e]=function(){{t.push([e].concat(Array.prototype.slice.call(arguments,0)))}}}};\
             for(var i=0;i<ttq.methods.length;i++)ttq.setAndDefer(ttq,ttq.methods[i]);\
             ttq.instance=function(t){{for(var e=ttq._i[t]||[],n=0;n<ttq.methods.length;n++)\
             ttq.setAndDefer(e,ttq.methods[n]);return e}};\
             ttq.load=function(e,n){{var i=\"https://analytics.tiktok.com/i18n/pixel/events.js\";\
             ttq._i=ttq._i||{{}},ttq._i[e]=[],ttq._i[e]._u=i,ttq._t=ttq._t||{{}},ttq._t[e]=+new Date,\
             ttq._o=ttq._o||{{}},ttq._o[e]=n||{{}};var o=document.createElement(\"script\");\
             o.type=\"text/javascript\",o.async=!0,o.src=i+\"?sdkid=\"+e+\"&lib=\"+t;\
             var a=document.getElementsByTagName(\"script\")[0];a.parentNode.insertBefore(o,a)}};\n\
             \x20 ttq.load({id});\n\
             \x20 ttq.page();\n\
             }}(window, document, 'ttq');\n"
        )
    }
}

impl Destination for TikTokPixel {
    type Config = TikTokPixelConfig;

    const ID: DestinationId = DestinationId::TikTok;

    fn from_config(config: &Self::Config) -> Self {
        Self {
            measurement_id: config.measurement_id.clone(),
        }
    }

    fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    fn script_request(&self) -> ScriptRequest {
        let marker = self.marker();
        ScriptRequest {
            destination: Self::ID,
            matcher: ScriptMatcher::Attribute {
                name: TIKTOK_PIXEL_MARKER_ATTRIBUTE.into(),
                value: marker.clone(),
            },
            source: ScriptSource::Inline(self.bootstrap()),
            attributes: vec![(TIKTOK_PIXEL_MARKER_ATTRIBUTE.into(), marker)],
            prelude: None,
            placement: ScriptPlacement::Head,
        }
    }

    fn vendor_call(&self, event: &AnalyticsEvent) -> VendorCall {
        let mut args = vec![json!(event.name()), event.params_value()];
        if let Some(id) = event.id() {
            args.push(json!({ "event_id": id }));
        }
        VendorCall::Method {
            namespace: "ttq".into(),
            method: "track".into(),
            args,
        }
    }

    fn logger() -> &'static Logger {
        &LOGGER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::adapter::{DestinationAdapter, DispatchContext};
    use crate::analytics::loader::HeadlessScriptLoader;
    use crate::analytics::transport::RecordingGlobals;
    use crate::test_support::{log_guard, LogCapture};
    use std::sync::Arc;

    fn pixel() -> TikTokPixel {
        TikTokPixel::from_config(&TikTokPixelConfig::new("TT-PIXEL-1"))
    }

    #[test]
    fn script_is_marked_with_pixel_id() {
        let request = pixel().script_request();
        assert_eq!(
            request.matcher,
            ScriptMatcher::Attribute {
                name: "data-id".into(),
                value: "tiktok-pixel-TT-PIXEL-1".into(),
            }
        );
        assert_eq!(
            request.attributes,
            vec![("data-id".to_string(), "tiktok-pixel-TT-PIXEL-1".to_string())]
        );
        let ScriptSource::Inline(body) = request.source else {
            panic!("expected inline bootstrap");
        };
        assert!(body.contains("ttq.load(\"TT-PIXEL-1\");"));
        assert!(body.contains("ttq.page();"));
    }

    #[test]
    fn event_maps_to_track_method() {
        let call = pixel().vendor_call(
            &AnalyticsEvent::new("CompletePayment")
                .with_param("value", 99.99)
                .with_id("order-1"),
        );
        assert_eq!(
            call,
            VendorCall::Method {
                namespace: "ttq".into(),
                method: "track".into(),
                args: vec![
                    json!("CompletePayment"),
                    json!({"value": 99.99}),
                    json!({"event_id": "order-1"}),
                ],
            }
        );
    }

    #[test]
    fn missing_ttq_namespace_is_a_logged_failure() {
        let _guard = log_guard();
        let capture = LogCapture::start(TikTokPixel::logger());
        let loader = Arc::new(HeadlessScriptLoader::new());
        let globals = Arc::new(RecordingGlobals::new());
        let adapter: DestinationAdapter<TikTokPixel> = DestinationAdapter::new(
            TikTokPixelConfig::new("TT-PIXEL-1"),
            &DispatchContext::new(loader.clone(), globals.clone()),
        );
        loader.complete_load(DestinationId::TikTok);

        let event = AnalyticsEvent::new("AddToCart").with_param("content_id", "SKU123");
        let err = adapter.send_to_vendor(&event).unwrap_err();
        assert_eq!(err.message(), "ttq is not defined");

        adapter.submit(event);

        assert!(adapter.queue_snapshot().is_empty());
        assert!(globals.calls().is_empty());
        let errors = capture.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|message| message.contains("ttq is not defined")));
    }
}
