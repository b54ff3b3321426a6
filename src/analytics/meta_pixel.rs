//! Meta (Facebook) Pixel through the global `fbq` queue.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::analytics::adapter::{Destination, DestinationId};
use crate::analytics::constants::META_PIXEL_SCRIPT_FRAGMENT;
use crate::analytics::event::AnalyticsEvent;
use crate::analytics::loader::{ScriptMatcher, ScriptPlacement, ScriptRequest, ScriptSource};
use crate::analytics::transport::VendorCall;
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@analytics-dispatch/meta"));

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaPixelConfig {
    pub measurement_id: String,
    /// Advertiser-side user identifier, passed to `fbq('init')` as `external_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl MetaPixelConfig {
    pub fn new(measurement_id: impl Into<String>) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct MetaPixel {
    measurement_id: String,
    user_id: Option<String>,
}

impl MetaPixel {
    fn init_arguments(&self) -> String {
        let mut args = vec![json!("init"), json!(self.measurement_id)];
        if let Some(user_id) = &self.user_id {
            args.push(json!({ "external_id": user_id }));
        }
        args.iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bootstrap(&self) -> String {
        format!(
            "!function(f,b,e,v,n,t,s)\
             {{if(f.fbq)return;n=f.fbq=function(){{n.callMethod?\
             n.callMethod.apply(n,arguments):n.queue.push(arguments)}};\
             if(!f._fbq)f._fbq=n;n.push=n;n.loaded=!0;n.version='2.0';\
             n.queue=[];t=b.createElement(e);t.async=!0;\
             t.src=v;s=b.getElementsByTagName(e)[0];\
             s.parentNode.insertBefore(t,s)}}(window, document,'script',\
             'https://{META_PIXEL_SCRIPT_FRAGMENT}');\n\
             fbq({init});\n\
             fbq('track', 'PageView');\n",
            init = self.init_arguments()
        )
    }
}

impl Destination for MetaPixel {
    type Config = MetaPixelConfig;

    const ID: DestinationId = DestinationId::Meta;

    fn from_config(config: &Self::Config) -> Self {
        Self {
            measurement_id: config.measurement_id.clone(),
            user_id: config.user_id.clone(),
        }
    }

    fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    fn script_request(&self) -> ScriptRequest {
        ScriptRequest {
            destination: Self::ID,
            matcher: ScriptMatcher::SourceContains(META_PIXEL_SCRIPT_FRAGMENT.into()),
            source: ScriptSource::Inline(self.bootstrap()),
            attributes: Vec::new(),
            prelude: None,
            placement: ScriptPlacement::Head,
        }
    }

    fn vendor_call(&self, event: &AnalyticsEvent) -> VendorCall {
        let mut args = vec![json!("track"), json!(event.name()), event.params_value()];
        if let Some(id) = event.id() {
            args.push(json!({ "eventID": id }));
        }
        VendorCall::Push {
            global: "fbq".into(),
            args,
        }
    }

    fn logger() -> &'static Logger {
        &LOGGER
    }
}
