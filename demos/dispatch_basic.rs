use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use analytics_dispatch::analytics::{
    AnalyticsConfig, AnalyticsEvent, DestinationId, DestinationRegistry, DispatchContext,
    HeadlessScriptLoader, RecordingGlobals,
};
use analytics_dispatch::logger::{set_log_level, LogLevel};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    set_log_level(LogLevel::Debug)?;

    // Falls back to a demo bundle when the environment carries no configuration.
    let config = match AnalyticsConfig::from_env()? {
        config if !config.is_empty() => config,
        _ => AnalyticsConfig::from_json_str(
            r#"{
                "GA": {"measurementId": "G-DEMO"},
                "META": {"measurementId": "1234567890", "userId": "demo-user"},
                "TIKTOK": {"measurementId": "TT-DEMO"},
                "settings": {"pollIntervalMs": 200}
            }"#,
        )?,
    };

    let loader = Arc::new(HeadlessScriptLoader::new());
    let globals = Arc::new(RecordingGlobals::new());
    globals.define_function("gtag");
    globals.define_queue("fbq");
    globals.define_namespace("ttq", ["load", "page", "track"]);

    let registry = DestinationRegistry::with_config(
        DispatchContext::new(loader.clone(), globals.clone()),
        &config,
    );

    registry.broadcast(&AnalyticsEvent::new("page_view").with_param("page_title", "Home"));
    registry.broadcast(
        &AnalyticsEvent::new("purchase")
            .with_param("transaction_id", "T12345")
            .with_param("value", 99.99)
            .with_id("order-T12345"),
    );
    println!("queued before load: {}", globals.calls().is_empty());

    for id in DestinationId::ALL {
        loader.complete_load(id);
    }
    tokio::time::sleep(Duration::from_millis(
        config.settings.poll_interval_ms + 100,
    ))
    .await;

    for call in globals.calls() {
        println!("{} <- {}", call.global(), serde_json::to_string(call.args())?);
    }

    registry.dispose();
    Ok(())
}
