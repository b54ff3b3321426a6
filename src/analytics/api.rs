use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex};

use crate::analytics::adapter::{
    lock, Destination, DestinationAdapter, DestinationId, DispatchContext, TrackingAdapter,
};
use crate::analytics::config::AnalyticsConfig;
use crate::analytics::event::AnalyticsEvent;
use crate::analytics::gtag::GoogleAnalytics;
use crate::analytics::meta_pixel::MetaPixel;
use crate::analytics::tiktok_pixel::TikTokPixel;
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@analytics-dispatch/registry"));

type DynAdapter = Arc<dyn Any + Send + Sync>;

struct RegistryEntry {
    type_id: TypeId,
    id: DestinationId,
    instance: DynAdapter,
    sink: Arc<dyn TrackingAdapter>,
}

/// Owns at most one adapter per destination type.
///
/// The first [`Destination::get_instance`] call for a destination fixes its configuration; later
/// calls return the same adapter whatever configuration they pass. Id lookups resolve to the
/// first adapter registered under that [`DestinationId`].
pub struct DestinationRegistry {
    context: DispatchContext,
    entries: Mutex<Vec<RegistryEntry>>,
}

impl fmt::Debug for DestinationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationRegistry")
            .field("context", &self.context)
            .field("configured", &self.configured())
            .finish()
    }
}

impl DestinationRegistry {
    pub fn new(context: DispatchContext) -> Self {
        Self {
            context,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Registry using the bundle's settings, with every destination of the bundle configured.
    pub fn with_config(context: DispatchContext, config: &AnalyticsConfig) -> Self {
        let registry = Self::new(context.with_settings(config.settings.clone()));
        registry.configure(config);
        registry
    }

    pub fn context(&self) -> &DispatchContext {
        &self.context
    }

    /// Returns the adapter registered for `D`, creating it from `config` on first use.
    pub fn get_instance<D: Destination>(&self, config: D::Config) -> DestinationAdapter<D> {
        let mut entries = lock(&self.entries);
        if let Some(adapter) = find_typed::<D>(&entries) {
            if *adapter.config() != config {
                LOGGER.debug(format!(
                    "{} already configured, keeping measurement id {}",
                    D::ID,
                    adapter.measurement_id()
                ));
            }
            return adapter;
        }

        if entries.iter().any(|entry| entry.id == D::ID) {
            LOGGER.warn(format!(
                "{} is already served by another destination type; id lookups keep the first one",
                D::ID
            ));
        }

        let adapter = DestinationAdapter::<D>::new(config, &self.context);
        LOGGER.debug(format!(
            "registered {} ({})",
            D::ID,
            adapter.measurement_id()
        ));
        entries.push(RegistryEntry {
            type_id: TypeId::of::<D>(),
            id: D::ID,
            instance: Arc::new(adapter.clone()),
            sink: Arc::new(adapter.clone()),
        });
        adapter
    }

    /// Creates adapters for the destinations present in `config`. Destinations that are absent
    /// from the bundle, or already configured, are left untouched.
    pub fn configure(&self, config: &AnalyticsConfig) {
        if let Some(ga) = &config.google_analytics {
            GoogleAnalytics::get_instance(self, ga.clone());
        }
        if let Some(meta) = &config.meta {
            MetaPixel::get_instance(self, meta.clone());
        }
        if let Some(tiktok) = &config.tiktok {
            TikTokPixel::get_instance(self, tiktok.clone());
        }
    }

    pub fn lookup(&self, id: DestinationId) -> Option<Arc<dyn TrackingAdapter>> {
        lock(&self.entries)
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| Arc::clone(&entry.sink))
    }

    /// Typed variant of [`DestinationRegistry::lookup`].
    pub fn adapter<D: Destination>(&self) -> Option<DestinationAdapter<D>> {
        find_typed::<D>(&lock(&self.entries))
    }

    /// Configured destinations in registration order, each listed once.
    pub fn configured(&self) -> Vec<DestinationId> {
        let mut ids = Vec::new();
        for entry in lock(&self.entries).iter() {
            if !ids.contains(&entry.id) {
                ids.push(entry.id);
            }
        }
        ids
    }

    /// Submits a copy of `event` to every configured destination.
    pub fn broadcast(&self, event: &AnalyticsEvent) {
        let sinks: Vec<_> = lock(&self.entries)
            .iter()
            .map(|entry| Arc::clone(&entry.sink))
            .collect();
        for sink in sinks {
            sink.submit(event.clone());
        }
    }

    /// Cancels the pending retries of every adapter.
    pub fn dispose(&self) {
        let sinks: Vec<_> = lock(&self.entries)
            .iter()
            .map(|entry| Arc::clone(&entry.sink))
            .collect();
        for sink in sinks {
            sink.dispose();
        }
    }
}

fn find_typed<D: Destination>(entries: &[RegistryEntry]) -> Option<DestinationAdapter<D>> {
    entries
        .iter()
        .find(|entry| entry.type_id == TypeId::of::<D>())
        .and_then(|entry| entry.instance.downcast_ref::<DestinationAdapter<D>>().cloned())
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::analytics::gtag::GoogleAnalyticsConfig;
    use crate::analytics::loader::{HeadlessScriptLoader, ScriptRequest};
    use crate::analytics::meta_pixel::MetaPixelConfig;
    use crate::analytics::tiktok_pixel::TikTokPixelConfig;
    use crate::analytics::transport::{RecordingGlobals, VendorCall};
    use serde_json::json;
    use std::time::Duration;

    /// Second destination type reusing the Google Analytics id.
    struct MirrorAnalytics(GoogleAnalytics);

    impl Destination for MirrorAnalytics {
        type Config = GoogleAnalyticsConfig;

        const ID: DestinationId = DestinationId::GoogleAnalytics;

        fn from_config(config: &Self::Config) -> Self {
            Self(GoogleAnalytics::from_config(config))
        }

        fn measurement_id(&self) -> &str {
            self.0.measurement_id()
        }

        fn script_request(&self) -> ScriptRequest {
            self.0.script_request()
        }

        fn vendor_call(&self, event: &AnalyticsEvent) -> VendorCall {
            self.0.vendor_call(event)
        }

        fn logger() -> &'static Logger {
            GoogleAnalytics::logger()
        }
    }

    fn registry() -> (DestinationRegistry, Arc<HeadlessScriptLoader>, Arc<RecordingGlobals>) {
        let loader = Arc::new(HeadlessScriptLoader::new());
        let globals = Arc::new(RecordingGlobals::new());
        let context = DispatchContext::new(loader.clone(), globals.clone());
        (DestinationRegistry::new(context), loader, globals)
    }

    #[test]
    fn first_configuration_wins() {
        let (registry, loader, _) = registry();

        let first = GoogleAnalytics::get_instance(&registry, GoogleAnalyticsConfig::new("G-FIRST"));
        let second =
            GoogleAnalytics::get_instance(&registry, GoogleAnalyticsConfig::new("G-SECOND"));

        assert!(first.ptr_eq(&second));
        assert_eq!(second.measurement_id(), "G-FIRST");
        assert_eq!(second.config(), &GoogleAnalyticsConfig::new("G-FIRST"));
        assert_eq!(loader.pending_loads(), 1);
    }

    #[test]
    fn destinations_get_separate_adapters() {
        let (registry, loader, _) = registry();

        let meta = MetaPixel::get_instance(&registry, MetaPixelConfig::new("M-1"));
        let tiktok = TikTokPixel::get_instance(&registry, TikTokPixelConfig::new("TT-1"));

        assert_eq!(meta.destination_id(), DestinationId::Meta);
        assert_eq!(tiktok.destination_id(), DestinationId::TikTok);
        assert_eq!(loader.pending_loads(), 2);
        assert_eq!(
            registry.configured(),
            vec![DestinationId::Meta, DestinationId::TikTok]
        );
    }

    #[test]
    fn configure_is_additive() {
        let (registry, _, _) = registry();

        registry.configure(
            &AnalyticsConfig::new().with_google_analytics(GoogleAnalyticsConfig::new("G-1")),
        );
        let ga = registry.lookup(DestinationId::GoogleAnalytics).unwrap();
        assert!(registry.lookup(DestinationId::Meta).is_none());

        registry.configure(
            &AnalyticsConfig::new()
                .with_google_analytics(GoogleAnalyticsConfig::new("G-2"))
                .with_tiktok(TikTokPixelConfig::new("TT-1")),
        );

        let ga_again = registry.lookup(DestinationId::GoogleAnalytics).unwrap();
        assert!(Arc::ptr_eq(&ga, &ga_again));
        assert_eq!(ga_again.measurement_id(), "G-1");
        assert_eq!(
            registry.lookup(DestinationId::TikTok).unwrap().measurement_id(),
            "TT-1"
        );
        assert!(registry.lookup(DestinationId::Meta).is_none());
    }

    #[test]
    fn typed_lookup_returns_registered_adapter() {
        let (registry, _, _) = registry();
        assert!(registry.adapter::<TikTokPixel>().is_none());

        let created = TikTokPixel::get_instance(&registry, TikTokPixelConfig::new("TT-1"));
        let found = registry.adapter::<TikTokPixel>().unwrap();
        assert!(created.ptr_eq(&found));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn broadcast_reaches_every_ready_destination() {
        let (registry, loader, globals) = registry();
        globals.define_function("gtag");
        globals.define_queue("fbq");
        globals.define_namespace("ttq", ["page", "track"]);

        registry.configure(
            &AnalyticsConfig::new()
                .with_google_analytics(GoogleAnalyticsConfig::new("G-1"))
                .with_meta(MetaPixelConfig::new("M-1"))
                .with_tiktok(TikTokPixelConfig::new("TT-1")),
        );
        for id in DestinationId::ALL {
            loader.complete_load(id);
        }

        registry.broadcast(&AnalyticsEvent::new("sign_up").with_param("method", "email"));

        let calls = globals.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            VendorCall::Push {
                global: "fbq".into(),
                args: vec![json!("track"), json!("sign_up"), json!({"method": "email"})],
            }
        );
        assert_eq!(calls[2].global(), "ttq");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dispose_stops_every_retry() {
        let (registry, loader, globals) = registry();
        globals.define_function("gtag");
        let ga = GoogleAnalytics::get_instance(&registry, GoogleAnalyticsConfig::new("G-1"));

        registry.broadcast(&AnalyticsEvent::new("queued"));
        assert!(ga.is_retry_scheduled());
        registry.dispose();
        assert!(!ga.is_retry_scheduled());

        loader.complete_load(DestinationId::GoogleAnalytics);
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(globals.calls().is_empty());
        assert_eq!(ga.queue_snapshot().len(), 1);
    }

    #[test]
    fn with_config_applies_settings() {
        let loader = Arc::new(HeadlessScriptLoader::new());
        let globals = Arc::new(RecordingGlobals::new());
        let config = AnalyticsConfig::from_json_str(
            r#"{"META": {"measurementId": "M-1"}, "settings": {"pollIntervalMs": 50}}"#,
        )
        .unwrap();

        let registry =
            DestinationRegistry::with_config(DispatchContext::new(loader, globals), &config);

        assert_eq!(registry.context().settings().poll_interval_ms, 50);
        assert_eq!(registry.configured(), vec![DestinationId::Meta]);
    }

    #[test]
    fn types_sharing_an_id_are_registered_separately() {
        let (registry, _, _) = registry();
        let ga = GoogleAnalytics::get_instance(&registry, GoogleAnalyticsConfig::new("G-1"));

        let mirror = MirrorAnalytics::get_instance(&registry, GoogleAnalyticsConfig::new("G-2"));
        let mirror_again =
            MirrorAnalytics::get_instance(&registry, GoogleAnalyticsConfig::new("G-3"));

        assert!(mirror.ptr_eq(&mirror_again));
        assert_eq!(mirror_again.measurement_id(), "G-2");
        assert!(registry.adapter::<MirrorAnalytics>().unwrap().ptr_eq(&mirror));
        assert!(registry.adapter::<GoogleAnalytics>().unwrap().ptr_eq(&ga));
        assert_eq!(
            registry
                .lookup(DestinationId::GoogleAnalytics)
                .unwrap()
                .measurement_id(),
            "G-1"
        );
        assert_eq!(registry.configured(), vec![DestinationId::GoogleAnalytics]);
    }
}
