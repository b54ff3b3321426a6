use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analytics::api::DestinationRegistry;
use crate::analytics::constants::{DEFAULT_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS};
use crate::analytics::error::{invalid_config, DeliveryResult, DispatchError};
use crate::analytics::event::AnalyticsEvent;
use crate::analytics::loader::{ScriptLoader, ScriptRequest};
use crate::analytics::transport::{VendorCall, VendorGlobals};
use crate::logger::{LogArgument, Logger};
use crate::platform::runtime::{sleep, spawn_cancellable, TaskHandle};

/// Identifier of a tracking destination, doubling as its configuration key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DestinationId {
    #[serde(rename = "GA")]
    GoogleAnalytics,
    #[serde(rename = "META")]
    Meta,
    #[serde(rename = "TIKTOK")]
    TikTok,
}

impl DestinationId {
    pub const ALL: [DestinationId; 3] = [
        DestinationId::GoogleAnalytics,
        DestinationId::Meta,
        DestinationId::TikTok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationId::GoogleAnalytics => "GA",
            DestinationId::Meta => "META",
            DestinationId::TikTok => "TIKTOK",
        }
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DestinationId {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DestinationId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| invalid_config(format!("unknown destination '{s}'")))
    }
}

/// Tunables shared by every adapter created from one [`DispatchContext`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    pub poll_interval_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl DispatchSettings {
    /// Delay between retries, never shorter than 1 ms so the retry task always yields.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// The external collaborators an adapter is wired to.
#[derive(Clone)]
pub struct DispatchContext {
    loader: Arc<dyn ScriptLoader>,
    globals: Arc<dyn VendorGlobals>,
    settings: DispatchSettings,
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DispatchContext {
    pub fn new(loader: Arc<dyn ScriptLoader>, globals: Arc<dyn VendorGlobals>) -> Self {
        Self {
            loader,
            globals,
            settings: DispatchSettings::default(),
        }
    }

    /// Context bound to the page's `document` and `window` globals.
    #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
    pub fn browser() -> Self {
        use crate::analytics::web::{BrowserGlobals, BrowserScriptLoader};
        Self::new(Arc::new(BrowserScriptLoader), Arc::new(BrowserGlobals))
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn loader(&self) -> &Arc<dyn ScriptLoader> {
        &self.loader
    }

    pub fn globals(&self) -> &Arc<dyn VendorGlobals> {
        &self.globals
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }
}

/// What distinguishes one tracking destination from another.
///
/// Everything else (queueing, readiness, retries) lives in [`DestinationAdapter`].
pub trait Destination: Send + Sync + Sized + 'static {
    type Config: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    const ID: DestinationId;

    fn from_config(config: &Self::Config) -> Self;

    fn measurement_id(&self) -> &str;

    /// Detection predicate, bootstrap content and injection point of the vendor script.
    fn script_request(&self) -> ScriptRequest;

    /// Translates an event into this destination's calling convention.
    fn vendor_call(&self, event: &AnalyticsEvent) -> VendorCall;

    fn logger() -> &'static Logger;

    /// Returns the registry's adapter for this destination, creating it on first use.
    /// Later calls ignore `config` and hand back the original instance.
    fn get_instance(registry: &DestinationRegistry, config: Self::Config) -> DestinationAdapter<Self> {
        registry.get_instance::<Self>(config)
    }
}

/// Object-safe view of an adapter, used for lookups by [`DestinationId`].
pub trait TrackingAdapter: Send + Sync {
    fn destination_id(&self) -> DestinationId;
    fn measurement_id(&self) -> &str;
    fn submit(&self, event: AnalyticsEvent);
    fn attempt_delivery(&self);
    fn is_ready(&self) -> bool;
    fn queue_snapshot(&self) -> Vec<AnalyticsEvent>;
    fn dispose(&self);
}

/// Readiness-gated queue in front of one destination.
///
/// Events submitted before the vendor script has loaded are buffered and delivered in
/// submission order on the first delivery pass after readiness. Each event is removed from the
/// queue when its delivery is attempted, so a failed send is logged and dropped.
pub struct DestinationAdapter<D: Destination> {
    inner: Arc<AdapterInner<D>>,
}

impl<D: Destination> Clone for DestinationAdapter<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Destination> fmt::Debug for DestinationAdapter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationAdapter")
            .field("destination", &D::ID)
            .field("measurement_id", &self.measurement_id())
            .field("ready", &self.is_ready())
            .field("queued", &lock(&self.inner.queue).len())
            .finish()
    }
}

struct AdapterInner<D: Destination> {
    destination: D,
    config: D::Config,
    globals: Arc<dyn VendorGlobals>,
    poll_interval: Duration,
    ready: AtomicBool,
    disposed: AtomicBool,
    queue: Mutex<Vec<AnalyticsEvent>>,
    delivering: Mutex<()>,
    retry: Mutex<Option<TaskHandle>>,
}

impl<D: Destination> DestinationAdapter<D> {
    /// Builds an adapter and immediately requests the vendor script.
    ///
    /// Prefer [`Destination::get_instance`], which keeps one adapter per destination.
    pub fn new(config: D::Config, context: &DispatchContext) -> Self {
        let inner = AdapterInner {
            destination: D::from_config(&config),
            config,
            globals: Arc::clone(context.globals()),
            poll_interval: context.settings().poll_interval(),
            ready: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            queue: Mutex::new(Vec::new()),
            delivering: Mutex::new(()),
            retry: Mutex::new(None),
        };
        let adapter = Self {
            inner: Arc::new(inner),
        };
        adapter.initialize(context.loader().as_ref());
        adapter
    }

    fn initialize(&self, loader: &dyn ScriptLoader) {
        let request = self.inner.destination.script_request();
        let weak = Arc::downgrade(&self.inner);
        let status = loader.inject_if_absent(
            &request,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    D::logger().debug(format!("{} script loaded", D::ID));
                    inner.mark_ready();
                }
            }),
        );
        if status.already_present {
            D::logger().debug(format!("{} script already present", D::ID));
            self.inner.mark_ready();
        }
    }

    /// Queues `event` and tries to deliver everything pending.
    pub fn submit(&self, event: AnalyticsEvent) {
        lock(&self.inner.queue).push(event);
        self.attempt_delivery();
    }

    /// Flushes the queue when ready, otherwise makes sure a retry is scheduled.
    pub fn attempt_delivery(&self) {
        AdapterInner::attempt_delivery(&self.inner);
    }

    /// Hands one event to the vendor global. Failures are logged and returned, never raised.
    pub fn send_to_vendor(&self, event: &AnalyticsEvent) -> DeliveryResult {
        self.inner.send_to_vendor(event)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Copy of the events still waiting for delivery.
    pub fn queue_snapshot(&self) -> Vec<AnalyticsEvent> {
        lock(&self.inner.queue).clone()
    }

    /// Cancels the pending retry, if any. Queued events stay queued and later submissions are
    /// still delivered once the destination is ready.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        if let Some(task) = lock(&self.inner.retry).take() {
            task.cancel();
        }
    }

    pub fn is_retry_scheduled(&self) -> bool {
        lock(&self.inner.retry)
            .as_ref()
            .is_some_and(|task| !task.is_cancelled())
    }

    pub fn destination_id(&self) -> DestinationId {
        D::ID
    }

    pub fn measurement_id(&self) -> &str {
        self.inner.destination.measurement_id()
    }

    /// Configuration the adapter was created with.
    pub fn config(&self) -> &D::Config {
        &self.inner.config
    }

    pub fn destination(&self) -> &D {
        &self.inner.destination
    }

    /// Whether both handles refer to the same adapter instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<D: Destination> AdapterInner<D> {
    fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    fn attempt_delivery(this: &Arc<Self>) {
        if this.ready.load(Ordering::SeqCst) {
            this.flush();
        } else {
            Self::schedule_retry(this);
        }
    }

    fn flush(&self) {
        // A pass already running on this adapter re-reads the queue before it returns.
        let delivering = match self.delivering.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poison)) => poison.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };

        loop {
            let mut queue = lock(&self.queue);
            if queue.is_empty() {
                // Released while the queue is still locked so no submission slips in between.
                drop(delivering);
                return;
            }
            let batch = std::mem::take(&mut *queue);
            drop(queue);

            for event in &batch {
                let _ = self.send_to_vendor(event);
            }
        }
    }

    fn send_to_vendor(&self, event: &AnalyticsEvent) -> DeliveryResult {
        let call = self.destination.vendor_call(event);
        self.globals.invoke(&call).inspect_err(|err| {
            D::logger().error_with([
                LogArgument::Text(format!("[{}] failed to send '{}': {err}", D::ID, event.name())),
                LogArgument::Value(event.params_value()),
            ]);
        })
    }

    fn schedule_retry(this: &Arc<Self>) {
        if this.disposed.load(Ordering::SeqCst) {
            return;
        }

        let mut retry = lock(&this.retry);
        if retry.as_ref().is_some_and(|task| !task.is_cancelled()) {
            return;
        }

        let weak = Arc::downgrade(this);
        let interval = this.poll_interval;
        *retry = Some(spawn_cancellable(async move {
            loop {
                sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.ready.load(Ordering::SeqCst) {
                    lock(&inner.retry).take();
                    inner.flush();
                    break;
                }
            }
        }));
        D::logger().debug(format!(
            "{} not ready, retrying every {}ms",
            D::ID,
            interval.as_millis()
        ));
    }
}

impl<D: Destination> TrackingAdapter for DestinationAdapter<D> {
    fn destination_id(&self) -> DestinationId {
        D::ID
    }

    fn measurement_id(&self) -> &str {
        DestinationAdapter::measurement_id(self)
    }

    fn submit(&self, event: AnalyticsEvent) {
        DestinationAdapter::submit(self, event);
    }

    fn attempt_delivery(&self) {
        DestinationAdapter::attempt_delivery(self);
    }

    fn is_ready(&self) -> bool {
        DestinationAdapter::is_ready(self)
    }

    fn queue_snapshot(&self) -> Vec<AnalyticsEvent> {
        DestinationAdapter::queue_snapshot(self)
    }

    fn dispose(&self) {
        DestinationAdapter::dispose(self);
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
