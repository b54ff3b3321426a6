use std::future::Future;
use std::time::Duration;

use futures::future::{abortable, AbortHandle};

/// Handle to a background task started with [`spawn_cancellable`].
#[derive(Debug, Clone)]
pub struct TaskHandle {
    abort: AbortHandle,
}

impl TaskHandle {
    /// Stops the task at its next suspension point.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Platform-independent helper to spawn an async task that runs in the background.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Platform-independent helper to spawn an async task that runs in the background.
///
/// Tasks run on the caller's tokio runtime when there is one, otherwise on a shared background
/// runtime owned by the crate.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static BACKGROUND_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("analytics-dispatch")
            .enable_time()
            .build()
            .expect("failed to build background tokio runtime")
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else {
        BACKGROUND_RUNTIME.spawn(future);
    }
}

/// Spawns `future` in the background and returns a handle that can cancel it.
#[cfg(target_arch = "wasm32")]
pub fn spawn_cancellable<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + 'static,
{
    let (task, abort) = abortable(future);
    spawn_detached(async move {
        let _ = task.await;
    });
    TaskHandle { abort }
}

/// Spawns `future` in the background and returns a handle that can cancel it.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_cancellable<F>(future: F) -> TaskHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let (task, abort) = abortable(future);
    spawn_detached(async move {
        let _ = task.await;
    });
    TaskHandle { abort }
}

/// Asynchronously waits for the provided duration in a platform-compatible way.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    use gloo_timers::future::sleep;
    sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    use tokio::time::sleep;
    sleep(duration).await;
}
