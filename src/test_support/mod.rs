//! Test utilities shared across crate-level unit tests.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use crate::logger::{set_log_level, set_user_log_handler_fn, LogCallbackParams, LogLevel, Logger};

static LOG_TEST_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Serialises tests that touch process-wide logger state.
pub fn log_guard() -> MutexGuard<'static, ()> {
    LOG_TEST_GUARD
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

/// Collects every record emitted by one logger until dropped.
pub struct LogCapture {
    logger: Logger,
    records: Arc<Mutex<Vec<LogCallbackParams>>>,
}

impl LogCapture {
    pub fn start(logger: &Logger) -> Self {
        set_log_level(LogLevel::Debug).unwrap();
        logger.set_log_handler(|_, _, _| {});
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        let name = logger.name().to_owned();
        set_user_log_handler_fn(
            Some(move |params: LogCallbackParams| {
                if params.logger_type == name {
                    sink.lock().unwrap().push(params);
                }
            }),
            None,
        );
        Self {
            logger: logger.clone(),
            records,
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|params| params.level == LogLevel::Error)
            .map(|params| params.message.clone())
            .collect()
    }
}

impl Drop for LogCapture {
    fn drop(&mut self) {
        set_user_log_handler_fn(None::<fn(LogCallbackParams)>, None);
        self.logger.reset_log_handler();
        let _ = set_log_level(LogLevel::Info);
    }
}
