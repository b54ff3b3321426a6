//! Hand-off of events to the vendor-owned global tracking functions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::analytics::error::{destination_unavailable, vendor_call_failed, DeliveryResult};

/// Shape of a call into a vendor global.
#[derive(Clone, Debug, PartialEq)]
pub enum VendorCall {
    /// `global(...args)`
    Function { global: String, args: Vec<Value> },
    /// `global.push(...args)`
    Push { global: String, args: Vec<Value> },
    /// `namespace.method(...args)`; both the namespace and the method may be missing.
    Method {
        namespace: String,
        method: String,
        args: Vec<Value>,
    },
}

impl VendorCall {
    pub fn global(&self) -> &str {
        match self {
            VendorCall::Function { global, .. } | VendorCall::Push { global, .. } => global,
            VendorCall::Method { namespace, .. } => namespace,
        }
    }

    pub fn args(&self) -> &[Value] {
        match self {
            VendorCall::Function { args, .. }
            | VendorCall::Push { args, .. }
            | VendorCall::Method { args, .. } => args,
        }
    }
}

/// Access to the globals defined by vendor bootstrap scripts.
///
/// Implementations must check that the target exists before calling it and must report a call
/// that raised as an error instead of unwinding.
pub trait VendorGlobals: Send + Sync {
    fn invoke(&self, call: &VendorCall) -> DeliveryResult;
}

/// Failure handler for globals defined with [`RecordingGlobals::define_failing_function`].
type CallHook = Arc<dyn Fn(&[Value]) -> Result<(), String> + Send + Sync>;

enum GlobalEntry {
    Function(Option<CallHook>),
    Queue,
    Namespace(BTreeSet<String>),
}

/// In-memory globals that record every successful vendor call.
///
/// Globals start undefined, the state of a page whose bootstrap scripts have not run.
#[derive(Default)]
pub struct RecordingGlobals {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    globals: BTreeMap<String, GlobalEntry>,
    calls: Vec<VendorCall>,
}

impl fmt::Debug for RecordingGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("RecordingGlobals")
            .field("globals", &state.globals.keys().collect::<Vec<_>>())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl RecordingGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a callable global such as `gtag`.
    pub fn define_function(&self, name: impl Into<String>) {
        self.state()
            .globals
            .insert(name.into(), GlobalEntry::Function(None));
    }

    /// Defines a callable global whose invocation runs `hook`; an `Err` simulates a throw.
    pub fn define_failing_function<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn(&[Value]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.state()
            .globals
            .insert(name.into(), GlobalEntry::Function(Some(Arc::new(hook))));
    }

    /// Defines a global exposing the array-push convention, such as `fbq`.
    pub fn define_queue(&self, name: impl Into<String>) {
        self.state().globals.insert(name.into(), GlobalEntry::Queue);
    }

    /// Defines a namespace object carrying the listed methods, such as `ttq`.
    pub fn define_namespace<I, S>(&self, name: impl Into<String>, methods: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let methods = methods.into_iter().map(Into::into).collect();
        self.state()
            .globals
            .insert(name.into(), GlobalEntry::Namespace(methods));
    }

    pub fn remove(&self, name: &str) {
        self.state().globals.remove(name);
    }

    /// Calls that reached a defined global, in invocation order.
    pub fn calls(&self) -> Vec<VendorCall> {
        self.state().calls.clone()
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl VendorGlobals for RecordingGlobals {
    fn invoke(&self, call: &VendorCall) -> DeliveryResult {
        let mut state = self.state();
        let hook = match (call, state.globals.get(call.global())) {
            (VendorCall::Function { .. }, Some(GlobalEntry::Function(hook))) => hook.clone(),
            (VendorCall::Push { .. }, Some(GlobalEntry::Queue)) => None,
            (VendorCall::Method { method, .. }, Some(GlobalEntry::Namespace(methods))) => {
                if !methods.contains(method) {
                    return Err(destination_unavailable(format!(
                        "{}.{method} is not defined",
                        call.global()
                    )));
                }
                None
            }
            (_, Some(_)) => {
                return Err(vendor_call_failed(format!(
                    "{} does not support this calling convention",
                    call.global()
                )))
            }
            (_, None) => {
                return Err(destination_unavailable(format!(
                    "{} is not defined",
                    call.global()
                )))
            }
        };

        if let Some(hook) = hook {
            drop(state);
            hook(call.args()).map_err(vendor_call_failed)?;
            state = self.state();
        }
        state.calls.push(call.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::error::DispatchErrorCode;
    use serde_json::json;

    fn gtag_call(name: &str) -> VendorCall {
        VendorCall::Function {
            global: "gtag".into(),
            args: vec![json!("event"), json!(name), json!({})],
        }
    }

    #[test]
    fn undefined_global_is_unavailable() {
        let globals = RecordingGlobals::new();
        let err = globals.invoke(&gtag_call("login")).unwrap_err();
        assert_eq!(err.code, DispatchErrorCode::DestinationUnavailable);
        assert_eq!(err.message(), "gtag is not defined");
        assert!(globals.calls().is_empty());
    }

    #[test]
    fn failing_function_reports_call_failure() {
        let globals = RecordingGlobals::new();
        globals.define_failing_function("gtag", |_| Err("blocked by extension".into()));
        let err = globals.invoke(&gtag_call("login")).unwrap_err();
        assert_eq!(err.code, DispatchErrorCode::VendorCallFailed);
        assert!(globals.calls().is_empty());
    }

    #[test]
    fn namespace_without_method_is_unavailable() {
        let globals = RecordingGlobals::new();
        globals.define_namespace("ttq", ["page", "load"]);
        let call = VendorCall::Method {
            namespace: "ttq".into(),
            method: "track".into(),
            args: vec![json!("Purchase")],
        };
        let err = globals.invoke(&call).unwrap_err();
        assert_eq!(err.code, DispatchErrorCode::DestinationUnavailable);
        assert_eq!(err.message(), "ttq.track is not defined");

        globals.define_namespace("ttq", ["track"]);
        globals.invoke(&call).unwrap();
        assert_eq!(globals.calls(), vec![call]);
    }

    #[test]
    fn records_calls_in_order() {
        let globals = RecordingGlobals::new();
        globals.define_function("gtag");
        globals.invoke(&gtag_call("first")).unwrap();
        globals.invoke(&gtag_call("second")).unwrap();
        let names: Vec<_> = globals
            .calls()
            .iter()
            .map(|call| call.args()[1].clone())
            .collect();
        assert_eq!(names, vec![json!("first"), json!("second")]);
    }
}
