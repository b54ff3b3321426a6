//! DOM-backed loader and `window` globals for `wasm32` builds with the `wasm-web` feature.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use js_sys::{Array, Function};
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, HtmlScriptElement};

use crate::analytics::error::{
    destination_unavailable, internal_error, vendor_call_failed, DeliveryResult, DispatchError,
    DispatchResult,
};
use crate::analytics::loader::{
    LoadCallback, ScriptLoader, ScriptPlacement, ScriptRequest, ScriptSource, ScriptStatus,
};
use crate::analytics::transport::{VendorCall, VendorGlobals};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@analytics-dispatch/web"));

/// Injects bootstrap scripts into the current document.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserScriptLoader;

impl ScriptLoader for BrowserScriptLoader {
    fn inject_if_absent(&self, request: &ScriptRequest, on_loaded: LoadCallback) -> ScriptStatus {
        let Some(document) = web_sys::window().and_then(|win| win.document()) else {
            LOGGER.error(format!("{}: document not available", request.destination));
            return ScriptStatus {
                already_present: false,
            };
        };

        if let Some(prelude) = &request.prelude {
            if let Err(err) = evaluate_inline(&document, prelude, request.placement) {
                LOGGER.error(format!("{}: {err}", request.destination));
            }
        }

        if document
            .query_selector(&request.matcher.css_selector())
            .ok()
            .flatten()
            .is_some()
        {
            return ScriptStatus {
                already_present: true,
            };
        }

        if let Err(err) = inject(&document, request, on_loaded) {
            LOGGER.error(format!("{}: {err}", request.destination));
        }
        ScriptStatus {
            already_present: false,
        }
    }
}

/// Inserts an inline script, which the browser runs synchronously.
fn evaluate_inline(document: &Document, body: &str, placement: ScriptPlacement) -> DispatchResult<()> {
    let inline = create_script(document)?;
    inline
        .set_text(body)
        .map_err(|err| internal_error(format!("Failed to set script text: {}", js_error_message(err))))?;
    append(document, &inline, placement)
}

fn inject(document: &Document, request: &ScriptRequest, on_loaded: LoadCallback) -> DispatchResult<()> {
    let script = create_script(document)?;
    for (name, value) in &request.attributes {
        script
            .set_attribute(name, value)
            .map_err(|err| internal_error(format!("Failed to set {name}: {}", js_error_message(err))))?;
    }

    match &request.source {
        ScriptSource::External { src, async_load } => {
            script.set_src(src);
            script.set_async(*async_load);

            let callback = Rc::new(RefCell::new(Some(on_loaded)));
            let onload = Closure::wrap(Box::new(move || {
                if let Some(callback) = callback.borrow_mut().take() {
                    callback();
                }
            }) as Box<dyn FnMut()>);
            script.set_onload(Some(onload.as_ref().unchecked_ref()));
            onload.forget();

            append(document, &script, request.placement)
        }
        ScriptSource::Inline(body) => {
            script
                .set_text(body)
                .map_err(|err| internal_error(format!("Failed to set script text: {}", js_error_message(err))))?;
            append(document, &script, request.placement)?;
            // Inline scripts run synchronously on insertion and never fire `load`.
            on_loaded();
            Ok(())
        }
    }
}

fn create_script(document: &Document) -> DispatchResult<HtmlScriptElement> {
    document
        .create_element("script")
        .map_err(|err| internal_error(format!("Failed to create script: {}", js_error_message(err))))?
        .dyn_into::<HtmlScriptElement>()
        .map_err(|_| internal_error("Script element has wrong type"))
}

fn append(document: &Document, script: &HtmlScriptElement, placement: ScriptPlacement) -> DispatchResult<()> {
    let parent: Option<web_sys::Node> = match placement {
        ScriptPlacement::Head => document
            .head()
            .map(Into::into)
            .or_else(|| document.body().map(Into::into)),
        ScriptPlacement::Body => document.body().map(Into::into),
    };
    let parent = parent.ok_or_else(|| internal_error("No <head> or <body> element found"))?;
    parent
        .append_child(script)
        .map(|_| ())
        .map_err(|err| internal_error(format!("Failed to append script: {}", js_error_message(err))))
}

/// Resolves vendor globals on the JavaScript global object.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserGlobals;

impl VendorGlobals for BrowserGlobals {
    fn invoke(&self, call: &VendorCall) -> DeliveryResult {
        let target = resolve(&JsValue::from(js_sys::global()), call.global())
            .ok_or_else(|| destination_unavailable(format!("{} is not defined", call.global())))?;
        let args = to_js_args(call.args())?;

        let (function, receiver) = match call {
            VendorCall::Function { global, .. } => (as_function(target.clone(), global)?, JsValue::UNDEFINED),
            VendorCall::Push { global, .. } => {
                let push = resolve(&target, "push")
                    .ok_or_else(|| destination_unavailable(format!("{global}.push is not defined")))?;
                (as_function(push, &format!("{global}.push"))?, target)
            }
            VendorCall::Method { namespace, method, .. } => {
                let member = resolve(&target, method).ok_or_else(|| {
                    destination_unavailable(format!("{namespace}.{method} is not defined"))
                })?;
                (as_function(member, &format!("{namespace}.{method}"))?, target)
            }
        };

        function
            .apply(&receiver, &args)
            .map(|_| ())
            .map_err(|err| vendor_call_failed(js_error_message(err)))
    }
}

fn resolve(owner: &JsValue, name: &str) -> Option<JsValue> {
    let value = js_sys::Reflect::get(owner, &JsValue::from_str(name)).ok()?;
    if value.is_undefined() || value.is_null() {
        None
    } else {
        Some(value)
    }
}

fn as_function(value: JsValue, name: &str) -> Result<Function, DispatchError> {
    value
        .dyn_into::<Function>()
        .map_err(|_| destination_unavailable(format!("{name} is not a function")))
}

fn to_js_args(args: &[Value]) -> Result<Array, DispatchError> {
    let array = Array::new();
    for arg in args {
        let text = serde_json::to_string(arg)
            .map_err(|err| internal_error(format!("Failed to encode argument: {err}")))?;
        let value = js_sys::JSON::parse(&text)
            .map_err(|err| internal_error(format!("Failed to decode argument: {}", js_error_message(err))))?;
        array.push(&value);
    }
    Ok(array)
}

fn js_error_message(value: JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        format!("{}", error.message())
    } else if let Some(string) = value.as_string() {
        string
    } else {
        format!("{value:?}")
    }
}
