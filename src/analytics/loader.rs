//! Contract with the vendor script loader plus an in-memory implementation.
//!
//! Every destination is backed by a bootstrap script that defines its global tracking function.
//! The dispatcher never looks at the script body; it only asks the loader to make sure the
//! script exists once and waits for the loader to report completion.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::analytics::adapter::DestinationId;

/// One-shot completion signal handed to the loader at injection time.
pub type LoadCallback = Box<dyn FnOnce() + Send + 'static>;

/// Predicate used to detect a bootstrap script that is already part of the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptMatcher {
    /// `src` attribute equals the given URL.
    SourceEquals(String),
    /// `src` attribute contains the given fragment.
    SourceContains(String),
    /// The script carries a destination specific marker attribute.
    Attribute { name: String, value: String },
}

impl ScriptMatcher {
    pub fn css_selector(&self) -> String {
        match self {
            ScriptMatcher::SourceEquals(src) => format!("script[src=\"{src}\"]"),
            ScriptMatcher::SourceContains(fragment) => format!("script[src*=\"{fragment}\"]"),
            ScriptMatcher::Attribute { name, value } => format!("script[{name}=\"{value}\"]"),
        }
    }

    pub fn matches(&self, tag: &ScriptTag) -> bool {
        match self {
            ScriptMatcher::SourceEquals(src) => tag.src.as_deref() == Some(src.as_str()),
            ScriptMatcher::SourceContains(fragment) => tag
                .src
                .as_deref()
                .is_some_and(|src| src.contains(fragment.as_str())),
            ScriptMatcher::Attribute { name, value } => {
                tag.attributes.get(name).map(String::as_str) == Some(value.as_str())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptSource {
    External { src: String, async_load: bool },
    Inline(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScriptPlacement {
    #[default]
    Head,
    Body,
}

/// Everything a loader needs to bootstrap one destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptRequest {
    pub destination: DestinationId,
    pub matcher: ScriptMatcher,
    pub source: ScriptSource,
    pub attributes: Vec<(String, String)>,
    /// Inline code evaluated on every injection request, before the presence check, so globals
    /// the script relies on exist even when the host page already ships the script.
    pub prelude: Option<String>,
    pub placement: ScriptPlacement,
}

impl ScriptRequest {
    pub fn to_tag(&self) -> ScriptTag {
        let (src, async_load, text) = match &self.source {
            ScriptSource::External { src, async_load } => (Some(src.clone()), *async_load, None),
            ScriptSource::Inline(body) => (None, false, Some(body.clone())),
        };
        ScriptTag {
            src,
            async_load,
            text,
            attributes: self.attributes.iter().cloned().collect(),
            placement: self.placement,
        }
    }
}

/// Minimal model of a `<script>` element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptTag {
    pub src: Option<String>,
    pub async_load: bool,
    pub text: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub placement: ScriptPlacement,
}

impl ScriptTag {
    pub fn external(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptStatus {
    pub already_present: bool,
}

/// Injects bootstrap scripts and reports their completion.
///
/// The request's prelude, if any, is evaluated first. When the script is already present the
/// loader then returns `already_present: true` and drops `on_loaded` without calling it. Otherwise it inserts the script and calls `on_loaded` exactly
/// once when the script has loaded; a script that never loads never calls it.
pub trait ScriptLoader: Send + Sync {
    fn inject_if_absent(&self, request: &ScriptRequest, on_loaded: LoadCallback) -> ScriptStatus;
}

/// Loader backed by an in-memory document, used on native targets and in tests.
///
/// Injected scripts stay pending until [`HeadlessScriptLoader::complete_load`] is called, which
/// plays the role of the browser's `load` event.
#[derive(Default)]
pub struct HeadlessScriptLoader {
    document: Mutex<HeadlessDocument>,
}

#[derive(Default)]
struct HeadlessDocument {
    scripts: Vec<ScriptTag>,
    pending: Vec<(DestinationId, LoadCallback)>,
}

impl fmt::Debug for HeadlessScriptLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let document = self.document();
        f.debug_struct("HeadlessScriptLoader")
            .field("scripts", &document.scripts)
            .field("pending", &document.pending.len())
            .finish()
    }
}

impl HeadlessScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a script as if the host page had shipped it.
    pub fn insert_existing(&self, tag: ScriptTag) {
        self.document().scripts.push(tag);
    }

    pub fn scripts(&self) -> Vec<ScriptTag> {
        self.document().scripts.clone()
    }

    pub fn find(&self, matcher: &ScriptMatcher) -> Option<ScriptTag> {
        self.document()
            .scripts
            .iter()
            .find(|tag| matcher.matches(tag))
            .cloned()
    }

    pub fn pending_loads(&self) -> usize {
        self.document().pending.len()
    }

    /// Fires the load signal of every pending script injected for `destination`.
    /// Returns whether any callback ran.
    pub fn complete_load(&self, destination: DestinationId) -> bool {
        let callbacks: Vec<LoadCallback> = {
            let mut document = self.document();
            let (matching, remaining) = std::mem::take(&mut document.pending)
                .into_iter()
                .partition::<Vec<_>, _>(|(id, _)| *id == destination);
            document.pending = remaining;
            matching.into_iter().map(|(_, callback)| callback).collect()
        };
        let fired = !callbacks.is_empty();
        for callback in callbacks {
            callback();
        }
        fired
    }

    fn document(&self) -> MutexGuard<'_, HeadlessDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl ScriptLoader for HeadlessScriptLoader {
    fn inject_if_absent(&self, request: &ScriptRequest, on_loaded: LoadCallback) -> ScriptStatus {
        let mut document = self.document();
        if let Some(prelude) = &request.prelude {
            // Preludes are idempotent; one copy in the document is enough.
            let evaluated = document
                .scripts
                .iter()
                .any(|tag| tag.src.is_none() && tag.text.as_deref() == Some(prelude.as_str()));
            if !evaluated {
                document.scripts.push(ScriptTag {
                    text: Some(prelude.clone()),
                    placement: request.placement,
                    ..Default::default()
                });
            }
        }

        if document
            .scripts
            .iter()
            .any(|tag| request.matcher.matches(tag))
        {
            return ScriptStatus {
                already_present: true,
            };
        }

        document.scripts.push(request.to_tag());
        document.pending.push((request.destination, on_loaded));
        ScriptStatus {
            already_present: false,
        }
    }
}
