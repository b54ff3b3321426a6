use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters attached to an event, kept in insertion order. Values may be primitives or nested
/// JSON structures.
pub type EventParams = Map<String, Value>;

/// A named analytics event with its parameters.
///
/// Events are immutable once built. The optional `id` is forwarded to destinations that accept a
/// de-duplication key; the dispatcher itself never inspects it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    name: String,
    #[serde(default)]
    params: EventParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl AnalyticsEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: EventParams::new(),
            id: None,
        }
    }

    pub fn with_params(mut self, params: EventParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &EventParams {
        &self.params
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Parameters as a JSON object, the shape every vendor global expects.
    pub(crate) fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}
