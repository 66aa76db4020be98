use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Options forwarded to the remote service with every lookup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOptions {
    /// Asks the remote service not to record an exposure for this lookup.
    #[serde(default)]
    pub disable_exposure_logging: bool,
}

/// A gate as reported by the remote flag service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gate {
    pub value: bool,
    /// The kind of identifier the service evaluated the gate against. A gate without one was not
    /// actually evaluated (for example, the service has never heard of the key).
    #[serde(default)]
    pub identifier_type: Option<String>,
}

impl Gate {
    pub fn evaluated(value: bool, identifier_type: impl Into<String>) -> Self {
        Gate {
            value,
            identifier_type: Some(identifier_type.into()),
        }
    }

    pub fn unevaluated(value: bool) -> Self {
        Gate {
            value,
            identifier_type: None,
        }
    }

    /// Returns true if the service genuinely evaluated this gate.
    pub fn is_evaluated(&self) -> bool {
        self.identifier_type
            .as_deref()
            .map_or(false, |identifier_type| !identifier_type.is_empty())
    }
}

/// ProviderError is what a [FlagProvider] returns when it cannot evaluate a gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        ProviderError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderError {}

/// FlagProvider is the remote service's view of boolean flags.
///
/// The provider must already be initialized when it is called: resolution is synchronous and
/// never waits for it.
pub trait FlagProvider: Send + Sync {
    fn evaluate(&self, key: &str, options: &EvaluationOptions) -> Result<Gate, ProviderError>;
}

/// One store's worth of remote parameter values.
pub trait RemoteSnapshot {
    /// Returns true if the remote service has a value for `parameter`.
    fn has_entry(&self, parameter: &str) -> bool;

    /// Returns the remote value for `parameter`, or `fallback` if the service cannot produce one.
    fn get(&self, parameter: &str, fallback: &Value) -> Value;
}

/// ParameterProvider is the remote service's view of parameter stores.
pub trait ParameterProvider: Send + Sync {
    fn snapshot(&self, store: &str, options: &EvaluationOptions) -> Box<dyn RemoteSnapshot + '_>;
}

/// A pre-fetched remote payload, as handed to the client at startup.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    #[serde(default)]
    pub gates: BTreeMap<String, Gate>,
    #[serde(default)]
    pub parameter_stores: BTreeMap<String, Map<String, Value>>,
}

impl Bootstrap {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::InvalidBootstrap(e.to_string()))
    }
}

/// BootstrapProvider serves flags and parameters from a [Bootstrap] payload held in memory, so a
/// client can start resolving without a round trip.
///
/// Gates missing from the payload are reported as unevaluated.
#[derive(Clone, Debug, Default)]
pub struct BootstrapProvider {
    payload: Bootstrap,
}

impl BootstrapProvider {
    pub fn new(payload: Bootstrap) -> Self {
        BootstrapProvider { payload }
    }

    pub fn payload(&self) -> &Bootstrap {
        &self.payload
    }
}

impl FlagProvider for BootstrapProvider {
    fn evaluate(&self, key: &str, _options: &EvaluationOptions) -> Result<Gate, ProviderError> {
        Ok(self
            .payload
            .gates
            .get(key)
            .cloned()
            .unwrap_or_else(|| Gate::unevaluated(false)))
    }
}

struct BootstrapSnapshot<'a> {
    fields: Option<&'a Map<String, Value>>,
}

impl RemoteSnapshot for BootstrapSnapshot<'_> {
    fn has_entry(&self, parameter: &str) -> bool {
        self.fields
            .map_or(false, |fields| fields.contains_key(parameter))
    }

    fn get(&self, parameter: &str, fallback: &Value) -> Value {
        self.fields
            .and_then(|fields| fields.get(parameter))
            .cloned()
            .unwrap_or_else(|| fallback.clone())
    }
}

impl ParameterProvider for BootstrapProvider {
    fn snapshot(&self, store: &str, _options: &EvaluationOptions) -> Box<dyn RemoteSnapshot + '_> {
        Box::new(BootstrapSnapshot {
            fields: self.payload.parameter_stores.get(store),
        })
    }
}
