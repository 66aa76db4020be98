use std::borrow::Cow;
use std::cell::OnceCell;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::definition::ParameterDefinition;
use crate::environment::{Binding, Environment};
use crate::error::Error;
use crate::provider::RemoteSnapshot;
use crate::registry::Registry;
use crate::resolve::{resolve, Resolution};
use crate::schema::ValidationError;
use crate::source::{LocalSource, Source};
use crate::url_override::ParameterOverrides;

/// Parameter definitions, keyed by store and then by parameter.
pub type ParameterDefinitions = Registry<Registry<ParameterDefinition>>;

/// The outcome of resolving a parameter.
///
/// Which variant is returned depends on whether the winning value passed its schema and, if it did
/// not, on whether that value was declared locally (and is therefore kept) or came from the remote
/// service (and is therefore replaced by the fallback).
#[derive(Clone, Debug, PartialEq)]
pub enum ParameterState {
    /// The value passed validation; `value` is the validator's normalized output.
    Valid { value: Value, source: Source },
    /// A URL, test or static override failed validation. The raw value is returned anyway, along
    /// with the declared fallback the caller may prefer.
    Unvalidated {
        value: Value,
        source: LocalSource,
        error: ValidationError,
        fallback: Value,
    },
    /// A remote value (or the fallback itself) failed validation; `value` is the declared fallback.
    Rejected { value: Value, error: ValidationError },
}

impl ParameterState {
    pub fn value(&self) -> &Value {
        match self {
            ParameterState::Valid { value, .. }
            | ParameterState::Unvalidated { value, .. }
            | ParameterState::Rejected { value, .. } => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ParameterState::Valid { value, .. }
            | ParameterState::Unvalidated { value, .. }
            | ParameterState::Rejected { value, .. } => value,
        }
    }

    pub fn source(&self) -> Source {
        match self {
            ParameterState::Valid { source, .. } => *source,
            ParameterState::Unvalidated { source, .. } => (*source).into(),
            ParameterState::Rejected { .. } => Source::Fallback,
        }
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            ParameterState::Valid { .. } => None,
            ParameterState::Unvalidated { error, .. } | ParameterState::Rejected { error, .. } => {
                Some(error)
            }
        }
    }

    /// The declared fallback, present only when an override was returned despite failing
    /// validation.
    pub fn fallback(&self) -> Option<&Value> {
        match self {
            ParameterState::Unvalidated { fallback, .. } => Some(fallback),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ParameterState::Valid { .. })
    }
}

#[serde_with::skip_serializing_none]
#[derive(Serialize)]
struct ParameterStateRepr<'a> {
    value: &'a Value,
    source: Source,
    error: Option<&'a ValidationError>,
    fallback: Option<&'a Value>,
}

impl Serialize for ParameterState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ParameterStateRepr {
            value: self.value(),
            source: self.source(),
            error: self.error(),
            fallback: self.fallback(),
        }
        .serialize(serializer)
    }
}

/// ParameterStore resolves typed parameters grouped into stores, validating every resolved value
/// against the parameter's schema.
#[derive(Clone, Debug)]
pub struct ParameterStore {
    definitions: ParameterDefinitions,
    binding: Binding,
}

impl ParameterStore {
    /// Creates a store that resolves against `environment`.
    pub fn new(definitions: ParameterDefinitions, environment: Arc<Environment>) -> Self {
        ParameterStore {
            definitions,
            binding: Binding::Local(environment),
        }
    }

    /// Creates a store that resolves against the process-wide client. Resolving a declared
    /// parameter before [crate::init] fails with [Error::NotInitialized].
    pub fn global(definitions: ParameterDefinitions) -> Self {
        ParameterStore {
            definitions,
            binding: Binding::Global,
        }
    }

    pub fn definitions(&self) -> &ParameterDefinitions {
        &self.definitions
    }

    /// `(store, parameter)` pairs declared as not needing a remote counterpart.
    pub fn kept_parameters(&self) -> Vec<(&str, &str)> {
        self.definitions
            .iter()
            .flat_map(|(store, parameters)| {
                parameters
                    .iter()
                    .filter(|(_, definition)| definition.is_kept())
                    .map(move |(parameter, _)| (store, parameter))
            })
            .collect()
    }

    pub fn get_value(&self, store: &str, parameter: &str) -> Result<Value, Error> {
        self.get_state(store, parameter)
            .map(ParameterState::into_value)
    }

    pub fn get_state(&self, store: &str, parameter: &str) -> Result<ParameterState, Error> {
        self.store(store)?.get_state(parameter)
    }

    /// Like [ParameterStore::get_value], reading URL overrides from `query` instead of the
    /// ambient query string.
    pub fn get_value_with_query(
        &self,
        store: &str,
        parameter: &str,
        query: &str,
    ) -> Result<Value, Error> {
        self.get_state_with_query(store, parameter, query)
            .map(ParameterState::into_value)
    }

    pub fn get_state_with_query(
        &self,
        store: &str,
        parameter: &str,
        query: &str,
    ) -> Result<ParameterState, Error> {
        self.store_with_query(store, query)?.get_state(parameter)
    }

    /// Returns a handle on one store. All lookups through the handle share a single remote
    /// snapshot, fetched the first time a lookup actually needs the remote service.
    pub fn store(&self, store: &str) -> Result<StoreHandle<'_>, Error> {
        self.handle(store, None)
    }

    pub fn store_with_query(&self, store: &str, query: &str) -> Result<StoreHandle<'_>, Error> {
        self.handle(store, Some(query.to_string()))
    }

    fn handle(&self, store: &str, query: Option<String>) -> Result<StoreHandle<'_>, Error> {
        let (key, parameters) = self
            .definitions
            .get_entry(store)
            .ok_or_else(|| Error::UnknownStore {
                store: store.to_string(),
            })?;
        Ok(StoreHandle {
            key,
            parameters,
            all: &self.definitions,
            binding: &self.binding,
            query,
            snapshot: OnceCell::new(),
        })
    }
}

/// A bound accessor for the parameters of one store. See [ParameterStore::store].
pub struct StoreHandle<'a> {
    key: &'a str,
    parameters: &'a Registry<ParameterDefinition>,
    all: &'a ParameterDefinitions,
    binding: &'a Binding,
    query: Option<String>,
    snapshot: OnceCell<Box<dyn RemoteSnapshot + 'a>>,
}

impl<'a> StoreHandle<'a> {
    pub fn key(&self) -> &str {
        self.key
    }

    pub fn get(&self, parameter: &str) -> Result<Value, Error> {
        self.get_state(parameter).map(ParameterState::into_value)
    }

    pub fn get_state(&self, parameter: &str) -> Result<ParameterState, Error> {
        let definition =
            self.parameters
                .get(parameter)
                .ok_or_else(|| Error::UnknownParameter {
                    store: self.key.to_string(),
                    parameter: parameter.to_string(),
                })?;
        let environment = self.binding.environment()?;

        let query = match &self.query {
            Some(query) => Some(Cow::Borrowed(query.as_str())),
            None => environment.current_query().map(Cow::Owned),
        };
        let url = query.and_then(|query| {
            ParameterOverrides::parse(&query, |store, parameter| {
                self.all
                    .get(store)
                    .and_then(|parameters| parameters.get(parameter))
                    .map(ParameterDefinition::schema)
            })
            .get(self.key, parameter)
            .cloned()
        });

        let resolution = resolve(
            definition,
            url,
            || environment.is_test_environment(),
            || self.remote_value(environment, parameter, definition.fallback_value()),
        );
        Ok(self.validate(environment, parameter, definition, resolution))
    }

    fn remote_value(
        &self,
        environment: &'a Environment,
        parameter: &str,
        fallback: &Value,
    ) -> Option<Value> {
        let snapshot = self.snapshot.get_or_init(|| {
            environment
                .parameter_provider
                .snapshot(self.key, &environment.options)
        });
        if snapshot.has_entry(parameter) {
            Some(snapshot.get(parameter, fallback))
        } else {
            None
        }
    }

    fn validate(
        &self,
        environment: &Environment,
        parameter: &str,
        definition: &ParameterDefinition,
        resolution: Resolution<Value>,
    ) -> ParameterState {
        let Resolution { value, source } = resolution;
        let error = match definition.schema().validate(&value) {
            Ok(validated) => {
                return ParameterState::Valid {
                    value: validated,
                    source,
                }
            }
            Err(error) => error,
        };

        environment.report(
            &format!(
                "parameter {}.{} from {} failed validation: {}",
                self.key, parameter, source, error
            ),
            Some(&json!({
                "store": self.key,
                "parameter": parameter,
                "source": source,
                "value": value,
                "error": error,
            })),
        );

        match source.as_local() {
            Some(source) => ParameterState::Unvalidated {
                value,
                source,
                error,
                fallback: definition.fallback_value().clone(),
            },
            None => {
                let fallback = definition.fallback_value();
                ParameterState::Rejected {
                    value: definition
                        .schema()
                        .validate(fallback)
                        .unwrap_or_else(|_| fallback.clone()),
                    error,
                }
            }
        }
    }
}
