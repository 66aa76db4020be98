#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::client::Config;
use crate::environment::{DiagnosticSink, Environment};
use crate::provider::{
    EvaluationOptions, FlagProvider, Gate, ParameterProvider, ProviderError, RemoteSnapshot,
};

/// A flag provider answering from a fixed table and recording every key and options it is asked
/// about.
pub struct RecordingFlagProvider {
    gates: HashMap<String, Result<Gate, ProviderError>>,
    calls: Mutex<Vec<String>>,
    options: Mutex<Vec<EvaluationOptions>>,
}

impl RecordingFlagProvider {
    pub fn new(gates: HashMap<&str, Result<Gate, ProviderError>>) -> Self {
        Self {
            gates: gates
                .into_iter()
                .map(|(key, gate)| (key.to_string(), gate))
                .collect(),
            calls: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn options_seen(&self) -> Vec<EvaluationOptions> {
        self.options.lock().unwrap().clone()
    }
}

impl FlagProvider for RecordingFlagProvider {
    fn evaluate(&self, key: &str, options: &EvaluationOptions) -> Result<Gate, ProviderError> {
        self.calls.lock().unwrap().push(key.to_string());
        self.options.lock().unwrap().push(*options);
        self.gates
            .get(key)
            .cloned()
            .unwrap_or_else(|| Ok(Gate::unevaluated(false)))
    }
}

/// A parameter provider answering from fixed stores, counting snapshots and recording `get`s.
pub struct RecordingParameterProvider {
    stores: HashMap<String, Map<String, Value>>,
    snapshots: AtomicUsize,
    gets: Mutex<Vec<(String, String)>>,
    options: Mutex<Vec<EvaluationOptions>>,
}

impl RecordingParameterProvider {
    pub fn new(stores: HashMap<&str, Value>) -> Self {
        Self {
            stores: stores
                .into_iter()
                .map(|(store, fields)| match fields {
                    Value::Object(fields) => (store.to_string(), fields),
                    other => panic!("store {} must be an object, got {}", store, other),
                })
                .collect(),
            snapshots: AtomicUsize::new(0),
            gets: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> Vec<(String, String)> {
        self.gets.lock().unwrap().clone()
    }

    pub fn options_seen(&self) -> Vec<EvaluationOptions> {
        self.options.lock().unwrap().clone()
    }
}

struct RecordingSnapshot<'a> {
    provider: &'a RecordingParameterProvider,
    store: String,
}

impl RemoteSnapshot for RecordingSnapshot<'_> {
    fn has_entry(&self, parameter: &str) -> bool {
        self.provider
            .stores
            .get(&self.store)
            .map_or(false, |fields| fields.contains_key(parameter))
    }

    fn get(&self, parameter: &str, fallback: &Value) -> Value {
        self.provider
            .gets
            .lock()
            .unwrap()
            .push((self.store.clone(), parameter.to_string()));
        self.provider
            .stores
            .get(&self.store)
            .and_then(|fields| fields.get(parameter))
            .cloned()
            .unwrap_or_else(|| fallback.clone())
    }
}

impl ParameterProvider for RecordingParameterProvider {
    fn snapshot(&self, store: &str, options: &EvaluationOptions) -> Box<dyn RemoteSnapshot + '_> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(*options);
        Box::new(RecordingSnapshot {
            provider: self,
            store: store.to_string(),
        })
    }
}

/// A diagnostic sink keeping every report in memory.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(String, Option<Value>)>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<(String, Option<Value>)> {
        self.reports.lock().unwrap().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, message: &str, data: Option<&Value>) {
        self.reports
            .lock()
            .unwrap()
            .push((message.to_string(), data.cloned()));
    }
}

fn with_test_and_query(config: Config, is_test: bool, query: Option<&str>) -> Config {
    let config = config.test_predicate(move || is_test);
    match query {
        Some(query) => {
            let query = query.to_string();
            config.query_source(move || Some(query.clone()))
        }
        None => config,
    }
}

pub fn flag_environment(
    provider: Arc<RecordingFlagProvider>,
    is_test: bool,
    query: Option<&str>,
) -> Arc<Environment> {
    let config = Config::new().flag_provider(provider);
    Arc::new(with_test_and_query(config, is_test, query).into_environment())
}

pub fn parameter_environment(
    provider: Arc<RecordingParameterProvider>,
    sink: Arc<RecordingSink>,
    is_test: bool,
    query: Option<&str>,
) -> Arc<Environment> {
    let config = Config::new()
        .parameter_provider(provider)
        .diagnostic_sink(sink);
    Arc::new(with_test_and_query(config, is_test, query).into_environment())
}
