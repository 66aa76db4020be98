use std::fmt;
use std::sync::Arc;

use log::warn;
use serde_json::Value;

use crate::client::{self, Config};
use crate::error::Error;
use crate::provider::{EvaluationOptions, FlagProvider, ParameterProvider};

/// DiagnosticSink receives reports about misconfiguration that resolution recovers from, such
/// as a parameter value that failed schema validation.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, message: &str, data: Option<&Value>);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&str, Option<&Value>) + Send + Sync,
{
    fn report(&self, message: &str, data: Option<&Value>) {
        self(message, data)
    }
}

/// The default [DiagnosticSink], writing every report through the `log` facade at warn level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, message: &str, data: Option<&Value>) {
        match data {
            Some(data) => warn!("{} {}", message, data),
            None => warn!("{}", message),
        }
    }
}

/// QuerySource yields the query string of the current page, which is where URL overrides are
/// read from when the caller does not supply a query explicitly.
pub trait QuerySource: Send + Sync {
    fn query(&self) -> Option<String>;
}

impl<F> QuerySource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn query(&self) -> Option<String> {
        self()
    }
}

/// Environment bundles everything resolution consults besides the definitions themselves: the
/// remote providers, the test-environment predicate, the diagnostic sink and the ambient query
/// string.
///
/// Build one with [Config::into_environment], or let [crate::init] build the process-wide one.
pub struct Environment {
    pub(crate) flag_provider: Arc<dyn FlagProvider>,
    pub(crate) parameter_provider: Arc<dyn ParameterProvider>,
    pub(crate) test_predicate: Arc<dyn Fn() -> bool + Send + Sync>,
    pub(crate) diagnostic_sink: Arc<dyn DiagnosticSink>,
    pub(crate) query_source: Option<Arc<dyn QuerySource>>,
    pub(crate) options: EvaluationOptions,
}

impl Environment {
    pub fn is_test_environment(&self) -> bool {
        (self.test_predicate)()
    }

    /// The ambient query string, if a [QuerySource] is configured and has one.
    pub fn current_query(&self) -> Option<String> {
        self.query_source.as_ref().and_then(|source| source.query())
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    pub(crate) fn report(&self, message: &str, data: Option<&Value>) {
        self.diagnostic_sink.report(message, data)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Config::default().into_environment()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("query_source", &self.query_source.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Where a store finds its [Environment]: either one it was given, or the process-wide client
/// created by [crate::init].
#[derive(Clone, Debug)]
pub(crate) enum Binding {
    Global,
    Local(Arc<Environment>),
}

impl Binding {
    pub(crate) fn environment(&self) -> Result<&Environment, Error> {
        match self {
            Binding::Global => client::client().map(|client| client.environment().as_ref()),
            Binding::Local(environment) => Ok(environment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;
    use spectral::prelude::*;

    #[test]
    fn defaults_disable_test_overrides_and_ambient_query() {
        let environment = Environment::default();
        assert_that!(environment.is_test_environment()).is_false();
        assert_that!(environment.current_query()).is_none();
        assert_that!(*environment.options()).is_equal_to(EvaluationOptions::default());
    }

    #[test]
    fn closures_serve_as_sinks_and_query_sources() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let recorded = reports.clone();
        let environment = Config::new()
            .diagnostic_sink(Arc::new(move |message: &str, data: Option<&Value>| {
                recorded
                    .lock()
                    .unwrap()
                    .push((message.to_string(), data.cloned()))
            }))
            .query_source(|| Some("?ff.a=1".to_string()))
            .test_predicate(|| true)
            .into_environment();

        environment.report("mismatch", Some(&json!({"key": "a"})));
        assert_that!(environment.current_query()).contains_value("?ff.a=1".to_string());
        assert_that!(environment.is_test_environment()).is_true();
        assert_that!(*reports.lock().unwrap()).is_equal_to(vec![(
            "mismatch".to_string(),
            Some(json!({"key": "a"})),
        )]);
    }

    #[test]
    fn local_binding_never_needs_the_client() {
        let binding = Binding::Local(Arc::new(Environment::default()));
        assert_that!(binding.environment().is_ok()).is_true();
    }
}
