use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::environment::{DiagnosticSink, Environment, LogSink, QuerySource};
use crate::error::Error;
use crate::provider::{
    Bootstrap, BootstrapProvider, EvaluationOptions, FlagProvider, ParameterProvider,
};

static CLIENT: OnceLock<Client> = OnceLock::new();

/// The identity flags and parameters are evaluated for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "customIDs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_ids: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        User {
            user_id: Some(user_id.into()),
            ..User::default()
        }
    }

    /// An identity with no user id, for visitors who have not signed in.
    pub fn anonymous() -> Self {
        User::default()
    }

    pub fn custom_id(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.custom_ids.insert(kind.into(), id.into());
        self
    }

    pub fn custom(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }
}

/// Config gathers the collaborators a client needs. Every field is optional; see each setter for
/// its default.
#[derive(Clone, Default)]
pub struct Config {
    flag_provider: Option<Arc<dyn FlagProvider>>,
    parameter_provider: Option<Arc<dyn ParameterProvider>>,
    test_predicate: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    diagnostic_sink: Option<Arc<dyn DiagnosticSink>>,
    query_source: Option<Arc<dyn QuerySource>>,
    bootstrap: Option<Bootstrap>,
    evaluation_options: EvaluationOptions,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// The remote flag service. Defaults to serving the bootstrap payload.
    pub fn flag_provider(mut self, provider: Arc<dyn FlagProvider>) -> Self {
        self.flag_provider = Some(provider);
        self
    }

    /// The remote parameter service. Defaults to serving the bootstrap payload.
    pub fn parameter_provider(mut self, provider: Arc<dyn ParameterProvider>) -> Self {
        self.parameter_provider = Some(provider);
        self
    }

    /// Decides whether test overrides apply. Defaults to never.
    pub fn test_predicate(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.test_predicate = Some(Arc::new(predicate));
        self
    }

    /// Receives validation mismatch reports. Defaults to [LogSink].
    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostic_sink = Some(sink);
        self
    }

    /// Supplies the ambient query string for URL overrides. Defaults to none.
    pub fn query_source(mut self, source: impl QuerySource + 'static) -> Self {
        self.query_source = Some(Arc::new(source));
        self
    }

    /// A pre-fetched remote payload, served by whichever provider is not configured explicitly.
    pub fn bootstrap(mut self, bootstrap: Bootstrap) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn evaluation_options(mut self, options: EvaluationOptions) -> Self {
        self.evaluation_options = options;
        self
    }

    pub fn into_environment(self) -> Environment {
        let bootstrap = Arc::new(BootstrapProvider::new(self.bootstrap.unwrap_or_default()));
        Environment {
            flag_provider: self.flag_provider.unwrap_or_else(|| bootstrap.clone()),
            parameter_provider: self.parameter_provider.unwrap_or(bootstrap),
            test_predicate: self.test_predicate.unwrap_or_else(|| Arc::new(|| false)),
            diagnostic_sink: self.diagnostic_sink.unwrap_or_else(|| Arc::new(LogSink)),
            query_source: self.query_source,
            options: self.evaluation_options,
        }
    }
}

/// Client owns the [Environment] that globally bound stores resolve against.
#[derive(Debug)]
pub struct Client {
    client_key: String,
    user: User,
    environment: Arc<Environment>,
}

impl Client {
    pub fn new(client_key: &str, user: User, config: Config) -> Result<Self, Error> {
        if client_key.trim().is_empty() {
            return Err(Error::InvalidClientKey);
        }
        Ok(Client {
            client_key: client_key.to_string(),
            user,
            environment: Arc::new(config.into_environment()),
        })
    }

    pub fn client_key(&self) -> &str {
        &self.client_key
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }
}

/// Creates the process-wide client.
///
/// Only the first successful call has any effect; later calls return the existing client and
/// ignore their arguments.
pub fn init(client_key: &str, user: User, config: Config) -> Result<&'static Client, Error> {
    if let Some(client) = CLIENT.get() {
        debug!("client already initialized; ignoring init");
        return Ok(client);
    }
    let client = Client::new(client_key, user, config)?;
    let client = CLIENT.get_or_init(|| client);
    info!("client initialized for user {:?}", client.user.user_id);
    Ok(client)
}

/// Returns the process-wide client, or [Error::NotInitialized] before [init] has succeeded.
pub fn client() -> Result<&'static Client, Error> {
    CLIENT.get().ok_or(Error::NotInitialized)
}
