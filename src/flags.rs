use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::definition::FlagDefinition;
use crate::environment::{Binding, Environment};
use crate::error::Error;
use crate::registry::Registry;
use crate::resolve::resolve;
use crate::source::Source;
use crate::url_override::{flag_override, parse_flag_overrides};

/// A JSON object read entry by entry, so repeated keys survive until the registry sees them.
#[serde_as]
#[derive(Deserialize)]
#[serde(transparent)]
struct DefinitionEntries(#[serde_as(as = "serde_with::Map<_, _>")] Vec<(String, FlagDefinition)>);

/// The resolved value of a flag and where it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagState {
    pub flag: bool,
    pub source: Source,
}

/// FlagStore resolves boolean flags against a fixed set of [FlagDefinition]s.
///
/// Nothing is cached: every call re-reads the URL, the test predicate and the remote provider.
#[derive(Clone, Debug)]
pub struct FlagStore {
    definitions: Registry<FlagDefinition>,
    binding: Binding,
}

impl FlagStore {
    /// Creates a store that resolves against `environment`.
    pub fn new(definitions: Registry<FlagDefinition>, environment: Arc<Environment>) -> Self {
        FlagStore {
            definitions,
            binding: Binding::Local(environment),
        }
    }

    /// Creates a store that resolves against the process-wide client. Resolving before
    /// [crate::init] fails with [Error::NotInitialized].
    pub fn global(definitions: Registry<FlagDefinition>) -> Self {
        FlagStore {
            definitions,
            binding: Binding::Global,
        }
    }

    /// Parses definitions from a JSON object of flag key to definition, e.g.
    /// `{"new_checkout": {"override": true}, "beta": {"testOverride": true, "keep": true}}`.
    /// A key that appears twice is rejected like in [Registry::new].
    pub fn definitions_from_json(json: &str) -> Result<Registry<FlagDefinition>, Error> {
        let entries = serde_json::from_str::<DefinitionEntries>(json)
            .map_err(|e| Error::InvalidDefinitions(e.to_string()))?;
        Registry::new(entries.0)
    }

    pub fn definitions(&self) -> &Registry<FlagDefinition> {
        &self.definitions
    }

    /// Keys of flags declared as not needing a remote counterpart.
    pub fn kept_keys(&self) -> impl Iterator<Item = &str> {
        self.definitions
            .iter()
            .filter(|(_, definition)| definition.is_kept())
            .map(|(key, _)| key)
    }

    pub fn get_value(&self, key: &str) -> Result<bool, Error> {
        self.get_state(key).map(|state| state.flag)
    }

    pub fn get_state(&self, key: &str) -> Result<FlagState, Error> {
        self.state(key, None)
    }

    /// Like [FlagStore::get_value], reading URL overrides from `query` instead of the ambient
    /// query string.
    pub fn get_value_with_query(&self, key: &str, query: &str) -> Result<bool, Error> {
        self.get_state_with_query(key, query)
            .map(|state| state.flag)
    }

    pub fn get_state_with_query(&self, key: &str, query: &str) -> Result<FlagState, Error> {
        self.state(key, Some(query))
    }

    /// Resolves every declared flag.
    pub fn snapshot(&self) -> Result<BTreeMap<String, FlagState>, Error> {
        let environment = self.binding.environment()?;
        let query = environment.current_query();
        self.snapshot_in(environment, query.as_deref())
    }

    pub fn snapshot_with_query(&self, query: &str) -> Result<BTreeMap<String, FlagState>, Error> {
        let environment = self.binding.environment()?;
        self.snapshot_in(environment, Some(query))
    }

    fn snapshot_in(
        &self,
        environment: &Environment,
        query: Option<&str>,
    ) -> Result<BTreeMap<String, FlagState>, Error> {
        let url_overrides = query.map(parse_flag_overrides).unwrap_or_default();
        Ok(self
            .definitions
            .iter()
            .map(|(key, definition)| {
                let url = url_overrides.get(key).copied();
                (
                    key.to_string(),
                    resolve_flag(environment, key, definition, url),
                )
            })
            .collect())
    }

    fn state(&self, key: &str, query: Option<&str>) -> Result<FlagState, Error> {
        let definition = self.definitions.get(key).ok_or_else(|| Error::UnknownFlag {
            key: key.to_string(),
        })?;
        let environment = self.binding.environment()?;

        let query = match query {
            Some(query) => Some(Cow::Borrowed(query)),
            None => environment.current_query().map(Cow::Owned),
        };
        let url = query.as_deref().and_then(|query| flag_override(query, key));

        Ok(resolve_flag(environment, key, definition, url))
    }
}

fn resolve_flag(
    environment: &Environment,
    key: &str,
    definition: &FlagDefinition,
    url: Option<bool>,
) -> FlagState {
    let resolution = resolve(
        definition,
        url,
        || environment.is_test_environment(),
        || remote_gate(environment, key),
    );
    FlagState {
        flag: resolution.value,
        source: resolution.source,
    }
}

// A gate only counts as remote if the provider actually evaluated it; anything else, including a
// provider error, falls through to the fallback.
fn remote_gate(environment: &Environment, key: &str) -> Option<bool> {
    match environment.flag_provider.evaluate(key, &environment.options) {
        Ok(gate) if gate.is_evaluated() => Some(gate.value),
        Ok(_) => None,
        Err(e) => {
            warn!("remote evaluation of flag {} failed, using fallback: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Config;
    use crate::provider::{EvaluationOptions, Gate, ProviderError};
    use crate::test_common::{flag_environment, RecordingFlagProvider};
    use assert_json_diff::assert_json_eq;
    use maplit::hashmap;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    fn definitions() -> Registry<FlagDefinition> {
        Registry::new(vec![
            ("feature_a", FlagDefinition::new()),
            ("feature_b", FlagDefinition::new().fallback(true)),
            ("feature_c", FlagDefinition::new().override_value(false)),
            (
                "feature_d",
                FlagDefinition::new().test_override(true).override_value(false),
            ),
            ("feature_e", FlagDefinition::new().keep()),
        ])
        .unwrap()
    }

    fn provider() -> Arc<RecordingFlagProvider> {
        Arc::new(RecordingFlagProvider::new(hashmap! {
            "feature_a" => Ok(Gate::evaluated(true, "userID")),
            "feature_b" => Ok(Gate::unevaluated(false)),
            "feature_c" => Ok(Gate::evaluated(true, "userID")),
            "feature_d" => Ok(Gate::evaluated(true, "stableID")),
            "feature_e" => Err(ProviderError::new("network unreachable")),
        }))
    }

    #[test_case("feature_a", true, Source::Remote)]
    #[test_case("feature_b", true, Source::Fallback)]
    #[test_case("feature_c", false, Source::Override)]
    #[test_case("feature_d", false, Source::Override)]
    #[test_case("feature_e", false, Source::Fallback)]
    fn resolves_outside_tests(key: &str, flag: bool, source: Source) {
        let store = FlagStore::new(definitions(), flag_environment(provider(), false, None));
        assert_that!(store.get_state(key).unwrap()).is_equal_to(FlagState { flag, source });
        assert_that!(store.get_value(key).unwrap()).is_equal_to(flag);
    }

    #[test]
    fn test_override_applies_only_in_test_environment() {
        let store = FlagStore::new(definitions(), flag_environment(provider(), true, None));
        assert_that!(store.get_state("feature_d").unwrap()).is_equal_to(FlagState {
            flag: true,
            source: Source::Test,
        });
        assert_that!(store.get_state("feature_c").unwrap().source).is_equal_to(Source::Override);
    }

    #[test]
    fn url_overrides_win_over_every_other_source() {
        let environment = flag_environment(
            provider(),
            true,
            Some("?ff.feature_c=true&ff.feature_d=0&ff.feature_e=%20TRUE"),
        );
        let store = FlagStore::new(definitions(), environment);

        assert_that!(store.get_state("feature_c").unwrap()).is_equal_to(FlagState {
            flag: true,
            source: Source::Url,
        });
        assert_that!(store.get_state("feature_d").unwrap()).is_equal_to(FlagState {
            flag: false,
            source: Source::Url,
        });
        assert_that!(store.get_value("feature_e").unwrap()).is_true();
    }

    #[test]
    fn explicit_query_replaces_ambient_query() {
        let environment = flag_environment(provider(), false, Some("?ff.feature_a=0"));
        let store = FlagStore::new(definitions(), environment);

        assert_that!(store.get_state("feature_a").unwrap().source).is_equal_to(Source::Url);
        let state = store.get_state_with_query("feature_a", "?utm=1").unwrap();
        assert_that!(state).is_equal_to(FlagState {
            flag: true,
            source: Source::Remote,
        });
        assert_that!(store.get_value_with_query("feature_b", "ff.feature_b=false").unwrap())
            .is_false();
    }

    #[test]
    fn override_never_consults_the_remote_provider() {
        let provider = provider();
        let store = FlagStore::new(definitions(), flag_environment(provider.clone(), false, None));

        store.get_state("feature_c").unwrap();
        assert_that!(provider.calls()).is_empty();

        store.get_state("feature_a").unwrap();
        assert_that!(provider.calls()).is_equal_to(vec!["feature_a".to_string()]);
    }

    #[test]
    fn undeclared_flag_is_a_configuration_error() {
        let provider = provider();
        let store = FlagStore::new(definitions(), flag_environment(provider.clone(), false, None));
        let error = store.get_state("feature_z").unwrap_err();
        assert_that!(error).is_equal_to(Error::UnknownFlag {
            key: "feature_z".into(),
        });
        assert_that!(error.to_string()).contains("feature_z");
        assert_that!(provider.calls()).is_empty();
    }

    #[test]
    fn snapshot_resolves_every_flag() {
        let environment = flag_environment(provider(), false, Some("ff.feature_b=0"));
        let store = FlagStore::new(definitions(), environment);

        let snapshot = store.snapshot().unwrap();
        assert_json_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({
                "feature_a": {"flag": true, "source": "remote"},
                "feature_b": {"flag": false, "source": "url"},
                "feature_c": {"flag": false, "source": "override"},
                "feature_d": {"flag": false, "source": "override"},
                "feature_e": {"flag": false, "source": "fallback"}
            })
        );

        let snapshot = store.snapshot_with_query("").unwrap();
        assert_that!(snapshot["feature_b"].source).is_equal_to(Source::Fallback);
    }

    #[test]
    fn evaluation_options_reach_the_provider() {
        let configured = provider();
        let environment = Config::new()
            .flag_provider(configured.clone())
            .evaluation_options(EvaluationOptions {
                disable_exposure_logging: true,
            })
            .into_environment();
        let store = FlagStore::new(definitions(), Arc::new(environment));

        assert_that!(store.get_value("feature_a").unwrap()).is_true();
        assert_that!(configured.options_seen()).is_equal_to(vec![EvaluationOptions {
            disable_exposure_logging: true,
        }]);

        let defaults = provider();
        let store = FlagStore::new(definitions(), flag_environment(defaults.clone(), false, None));
        store.get_value("feature_a").unwrap();
        assert_that!(defaults.options_seen()).is_equal_to(vec![EvaluationOptions::default()]);
    }

    #[test]
    fn definitions_load_from_json() {
        let definitions = FlagStore::definitions_from_json(
            r#"{"feature_c": {"override": false}, "legacy": {"keep": true}}"#,
        )
        .unwrap();
        let store = FlagStore::new(definitions, Arc::new(Config::new().into_environment()));

        assert_that!(store.get_state("feature_c").unwrap()).is_equal_to(FlagState {
            flag: false,
            source: Source::Override,
        });
        assert_that!(store.kept_keys().collect::<Vec<_>>()).is_equal_to(vec!["legacy"]);

        let result = FlagStore::definitions_from_json(r#"{"feature_c": {"override": "yes"}}"#);
        assert!(matches!(result, Err(Error::InvalidDefinitions(_))));

        let result =
            FlagStore::definitions_from_json(r#"{"beta": {"keep": true}, "beta": {"override": true}}"#);
        assert_that!(result.unwrap_err()).is_equal_to(Error::DuplicateKey { key: "beta".into() });
    }
}
