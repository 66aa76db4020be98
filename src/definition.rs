use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Schema;
use crate::util::is_false;

/// FlagDefinition declares everything the resolver knows locally about a boolean flag.
///
/// A definition is built once when the store is created and never changes afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    /// Value used when no other source applies.
    #[serde(default, skip_serializing_if = "is_false")]
    pub(crate) fallback: bool,
    /// Statically declared value that always wins over the remote service.
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub(crate) override_value: Option<bool>,
    /// Value used only while the test-environment predicate holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) test_override: Option<bool>,
    /// Marks a flag that does not need a remote counterpart. Informational only.
    #[serde(default, skip_serializing_if = "is_false")]
    pub(crate) keep: bool,
}

impl FlagDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn override_value(mut self, value: bool) -> Self {
        self.override_value = Some(value);
        self
    }

    pub fn test_override(mut self, value: bool) -> Self {
        self.test_override = Some(value);
        self
    }

    pub fn keep(mut self) -> Self {
        self.keep = true;
        self
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }
}

/// ParameterDefinition declares a typed parameter: its fallback, the schema every resolved value
/// is checked against, and any local overrides.
#[derive(Clone, Debug)]
pub struct ParameterDefinition {
    pub(crate) fallback: Value,
    pub(crate) schema: Schema,
    pub(crate) override_value: Option<Value>,
    pub(crate) test_override: Option<Value>,
    pub(crate) keep: bool,
}

impl ParameterDefinition {
    pub fn new(fallback: impl Into<Value>, schema: impl Into<Schema>) -> Self {
        ParameterDefinition {
            fallback: fallback.into(),
            schema: schema.into(),
            override_value: None,
            test_override: None,
            keep: false,
        }
    }

    pub fn override_value(mut self, value: impl Into<Value>) -> Self {
        self.override_value = Some(value.into());
        self
    }

    pub fn test_override(mut self, value: impl Into<Value>) -> Self {
        self.test_override = Some(value.into());
        self
    }

    pub fn keep(mut self) -> Self {
        self.keep = true;
        self
    }

    pub fn is_kept(&self) -> bool {
        self.keep
    }

    pub fn fallback_value(&self) -> &Value {
        &self.fallback
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}
