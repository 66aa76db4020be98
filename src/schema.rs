//! Validators for parameter values.
//!
//! Resolution only needs something that accepts or rejects a candidate [Value] and explains a
//! rejection; that contract is the [Validator] trait. A [Schema] is a cheaply cloneable handle to
//! a validator, and the functions in this module build the common ones.
//!
//! A validator may normalize what it accepts (for example [integer] turns `3.0` into `3`), and
//! the normalized value is what callers receive.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::util::f64_to_i64_safe;

/// ValidationError describes why a value was rejected by a [Validator].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Location of the offending value, `$` being the value itself.
    pub path: String,
    /// What the validator wanted at that location.
    pub expected: String,
    /// What it found instead.
    pub actual: String,
}

impl ValidationError {
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ValidationError {
            path: "$".to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Builds an error for a value of the wrong kind, describing the value by its JSON type.
    pub fn mismatch(expected: impl Into<String>, actual: &Value) -> Self {
        Self::new(expected, type_name(actual))
    }

    fn within(mut self, segment: &str) -> Self {
        let rest = self.path.strip_prefix('$').unwrap_or(&self.path);
        self.path = format!("${}{}", segment, rest);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} at {}, received {}",
            self.expected, self.path, self.actual
        )
    }
}

impl std::error::Error for ValidationError {}

/// Validator accepts or rejects a candidate value.
///
/// On success it returns the value callers should see, which may differ from the input if the
/// validator normalizes it.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<Value, ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self(value)
    }
}

/// A shareable handle to a [Validator].
#[derive(Clone)]
pub struct Schema(Arc<dyn Validator>);

impl Schema {
    pub fn new<V: Validator + 'static>(validator: V) -> Self {
        Schema(Arc::new(validator))
    }

    /// Wraps a closure as a schema.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ValidationError> + Send + Sync + 'static,
    {
        Schema(Arc::new(f))
    }

    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self.0.validate(value)
    }

    /// Returns true if the schema accepts `value` as is.
    pub fn accepts(&self, value: &Value) -> bool {
        self.0.validate(value).is_ok()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Schema")
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accepts every value unchanged.
pub fn any() -> Schema {
    Schema::from_fn(|value| Ok(value.clone()))
}

pub fn boolean() -> Schema {
    Schema::from_fn(|value| match value {
        Value::Bool(_) => Ok(value.clone()),
        _ => Err(ValidationError::mismatch("boolean", value)),
    })
}

/// Accepts exactly `expected`.
pub fn literal(expected: impl Into<Value>) -> Schema {
    let expected = expected.into();
    Schema::from_fn(move |value| {
        if *value == expected {
            Ok(value.clone())
        } else {
            Err(ValidationError::new(expected.to_string(), value.to_string()))
        }
    })
}

/// Accepts any one of `allowed`.
pub fn one_of<I, V>(allowed: I) -> Schema
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    let allowed: Vec<Value> = allowed.into_iter().map(Into::into).collect();
    Schema::from_fn(move |value| {
        if allowed.contains(value) {
            Ok(value.clone())
        } else {
            Err(ValidationError::new(
                format!("one of [{}]", allowed.iter().join(", ")),
                value.to_string(),
            ))
        }
    })
}

/// Accepts `null` in addition to whatever `inner` accepts.
pub fn nullable(inner: impl Into<Schema>) -> Schema {
    let inner = inner.into();
    Schema::from_fn(move |value| match value {
        Value::Null => Ok(Value::Null),
        _ => inner.validate(value),
    })
}

/// Substitutes `default` for `null` before handing the value to `inner`.
pub fn with_default(inner: impl Into<Schema>, default: impl Into<Value>) -> Schema {
    let inner = inner.into();
    let default = default.into();
    Schema::from_fn(move |value| match value {
        Value::Null => inner.validate(&default),
        _ => inner.validate(value),
    })
}

/// Accepts arrays whose every element is accepted by `item`.
pub fn array(item: impl Into<Schema>) -> Schema {
    let item = item.into();
    Schema::from_fn(move |value| match value {
        Value::Array(elements) => elements
            .iter()
            .enumerate()
            .map(|(index, element)| {
                item.validate(element)
                    .map_err(|e| e.within(&format!("[{}]", index)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(ValidationError::mismatch("array", value)),
    })
}

/// Builder for numeric validators. See [number] and [integer].
#[derive(Clone, Debug, Default)]
pub struct NumberSchema {
    integer: bool,
    min: Option<f64>,
    max: Option<f64>,
}

/// Accepts any JSON number.
pub fn number() -> NumberSchema {
    NumberSchema::default()
}

/// Accepts numbers with no fractional part, normalizing them to integers.
pub fn integer() -> NumberSchema {
    NumberSchema {
        integer: true,
        ..NumberSchema::default()
    }
}

impl NumberSchema {
    /// Rejects numbers below `min`.
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Rejects numbers above `max`.
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    fn expected(&self) -> String {
        let kind = if self.integer { "integer" } else { "number" };
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("{} in [{}, {}]", kind, min, max),
            (Some(min), None) => format!("{} >= {}", kind, min),
            (None, Some(max)) => format!("{} <= {}", kind, max),
            (None, None) => kind.to_string(),
        }
    }
}

impl Validator for NumberSchema {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let n = match value.as_f64() {
            Some(n) => n,
            None => return Err(ValidationError::mismatch(self.expected(), value)),
        };
        if self.min.map_or(false, |min| n < min) || self.max.map_or(false, |max| n > max) {
            return Err(ValidationError::new(self.expected(), value.to_string()));
        }
        if !self.integer || value.is_i64() || value.is_u64() {
            return Ok(value.clone());
        }
        match f64_to_i64_safe(n) {
            Some(i) if i as f64 == n => Ok(Value::from(i)),
            _ => Err(ValidationError::new(self.expected(), value.to_string())),
        }
    }
}

impl From<NumberSchema> for Schema {
    fn from(schema: NumberSchema) -> Self {
        Schema::new(schema)
    }
}

/// Builder for string validators. See [string].
#[derive(Clone, Debug, Default)]
pub struct StringSchema {
    trim: bool,
    non_empty: bool,
}

pub fn string() -> StringSchema {
    StringSchema::default()
}

impl StringSchema {
    /// Strips surrounding whitespace from accepted strings.
    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    /// Rejects the empty string (after trimming, if enabled).
    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }
}

impl Validator for StringSchema {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let s = match value {
            Value::String(s) => s,
            _ => return Err(ValidationError::mismatch("string", value)),
        };
        let s = if self.trim { s.trim() } else { s.as_str() };
        if self.non_empty && s.is_empty() {
            return Err(ValidationError::new("non-empty string", "empty string"));
        }
        Ok(Value::from(s))
    }
}

impl From<StringSchema> for Schema {
    fn from(schema: StringSchema) -> Self {
        Schema::new(schema)
    }
}

/// Builder for object validators. See [object].
///
/// Fields that are not declared pass through untouched.
#[derive(Clone, Debug, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Schema, bool)>,
}

pub fn object() -> ObjectSchema {
    ObjectSchema::default()
}

impl ObjectSchema {
    /// Declares a required field. A missing field is validated as `null`, so a [nullable] or
    /// [with_default] field schema can still accept it.
    pub fn field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push((name.into(), schema.into(), true));
        self
    }

    /// Declares a field that may be absent.
    pub fn optional_field(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.fields.push((name.into(), schema.into(), false));
        self
    }
}

impl Validator for ObjectSchema {
    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let input = match value {
            Value::Object(map) => map,
            _ => return Err(ValidationError::mismatch("object", value)),
        };

        let mut output: Map<String, Value> = input.clone();
        for (name, schema, required) in &self.fields {
            let segment = format!(".{}", name);
            match input.get(name) {
                Some(field) => {
                    let validated = schema.validate(field).map_err(|e| e.within(&segment))?;
                    output.insert(name.clone(), validated);
                }
                None if *required => {
                    let validated = schema.validate(&Value::Null).map_err(|e| {
                        ValidationError {
                            actual: "missing".to_string(),
                            ..e
                        }
                        .within(&segment)
                    })?;
                    output.insert(name.clone(), validated);
                }
                None => (),
            }
        }
        Ok(Value::Object(output))
    }
}

impl From<ObjectSchema> for Schema {
    fn from(schema: ObjectSchema) -> Self {
        Schema::new(schema)
    }
}
