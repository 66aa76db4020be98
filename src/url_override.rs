//! Overrides encoded in a page query string.
//!
//! Flags use `ff.<key>=<value>`. Parameters use either the dotted form `fp.<store>.<param>=<value>`
//! or the whole-store form `fp.<store>=<json object>`. Anything else in the query string is
//! ignored, and an override that cannot be decoded is dropped without affecting the others.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::schema::Schema;
use crate::util::json_number;

pub const FLAG_PREFIX: &str = "ff.";
pub const PARAMETER_PREFIX: &str = "fp.";

lazy_static! {
    static ref FLAG_PARAM_REGEX: Regex =
        Regex::new(&format!(r"(?s)^{}(.+)$", regex::escape(FLAG_PREFIX))).unwrap();
    static ref PARAMETER_PARAM_REGEX: Regex = Regex::new(&format!(
        r"(?s)^{}([^.]+)(?:\.(.+))?$",
        regex::escape(PARAMETER_PREFIX)
    ))
    .unwrap();
    static ref DECIMAL_REGEX: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

/// Extracts the query component from either a bare query string (with or without the leading
/// `?`) or a URL.
fn query_component(input: &str) -> &str {
    let input = if let Some(query) = input.strip_prefix('?') {
        query
    } else if input.contains("://") || input.starts_with('/') {
        match input.find('?') {
            Some(index) => &input[index + 1..],
            None => "",
        }
    } else {
        input
    };
    match input.find('#') {
        Some(index) => &input[..index],
        None => input,
    }
}

fn query_pairs(input: &str) -> form_urlencoded::Parse<'_> {
    form_urlencoded::parse(query_component(input).as_bytes())
}

/// Only `1` and `true` (any case, surrounding whitespace ignored) turn a flag on.
pub fn coerce_flag_value(raw: &str) -> bool {
    let value = raw.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Parses every `ff.` override in `query` into a map of flag key to value.
///
/// When a key repeats, the last occurrence wins.
pub fn parse_flag_overrides(query: &str) -> BTreeMap<String, bool> {
    flag_pairs(query).collect()
}

/// Returns the override for exactly `key`, if `query` carries one.
pub fn flag_override(query: &str, key: &str) -> Option<bool> {
    flag_pairs(query)
        .filter(|(name, _)| name == key)
        .last()
        .map(|(_, value)| value)
}

fn flag_pairs(query: &str) -> impl Iterator<Item = (String, bool)> + '_ {
    query_pairs(query).filter_map(|(name, value)| {
        FLAG_PARAM_REGEX
            .captures(&name)
            .map(|captures| (captures[1].to_string(), coerce_flag_value(&value)))
    })
}

/// Parameter overrides parsed from a query string, grouped by store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterOverrides {
    stores: BTreeMap<String, Map<String, Value>>,
}

impl ParameterOverrides {
    /// Parses every `fp.` override in `query`.
    ///
    /// `schema_for` is consulted while coercing dotted-form values, so that `42` becomes a number
    /// only for a parameter whose schema accepts one.
    pub fn parse<'a, F>(query: &str, schema_for: F) -> Self
    where
        F: Fn(&str, &str) -> Option<&'a Schema>,
    {
        let mut overrides = ParameterOverrides::default();
        for (name, raw) in query_pairs(query) {
            let captures = match PARAMETER_PARAM_REGEX.captures(&name) {
                Some(captures) => captures,
                None => continue,
            };
            let store = &captures[1];

            match captures.get(2) {
                Some(parameter) => {
                    let parameter = parameter.as_str();
                    match coerce_parameter_value(&raw, schema_for(store, parameter)) {
                        Some(value) => {
                            overrides
                                .stores
                                .entry(store.to_string())
                                .or_default()
                                .insert(parameter.to_string(), value);
                        }
                        None => debug!("dropping malformed override for {}.{}", store, parameter),
                    }
                }
                None => match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(fields)) => {
                        let existing = overrides.stores.entry(store.to_string()).or_default();
                        deep_merge(existing, fields);
                    }
                    Ok(other) => debug!(
                        "dropping override for store {}: expected a JSON object, got {}",
                        store, other
                    ),
                    Err(e) => debug!("dropping malformed override for store {}: {}", store, e),
                },
            }
        }
        overrides
    }

    /// Returns the override for exactly `parameter` in `store`.
    pub fn get(&self, store: &str, parameter: &str) -> Option<&Value> {
        self.stores.get(store).and_then(|fields| fields.get(parameter))
    }

    /// Returns every override for `store`.
    pub fn store(&self, store: &str) -> Option<&Map<String, Value>> {
        self.stores.get(store)
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

fn is_json_container(value: &str) -> bool {
    (value.starts_with('{') && value.ends_with('}'))
        || (value.starts_with('[') && value.ends_with(']'))
}

/// Turns a raw dotted-form value into a candidate.
///
/// The chain is deliberately short: JSON containers are parsed as JSON; with a known schema a
/// number is tried, then the literals `true`, `false` and `null`, each kept only if the schema
/// accepts it; everything else stays a string. Returns `None` for a container that is not valid
/// JSON.
pub fn coerce_parameter_value(raw: &str, schema: Option<&Schema>) -> Option<Value> {
    let trimmed = raw.trim();
    if is_json_container(trimmed) {
        return serde_json::from_str(trimmed).ok();
    }

    if let Some(schema) = schema {
        if DECIMAL_REGEX.is_match(trimmed) {
            let number = trimmed.parse::<f64>().ok().and_then(json_number);
            if let Some(number) = number.filter(|n| schema.accepts(n)) {
                return Some(number);
            }
        }

        let literal = match trimmed {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            _ => None,
        };
        if let Some(literal) = literal.filter(|l| schema.accepts(l)) {
            return Some(literal);
        }
    }

    Some(Value::String(raw.to_string()))
}

/// Merges `source` into `target`, recursing where both sides hold an object and replacing
/// otherwise.
pub(crate) fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(incoming) => match target.get_mut(&key) {
                Some(Value::Object(existing)) => deep_merge(existing, incoming),
                _ => {
                    target.insert(key, Value::Object(incoming));
                }
            },
            value => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use assert_json_diff::assert_json_eq;
    use maplit::btreemap;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test_case("1", true)]
    #[test_case("true", true)]
    #[test_case(" TRUE ", true ; "padded upper true")]
    #[test_case("True", true ; "capitalized true")]
    #[test_case("0", false)]
    #[test_case("false", false)]
    #[test_case("yes", false)]
    #[test_case("", false)]
    #[test_case("11", false)]
    fn flag_values_are_coerced(raw: &str, expected: bool) {
        assert_that!(coerce_flag_value(raw)).is_equal_to(expected);
    }

    #[test]
    fn flag_overrides_strip_the_prefix() {
        let overrides = parse_flag_overrides("?ff.new_checkout=1&ff.dark_mode=off&utm_source=x");
        assert_that!(overrides).is_equal_to(btreemap! {
            "new_checkout".to_string() => true,
            "dark_mode".to_string() => false,
        });
    }

    #[test]
    fn flag_override_is_exact_and_last_wins() {
        let query = "ff.beta=1&ff.Beta=0&ff.beta=0&ff.beta_two=1";
        assert_that!(flag_override(query, "beta")).contains_value(false);
        assert_that!(flag_override(query, "Beta")).contains_value(false);
        assert_that!(flag_override(query, "beta_two")).contains_value(true);
        assert_that!(flag_override(query, "bet")).is_none();
    }

    #[test]
    fn decoded_newlines_stay_part_of_the_key() {
        let query = "ff.line%0Abreak=1&fp.s.multi%0Aline=x&fp.s%0At.c=y";
        assert_that!(flag_override(query, "line\nbreak")).contains_value(true);
        assert_that!(parse_flag_overrides(query).get("line\nbreak")).contains_value(&true);

        let overrides = ParameterOverrides::parse(query, |_, _| None);
        assert_that!(overrides.get("s", "multi\nline")).contains_value(&json!("x"));
        assert_that!(overrides.get("s\nt", "c")).contains_value(&json!("y"));
    }

    #[test_case("" ; "empty")]
    #[test_case("?" ; "bare question mark")]
    #[test_case("&&==&" ; "only separators")]
    #[test_case("%zz=%%" ; "bad percent escapes")]
    #[test_case("ff.=1" ; "empty flag name")]
    fn malformed_queries_yield_nothing(query: &str) {
        assert_that!(parse_flag_overrides(query).is_empty()).is_true();
        assert_that!(ParameterOverrides::parse(query, |_, _| None).is_empty()).is_true();
    }

    #[test]
    fn full_urls_and_percent_encoding_are_understood() {
        let overrides =
            parse_flag_overrides("https://example.com/app?ff.promo%5Fbanner=%20true%20#top");
        assert_that!(overrides.get("promo_banner")).contains_value(&true);
    }

    #[test]
    fn dotted_values_are_coerced_against_the_schema() {
        let count = schema::Schema::from(schema::number());
        let enabled = schema::boolean();
        let label = schema::Schema::from(schema::string());
        let overrides = ParameterOverrides::parse(
            "fp.s.count=42&fp.s.enabled=true&fp.s.label=42&fp.s.untyped=7&fp.s.items=%5B1%2C2%5D",
            |store, parameter| match (store, parameter) {
                ("s", "count") => Some(&count),
                ("s", "enabled") => Some(&enabled),
                ("s", "label") => Some(&label),
                _ => None,
            },
        );

        assert_that!(overrides.get("s", "count")).contains_value(&json!(42));
        assert_that!(overrides.get("s", "enabled")).contains_value(&json!(true));
        assert_that!(overrides.get("s", "label")).contains_value(&json!("42"));
        assert_that!(overrides.get("s", "untyped")).contains_value(&json!("7"));
        assert_that!(overrides.get("s", "items")).contains_value(&json!([1, 2]));
    }

    #[test]
    fn literals_need_schema_acceptance() {
        let nullable = schema::nullable(schema::string());
        assert_that!(coerce_parameter_value("null", Some(&nullable))).contains_value(Value::Null);
        assert_that!(coerce_parameter_value("true", Some(&nullable)))
            .contains_value(json!("true"));
        assert_that!(coerce_parameter_value("1.5e2", Some(&schema::number().into())))
            .contains_value(json!(150));
        assert_that!(coerce_parameter_value("abc", Some(&schema::number().into())))
            .contains_value(json!("abc"));
    }

    #[test]
    fn whole_store_json_deep_merges_with_dotted_values() {
        let query = format!(
            "fp.s.limits={}&fp.s={}&fp.s.name=dotted",
            r#"{"max":5,"min":1}"#, r#"{"limits":{"max":9},"name":"json","extra":true}"#
        );
        let overrides = ParameterOverrides::parse(&query, |_, _| None);

        assert_json_eq!(
            json!(overrides.store("s").unwrap()),
            json!({
                "limits": {"max": 9, "min": 1},
                "name": "dotted",
                "extra": true
            })
        );
    }

    #[test]
    fn repeated_whole_store_overrides_merge_left_to_right() {
        let query = r#"fp.s={"a":1,"b":{"x":1}}&fp.s={"b":{"y":2},"c":3}&fp.s={"a":4}"#;
        let overrides = ParameterOverrides::parse(query, |_, _| None);
        assert_json_eq!(
            json!(overrides.store("s").unwrap()),
            json!({"a": 4, "b": {"x": 1, "y": 2}, "c": 3})
        );
    }

    #[test]
    fn malformed_json_drops_only_that_override() {
        let query = r#"fp.s={"a":&fp.s.b=[1,&fp.s.c=3&fp.t=[1]&fp.u={"ok":true}"#;
        let overrides = ParameterOverrides::parse(query, |_, _| None);

        assert_that!(overrides.get("s", "a")).is_none();
        assert_that!(overrides.get("s", "b")).contains_value(&json!("[1,"));
        assert_that!(overrides.get("s", "c")).contains_value(&json!("3"));
        assert_that!(overrides.store("t")).is_none();
        assert_that!(overrides.get("u", "ok")).contains_value(&json!(true));

        let overrides = ParameterOverrides::parse("fp.s.b={broken}", |_, _| None);
        assert_that!(overrides.get("s", "b")).is_none();
    }

    #[test]
    fn unprefixed_and_flag_parameters_are_ignored() {
        let overrides = ParameterOverrides::parse("ff.s.count=1&fps.count=2&x.fp.s.c=3", |_, _| None);
        assert_that!(overrides.is_empty()).is_true();
    }
}
