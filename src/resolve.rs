use crate::definition::{FlagDefinition, ParameterDefinition};
use crate::source::Source;

/// Declared is what the priority algorithm needs to know about a definition: its locally
/// declared candidates and its fallback.
pub trait Declared {
    type Value: Clone;

    fn test_override(&self) -> Option<&Self::Value>;
    fn static_override(&self) -> Option<&Self::Value>;
    fn fallback(&self) -> &Self::Value;
}

impl Declared for FlagDefinition {
    type Value = bool;

    fn test_override(&self) -> Option<&bool> {
        self.test_override.as_ref()
    }

    fn static_override(&self) -> Option<&bool> {
        self.override_value.as_ref()
    }

    fn fallback(&self) -> &bool {
        &self.fallback
    }
}

impl Declared for ParameterDefinition {
    type Value = serde_json::Value;

    fn test_override(&self) -> Option<&serde_json::Value> {
        self.test_override.as_ref()
    }

    fn static_override(&self) -> Option<&serde_json::Value> {
        self.override_value.as_ref()
    }

    fn fallback(&self) -> &serde_json::Value {
        &self.fallback
    }
}

/// The value picked by [resolve] and the source it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Resolution<T> {
    fn new(value: T, source: Source) -> Self {
        Resolution { value, source }
    }
}

/// Picks exactly one value for a definition, trying sources strictly in priority order:
/// the URL override, the test override (only while `is_test_environment` holds), the static
/// override, the remote value, and finally the fallback.
///
/// `is_test_environment` and `remote` are only invoked if every source above them came up empty,
/// so a static override never costs a remote lookup.
pub fn resolve<D, T, R>(
    definition: &D,
    url: Option<D::Value>,
    is_test_environment: T,
    remote: R,
) -> Resolution<D::Value>
where
    D: Declared,
    T: FnOnce() -> bool,
    R: FnOnce() -> Option<D::Value>,
{
    if let Some(value) = url {
        return Resolution::new(value, Source::Url);
    }

    if let Some(value) = definition.test_override() {
        if is_test_environment() {
            return Resolution::new(value.clone(), Source::Test);
        }
    }

    if let Some(value) = definition.static_override() {
        return Resolution::new(value.clone(), Source::Override);
    }

    if let Some(value) = remote() {
        return Resolution::new(value, Source::Remote);
    }

    Resolution::new(definition.fallback().clone(), Source::Fallback)
}
