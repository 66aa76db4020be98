//! Deterministic resolution of feature flags and typed parameters.
//!
//! Every lookup picks exactly one value, trying sources in a fixed order: a URL override, a test
//! override (in test environments only), a static override, the remote configuration service, and
//! finally the declared fallback. Parameters are additionally validated against a [Schema]; see
//! [ParameterState] for how mismatches are reported.
//!
//! ```
//! use std::sync::Arc;
//! use flag_resolution::{Config, FlagDefinition, FlagStore, Registry, Source};
//!
//! let definitions = Registry::new(vec![
//!     ("new_checkout", FlagDefinition::new().override_value(false)),
//!     ("dark_mode", FlagDefinition::new()),
//! ])
//! .unwrap();
//! let store = FlagStore::new(definitions, Arc::new(Config::new().into_environment()));
//!
//! let state = store.get_state_with_query("new_checkout", "?ff.new_checkout=1").unwrap();
//! assert!(state.flag);
//! assert_eq!(state.source, Source::Url);
//! assert_eq!(store.get_state("dark_mode").unwrap().source, Source::Fallback);
//! ```

mod client;
mod definition;
mod environment;
mod error;
mod flags;
mod parameters;
mod provider;
mod registry;
mod resolve;
pub mod schema;
mod source;
mod test_common;
mod url_override;
mod util;

pub use client::*;
pub use definition::*;
pub use environment::{DiagnosticSink, Environment, LogSink, QuerySource};
pub use error::*;
pub use flags::*;
pub use parameters::*;
pub use provider::*;
pub use registry::*;
pub use resolve::*;
pub use schema::{Schema, ValidationError, Validator};
pub use source::*;
pub use url_override::*;
