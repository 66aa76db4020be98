use std::fmt;

/// Error is returned when a flag or parameter store is misused: an undeclared key was requested,
/// a registry was built inconsistently, or resolution was attempted before the client singleton
/// was initialized.
///
/// These are programmer errors. Remote failures and schema mismatches never surface as an
/// [Error]; they degrade to a fallback value instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// UnknownFlag indicates the requested flag key is not declared in the flag store.
    UnknownFlag { key: String },
    /// UnknownStore indicates the requested parameter store is not declared.
    UnknownStore { store: String },
    /// UnknownParameter indicates the parameter store exists but does not declare the parameter.
    UnknownParameter { store: String, parameter: String },
    /// DuplicateKey indicates a registry was constructed with the same key more than once.
    DuplicateKey { key: String },
    /// NotInitialized indicates a globally bound store was used before [crate::init] was called.
    NotInitialized,
    /// InvalidClientKey indicates [crate::init] was called with an empty client key.
    InvalidClientKey,
    /// InvalidDefinitions indicates a serialized definition set could not be parsed.
    InvalidDefinitions(String),
    /// InvalidBootstrap indicates a pre-fetched remote payload could not be parsed.
    InvalidBootstrap(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownFlag { key } => write!(f, "flag '{}' is not declared", key),
            Error::UnknownStore { store } => {
                write!(f, "parameter store '{}' is not declared", store)
            }
            Error::UnknownParameter { store, parameter } => write!(
                f,
                "parameter '{}' is not declared in store '{}'",
                parameter, store
            ),
            Error::DuplicateKey { key } => write!(f, "key '{}' is declared more than once", key),
            Error::NotInitialized => {
                write!(f, "client is not initialized; call init() before resolving")
            }
            Error::InvalidClientKey => write!(f, "client key must not be empty"),
            Error::InvalidDefinitions(reason) => write!(f, "invalid definitions: {}", reason),
            Error::InvalidBootstrap(reason) => write!(f, "invalid bootstrap payload: {}", reason),
        }
    }
}

impl std::error::Error for Error {}
