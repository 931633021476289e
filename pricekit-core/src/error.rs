//! Error taxonomy for the fetch pipeline.
//!
//! A `fetch()` call fails with exactly one of three kinds: a parameter that
//! did not validate, a provider that could not deliver data, or a kernel or
//! schema failure while transforming. The `Stage` variant guards stage order
//! when the stages are driven by hand.

use crate::data::provider::{Provider, ProviderError};
use crate::fetcher::Stage;
use crate::schema::SchemaError;
use thiserror::Error;

/// A parameter failed its declared constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The provider call failed or returned nothing usable.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("provider '{provider}' failed: {source}")]
    Provider {
        provider: Provider,
        #[source]
        source: ProviderError,
    },

    #[error("provider '{provider}' returned no rows for {symbols}")]
    Empty { provider: Provider, symbols: String },

    #[error("no provider registered for '{0}'")]
    NotConfigured(Provider),

    #[error("provider frame is unusable: {0}")]
    Frame(String),
}

/// The kernel raised or its output failed schema validation.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{command} transformation failed: {message}")]
    Kernel {
        command: &'static str,
        message: String,
    },

    #[error("{command} output failed validation: {source}")]
    Schema {
        command: &'static str,
        #[source]
        source: SchemaError,
    },
}

impl TransformError {
    /// The underlying failure message, without the command prefix.
    pub fn message(&self) -> String {
        match self {
            TransformError::Kernel { message, .. } => message.clone(),
            TransformError::Schema { source, .. } => source.to_string(),
        }
    }
}

/// Everything `Fetcher::fetch` can return.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("stage out of order: expected {expected:?}, fetcher is {actual:?}")]
    Stage { expected: Stage, actual: Stage },
}
