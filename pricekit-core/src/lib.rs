//! PriceKit core: technical-analysis commands over market price data.
//!
//! Each command runs through a single-use [`Fetcher`] in three stages
//! (validate parameters, extract prices from a provider, transform with a
//! kernel) and returns an [`Envelope`] whose results passed schema
//! validation. [`Toolbox`] binds a session context to the available
//! commands.

pub mod commands;
pub mod config;
pub mod data;
pub mod envelope;
pub mod error;
pub mod fetcher;
pub mod indicators;
pub mod params;
pub mod schema;
pub mod toolbox;

pub use commands::{MandelbrotChannel, MandelbrotChannelQueryParams, Momentum, MomentumQueryParams};
pub use config::{ConfigError, Settings};
pub use data::provider::{PriceProvider, PriceRequest, Provider, ProviderError, ProviderRegistry};
pub use envelope::{Envelope, Extra, Warning};
pub use error::{ExtractionError, FetchError, TransformError, ValidationError};
pub use fetcher::{Command, Fetcher, FetcherConfig, RawSeries, Stage};
pub use params::{ContextParams, QueryParams, RawParams};
pub use schema::{ResultTable, SchemaError};
pub use toolbox::{Technical, Toolbox};
