//! Result envelope returned by a successful fetch.

use crate::data::provider::Provider;
use crate::params::ContextParams;
use crate::schema::ResultTable;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Free-form diagnostics recorded by a command's transform stage.
pub type Extra = serde_json::Map<String, Value>;

/// A non-fatal condition noticed while building a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub category: String,
    pub message: String,
}

impl Warning {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Validated results plus everything needed to interpret them.
///
/// Built once by the fetcher and never modified afterwards. The warnings
/// list is owned: context warnings come first, then the fetcher's own, and
/// neither source is shared with the envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<P> {
    results: ResultTable,
    provider: Provider,
    warnings: Vec<Warning>,
    chart: Option<Value>,
    context_params: ContextParams,
    command_params: P,
    extra: Extra,
}

impl<P: Serialize> Envelope<P> {
    pub(crate) fn new(
        results: ResultTable,
        provider: Provider,
        warnings: Vec<Warning>,
        context_params: ContextParams,
        command_params: P,
        extra: Extra,
    ) -> Self {
        Self {
            results,
            provider,
            warnings,
            chart: None,
            context_params,
            command_params,
            extra,
        }
    }

    pub fn results(&self) -> &ResultTable {
        &self.results
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Always `None`; chart rendering is not produced by this crate.
    pub fn chart(&self) -> Option<&Value> {
        self.chart.as_ref()
    }

    pub fn context_params(&self) -> &ContextParams {
        &self.context_params
    }

    pub fn command_params(&self) -> &P {
        &self.command_params
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    /// The validated result frame.
    pub fn to_polars(&self) -> DataFrame {
        self.results.frame().clone()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
