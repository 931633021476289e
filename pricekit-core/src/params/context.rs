//! Session-wide context: symbols, provider, and date range.
//!
//! Built once per session and shared read-only (behind an `Arc`) by every
//! fetcher issued in that session. Warnings may be appended while the
//! context is still exclusively owned; once shared it is immutable.

use super::{expect_str, run_validators, FieldValidator, RawParams};
use crate::data::provider::Provider;
use crate::envelope::Warning;
use crate::error::ValidationError;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ContextParams {
    symbols: Vec<String>,
    provider: Provider,
    start_date: NaiveDate,
    end_date: NaiveDate,
    warnings: Vec<Warning>,
    #[serde(skip)]
    explicit_start: bool,
}

impl Default for ContextParams {
    fn default() -> Self {
        let provider = Provider::default();
        Self {
            symbols: vec!["AAPL".to_string()],
            provider,
            start_date: provider.default_start(),
            end_date: Utc::now().date_naive(),
            warnings: Vec::new(),
            explicit_start: false,
        }
    }
}

impl ContextParams {
    fn validators() -> Vec<FieldValidator<Self>> {
        vec![
            FieldValidator::new("symbols", apply_symbols),
            FieldValidator::new("provider", apply_provider),
            FieldValidator::new("start_date", apply_start_date),
            FieldValidator::new("end_date", apply_end_date),
        ]
    }

    /// Validate a raw mapping. `symbol` is accepted as an alias of `symbols`.
    pub fn from_raw(raw: &RawParams) -> Result<Self, ValidationError> {
        let mut raw = raw.clone();
        if let Some(value) = raw.remove("symbol") {
            if raw.contains_key("symbols") {
                return Err(ValidationError::new(
                    "symbol",
                    "give either 'symbol' or 'symbols', not both",
                ));
            }
            raw.insert("symbols".into(), value);
        }

        let mut params: Self = run_validators(&raw, &Self::validators())?;
        if !params.explicit_start {
            params.start_date = params.provider.default_start();
        }
        if params.start_date > params.end_date {
            return Err(ValidationError::new(
                "start_date",
                format!(
                    "{} is after end_date {}",
                    params.start_date, params.end_date
                ),
            ));
        }
        Ok(params)
    }

    /// Convenience constructor for the common case.
    pub fn new(symbols: &str, provider: Provider) -> Result<Self, ValidationError> {
        let mut raw = RawParams::new();
        raw.insert("symbols".into(), Value::String(symbols.to_string()));
        raw.insert("provider".into(), Value::String(provider.to_string()));
        Self::from_raw(&raw)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Whether the caller supplied `start_date` rather than taking the
    /// provider default.
    pub fn start_is_explicit(&self) -> bool {
        self.explicit_start
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn push_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

/// Split, trim and upper-case symbols, keeping first-seen order.
///
/// Duplicates are dropped; each one is reported in the returned list.
pub fn normalize_symbols(value: &Value) -> Result<(Vec<String>, Vec<String>), String> {
    let entries: Vec<&str> = match value {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| expect_str(item).map_err(|e| format!("symbol list entry: {e}")))
            .collect::<Result<_, _>>()?,
        _ => return Err("expected a comma-separated string or a list of strings".into()),
    };

    let mut symbols: Vec<String> = Vec::with_capacity(entries.len());
    let mut duplicates = Vec::new();
    for entry in entries {
        let symbol = entry.trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }
        if symbols.contains(&symbol) {
            duplicates.push(symbol);
        } else {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err("at least one symbol is required".into());
    }
    Ok((symbols, duplicates))
}

fn apply_symbols(params: &mut ContextParams, value: &Value) -> Result<(), String> {
    let (symbols, duplicates) = normalize_symbols(value)?;
    params.symbols = symbols;
    for symbol in duplicates {
        params.warnings.push(Warning::new(
            "symbols",
            format!("duplicate symbol '{symbol}' ignored"),
        ));
    }
    Ok(())
}

fn apply_provider(params: &mut ContextParams, value: &Value) -> Result<(), String> {
    params.provider = expect_str(value)?.parse()?;
    Ok(())
}

fn parse_date(value: &Value) -> Result<NaiveDate, String> {
    let s = expect_str(value)?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("'{s}' is not a YYYY-MM-DD date: {e}"))
}

fn apply_start_date(params: &mut ContextParams, value: &Value) -> Result<(), String> {
    params.start_date = parse_date(value)?;
    params.explicit_start = true;
    Ok(())
}

fn apply_end_date(params: &mut ContextParams, value: &Value) -> Result<(), String> {
    params.end_date = parse_date(value)?;
    Ok(())
}
