//! Query parameter models.
//!
//! Parameters arrive as a loosely typed mapping (`RawParams`). Each parameter
//! type declares an ordered list of field validators; construction starts
//! from `Default` and runs the validator of every supplied field in order.
//! A `null` value means "not supplied" and keeps the default. Unknown fields
//! are rejected.

pub mod context;
pub mod window;

pub use context::ContextParams;
pub use window::{Window, WindowUnit};

use crate::error::ValidationError;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::str::FromStr;

/// Raw field values keyed by field name.
pub type RawParams = serde_json::Map<String, Value>;

/// Parses one raw value and stores the normalized result on `P`.
pub type ApplyFn<P> = fn(&mut P, &Value) -> Result<(), String>;

/// One entry of a validation pipeline.
pub struct FieldValidator<P> {
    pub name: &'static str,
    pub apply: ApplyFn<P>,
}

impl<P> FieldValidator<P> {
    pub const fn new(name: &'static str, apply: ApplyFn<P>) -> Self {
        Self { name, apply }
    }
}

/// Per-command parameters with declared defaults.
///
/// `from_raw(&p.to_raw())` must reproduce `p` exactly.
pub trait QueryParams: Default + Clone + PartialEq + Debug + Serialize + Send + Sync {
    /// Validators in the order they run.
    fn validators() -> Vec<FieldValidator<Self>>;

    fn from_raw(raw: &RawParams) -> Result<Self, ValidationError> {
        run_validators(raw, &Self::validators())
    }

    /// Canonical mapping of every field.
    fn to_raw(&self) -> RawParams {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => RawParams::new(),
        }
    }
}

/// Run a validation pipeline against a raw mapping.
pub fn run_validators<P: Default>(
    raw: &RawParams,
    validators: &[FieldValidator<P>],
) -> Result<P, ValidationError> {
    if let Some(unknown) = raw
        .keys()
        .find(|key| !validators.iter().any(|v| v.name == key.as_str()))
    {
        return Err(ValidationError::new(unknown.as_str(), "unknown field"));
    }

    let mut params = P::default();
    for validator in validators {
        match raw.get(validator.name) {
            None | Some(Value::Null) => {}
            Some(value) => (validator.apply)(&mut params, value)
                .map_err(|message| ValidationError::new(validator.name, message))?,
        }
    }
    Ok(params)
}

// ── Coercion helpers ────────────────────────────────────────────────

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strings only; no coercion from other JSON types.
pub fn expect_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, got {}", kind(value)))
}

/// Booleans, or the strings "true"/"false" in any case.
pub fn coerce_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        },
        other => Err(format!("expected a boolean, got {}", kind(other))),
    }
}

/// Integers, integral floats, or digit strings.
pub fn coerce_int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                    _ => Err(format!("{n} is not an integer")),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an integer")),
        other => Err(format!("expected an integer, got {}", kind(other))),
    }
}

/// A string parsed into one of a closed set of choices.
pub fn parse_choice<T>(value: &Value) -> Result<T, String>
where
    T: FromStr<Err = String>,
{
    expect_str(value)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Sample {
        flag: bool,
        count: i64,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                flag: false,
                count: 3,
            }
        }
    }

    impl QueryParams for Sample {
        fn validators() -> Vec<FieldValidator<Self>> {
            vec![
                FieldValidator::new("flag", |p: &mut Sample, v| {
                    p.flag = coerce_bool(v)?;
                    Ok(())
                }),
                FieldValidator::new("count", |p: &mut Sample, v| {
                    p.count = coerce_int(v)?;
                    Ok(())
                }),
            ]
        }
    }

    fn raw(value: Value) -> RawParams {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn empty_mapping_yields_defaults() {
        assert_eq!(Sample::from_raw(&RawParams::new()).unwrap(), Sample::default());
    }

    #[test]
    fn null_keeps_default() {
        let p = Sample::from_raw(&raw(json!({"count": null}))).unwrap();
        assert_eq!(p.count, 3);
    }

    #[test]
    fn unknown_field_is_named() {
        let err = Sample::from_raw(&raw(json!({"colour": "red"}))).unwrap_err();
        assert_eq!(err.field, "colour");
    }

    #[test]
    fn failing_validator_names_its_field() {
        let err = Sample::from_raw(&raw(json!({"flag": true, "count": "many"}))).unwrap_err();
        assert_eq!(err.field, "count");
    }

    #[test]
    fn to_raw_round_trips() {
        let p = Sample::from_raw(&raw(json!({"flag": "TRUE", "count": 7.0}))).unwrap();
        assert_eq!(p, Sample { flag: true, count: 7 });
        assert_eq!(Sample::from_raw(&p.to_raw()).unwrap(), p);
    }

    #[test]
    fn coerce_bool_rejects_numbers() {
        assert!(coerce_bool(&json!(1)).is_err());
        assert!(coerce_bool(&json!("yes")).is_err());
    }

    #[test]
    fn coerce_int_rejects_fractions() {
        assert_eq!(coerce_int(&json!("12")).unwrap(), 12);
        assert!(coerce_int(&json!(1.5)).is_err());
        assert!(coerce_int(&json!(true)).is_err());
    }

    #[test]
    fn expect_str_reports_actual_kind() {
        assert_eq!(expect_str(&json!(5)).unwrap_err(), "expected a string, got number");
    }
}
