//! Loosely-typed environmental covariate values
//!
//! Sample metadata files carry an open-ended set of extra columns (station
//! name, pH, temperature, ...) that varies per project. Those columns are
//! preserved losslessly as an ordered JSON map; cell values are inferred as
//! integer, float, boolean, or plain text.

use serde_json::{Map, Number, Value};

/// Ordered key/value map of environmental covariates.
///
/// `serde_json` is built with `preserve_order`, so insertion order (the
/// column order of the metadata file) survives serialization.
pub type CovariateMap = Map<String, Value>;

/// Infer a loosely-typed JSON value from a raw table cell.
///
/// Inference order: integer, float, boolean (`true`/`false`, any case),
/// then plain string. Whitespace is trimmed before inference but the
/// original string is kept verbatim when no other type matches.
pub fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(Number::from(i));
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {},
    }

    Value::String(raw.to_string())
}
