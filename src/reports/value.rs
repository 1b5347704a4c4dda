use std::collections::HashMap;
use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// Whole numbers are written as JSON integers, everything else as floats.
fn serialize_number<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        if let Some(integer) = normalized.to_i64() {
            return serializer.serialize_i64(integer);
        }
    }
    match value.to_f64() {
        Some(float) => serializer.serialize_f64(float),
        None => serializer.serialize_str(&value.to_string()),
    }
}

/// Raw value a usage plugin reports for one field.
///
/// Upstream code sometimes places a marker such as `"Incomplete price"` where a cost is
/// expected, so a field is either a number or an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UsageValue {
    Numeric(#[serde(serialize_with = "serialize_number")] Decimal),
    Opaque(String),
}

impl UsageValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            UsageValue::Numeric(value) => Some(*value),
            UsageValue::Opaque(_) => None,
        }
    }
}

impl From<Decimal> for UsageValue {
    fn from(value: Decimal) -> Self {
        UsageValue::Numeric(value)
    }
}

impl From<i32> for UsageValue {
    fn from(value: i32) -> Self {
        UsageValue::Numeric(Decimal::from(value))
    }
}

impl From<i64> for UsageValue {
    fn from(value: i64) -> Self {
        UsageValue::Numeric(Decimal::from(value))
    }
}

impl From<usize> for UsageValue {
    fn from(value: usize) -> Self {
        UsageValue::Numeric(Decimal::from(value))
    }
}

impl From<&str> for UsageValue {
    fn from(value: &str) -> Self {
        UsageValue::Opaque(value.to_string())
    }
}

impl From<String> for UsageValue {
    fn from(value: String) -> Self {
        UsageValue::Opaque(value)
    }
}

/// Field key -> value for one venture.
pub type FieldValues = HashMap<String, UsageValue>;

/// Venture id -> field values, as returned by one plugin.
pub type UsageData = HashMap<i32, FieldValues>;

/// One rendered report cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(#[serde(serialize_with = "serialize_number")] Decimal),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(value) => write!(f, "{value}"),
            Cell::Text(text) => f.write_str(text),
        }
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Number(Decimal::from(value))
    }
}

impl From<Decimal> for Cell {
    fn from(value: Decimal) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}
