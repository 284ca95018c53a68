use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Possible values a calculator input or result can hold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<FieldValue>),
    Object(HashMap<String, FieldValue>),
    Date(DateTime<Utc>),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            FieldValue::Object(obj) => {
                let mut pairs: Vec<String> =
                    obj.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                pairs.sort();
                write!(f, "{{{}}}", pairs.join(", "))
            }
            FieldValue::Date(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            FieldValue::Date(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<FieldValue>> {
        match self {
            FieldValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Numeric view of this value. Returns `None` when the variant is not
    /// `Integer` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Type name for validation error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Array(_) => "array",
            FieldValue::Object(_) => "object",
            FieldValue::Date(_) => "date",
            FieldValue::Null => "null",
        }
    }
}

/// Display text keyed by locale tag (`en`, `zh-TW`, ...).
///
/// Lookup falls back from the exact tag to the primary subtag, then to
/// `en`, then to any available entry so callers always get something
/// renderable out of a non-empty table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(HashMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Single-locale text, convenient for tests and built-ins.
    pub fn with(locale: &str, text: &str) -> Self {
        let mut map = HashMap::new();
        map.insert(locale.to_string(), text.to_string());
        Self(map)
    }

    pub fn insert(&mut self, locale: &str, text: &str) -> &mut Self {
        self.0.insert(locale.to_string(), text.to_string());
        self
    }

    pub fn get(&self, locale: &str) -> Option<&str> {
        if let Some(text) = self.0.get(locale) {
            return Some(text);
        }
        // "zh-TW" -> "zh"
        if let Some(primary) = locale.split('-').next() {
            if primary != locale {
                if let Some(text) = self.0.get(primary) {
                    return Some(text);
                }
            }
        }
        if let Some(text) = self.0.get("en") {
            return Some(text);
        }
        // Deterministic last resort: smallest locale tag wins
        self.0
            .iter()
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, text)| text.as_str())
    }

    /// Resolved text or empty string, for display contexts that cannot fail.
    pub fn resolve(&self, locale: &str) -> &str {
        self.get(locale).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }
}

/// Result of a single calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    /// The computed value
    pub value: FieldValue,
    /// Unit of the computed value, when one applies (`kg/m²`, `mL/min`, ...)
    pub unit: Option<String>,
    /// Optional clinical interpretation for display; opaque to the runtime
    pub interpretation: Option<LocalizedText>,
}

impl CalculationOutcome {
    /// Plain numeric outcome with no unit
    pub fn number(value: f64) -> Self {
        Self { value: FieldValue::Float(value), unit: None, interpretation: None }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_interpretation(mut self, interpretation: LocalizedText) -> Self {
        self.interpretation = Some(interpretation);
        self
    }
}

/// A single failed input field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), message: message.into() }
    }
}

/// Outcome of validating a set of calculator inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }

    pub fn invalid(errors: Vec<FieldError>) -> Self {
        Self { is_valid: false, errors }
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(FieldError::new(field, message));
    }
}
