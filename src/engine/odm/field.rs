//! Field descriptors
//!
//! A `FieldSpec` is an immutable description of one document field: its
//! type plus the `required`, `default`, `min`, `max` and `one_of`
//! constraints. Builder methods take `self` by value and hand back a new
//! spec, so a spec can be cloned into several schemas without the copies
//! influencing each other.
//!
//! ```
//! use docmap::engine::odm::field::{number, string};
//!
//! let username = string().required().min(3).max(20);
//! let price = number().min(0).default(0);
//! # let _ = (username, price);
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

use super::error::ValidationError;

type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Field type definitions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
        };
        f.write_str(name)
    }
}

/// A `min`/`max` limit. Strings compare their length, numbers their value
/// and dates their instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Number(f64),
    Date(DateTime<Utc>),
}

impl From<f64> for Bound {
    fn from(n: f64) -> Self {
        Bound::Number(n)
    }
}

impl From<i32> for Bound {
    fn from(n: i32) -> Self {
        Bound::Number(n as f64)
    }
}

impl From<i64> for Bound {
    fn from(n: i64) -> Self {
        Bound::Number(n as f64)
    }
}

impl From<u32> for Bound {
    fn from(n: u32) -> Self {
        Bound::Number(n as f64)
    }
}

impl From<usize> for Bound {
    fn from(n: usize) -> Self {
        Bound::Number(n as f64)
    }
}

impl From<DateTime<Utc>> for Bound {
    fn from(d: DateTime<Utc>) -> Self {
        Bound::Date(d)
    }
}

/// Value used when a field is absent
#[derive(Clone)]
pub enum DefaultValue {
    /// Fixed value
    Static(Value),
    /// Evaluated every time the default is needed
    Generated(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Static(v) => v.clone(),
            DefaultValue::Generated(f) => f(),
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, DefaultValue::Generated(_))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(v) => f.debug_tuple("Static").field(v).finish(),
            DefaultValue::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// Typed, constrained field descriptor
#[derive(Debug, Clone)]
pub struct FieldSpec {
    field_type: FieldType,
    required: bool,
    default: Option<DefaultValue>,
    min: Option<Bound>,
    max: Option<Bound>,
    allowed: Option<Vec<Value>>,
}

pub fn string() -> FieldSpec {
    FieldSpec::new(FieldType::String)
}

pub fn number() -> FieldSpec {
    FieldSpec::new(FieldType::Number)
}

pub fn boolean() -> FieldSpec {
    FieldSpec::new(FieldType::Boolean)
}

pub fn date() -> FieldSpec {
    FieldSpec::new(FieldType::Date)
}

pub fn array() -> FieldSpec {
    FieldSpec::new(FieldType::Array)
}

pub fn object() -> FieldSpec {
    FieldSpec::new(FieldType::Object)
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            min: None,
            max: None,
            allowed: None,
        }
    }

    pub fn required(self) -> Self {
        Self { required: true, ..self }
    }

    pub fn default(self, value: impl Into<Value>) -> Self {
        Self {
            default: Some(DefaultValue::Static(value.into())),
            ..self
        }
    }

    /// Default computed each time it is needed
    pub fn default_with<F>(self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self {
            default: Some(DefaultValue::Generated(Arc::new(f))),
            ..self
        }
    }

    /// Default to the current instant, evaluated when the default is used
    pub fn default_now(self) -> Self {
        self.default_with(|| Value::String(format_date(Utc::now())))
    }

    pub fn min(self, bound: impl Into<Bound>) -> Self {
        Self {
            min: Some(bound.into()),
            ..self
        }
    }

    pub fn max(self, bound: impl Into<Bound>) -> Self {
        Self {
            max: Some(bound.into()),
            ..self
        }
    }

    /// Restrict the field to a fixed set of values
    pub fn one_of<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            allowed: Some(values.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Validate a possibly absent value.
    ///
    /// Absent and `null` values yield the default (`None` when there is
    /// none) unless the field is required. Present values are checked by
    /// [`FieldSpec::check`].
    pub fn validate(&self, field: &str, value: Option<&Value>) -> ValidationResult<Option<Value>> {
        match value {
            None | Some(Value::Null) => {
                if self.required {
                    return Err(ValidationError::new(field, "is required"));
                }
                Ok(self.default.as_ref().map(DefaultValue::resolve))
            }
            Some(value) => self.check(field, value).map(Some),
        }
    }

    /// Validate a present value and return its normalized form
    pub fn check(&self, field: &str, value: &Value) -> ValidationResult<Value> {
        match self.field_type {
            FieldType::String => self.check_string(field, value),
            FieldType::Number => self.check_number(field, value),
            FieldType::Boolean => {
                if !value.is_boolean() {
                    return Err(type_error(field, self.field_type, value));
                }
                self.check_allowed(field, value)?;
                Ok(value.clone())
            }
            FieldType::Date => self.check_date(field, value),
            FieldType::Array => {
                if !value.is_array() {
                    return Err(type_error(field, self.field_type, value));
                }
                Ok(value.clone())
            }
            FieldType::Object => {
                if !value.is_object() {
                    return Err(type_error(field, self.field_type, value));
                }
                Ok(value.clone())
            }
        }
    }

    fn check_string(&self, field: &str, value: &Value) -> ValidationResult<Value> {
        let s = value
            .as_str()
            .ok_or_else(|| type_error(field, self.field_type, value))?;
        let len = s.chars().count() as f64;

        if let Some(min) = self.min_number(field)? {
            if len < min {
                return Err(ValidationError::new(
                    field,
                    format!("must be at least {} characters", min),
                ));
            }
        }
        if let Some(max) = self.max_number(field)? {
            if len > max {
                return Err(ValidationError::new(
                    field,
                    format!("must be at most {} characters", max),
                ));
            }
        }

        self.check_allowed(field, value)?;
        Ok(value.clone())
    }

    fn check_number(&self, field: &str, value: &Value) -> ValidationResult<Value> {
        let (n, normalized) = match value {
            Value::Number(num) => {
                let n = num
                    .as_f64()
                    .ok_or_else(|| ValidationError::new(field, "is not a finite number"))?;
                (n, value.clone())
            }
            // Form input arrives as text
            Value::String(s) => {
                let n: f64 = s
                    .trim()
                    .parse()
                    .map_err(|_| ValidationError::new(field, format!("{:?} is not a number", s)))?;
                let num = Number::from_f64(n)
                    .ok_or_else(|| ValidationError::new(field, "is not a finite number"))?;
                (n, Value::Number(num))
            }
            other => return Err(type_error(field, self.field_type, other)),
        };

        if let Some(min) = self.min_number(field)? {
            if n < min {
                return Err(ValidationError::new(field, format!("must be at least {}", min)));
            }
        }
        if let Some(max) = self.max_number(field)? {
            if n > max {
                return Err(ValidationError::new(field, format!("must be at most {}", max)));
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| a.as_f64() == Some(n)) {
                return Err(not_allowed(field, value));
            }
        }
        Ok(normalized)
    }

    fn check_date(&self, field: &str, value: &Value) -> ValidationResult<Value> {
        let dt = parse_date(value).ok_or_else(|| {
            ValidationError::new(field, format!("{} is not a valid date", value))
        })?;

        if let Some(min) = self.min_date(field)? {
            if dt < min {
                return Err(ValidationError::new(
                    field,
                    format!("must not be before {}", format_date(min)),
                ));
            }
        }
        if let Some(max) = self.max_date(field)? {
            if dt > max {
                return Err(ValidationError::new(
                    field,
                    format!("must not be after {}", format_date(max)),
                ));
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| parse_date(a) == Some(dt)) {
                return Err(not_allowed(field, value));
            }
        }
        Ok(Value::String(format_date(dt)))
    }

    fn check_allowed(&self, field: &str, value: &Value) -> ValidationResult<()> {
        match &self.allowed {
            Some(allowed) if !allowed.contains(value) => Err(not_allowed(field, value)),
            _ => Ok(()),
        }
    }

    fn min_number(&self, field: &str) -> ValidationResult<Option<f64>> {
        number_bound(field, self.min.as_ref())
    }

    fn max_number(&self, field: &str) -> ValidationResult<Option<f64>> {
        number_bound(field, self.max.as_ref())
    }

    fn min_date(&self, field: &str) -> ValidationResult<Option<DateTime<Utc>>> {
        date_bound(field, self.min.as_ref())
    }

    fn max_date(&self, field: &str) -> ValidationResult<Option<DateTime<Utc>>> {
        date_bound(field, self.max.as_ref())
    }
}

fn number_bound(field: &str, bound: Option<&Bound>) -> ValidationResult<Option<f64>> {
    match bound {
        None => Ok(None),
        Some(Bound::Number(n)) => Ok(Some(*n)),
        Some(Bound::Date(_)) => Err(ValidationError::new(field, "date bound on a non-date field")),
    }
}

fn date_bound(field: &str, bound: Option<&Bound>) -> ValidationResult<Option<DateTime<Utc>>> {
    match bound {
        None => Ok(None),
        Some(Bound::Date(d)) => Ok(Some(*d)),
        Some(Bound::Number(_)) => Err(ValidationError::new(field, "numeric bound on a date field")),
    }
}

fn type_error(field: &str, expected: FieldType, value: &Value) -> ValidationError {
    ValidationError::new(field, format!("expected {}, got {}", expected, value))
}

fn not_allowed(field: &str, value: &Value) -> ValidationError {
    ValidationError::new(field, format!("{} is not one of the allowed values", value))
}

/// Canonical text form of a date: RFC 3339, UTC, millisecond precision
pub fn format_date(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a date from RFC 3339 text, a naive date/datetime, or epoch millis
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(naive.and_utc());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(naive.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_string_bounds() {
        let spec = string().required().min(3).max(5);

        assert!(spec.validate("name", Some(&json!("ab"))).is_err());
        assert_eq!(spec.validate("name", Some(&json!("abc"))).unwrap(), Some(json!("abc")));
        assert!(spec.validate("name", Some(&json!("abcdef"))).is_err());
        assert!(spec.validate("name", Some(&json!(12))).is_err());
        assert!(spec.validate("name", None).is_err());
        assert!(spec.validate("name", Some(&Value::Null)).is_err());
    }

    #[test]
    fn test_string_length_counts_characters() {
        let spec = string().max(3);
        assert!(spec.check("name", &json!("äöü")).is_ok());
    }

    #[test]
    fn test_one_of() {
        let spec = string().one_of(["pending", "shipped"]);
        assert!(spec.check("status", &json!("pending")).is_ok());
        let err = spec.check("status", &json!("lost")).unwrap_err();
        assert_eq!(err.field, "status");

        let sizes = number().one_of([1, 2, 3]);
        assert_eq!(sizes.check("size", &json!("2")).unwrap(), json!(2.0));
        assert!(sizes.check("size", &json!(4)).is_err());
    }

    #[test]
    fn test_number_coercion() {
        let spec = number().min(0).max(100);

        assert_eq!(spec.check("qty", &json!(30)).unwrap(), json!(30));
        assert_eq!(spec.check("qty", &json!(" 12.5 ")).unwrap(), json!(12.5));
        assert!(spec.check("qty", &json!("abc")).is_err());
        assert!(spec.check("qty", &json!("NaN")).is_err());
        assert!(spec.check("qty", &json!(-1)).is_err());
        assert!(spec.check("qty", &json!(101)).is_err());
        assert!(spec.check("qty", &json!(true)).is_err());
    }

    #[test]
    fn test_boolean_is_strict() {
        let spec = boolean();
        assert_eq!(spec.check("active", &json!(false)).unwrap(), json!(false));
        assert!(spec.check("active", &json!("true")).is_err());
        assert!(spec.check("active", &json!(1)).is_err());
    }

    #[test]
    fn test_date_parsing_and_bounds() {
        let min = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let spec = date().min(min);

        let normalized = spec.check("at", &json!("2024-03-05")).unwrap();
        assert_eq!(normalized, json!("2024-03-05T00:00:00.000Z"));
        // Normalized output validates to itself
        assert_eq!(spec.check("at", &normalized).unwrap(), normalized);

        assert!(spec.check("at", &json!("2023-12-31T23:59:59Z")).is_err());
        assert!(spec.check("at", &json!("yesterday")).is_err());
        assert!(spec.check("at", &json!(1_709_596_800_000i64)).is_ok());
    }

    #[test]
    fn test_mismatched_bound() {
        let spec = date().min(3);
        assert!(spec.check("at", &json!("2024-01-01")).is_err());
    }

    #[test]
    fn test_containers() {
        assert!(array().check("tags", &json!(["a", 1])).is_ok());
        assert!(array().check("tags", &json!({})).is_err());
        assert!(object().check("meta", &json!({"a": [1]})).is_ok());
        assert!(object().check("meta", &json!([])).is_err());
    }

    #[test]
    fn test_defaults() {
        let spec = string().default("guest");
        assert_eq!(spec.validate("role", None).unwrap(), Some(json!("guest")));
        assert_eq!(string().validate("role", None).unwrap(), None);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let spec = number().default_with(move || json!(counter.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(spec.validate("seq", None).unwrap(), Some(json!(0)));
        assert_eq!(spec.validate("seq", None).unwrap(), Some(json!(1)));
        assert!(spec.default_value().unwrap().is_generated());
    }

    #[test]
    fn test_default_now_is_evaluated_late() {
        let spec = date().default_now();
        let before = Utc::now();
        let value = spec.validate("createdAt", None).unwrap().unwrap();
        assert!(value.as_str().unwrap().ends_with('Z'));
        let at = parse_date(&value).unwrap();
        assert!(at >= before - chrono::Duration::milliseconds(1));
    }

    #[test]
    fn test_shared_bounds_validate_independently() {
        let base = string().min(3);
        let a = base.clone().max(5);
        let b = base.required();

        assert!(a.check("a", &json!("abcdef")).is_err());
        assert!(b.check("b", &json!("abcdef")).is_ok());
        assert!(a.validate("a", None).is_ok());
        assert!(b.validate("b", None).is_err());
    }
}
