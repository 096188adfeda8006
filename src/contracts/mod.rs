// src/contracts/mod.rs
//! Inter-stage payload contracts.
//!
//! A `Contract` is a directional schema (producer → consumer) made of ordered
//! `FieldSpec`s. `validate` is pure and never panics; it returns every problem
//! it finds. `assert_valid` turns a failed report into a `ContractViolation`
//! for call sites where drift is an integration defect.
//!
//! Per field, in declaration order:
//! 1. absent + required → "missing required field"
//! 2. null + optional → skip the rest
//! 3. kind mismatch → error (`Float` accepts integers)
//! 4. allowed set declared and value not in it → error
//! 5. check declared and false on a non-null value → error

pub mod registry;

use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use registry::{ContractRegistry, RegistryError};

/// Expected JSON kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Map,
    Any,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "list",
            FieldKind::Map => "map",
            FieldKind::Any => "any",
        }
    }

    pub fn accepts(&self, v: &Value) -> bool {
        match self {
            FieldKind::String => v.is_string(),
            FieldKind::Integer => v.is_i64() || v.is_u64(),
            FieldKind::Float => v.is_number(),
            FieldKind::Boolean => v.is_boolean(),
            FieldKind::List => v.is_array(),
            FieldKind::Map => v.is_object(),
            FieldKind::Any => true,
        }
    }
}

/// Value predicate attached to a field.
#[derive(Debug, Clone, Copy)]
pub enum FieldCheck {
    /// Strings/lists/maps must not be empty (strings after trimming).
    NonEmpty,
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Max characters for strings, max items for lists.
    MaxLen(usize),
    /// Absolute `http(s)` URL.
    HttpUrl,
    /// Anything else; `label` is used in error messages.
    Custom {
        label: &'static str,
        check: fn(&Value) -> bool,
    },
}

impl FieldCheck {
    pub fn holds(&self, v: &Value) -> bool {
        match self {
            FieldCheck::NonEmpty => match v {
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                _ => true,
            },
            FieldCheck::Range { min, max } => v.as_f64().is_some_and(|n| n >= *min && n <= *max),
            FieldCheck::MaxLen(n) => match v {
                Value::String(s) => s.chars().count() <= *n,
                Value::Array(a) => a.len() <= *n,
                _ => true,
            },
            FieldCheck::HttpUrl => v.as_str().is_some_and(|s| {
                ::url::Url::parse(s).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
            }),
            FieldCheck::Custom { check, .. } => check(v),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldCheck::NonEmpty => "non-empty".to_string(),
            FieldCheck::Range { min, max } => format!("within [{min}, {max}]"),
            FieldCheck::MaxLen(n) => format!("at most {n} long"),
            FieldCheck::HttpUrl => "an http(s) URL".to_string(),
            FieldCheck::Custom { label, .. } => (*label).to_string(),
        }
    }
}

/// One field definition. Build with `FieldSpec::required` / `FieldSpec::optional`.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub allowed: Option<Vec<Value>>,
    pub check: Option<FieldCheck>,
    pub description: &'static str,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            allowed: None,
            check: None,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_check(mut self, check: FieldCheck) -> Self {
        self.check = Some(check);
        self
    }

    fn check_into(&self, obj: &Map<String, Value>, errors: &mut Vec<String>) {
        let name = self.name;
        let Some(value) = obj.get(name) else {
            if self.required {
                errors.push(format!("missing required field '{name}'"));
            }
            return;
        };

        if value.is_null() && !self.required {
            return;
        }

        if !self.kind.accepts(value) {
            errors.push(format!(
                "field '{name}': expected {}, got {}",
                self.kind.as_str(),
                json_kind(value)
            ));
            return;
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                let list = allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
                errors.push(format!("field '{name}': value {value} not in allowed set [{list}]"));
            }
        }

        if let Some(check) = &self.check {
            if !value.is_null() && !check.holds(value) {
                errors.push(format!("field '{name}': must be {}", check.describe()));
            }
        }
    }
}

/// Directional schema for one pipeline boundary.
#[derive(Debug, Clone)]
pub struct Contract {
    pub id: &'static str,
    pub producer: &'static str,
    pub consumer: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl Contract {
    pub fn new(
        id: &'static str,
        producer: &'static str,
        consumer: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            id,
            producer,
            consumer,
            description,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn summary(&self) -> ContractSummary {
        ContractSummary {
            id: self.id,
            producer: self.producer,
            consumer: self.consumer,
            description: self.description,
            fields: self
                .fields
                .iter()
                .map(|f| FieldSummary {
                    name: f.name,
                    kind: f.kind,
                    required: f.required,
                    allowed: f.allowed.clone(),
                    check: f.check.as_ref().map(FieldCheck::describe),
                    description: f.description,
                })
                .collect(),
        }
    }
}

/// Serializable view of a contract (checks rendered as text).
#[derive(Debug, Clone, Serialize)]
pub struct ContractSummary {
    pub id: &'static str,
    pub producer: &'static str,
    pub consumer: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    pub description: &'static str,
}

/// Outcome of `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Raised by `assert_valid` when a payload breaks its contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("contract '{contract}' violated at {context}: {}", .errors.join("; "))]
pub struct ContractViolation {
    pub contract: String,
    pub context: String,
    pub errors: Vec<String>,
}

/// Check `payload` against `contract`. Never panics.
pub fn validate(contract: &Contract, payload: &Value) -> ValidationReport {
    let obj = match payload {
        Value::Object(obj) => obj,
        Value::Null => return ValidationReport::from_errors(vec!["payload is null".to_string()]),
        other => {
            return ValidationReport::from_errors(vec![format!(
                "payload must be an object, got {}",
                json_kind(other)
            )])
        }
    };

    let mut errors = Vec::new();
    for spec in &contract.fields {
        spec.check_into(obj, &mut errors);
    }
    ValidationReport::from_errors(errors)
}

/// `validate`, failing with a `ContractViolation` labelled with `context`.
pub fn assert_valid(contract: &Contract, payload: &Value, context: &str) -> Result<(), ContractViolation> {
    let report = validate(contract, payload);
    if report.valid {
        return Ok(());
    }
    counter!("contract_violations_total", "contract" => contract.id).increment(1);
    tracing::warn!(
        target: "contracts",
        contract = contract.id,
        context,
        errors = report.errors.len(),
        "contract violation"
    );
    Err(ContractViolation {
        contract: contract.id.to_string(),
        context: context.to_string(),
        errors: report.errors,
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Contract {
        Contract::new("sample", "ingestion", "analysis", "test contract")
            .field(FieldSpec::required("url", FieldKind::String, "link").with_check(FieldCheck::HttpUrl))
            .field(FieldSpec::required("title", FieldKind::String, "headline").with_check(FieldCheck::NonEmpty))
            .field(FieldSpec::optional("score", FieldKind::Float, "0..1").with_check(FieldCheck::Range { min: 0.0, max: 1.0 }))
            .field(FieldSpec::optional("level", FieldKind::String, "alert level").one_of(["low", "high"]))
    }

    #[test]
    fn well_formed_payload_is_valid() {
        let r = validate(&sample(), &json!({"url": "https://x.test/a", "title": "T", "score": 0.4}));
        assert!(r.valid);
        assert!(r.errors.is_empty());
    }

    #[test]
    fn missing_required_field_is_named() {
        let r = validate(&sample(), &json!({"url": "https://x.test/a"}));
        assert!(!r.valid);
        assert_eq!(r.errors, vec!["missing required field 'title'".to_string()]);
    }

    #[test]
    fn null_and_non_object_payloads() {
        let r = validate(&sample(), &Value::Null);
        assert!(!r.valid);
        assert_eq!(r.errors.len(), 1);
        let r = validate(&sample(), &json!([1, 2]));
        assert_eq!(r.errors, vec!["payload must be an object, got list".to_string()]);
    }

    #[test]
    fn optional_null_skips_checks() {
        let r = validate(
            &sample(),
            &json!({"url": "https://x.test/a", "title": "T", "score": null, "level": null}),
        );
        assert!(r.valid, "{:?}", r.errors);
    }

    #[test]
    fn required_null_is_a_type_error() {
        let r = validate(&sample(), &json!({"url": "https://x.test/a", "title": null}));
        assert_eq!(r.errors, vec!["field 'title': expected string, got null".to_string()]);
    }

    #[test]
    fn float_accepts_integer() {
        let r = validate(&sample(), &json!({"url": "https://x.test/a", "title": "T", "score": 1}));
        assert!(r.valid);
    }

    #[test]
    fn integer_rejects_float() {
        let c = Contract::new("n", "a", "b", "").field(FieldSpec::required("n", FieldKind::Integer, ""));
        let r = validate(&c, &json!({"n": 1.5}));
        assert_eq!(r.errors, vec!["field 'n': expected integer, got float".to_string()]);
    }

    #[test]
    fn allowed_set_and_checks_report_all_errors() {
        let r = validate(
            &sample(),
            &json!({"url": "ftp://x.test/a", "title": "  ", "score": 3.5, "level": "mid"}),
        );
        assert!(!r.valid);
        assert_eq!(r.errors.len(), 4);
        assert!(r.errors[3].contains("not in allowed set"));
    }

    #[test]
    fn custom_check_runs() {
        fn even(v: &Value) -> bool {
            v.as_i64().is_some_and(|n| n % 2 == 0)
        }
        let c = Contract::new("c", "a", "b", "")
            .field(FieldSpec::required("n", FieldKind::Integer, "").with_check(FieldCheck::Custom { label: "even", check: even }));
        assert!(validate(&c, &json!({"n": 4})).valid);
        assert_eq!(validate(&c, &json!({"n": 3})).errors, vec!["field 'n': must be even".to_string()]);
    }

    #[test]
    fn assert_valid_carries_context() {
        let err = assert_valid(&sample(), &json!({}), "ingest:test").unwrap_err();
        assert_eq!(err.contract, "sample");
        assert_eq!(err.context, "ingest:test");
        assert_eq!(err.errors.len(), 2);
        let msg = err.to_string();
        assert!(msg.contains("ingest:test"));
        assert!(msg.contains("missing required field 'url'; missing required field 'title'"));
        assert!(assert_valid(&sample(), &json!({"url": "http://x.test", "title": "T"}), "ok").is_ok());
    }
}
