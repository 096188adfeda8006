// src/contracts/registry.rs
//! Named contracts for every pipeline boundary:
//! ingestion → analysis → verification → alerting, plus the provider search
//! response consumed by the ingest driver.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{assert_valid, validate, Contract, ContractViolation, FieldCheck, FieldKind, FieldSpec, ValidationReport};

pub const INGESTION_TO_ANALYSIS: &str = "ingestion_to_analysis";
pub const ANALYSIS_TO_VERIFICATION: &str = "analysis_to_verification";
pub const VERIFICATION_TO_ALERTING: &str = "verification_to_alerting";
pub const PROVIDER_SEARCH_RESPONSE: &str = "provider_search_response";

pub const DEDUP_REASONS: [&str; 3] = ["none", "duplicate_url", "duplicate_content"];
pub const ALERT_LEVELS: [&str; 3] = ["low", "medium", "high"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("contract '{0}' is already registered")]
    Duplicate(String),
    #[error("unknown contract '{0}'")]
    Unknown(String),
}

/// Contracts addressable by id, listed in id order.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<&'static str, Contract>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the pipeline's boundary contracts.
    pub fn with_pipeline_contracts() -> Self {
        let mut reg = Self::new();
        for c in pipeline_contracts() {
            let res = reg.register(c);
            debug_assert!(res.is_ok(), "built-in contracts must have distinct ids");
            if let Err(e) = res {
                tracing::warn!(target: "contracts", error = %e, "built-in contract skipped");
            }
        }
        reg
    }

    pub fn register(&mut self, contract: Contract) -> Result<(), RegistryError> {
        if self.contracts.contains_key(contract.id) {
            return Err(RegistryError::Duplicate(contract.id.to_string()));
        }
        self.contracts.insert(contract.id, contract);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Contract> {
        self.contracts.get(id)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> + '_ {
        self.contracts.values()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.contracts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn validate(&self, id: &str, payload: &Value) -> Result<ValidationReport, RegistryError> {
        self.get(id)
            .map(|c| validate(c, payload))
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))
    }

    /// Unknown ids are reported as a violation, so callers have one error path.
    pub fn assert_valid(&self, id: &str, payload: &Value, context: &str) -> Result<(), ContractViolation> {
        match self.get(id) {
            Some(c) => assert_valid(c, payload, context),
            None => Err(ContractViolation {
                contract: id.to_string(),
                context: context.to_string(),
                errors: vec![RegistryError::Unknown(id.to_string()).to_string()],
            }),
        }
    }
}

fn not_in_future(v: &Value) -> bool {
    v.as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|t| t.with_timezone(&chrono::Utc) <= chrono::Utc::now() + chrono::Duration::minutes(5))
}

fn rfc3339(v: &Value) -> bool {
    v.as_str()
        .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
}

fn news_item_fields(c: Contract) -> Contract {
    c.field(FieldSpec::required("url", FieldKind::String, "Article/post link").with_check(FieldCheck::HttpUrl))
        .field(FieldSpec::required("title", FieldKind::String, "Headline").with_check(FieldCheck::NonEmpty))
        .field(FieldSpec::optional("snippet", FieldKind::String, "Lead paragraph or post body").with_check(FieldCheck::MaxLen(5_000)))
        .field(FieldSpec::required("source", FieldKind::String, "Outlet or provider label").with_check(FieldCheck::NonEmpty))
}

/// The built-in boundary contracts.
pub fn pipeline_contracts() -> Vec<Contract> {
    let ingestion = news_item_fields(Contract::new(
        INGESTION_TO_ANALYSIS,
        "ingestion",
        "analysis",
        "Normalized news item handed to analysis after deduplication.",
    ))
    .field(
        FieldSpec::optional("observed_at", FieldKind::String, "RFC 3339 timestamp when the item was observed")
            .with_check(FieldCheck::Custom { label: "an RFC 3339 timestamp not in the future", check: not_in_future }),
    );

    let analysis = news_item_fields(Contract::new(
        ANALYSIS_TO_VERIFICATION,
        "analysis",
        "verification",
        "Analyzed item with relevance and dedup verdict.",
    ))
    .field(FieldSpec::required("duplicate", FieldKind::Boolean, "Dedup verdict"))
    .field(FieldSpec::required("dedup_reason", FieldKind::String, "Dedup reason code").one_of(DEDUP_REASONS))
    .field(
        FieldSpec::required("relevance", FieldKind::Float, "Relevance in [0, 1]")
            .with_check(FieldCheck::Range { min: 0.0, max: 1.0 }),
    )
    .field(FieldSpec::optional("category", FieldKind::String, "Topic label (transfer, injury, result, ...)").with_check(FieldCheck::NonEmpty))
    .field(FieldSpec::optional("entities", FieldKind::List, "Named entities found in the item"));

    let verification = Contract::new(
        VERIFICATION_TO_ALERTING,
        "verification",
        "alerting",
        "Verified story ready for alert routing.",
    )
    .field(FieldSpec::required("url", FieldKind::String, "Canonical link").with_check(FieldCheck::HttpUrl))
    .field(FieldSpec::required("title", FieldKind::String, "Headline").with_check(FieldCheck::NonEmpty))
    .field(FieldSpec::required("verified", FieldKind::Boolean, "Corroborated by independent sources"))
    .field(
        FieldSpec::required("confidence", FieldKind::Float, "Verification confidence in [0, 1]")
            .with_check(FieldCheck::Range { min: 0.0, max: 1.0 }),
    )
    .field(FieldSpec::required("alert_level", FieldKind::String, "Routing priority").one_of(ALERT_LEVELS))
    .field(
        FieldSpec::optional("sources", FieldKind::List, "Outlets that reported the story")
            .with_check(FieldCheck::NonEmpty),
    )
    .field(
        FieldSpec::optional("verified_at", FieldKind::String, "RFC 3339 timestamp")
            .with_check(FieldCheck::Custom { label: "an RFC 3339 timestamp", check: rfc3339 }),
    );

    let search = Contract::new(
        PROVIDER_SEARCH_RESPONSE,
        "search provider",
        "ingestion",
        "Batched search response: a `data` list of result rows.",
    )
    .field(FieldSpec::required("data", FieldKind::List, "Result rows, each optionally carrying `title`"))
    .field(FieldSpec::optional("meta", FieldKind::Map, "Provider paging/rate metadata"));

    vec![ingestion, analysis, verification, search]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pipeline_registry_lists_all_boundaries() {
        let reg = ContractRegistry::with_pipeline_contracts();
        assert_eq!(
            reg.ids(),
            vec![
                ANALYSIS_TO_VERIFICATION,
                INGESTION_TO_ANALYSIS,
                PROVIDER_SEARCH_RESPONSE,
                VERIFICATION_TO_ALERTING
            ]
        );
        assert_eq!(reg.contracts().count(), 4);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = ContractRegistry::with_pipeline_contracts();
        let err = reg
            .register(Contract::new(INGESTION_TO_ANALYSIS, "a", "b", ""))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(INGESTION_TO_ANALYSIS.to_string()));
    }

    #[test]
    fn builtin_contract_ids_are_distinct() {
        let ids: Vec<&str> = pipeline_contracts().iter().map(|c| c.id).collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len(), "{ids:?}");
        assert_eq!(ContractRegistry::with_pipeline_contracts().len(), ids.len());
    }

    #[test]
    fn unknown_id() {
        let reg = ContractRegistry::with_pipeline_contracts();
        assert!(matches!(reg.validate("nope", &json!({})), Err(RegistryError::Unknown(_))));
        let err = reg.assert_valid("nope", &json!({}), "ctx").unwrap_err();
        assert_eq!(err.errors, vec!["unknown contract 'nope'".to_string()]);
    }

    #[test]
    fn ingestion_item_validates() {
        let reg = ContractRegistry::with_pipeline_contracts();
        let ok = json!({
            "url": "https://example.com/a",
            "title": "Juventus sign striker",
            "snippet": null,
            "source": "gazzetta",
            "observed_at": "2025-09-06T09:00:00Z"
        });
        assert!(reg.validate(INGESTION_TO_ANALYSIS, &ok).unwrap().valid);

        let future = json!({
            "url": "https://example.com/a",
            "title": "T",
            "source": "s",
            "observed_at": "2999-01-01T00:00:00Z"
        });
        let r = reg.validate(INGESTION_TO_ANALYSIS, &future).unwrap();
        assert!(!r.valid);
    }

    #[test]
    fn verification_enforces_levels_and_range() {
        let reg = ContractRegistry::with_pipeline_contracts();
        let bad = json!({
            "url": "https://example.com/a",
            "title": "T",
            "verified": true,
            "confidence": 1.2,
            "alert_level": "urgent"
        });
        let r = reg.validate(VERIFICATION_TO_ALERTING, &bad).unwrap();
        assert_eq!(r.errors.len(), 2);
    }

    #[test]
    fn search_response_requires_data_list() {
        let reg = ContractRegistry::with_pipeline_contracts();
        assert!(reg.validate(PROVIDER_SEARCH_RESPONSE, &json!({"data": []})).unwrap().valid);
        assert!(!reg.validate(PROVIDER_SEARCH_RESPONSE, &json!({"data": {}})).unwrap().valid);
    }
}
