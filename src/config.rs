// src/config.rs
//! Service configuration (`config/dedup.toml`).
//!
//! Resolution order:
//! 1) `$DEDUP_CONFIG_PATH` (must exist)
//! 2) `config/dedup.toml`
//! 3) built-in defaults
//!
//! Env overrides applied afterwards: `DEDUP_SIMILARITY_THRESHOLD` (clamped to
//! 0..=1) and `DEDUP_MAX_URLS`.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedup::fingerprint::{
    Fingerprinter, SimilarityParams, DEFAULT_SUBJECTS, DEFAULT_SUBJECT_ALIASES,
};
use crate::dedup::url::{UrlCanonicalizer, DEFAULT_TRACKING_KEYS, DEFAULT_TRACKING_PREFIXES};
use crate::dedup::LedgerLimits;
use crate::query::{QueryConfig, QuerySanitizer};

pub const DEFAULT_DEDUP_CONFIG_PATH: &str = "config/dedup.toml";
pub const ENV_DEDUP_CONFIG_PATH: &str = "DEDUP_CONFIG_PATH";
pub const ENV_SIMILARITY_THRESHOLD: &str = "DEDUP_SIMILARITY_THRESHOLD";
pub const ENV_MAX_URLS: &str = "DEDUP_MAX_URLS";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DedupConfig {
    #[serde(default)]
    pub ledger: LedgerLimits,
    #[serde(default)]
    pub similarity: SimilaritySection,
    #[serde(default)]
    pub url: UrlSection,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimilaritySection {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_min_shared")]
    pub min_shared_tokens: usize,
    #[serde(default = "default_near_identical")]
    pub near_identical: f32,
    /// Canonical subject markers (team names); two titles naming disjoint sets are never merged.
    /// Setting this replaces the built-in list.
    #[serde(default = "default_subjects")]
    pub subjects: Vec<String>,
    /// Alias → canonical subject, e.g. `juve = "juventus"`. Setting this replaces the built-in table.
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
}

fn default_threshold() -> f32 {
    SimilarityParams::default().threshold
}
fn default_min_shared() -> usize {
    SimilarityParams::default().min_shared_tokens
}
fn default_near_identical() -> f32 {
    SimilarityParams::default().near_identical
}
fn default_subjects() -> Vec<String> {
    DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect()
}
fn default_aliases() -> BTreeMap<String, String> {
    DEFAULT_SUBJECT_ALIASES
        .iter()
        .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
        .collect()
}

impl Default for SimilaritySection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_shared_tokens: default_min_shared(),
            near_identical: default_near_identical(),
            subjects: default_subjects(),
            aliases: default_aliases(),
        }
    }
}

impl SimilaritySection {
    pub fn params(&self) -> SimilarityParams {
        SimilarityParams {
            threshold: self.threshold,
            min_shared_tokens: self.min_shared_tokens,
            near_identical: self.near_identical,
        }
        .sanitized()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UrlSection {
    #[serde(default = "default_tracking_keys")]
    pub tracking_keys: Vec<String>,
    #[serde(default = "default_tracking_prefixes")]
    pub tracking_prefixes: Vec<String>,
}

fn default_tracking_keys() -> Vec<String> {
    DEFAULT_TRACKING_KEYS.iter().map(|s| s.to_string()).collect()
}
fn default_tracking_prefixes() -> Vec<String> {
    DEFAULT_TRACKING_PREFIXES.iter().map(|s| s.to_string()).collect()
}

impl Default for UrlSection {
    fn default() -> Self {
        Self {
            tracking_keys: default_tracking_keys(),
            tracking_prefixes: default_tracking_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IngestSection {
    /// Run the fingerprint scan for items whose URL is new.
    #[serde(default = "default_check_content")]
    pub check_content: bool,
}

fn default_check_content() -> bool {
    true
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            check_content: default_check_content(),
        }
    }
}

impl DedupConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: DedupConfig = toml::from_str(s).context("parsing dedup config")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading dedup config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Env path → default path → built-in defaults, then env overrides.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_DEDUP_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_DEDUP_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_DEDUP_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from_file(&default_p)?
            } else {
                Self::default()
            }
        };
        Ok(cfg.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(t) = parse_threshold_env(std::env::var(ENV_SIMILARITY_THRESHOLD).ok()) {
            self.similarity.threshold = t;
        }
        if let Some(n) = std::env::var(ENV_MAX_URLS)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
        {
            self.ledger.max_urls = n;
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        let p = self.similarity.params();
        self.similarity.threshold = p.threshold;
        self.similarity.min_shared_tokens = p.min_shared_tokens;
        self.similarity.near_identical = p.near_identical;
        self
    }

    pub fn canonicalizer(&self) -> UrlCanonicalizer {
        UrlCanonicalizer::new(self.url.tracking_keys.clone(), self.url.tracking_prefixes.clone())
    }

    pub fn fingerprinter(&self) -> Fingerprinter {
        Fingerprinter::new(
            self.similarity.params(),
            self.similarity.subjects.clone(),
            self.similarity.aliases.clone(),
        )
    }

    pub fn query_sanitizer(&self) -> QuerySanitizer {
        QuerySanitizer::new(&self.query)
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_is_defaults() {
        let cfg = DedupConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, DedupConfig::default());
        assert_eq!(cfg.ledger.max_urls, 50_000);
        assert!(cfg.ingest.check_content);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = DedupConfig::from_toml_str(
            r#"
[ledger]
max_urls = 10

[similarity]
threshold = 7.5
subjects = ["Juventus", "Real Madrid"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.ledger.max_urls, 10);
        assert_eq!(cfg.ledger.max_fingerprints, 5_000);
        assert_eq!(cfg.similarity.threshold, 1.0);
        assert_eq!(cfg.similarity.min_shared_tokens, 2);
        assert_eq!(cfg.query.max_batched_len, 500);
    }

    #[test]
    fn aliases_table_feeds_the_fingerprinter() {
        let cfg = DedupConfig::from_toml_str(
            r#"
[similarity]
subjects = ["Sporting CP"]

[similarity.aliases]
"Sporting Lisbon" = "Sporting CP"
"#,
        )
        .unwrap();
        assert_eq!(cfg.similarity.aliases.len(), 1);
        let f = cfg.fingerprinter();
        assert!(f.are_similar("Sporting Lisbon clinch title", "Sporting CP clinch title"));
    }

    #[test]
    fn shipped_config_matches_builtin_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_DEDUP_CONFIG_PATH);
        let cfg = DedupConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg, DedupConfig::default());
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(DedupConfig::from_toml_str("[ledger\nmax_urls = ").is_err());
    }

    #[test]
    fn threshold_env_is_clamped() {
        assert_eq!(parse_threshold_env(Some(" 0.7 ".into())), Some(0.7));
        assert_eq!(parse_threshold_env(Some("9".into())), Some(1.0));
        assert_eq!(parse_threshold_env(Some("NaN".into())), None);
        assert_eq!(parse_threshold_env(Some("abc".into())), None);
        assert_eq!(parse_threshold_env(None), None);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // isolate CWD so the repo's own config/ is not picked up
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_DEDUP_CONFIG_PATH);
        env::remove_var(ENV_SIMILARITY_THRESHOLD);
        env::remove_var(ENV_MAX_URLS);

        assert_eq!(DedupConfig::load_default().unwrap(), DedupConfig::default());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join(DEFAULT_DEDUP_CONFIG_PATH), "[ledger]\nmax_urls = 3\n").unwrap();
        assert_eq!(DedupConfig::load_default().unwrap().ledger.max_urls, 3);

        let p = tmp.path().join("other.toml");
        fs::write(&p, "[ledger]\nmax_urls = 9\n").unwrap();
        env::set_var(ENV_DEDUP_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_MAX_URLS, "11");
        let cfg = DedupConfig::load_default().unwrap();
        assert_eq!(cfg.ledger.max_urls, 11);

        env::set_var(ENV_DEDUP_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(DedupConfig::load_default().is_err());

        env::remove_var(ENV_DEDUP_CONFIG_PATH);
        env::remove_var(ENV_MAX_URLS);
        env::set_current_dir(&old).unwrap();
    }
}
