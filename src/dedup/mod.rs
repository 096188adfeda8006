// src/dedup/mod.rs
//! Cross-source deduplication ledger.
//!
//! Two indices behind one `RwLock`:
//! - canonical URL hashes (exact, cheap); capacity-capped, FIFO eviction
//! - content fingerprints (approximate); capacity-capped and time-windowed
//!
//! Reads (`is_duplicate`, `get_stats`) share the lock; writes (`mark_seen`,
//! `check_and_mark`, `clear`) hold it exclusively so both indices move together.
//! Nothing here panics: blank input is "not a duplicate", a poisoned lock is
//! recovered.
//!
//! Construct one ledger per process and share it as `Arc<DedupLedger>`.

pub mod fingerprint;
pub mod url;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::DedupConfig;
use crate::ingest::types::NewsItem;
use self::fingerprint::{ContentFingerprint, Fingerprinter};
use self::url::{sha256_hex, short_id, UrlCanonicalizer};

pub use self::fingerprint::are_similar;
pub use self::url::{get_url_hash, normalize_url};

/// Why an item was (or was not) considered a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DedupReason {
    #[serde(rename = "none")]
    Unique,
    #[serde(rename = "duplicate_url")]
    DuplicateUrl,
    #[serde(rename = "duplicate_content")]
    DuplicateContent,
}

impl DedupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupReason::Unique => "none",
            DedupReason::DuplicateUrl => "duplicate_url",
            DedupReason::DuplicateContent => "duplicate_content",
        }
    }

    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DedupReason::Unique)
    }
}

impl std::fmt::Display for DedupReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention limits. `0` disables the corresponding bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLimits {
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,
    #[serde(default = "default_max_fingerprints")]
    pub max_fingerprints: usize,
    #[serde(default = "default_window_secs")]
    pub fingerprint_window_secs: u64,
}

fn default_max_urls() -> usize {
    50_000
}
fn default_max_fingerprints() -> usize {
    5_000
}
// ~10 years; keeps `now - window` representable.
const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;

fn default_window_secs() -> u64 {
    48 * 3600
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_urls: default_max_urls(),
            max_fingerprints: default_max_fingerprints(),
            fingerprint_window_secs: default_window_secs(),
        }
    }
}

impl LedgerLimits {
    pub fn unbounded() -> Self {
        Self {
            max_urls: 0,
            max_fingerprints: 0,
            fingerprint_window_secs: 0,
        }
    }

    fn window(&self) -> Option<ChronoDuration> {
        if self.fingerprint_window_secs == 0 {
            return None;
        }
        ChronoDuration::try_seconds(self.fingerprint_window_secs.min(MAX_WINDOW_SECS) as i64)
    }
}

/// One remembered title.
#[derive(Debug, Clone)]
pub struct SeenFingerprint {
    pub fingerprint: ContentFingerprint,
    pub title: String,
    pub seen_at: DateTime<Utc>,
}

/// Storage behind the ledger. Implementations need no locking of their own;
/// the ledger serializes writers.
pub trait LedgerStore: Send + Sync {
    fn contains_url(&self, key: &str) -> bool;
    /// Returns `false` when the key was already present.
    fn insert_url(&mut self, key: String) -> bool;
    /// Drops the oldest URL key; `false` when empty.
    fn pop_oldest_url(&mut self) -> bool;
    fn push_fingerprint(&mut self, seen: SeenFingerprint);
    fn pop_oldest_fingerprint(&mut self) -> Option<SeenFingerprint>;
    fn oldest_fingerprint_at(&self) -> Option<DateTime<Utc>>;
    /// Newest first.
    fn recent_fingerprints(&self) -> Box<dyn Iterator<Item = &SeenFingerprint> + '_>;
    fn url_count(&self) -> usize;
    fn fingerprint_count(&self) -> usize;
    fn clear(&mut self);
}

/// In-process store: hash set + insertion order for URLs, deque for fingerprints.
#[derive(Debug, Default)]
pub struct MemoryStore {
    urls: HashSet<String>,
    url_order: VecDeque<String>,
    fingerprints: VecDeque<SeenFingerprint>,
}

impl LedgerStore for MemoryStore {
    fn contains_url(&self, key: &str) -> bool {
        self.urls.contains(key)
    }

    fn insert_url(&mut self, key: String) -> bool {
        if self.urls.contains(&key) {
            return false;
        }
        self.url_order.push_back(key.clone());
        self.urls.insert(key)
    }

    fn pop_oldest_url(&mut self) -> bool {
        match self.url_order.pop_front() {
            Some(k) => {
                self.urls.remove(&k);
                true
            }
            None => false,
        }
    }

    fn push_fingerprint(&mut self, seen: SeenFingerprint) {
        self.fingerprints.push_back(seen);
    }

    fn pop_oldest_fingerprint(&mut self) -> Option<SeenFingerprint> {
        self.fingerprints.pop_front()
    }

    fn oldest_fingerprint_at(&self) -> Option<DateTime<Utc>> {
        self.fingerprints.front().map(|f| f.seen_at)
    }

    fn recent_fingerprints(&self) -> Box<dyn Iterator<Item = &SeenFingerprint> + '_> {
        Box::new(self.fingerprints.iter().rev())
    }

    fn url_count(&self) -> usize {
        self.urls.len()
    }

    fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }

    fn clear(&mut self) {
        self.urls.clear();
        self.url_order.clear();
        self.fingerprints.clear();
    }
}

/// Read-only snapshot of index sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub unique_urls: usize,
    pub fingerprints: usize,
    pub max_urls: usize,
    pub max_fingerprints: usize,
    pub evicted_urls: u64,
    pub evicted_fingerprints: u64,
}

/// Verdict for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupVerdict {
    pub duplicate: bool,
    pub reason: DedupReason,
}

impl From<DedupReason> for DedupVerdict {
    fn from(reason: DedupReason) -> Self {
        Self {
            duplicate: reason.is_duplicate(),
            reason,
        }
    }
}

#[derive(Debug)]
struct Inner<S> {
    store: S,
    evicted_urls: u64,
    evicted_fingerprints: u64,
}

/// Process-wide registry of seen items.
#[derive(Debug)]
pub struct DedupLedger<S: LedgerStore = MemoryStore> {
    inner: RwLock<Inner<S>>,
    limits: LedgerLimits,
    canonicalizer: UrlCanonicalizer,
    fingerprinter: Fingerprinter,
}

impl Default for DedupLedger<MemoryStore> {
    fn default() -> Self {
        Self::new(LedgerLimits::default())
    }
}

impl DedupLedger<MemoryStore> {
    /// In-memory ledger with built-in tracking keys and similarity tunables.
    pub fn new(limits: LedgerLimits) -> Self {
        Self::with_store(
            MemoryStore::default(),
            limits,
            UrlCanonicalizer::default(),
            Fingerprinter::default(),
        )
    }

    pub fn from_config(cfg: &DedupConfig) -> Self {
        Self::with_store(
            MemoryStore::default(),
            cfg.ledger,
            cfg.canonicalizer(),
            cfg.fingerprinter(),
        )
    }
}

impl<S: LedgerStore> DedupLedger<S> {
    pub fn with_store(
        store: S,
        limits: LedgerLimits,
        canonicalizer: UrlCanonicalizer,
        fingerprinter: Fingerprinter,
    ) -> Self {
        crate::metrics::describe_once();
        Self {
            inner: RwLock::new(Inner {
                store,
                evicted_urls: 0,
                evicted_fingerprints: 0,
            }),
            limits,
            canonicalizer,
            fingerprinter,
        }
    }

    pub fn limits(&self) -> &LedgerLimits {
        &self.limits
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// Does not mutate. URL first; content only when asked and the URL is new.
    pub fn is_duplicate<'a, 'b>(
        &self,
        url: impl Into<Option<&'a str>>,
        title: impl Into<Option<&'b str>>,
        check_content: bool,
    ) -> (bool, DedupReason) {
        self.is_duplicate_at(url, title, check_content, Utc::now())
    }

    pub fn is_duplicate_at<'a, 'b>(
        &self,
        url: impl Into<Option<&'a str>>,
        title: impl Into<Option<&'b str>>,
        check_content: bool,
        now: DateTime<Utc>,
    ) -> (bool, DedupReason) {
        let url_key = self.url_key(url.into());
        let fp = check_content
            .then(|| self.title_fingerprint(title.into(), None))
            .flatten();

        let inner = self.read();
        let reason = self.classify(&inner.store, url_key.as_deref(), fp.as_ref(), now);
        drop(inner);

        record_check(reason);
        (reason.is_duplicate(), reason)
    }

    /// Record URL (if any) and fingerprint (if any title). Idempotent per URL.
    pub fn mark_seen<'a, 'b>(&self, url: impl Into<Option<&'a str>>, title: impl Into<Option<&'b str>>) {
        self.mark_seen_at(url, title, Utc::now());
    }

    pub fn mark_seen_at<'a, 'b>(
        &self,
        url: impl Into<Option<&'a str>>,
        title: impl Into<Option<&'b str>>,
        seen_at: DateTime<Utc>,
    ) {
        let title = title.into();
        let url_key = self.url_key(url.into());
        let fp = self.title_fingerprint(title, None);
        let mut inner = self.write();
        self.record(&mut inner, url_key, fp, title.unwrap_or_default(), seen_at);
    }

    /// Record a full item, using its snippet for subject markers and its own timestamp.
    pub fn mark_item(&self, item: &NewsItem) {
        let url_key = self.url_key(Some(&item.url));
        let fp = self.title_fingerprint(Some(&item.title), item.snippet.as_deref());
        let mut inner = self.write();
        self.record(&mut inner, url_key, fp, &item.title, item.observed_at);
    }

    /// Check and record under one write lock; the first concurrent caller wins.
    /// Duplicates are not recorded.
    pub fn check_and_mark(&self, item: &NewsItem, check_content: bool) -> DedupVerdict {
        let url_key = self.url_key(Some(&item.url));
        let fp = self.title_fingerprint(Some(&item.title), item.snippet.as_deref());

        let mut inner = self.write();
        let probe = if check_content { fp.as_ref() } else { None };
        let reason = self.classify(&inner.store, url_key.as_deref(), probe, item.observed_at);
        if !reason.is_duplicate() {
            self.record(&mut inner, url_key, fp, &item.title, item.observed_at);
        }
        drop(inner);

        record_check(reason);
        reason.into()
    }

    /// Reset both indices.
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.store.clear();
        inner.evicted_urls = 0;
        inner.evicted_fingerprints = 0;
        drop(inner);
        gauge!("dedup_ledger_urls").set(0.0);
        tracing::info!(target: "dedup", "ledger cleared");
    }

    pub fn get_stats(&self) -> LedgerStats {
        let inner = self.read();
        LedgerStats {
            unique_urls: inner.store.url_count(),
            fingerprints: inner.store.fingerprint_count(),
            max_urls: self.limits.max_urls,
            max_fingerprints: self.limits.max_fingerprints,
            evicted_urls: inner.evicted_urls,
            evicted_fingerprints: inner.evicted_fingerprints,
        }
    }

    // -- internals --

    fn url_key(&self, url: Option<&str>) -> Option<String> {
        let canonical = self.canonicalizer.normalize(url);
        (!canonical.is_empty()).then(|| sha256_hex(&canonical))
    }

    fn title_fingerprint(&self, title: Option<&str>, snippet: Option<&str>) -> Option<ContentFingerprint> {
        let title = title.filter(|t| !t.trim().is_empty())?;
        let fp = self.fingerprinter.fingerprint(title, snippet);
        (!fp.is_empty()).then_some(fp)
    }

    fn classify(
        &self,
        store: &S,
        url_key: Option<&str>,
        fp: Option<&ContentFingerprint>,
        now: DateTime<Utc>,
    ) -> DedupReason {
        if url_key.is_some_and(|k| store.contains_url(k)) {
            return DedupReason::DuplicateUrl;
        }
        let Some(fp) = fp else {
            return DedupReason::Unique;
        };

        let cutoff = self.limits.window().map(|w| now - w);
        for seen in store.recent_fingerprints() {
            if cutoff.is_some_and(|c| seen.seen_at < c) {
                continue;
            }
            if self.fingerprinter.similar(fp, &seen.fingerprint) {
                tracing::debug!(
                    target: "dedup",
                    id = %short_id(&fp.folded),
                    matched = %short_id(&seen.fingerprint.folded),
                    "content duplicate"
                );
                return DedupReason::DuplicateContent;
            }
        }
        DedupReason::Unique
    }

    fn record(
        &self,
        inner: &mut Inner<S>,
        url_key: Option<String>,
        fp: Option<ContentFingerprint>,
        title: &str,
        seen_at: DateTime<Utc>,
    ) {
        if let Some(key) = url_key {
            if inner.store.insert_url(key) {
                counter!("dedup_marked_total").increment(1);
            }
        }
        if let Some(fingerprint) = fp {
            inner.store.push_fingerprint(SeenFingerprint {
                fingerprint,
                title: title.to_string(),
                seen_at,
            });
        }
        self.evict(inner, seen_at);
        gauge!("dedup_ledger_urls").set(inner.store.url_count() as f64);
    }

    fn evict(&self, inner: &mut Inner<S>, now: DateTime<Utc>) {
        if self.limits.max_urls > 0 {
            while inner.store.url_count() > self.limits.max_urls && inner.store.pop_oldest_url() {
                inner.evicted_urls += 1;
            }
        }
        if self.limits.max_fingerprints > 0 {
            while inner.store.fingerprint_count() > self.limits.max_fingerprints
                && inner.store.pop_oldest_fingerprint().is_some()
            {
                inner.evicted_fingerprints += 1;
            }
        }
        if let Some(w) = self.limits.window() {
            let cutoff = now - w;
            // Fingerprints are appended in arrival order; an item with an old
            // `observed_at` may sit behind newer ones and is skipped on read.
            while inner.store.oldest_fingerprint_at().is_some_and(|t| t < cutoff) {
                if inner.store.pop_oldest_fingerprint().is_none() {
                    break;
                }
                inner.evicted_fingerprints += 1;
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<S>> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::warn!(target: "dedup", "ledger lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<S>> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::warn!(target: "dedup", "ledger lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

fn record_check(reason: DedupReason) {
    counter!("dedup_checks_total").increment(1);
    if reason.is_duplicate() {
        counter!("dedup_duplicates_total", "reason" => reason.as_str()).increment(1);
    }
}
