// src/dedup/fingerprint.rs
//! Content fingerprints for approximate (cross-outlet) duplicate detection.
//!
//! A fingerprint is a weighted bag of salient tokens:
//! - subject markers (team names, incl. multi-word ones like "real madrid") → 3.0
//! - capitalized words from the raw title (proper nouns) → 2.0
//! - everything else that survives stop-word removal → 1.0
//!
//! Two titles are similar when their weighted Jaccard overlap reaches the
//! threshold and they share at least `min_shared_tokens` tokens, or when the
//! folded strings are near-identical. Either way, titles whose subject-marker
//! sets are both non-empty and disjoint are never similar.
//!
//! Precision over recall: a missed duplicate is cheaper than merging two
//! different stories, so defaults lean conservative.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const SUBJECT_WEIGHT: f32 = 3.0;
pub const PROPER_NOUN_WEIGHT: f32 = 2.0;
pub const TOKEN_WEIGHT: f32 = 1.0;

/// Tunables for the similarity decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityParams {
    /// Weighted Jaccard overlap in [0.0, 1.0] required to call two titles similar.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Minimum number of shared tokens for the overlap rule.
    #[serde(default = "default_min_shared")]
    pub min_shared_tokens: usize,
    /// Normalized Levenshtein similarity for the near-identical shortcut.
    #[serde(default = "default_near_identical")]
    pub near_identical: f32,
}

fn default_threshold() -> f32 {
    0.5
}
fn default_min_shared() -> usize {
    2
}
fn default_near_identical() -> f32 {
    0.9
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            min_shared_tokens: default_min_shared(),
            near_identical: default_near_identical(),
        }
    }
}

impl SimilarityParams {
    /// Clamp ratios into [0, 1] and keep at least one shared token.
    pub fn sanitized(mut self) -> Self {
        if !self.threshold.is_finite() {
            self.threshold = default_threshold();
        }
        if !self.near_identical.is_finite() {
            self.near_identical = default_near_identical();
        }
        self.threshold = self.threshold.clamp(0.0, 1.0);
        self.near_identical = self.near_identical.clamp(0.0, 1.0);
        self.min_shared_tokens = self.min_shared_tokens.max(1);
        self
    }
}

/// Clubs most often leading a headline in the feeds we ingest (canonical names).
pub const DEFAULT_SUBJECTS: &[&str] = &[
    "juventus", "inter", "milan", "napoli", "roma", "lazio", "atalanta",
    "fiorentina", "torino", "bologna", "genoa", "sampdoria", "udinese", "cagliari",
    "lecce", "monza", "empoli", "verona", "sassuolo", "parma", "como", "venezia",
    "real madrid", "barcelona", "atletico madrid", "sevilla", "valencia",
    "manchester united", "manchester city", "liverpool", "chelsea", "arsenal",
    "tottenham", "newcastle", "bayern munich", "borussia dortmund",
    "paris saint germain", "ajax", "benfica", "porto",
];

/// Alternative names (alias → canonical). "Inter Milan" is Inter, not Milan.
pub const DEFAULT_SUBJECT_ALIASES: &[(&str, &str)] = &[
    ("juve", "juventus"),
    ("inter milan", "inter"),
    ("internazionale", "inter"),
    ("fc internazionale", "inter"),
    ("ac milan", "milan"),
    ("ssc napoli", "napoli"),
    ("as roma", "roma"),
    ("ss lazio", "lazio"),
    ("hellas verona", "verona"),
    ("fc barcelona", "barcelona"),
    ("barca", "barcelona"),
    ("atletico", "atletico madrid"),
    ("man utd", "manchester united"),
    ("man united", "manchester united"),
    ("man city", "manchester city"),
    ("spurs", "tottenham"),
    ("bayern", "bayern munich"),
    ("bayern munchen", "bayern munich"),
    ("dortmund", "borussia dortmund"),
    ("bvb", "borussia dortmund"),
    ("psg", "paris saint germain"),
    ("paris sg", "paris saint germain"),
];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // en
        "a", "an", "the", "and", "or", "but", "of", "in", "on", "at", "to", "for", "from",
        "by", "with", "as", "is", "are", "was", "were", "be", "been", "it", "its", "this",
        "that", "after", "before", "over", "into", "vs", "v", "his", "her", "their", "he",
        "she", "they", "will", "has", "have", "had", "not", "no", "up", "out", "about",
        // it
        "il", "lo", "la", "i", "gli", "le", "un", "uno", "una", "di", "da", "del", "della",
        "dei", "delle", "al", "alla", "ai", "con", "su", "per", "tra", "fra", "e", "ed",
        "che", "non", "si", "nel", "nella", "sul", "sulla", "dal", "dalla",
        // es
        "el", "los", "las", "y", "en", "por", "para", "con", "del", "al", "su", "sus", "se",
        // newsroom filler
        "breaking", "official", "live", "update", "updates", "report", "reports", "video",
        "watch", "exclusive", "news", "ufficiale",
    ]
    .into_iter()
    .collect()
});

/// Approximate content signature; never used for exact identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFingerprint {
    /// Folded title (lower-case, accents removed, punctuation → spaces).
    pub folded: String,
    /// Salient token → weight.
    pub tokens: BTreeMap<String, f32>,
    /// Canonical subjects found in the title (or the snippet, if the title has none).
    pub subjects: BTreeSet<String>,
}

impl ContentFingerprint {
    /// No salient token: filler-only titles ("LIVE", "Breaking news") carry no signal.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Builds and compares fingerprints with a fixed subject vocabulary and tunables.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    params: SimilarityParams,
    /// (folded phrase, canonical subject), longest phrase first so multi-word names win.
    phrases: Vec<(String, String)>,
}

static DEFAULT_FINGERPRINTER: Lazy<Fingerprinter> = Lazy::new(Fingerprinter::default);

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(
            SimilarityParams::default(),
            DEFAULT_SUBJECTS.iter().map(|s| s.to_string()),
            DEFAULT_SUBJECT_ALIASES
                .iter()
                .map(|(alias, canonical)| (alias.to_string(), canonical.to_string())),
        )
    }
}

impl Fingerprinter {
    /// `subjects` are canonical names; `aliases` map alternative names onto them.
    /// An alias whose canonical name is not listed still counts as a subject.
    pub fn new<S, A>(params: SimilarityParams, subjects: S, aliases: A) -> Self
    where
        S: IntoIterator<Item = String>,
        A: IntoIterator<Item = (String, String)>,
    {
        let mut phrases: Vec<(String, String)> = Vec::new();
        for s in subjects {
            let s = fold(&s);
            phrases.push((s.clone(), s));
        }
        for (alias, canonical) in aliases {
            let canonical = fold(&canonical);
            if canonical.is_empty() {
                continue;
            }
            phrases.push((fold(&alias), canonical.clone()));
            phrases.push((canonical.clone(), canonical));
        }
        phrases.retain(|(p, _)| !p.is_empty());
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.cmp(b)));
        // one canonical per phrase
        phrases.dedup_by(|a, b| a.0 == b.0);
        Self {
            params: params.sanitized(),
            phrases,
        }
    }

    pub fn params(&self) -> &SimilarityParams {
        &self.params
    }

    /// Extract a fingerprint from a title and optional snippet.
    pub fn fingerprint(&self, title: &str, snippet: Option<&str>) -> ContentFingerprint {
        let folded = fold(title);
        let capitalized = capitalized_words(title);
        // Subject phrases are consumed so "Inter Milan" adds no "milan" token.
        let (mut subjects, rest) = self.find_subjects(&folded);

        let mut tokens = BTreeMap::new();
        for tok in rest.split_whitespace() {
            if STOPWORDS.contains(tok) {
                continue;
            }
            if tok.len() < 2 && !tok.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let w = if capitalized.contains(tok) {
                PROPER_NOUN_WEIGHT
            } else {
                TOKEN_WEIGHT
            };
            bump(&mut tokens, tok, w);
        }

        for s in &subjects {
            bump(&mut tokens, s, SUBJECT_WEIGHT);
        }
        if subjects.is_empty() {
            if let Some(snip) = snippet {
                subjects = self.find_subjects(&fold(snip)).0;
            }
        }

        ContentFingerprint {
            folded,
            tokens,
            subjects,
        }
    }

    /// Weighted Jaccard overlap and number of shared tokens.
    pub fn score(&self, a: &ContentFingerprint, b: &ContentFingerprint) -> (f32, usize) {
        let mut shared_w = 0.0f32;
        let mut union_w = 0.0f32;
        let mut shared = 0usize;

        for (tok, wa) in &a.tokens {
            match b.tokens.get(tok) {
                Some(wb) => {
                    let w = wa.max(*wb);
                    shared_w += w;
                    union_w += w;
                    shared += 1;
                }
                None => union_w += wa,
            }
        }
        for (tok, wb) in &b.tokens {
            if !a.tokens.contains_key(tok) {
                union_w += wb;
            }
        }

        if union_w <= 0.0 {
            return (0.0, 0);
        }
        (shared_w / union_w, shared)
    }

    /// Similarity decision between two fingerprints.
    pub fn similar(&self, a: &ContentFingerprint, b: &ContentFingerprint) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if exclusive_subjects(a, b) {
            return false;
        }

        let (overlap, shared) = self.score(a, b);
        if shared == 0 {
            return false;
        }

        let near = strsim::normalized_levenshtein(&a.folded, &b.folded) as f32;
        if near >= self.params.near_identical {
            return true;
        }

        shared >= self.params.min_shared_tokens && overlap >= self.params.threshold
    }

    /// Title-level convenience; absent or blank input is never similar.
    pub fn are_similar<'a, 'b>(
        &self,
        a: impl Into<Option<&'a str>>,
        b: impl Into<Option<&'b str>>,
    ) -> bool {
        let (Some(a), Some(b)) = (a.into(), b.into()) else {
            return false;
        };
        if a.trim().is_empty() || b.trim().is_empty() {
            return false;
        }
        self.similar(&self.fingerprint(a, None), &self.fingerprint(b, None))
    }

    /// Canonical subjects named in `folded`, plus the text left once their phrases are removed.
    fn find_subjects(&self, folded: &str) -> (BTreeSet<String>, String) {
        let mut found = BTreeSet::new();
        let mut padded = format!(" {folded} ");
        for (phrase, canonical) in &self.phrases {
            let needle = format!(" {phrase} ");
            // Adjacent matches share a space, so repeat until none is left.
            while padded.contains(&needle) {
                found.insert(canonical.clone());
                padded = padded.replace(&needle, "  ");
            }
        }
        (found, padded)
    }
}

/// Built-in fingerprinter with default tunables and subject list.
pub fn are_similar<'a, 'b>(a: impl Into<Option<&'a str>>, b: impl Into<Option<&'b str>>) -> bool {
    DEFAULT_FINGERPRINTER.are_similar(a, b)
}

fn exclusive_subjects(a: &ContentFingerprint, b: &ContentFingerprint) -> bool {
    !a.subjects.is_empty() && !b.subjects.is_empty() && a.subjects.is_disjoint(&b.subjects)
}

fn bump(tokens: &mut BTreeMap<String, f32>, tok: &str, w: f32) {
    let e = tokens.entry(tok.to_string()).or_insert(w);
    if w > *e {
        *e = w;
    }
}

/// Folded words of the raw text that start with an upper-case letter.
fn capitalized_words(raw: &str) -> HashSet<String> {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
        .map(fold)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lower-case, fold accents, replace punctuation with spaces, collapse runs.
pub fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    let mut push = |c: char, out: &mut String| {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    };
    for ch in s.chars().flat_map(char::to_lowercase) {
        match fold_char(ch) {
            Some(rep) => rep.chars().for_each(|c| push(c, &mut out)),
            None => push(ch, &mut out),
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn fold_char(c: char) -> Option<&'static str> {
    let rep = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ç' | 'ć' | 'č' => "c",
        'ñ' | 'ń' | 'ň' => "n",
        'š' | 'ś' | 'ş' => "s",
        'ž' | 'ź' | 'ż' => "z",
        'ý' | 'ÿ' => "y",
        'ğ' => "g",
        'đ' | 'ď' => "d",
        'ł' => "l",
        'ř' => "r",
        'ť' => "t",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        _ => return None,
    };
    Some(rep)
}
