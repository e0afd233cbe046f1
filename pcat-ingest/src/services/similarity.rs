//! Product Similarity Scorer
//!
//! Scores two (name, brand) descriptions on a 0-100 scale. Used by the fuzzy tier
//! to find previously classified look-alikes and by the default tier to find
//! same-kind neighbours.
//!
//! **Algorithm:**
//! 1. Normalize: lowercase, punctuation to spaces, drop stopwords, collapse whitespace
//! 2. Brand: character-level similarity ratio
//! 3. Name: token-set ratio (order-insensitive, tolerant of extra tokens)
//! 4. Kind bonus: 100 if both names carry animal-kind keywords that overlap,
//!    20 if both carry keywords that do not overlap, else 0
//! 5. `0.6 * brand + 0.4 * name + 0.3 * bonus`, clamped to [0, 100]

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet, HashSet};

const BRAND_WEIGHT: f64 = 0.6;
const NAME_WEIGHT: f64 = 0.4;
const KIND_BONUS_WEIGHT: f64 = 0.3;
const KIND_MATCH_BONUS: f64 = 100.0;
const KIND_MISMATCH_BONUS: f64 = 20.0;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "the", "for", "of", "with", "in", "on", "to", "by", "or", "&",
    ]
    .into_iter()
    .collect()
});

/// Keyword → canonical animal kind
///
/// Shared by the scorer's kind bonus and the confidence gate.
#[derive(Debug, Clone, PartialEq)]
pub struct KindLexicon {
    keywords: BTreeMap<String, String>,
}

impl KindLexicon {
    /// Build from `(kind, keywords)` pairs; keywords are matched as whole tokens
    pub fn new<I, K, W>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<W>)>,
        K: Into<String>,
        W: Into<String>,
    {
        let mut keywords = BTreeMap::new();
        for (kind, words) in entries {
            let kind = kind.into().to_lowercase();
            for word in words {
                keywords.insert(word.into().to_lowercase(), kind.clone());
            }
        }
        Self { keywords }
    }

    /// Canonical kinds mentioned in already-normalized text
    pub fn kinds_in(&self, normalized: &str) -> BTreeSet<String> {
        normalized
            .split_whitespace()
            .filter_map(|token| self.keywords.get(token).cloned())
            .collect()
    }

    /// Kinds mentioned in raw text
    pub fn kinds_in_raw(&self, text: &str) -> BTreeSet<String> {
        self.kinds_in(&normalize(text))
    }

    /// Kinds a category label refers to, by keyword or by the kind's own name
    ///
    /// Whole tokens only: "Small Animal Supplies" names `small animal`, while
    /// "Concentrate" names nothing.
    pub fn kinds_in_label(&self, label: &str) -> BTreeSet<String> {
        let normalized = normalize(label);
        let mut kinds = self.kinds_in(&normalized);
        kinds.extend(
            self.canonical_kinds()
                .into_iter()
                .filter(|kind| contains_tokens(&normalized, kind))
                .map(str::to_string),
        );
        kinds
    }

    /// Kind whose name opens already-normalized text ("small animal supplies")
    pub fn leading_kind(&self, normalized: &str) -> Option<&str> {
        self.canonical_kinds().into_iter().find(|kind| {
            normalized == *kind
                || normalized
                    .strip_prefix(*kind)
                    .map_or(false, |rest| rest.starts_with(' '))
        })
    }

    /// Canonical kind names, most tokens first
    fn canonical_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self
            .keywords
            .values()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        kinds.sort_by_key(|kind| std::cmp::Reverse(kind.split_whitespace().count()));
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl Default for KindLexicon {
    fn default() -> Self {
        Self::new([
            ("dog", vec!["dog", "dogs", "puppy", "puppies", "canine"]),
            ("cat", vec!["cat", "cats", "kitten", "kittens", "feline"]),
            (
                "bird",
                vec!["bird", "birds", "parrot", "parakeet", "finch", "canary", "cockatiel"],
            ),
            ("fish", vec!["fish", "aquarium", "betta", "goldfish"]),
            (
                "small animal",
                vec![
                    "rabbit", "rabbits", "bunny", "hamster", "guinea", "gerbil", "ferret",
                    "chinchilla",
                ],
            ),
            (
                "reptile",
                vec!["reptile", "reptiles", "turtle", "tortoise", "lizard", "gecko", "snake"],
            ),
            ("horse", vec!["horse", "horses", "equine"]),
        ])
    }
}

/// Normalize a name or brand for comparison
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    lowered
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `needle` occurs in `haystack` as a run of whole tokens
pub fn contains_tokens(haystack: &str, needle: &str) -> bool {
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

/// Character-level similarity ratio (0-100); 0 when either side is empty
pub fn char_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Token-set ratio (0-100) of two normalized strings
///
/// Compares the shared tokens against each side's shared-plus-remainder string, so
/// a name whose tokens are a subset of the other's scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let shared = tokens_a
        .intersection(&tokens_b)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let only_a = tokens_a.difference(&tokens_b).copied().collect::<Vec<_>>().join(" ");
    let only_b = tokens_b.difference(&tokens_a).copied().collect::<Vec<_>>().join(" ");

    let combined_a = join_nonempty(&shared, &only_a);
    let combined_b = join_nonempty(&shared, &only_b);

    char_ratio(&shared, &combined_a)
        .max(char_ratio(&shared, &combined_b))
        .max(char_ratio(&combined_a, &combined_b))
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}

/// Normalized form of one description, reusable across many comparisons
#[derive(Debug, Clone, PartialEq)]
pub struct ProductProfile {
    pub name: String,
    pub brand: String,
    pub kinds: BTreeSet<String>,
}

/// Product similarity scorer
#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    lexicon: KindLexicon,
}

impl SimilarityScorer {
    pub fn new(lexicon: KindLexicon) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &KindLexicon {
        &self.lexicon
    }

    /// Normalize a description once for repeated scoring
    pub fn profile(&self, name: &str, brand: &str) -> ProductProfile {
        let name = normalize(name);
        let kinds = self.lexicon.kinds_in(&name);
        ProductProfile {
            name,
            brand: normalize(brand),
            kinds,
        }
    }

    /// Score two descriptions (0-100)
    pub fn score(&self, name_a: &str, brand_a: &str, name_b: &str, brand_b: &str) -> f64 {
        self.score_profiles(&self.profile(name_a, brand_a), &self.profile(name_b, brand_b))
    }

    /// Score two prepared profiles (0-100)
    pub fn score_profiles(&self, a: &ProductProfile, b: &ProductProfile) -> f64 {
        let brand_score = char_ratio(&a.brand, &b.brand);
        let name_score = token_set_ratio(&a.name, &b.name);

        let bonus = if a.kinds.is_empty() || b.kinds.is_empty() {
            0.0
        } else if a.kinds.intersection(&b.kinds).next().is_some() {
            KIND_MATCH_BONUS
        } else {
            KIND_MISMATCH_BONUS
        };

        let base = BRAND_WEIGHT * brand_score + NAME_WEIGHT * name_score;
        (base + KIND_BONUS_WEIGHT * bonus).clamp(0.0, 100.0)
    }
}
