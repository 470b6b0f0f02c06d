//! Versioned rule tables for the normalizer, resolver, matcher and batch runs.
//!
//! The default rule set is embedded from `data/rules.json` and parsed once.
//! Components take a `&RuleSet` (or one of its sections) explicitly, so
//! alternate rule files can be loaded with [`RuleSet::from_path`] and run
//! side by side.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::RulesError;

static BUILTIN_JSON: &str = include_str!("data/rules.json");

static BUILTIN: LazyLock<RuleSet> = LazyLock::new(|| {
    serde_json::from_str(BUILTIN_JSON).expect("rules.json should be valid JSON")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub normalizer: NormalizerRules,
    pub resolver: ResolverRules,
    pub matcher: MatcherRules,
    pub batch: BatchRules,
}

impl RuleSet {
    /// The embedded default rules.
    pub fn builtin() -> &'static RuleSet {
        &BUILTIN
    }

    pub fn from_json_str(json: &str) -> Result<RuleSet, RulesError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<RuleSet, RulesError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// Closed vocabularies the normalizer strips.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizerRules {
    /// Unit words removed wherever they stand as a token.
    pub units: Vec<String>,
    /// Unit abbreviations that are also plausible words; removed only after a quantity.
    pub ambiguous_units: Vec<String>,
    /// Phrases dropped outright ("optional", "for garnish").
    pub filler_phrases: Vec<String>,
    /// Phrases that drop everything up to the next comma ("such as ...").
    pub trailing_fillers: Vec<String>,
    /// Multi-word preparation/state descriptors.
    pub descriptor_phrases: Vec<String>,
    /// Single-word preparation/state descriptors.
    pub descriptors: Vec<String>,
    pub colors: Vec<String>,
    /// A color directly before one of these nouns is part of the ingredient's identity.
    pub color_bound_nouns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverRules {
    /// Misspelling (token or phrase) to correction.
    pub spelling_fixes: BTreeMap<String, String>,
    pub leading_modifiers: Vec<String>,
    pub trailing_leftovers: Vec<String>,
    /// Canonicals too generic to accept as a pattern-derived target.
    pub generic_blocklist: Vec<String>,
    /// Over-mapping guard: suggestions one canonical may absorb per batch run.
    pub max_suggestions_per_canonical: usize,
    /// Longest n-gram probed when searching for a contained canonical.
    pub max_ngram_tokens: usize,
    /// Jaro-Winkler similarity needed by the fuzzy strategy.
    pub fuzzy_threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherRules {
    /// Per-canonical extra description keywords ("flour" also matches "bread").
    pub category_expansions: BTreeMap<String, Vec<String>>,
    /// Sweets/snack markers that disqualify a product for non-sweets canonicals.
    pub cross_category_blocklist: Vec<String>,
    pub sweets_canonicals: Vec<String>,
    pub scoring: ScoringRules,
}

impl MatcherRules {
    /// Description keywords for a canonical: its name plus curated expansions.
    pub fn search_terms(&self, canonical_name: &str) -> Vec<String> {
        let mut terms = vec![canonical_name.to_string()];
        if let Some(extra) = self.category_expansions.get(canonical_name) {
            terms.extend(extra.iter().cloned());
        }
        terms
    }

    /// Sweets-related canonicals are exempt from the cross-category blocklist.
    pub fn is_sweets(&self, canonical_name: &str) -> bool {
        self.sweets_canonicals.iter().any(|s| s == canonical_name)
            || self
                .cross_category_blocklist
                .iter()
                .any(|marker| crate::text::contains_phrase(canonical_name, marker))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringRules {
    pub keyword_points: f64,
    pub first_token_bonus: f64,
    pub brand_bonus: f64,
    pub over_common_penalty: f64,
    pub over_common_canonicals: Vec<String>,
    pub accept_threshold: f64,
    pub max_accepted_per_canonical: usize,
    pub min_keyword_len: usize,
    pub stopwords: Vec<String>,
}

/// Shape checks that route a normalized mention to manual review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRules {
    pub min_chars: usize,
    pub max_chars: usize,
    pub max_tokens: usize,
}
