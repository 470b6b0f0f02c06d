use std::collections::{BTreeMap, BTreeSet};

use crate::rules::ScoringRules;
use crate::text::words;
use crate::types::{term_key, Confidence, Product};

#[derive(Debug, Clone, Default)]
struct CanonicalProfile {
    keywords: BTreeSet<String>,
    brands: BTreeSet<String>,
}

/// Per-canonical keyword and brand sets learned from vetted product tags.
///
/// Scoring a product against a canonical:
/// - `keyword_points` per distinct description word seen in training
/// - `first_token_bonus` when the description starts with the canonical's first word
/// - `brand_bonus` when the brand owner appeared with this canonical in training
/// - minus `over_common_penalty` for canonicals configured as over-common
#[derive(Debug, Clone)]
pub struct KeywordModel {
    rules: ScoringRules,
    profiles: BTreeMap<String, CanonicalProfile>,
}

impl KeywordModel {
    /// Learn from products tagged `confident`; everything else is ignored.
    pub fn train<'p>(rules: &ScoringRules, sample: impl IntoIterator<Item = &'p Product>) -> Self {
        let mut model = Self {
            rules: rules.clone(),
            profiles: BTreeMap::new(),
        };
        for product in sample {
            let (Some(tag), Some(Confidence::Confident)) =
                (product.canonical_tag.as_deref(), product.canonical_tag_confidence)
            else {
                continue;
            };
            let keywords = model.keywords(&product.description);
            let profile = model.profiles.entry(term_key(tag)).or_default();
            profile.keywords.extend(keywords);
            if !product.is_generic() {
                profile.brands.insert(term_key(&product.brand_owner));
            }
        }
        model
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn canonicals(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn score(&self, canonical: &str, product: &Product) -> f64 {
        let canonical = term_key(canonical);
        let Some(profile) = self.profiles.get(&canonical) else {
            return 0.0;
        };
        let rules = &self.rules;

        let description_words = self.keywords(&product.description);
        let overlap = description_words.intersection(&profile.keywords).count();
        let mut score = overlap as f64 * rules.keyword_points;

        let first_description_word = words(&product.description).into_iter().next();
        let first_canonical_word = canonical.split_whitespace().next();
        if first_description_word.is_some()
            && first_description_word.as_deref() == first_canonical_word
        {
            score += rules.first_token_bonus;
        }
        if !product.is_generic() && profile.brands.contains(&term_key(&product.brand_owner)) {
            score += rules.brand_bonus;
        }
        if rules.over_common_canonicals.iter().any(|c| term_key(c) == canonical) {
            score -= rules.over_common_penalty;
        }
        score
    }

    /// Highest-scoring canonical at or above the acceptance threshold.
    /// Ties go to the alphabetically first canonical.
    pub fn best_match(&self, product: &Product) -> Option<(String, f64)> {
        let mut best: Option<(String, f64)> = None;
        for canonical in self.profiles.keys() {
            let score = self.score(canonical, product);
            if score < self.rules.accept_threshold {
                continue;
            }
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((canonical.clone(), score));
            }
        }
        best
    }

    fn keywords(&self, text: &str) -> BTreeSet<String> {
        words(text)
            .into_iter()
            .filter(|w| w.chars().count() >= self.rules.min_keyword_len)
            .filter(|w| !w.chars().any(|c| c.is_ascii_digit()))
            .filter(|w| !self.rules.stopwords.iter().any(|s| s == w))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;

    fn training() -> Vec<Product> {
        vec![
            Product::new("t1", "Greek Yogurt Plain Nonfat", "Fage")
                .tagged("greek yogurt", Confidence::Confident),
            Product::new("t2", "Greek Yogurt Strained Whole Milk", "Chobani")
                .tagged("greek yogurt", Confidence::Confident),
            Product::new("t3", "Granulated Sugar", "Domino").tagged("sugar", Confidence::Confident),
            Product::new("t4", "Cane Sugar Organic", "Wholesome")
                .tagged("sugar", Confidence::Suggested),
        ]
    }

    #[test]
    fn test_learns_only_from_confident_tags() {
        let model = KeywordModel::train(&RuleSet::builtin().matcher.scoring, &training());
        assert_eq!(model.canonicals().collect::<Vec<_>>(), vec!["greek yogurt", "sugar"]);
        let cane = Product::new("p", "Cane Organic", "Someone");
        assert_eq!(model.score("sugar", &cane), -2.0);
    }

    #[test]
    fn test_scores_overlap_first_token_and_brand() {
        let model = KeywordModel::train(&RuleSet::builtin().matcher.scoring, &training());
        let product = Product::new("p1", "Greek Strained Yogurt Vanilla", "Chobani");
        // greek + strained + yogurt, first token, known brand
        assert_eq!(model.score("greek yogurt", &product), 3.0 + 2.0 + 1.5);
        let (canonical, _) = model.best_match(&product).unwrap();
        assert_eq!(canonical, "greek yogurt");
    }

    #[test]
    fn test_over_common_canonicals_are_penalized() {
        let model = KeywordModel::train(&RuleSet::builtin().matcher.scoring, &training());
        let product = Product::new("p2", "Sugar Granulated Packets", "Domino");
        // granulated + sugar, first token, known brand, minus penalty
        assert_eq!(model.score("sugar", &product), 2.0 + 2.0 + 1.5 - 2.0);
        let plain = Product::new("p3", "Granulated Sugar Packets", "Store");
        assert_eq!(model.score("sugar", &plain), 0.0);
        assert!(model.best_match(&plain).is_none());
    }

    #[test]
    fn test_unrelated_products_fall_below_threshold() {
        let model = KeywordModel::train(&RuleSet::builtin().matcher.scoring, &training());
        let product = Product::new("p3", "Paper Towels", "Bounty");
        assert!(model.best_match(&product).is_none());
    }
}
