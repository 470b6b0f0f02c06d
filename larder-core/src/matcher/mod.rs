//! Canonical-to-product matching.
//!
//! [`ProductMatcher`] is the read path: candidate filter, cross-category
//! exclusion, confidence gate, allergen exclusion and brand-first ranking.
//! [`ProductTagger`] and [`KeywordModel`] assign tags to untagged catalog rows
//! during batch runs.

mod scoring;
mod tagger;

pub use scoring::KeywordModel;
pub use tagger::{ProductTagger, TagDecision, TagMethod, TagOutcome};

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::allergens::AllergenExpander;
use crate::error::StoreError;
use crate::rules::MatcherRules;
use crate::store::CatalogStore;
use crate::text::contains_phrase;
use crate::types::{term_key, AllergenSet, Confidence, Product};

/// How much a caller can trust a match list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    /// At least one real-brand product.
    Branded,
    /// Only generic placeholders; shown as lower-quality results.
    PlaceholderOnly,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMatches {
    pub products: Vec<Product>,
    pub quality: MatchQuality,
}

impl ProductMatches {
    pub fn empty() -> Self {
        Self {
            products: Vec::new(),
            quality: MatchQuality::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

pub struct ProductMatcher<'a> {
    store: &'a dyn CatalogStore,
    rules: &'a MatcherRules,
    expander: AllergenExpander<'a>,
}

impl<'a> ProductMatcher<'a> {
    pub fn new(store: &'a dyn CatalogStore, rules: &'a MatcherRules) -> Self {
        Self {
            store,
            rules,
            expander: AllergenExpander::new(store),
        }
    }

    pub fn match_products(
        &self,
        canonical_name: &str,
        required: Confidence,
        avoid: &AllergenSet,
    ) -> Result<ProductMatches, StoreError> {
        let canonical_name = term_key(canonical_name);
        let exempt = self.rules.is_sweets(&canonical_name);

        let mut kept = Vec::new();
        for product in self.candidates(&canonical_name)? {
            if !exempt && self.is_cross_category(&product) {
                debug!(
                    product = %product.id,
                    canonical = %canonical_name,
                    "cross-category exclusion"
                );
                continue;
            }
            if !required.admits(product.canonical_tag_confidence) {
                continue;
            }
            if !avoid.is_empty() {
                let allergens = self.expander.product_allergens(&product)?;
                if !allergens.is_disjoint(avoid) {
                    debug!(product = %product.id, ?allergens, "allergen exclusion");
                    continue;
                }
            }
            kept.push(product);
        }

        kept.sort_by(|a, b| {
            a.is_generic()
                .cmp(&b.is_generic())
                .then_with(|| a.description.cmp(&b.description))
                .then_with(|| a.id.cmp(&b.id))
        });

        let quality = match kept.first() {
            None => MatchQuality::Empty,
            Some(first) if !first.is_generic() => MatchQuality::Branded,
            Some(_) if required == Confidence::Confident => {
                // Confident-only callers get nothing rather than placeholders.
                return Ok(ProductMatches::empty());
            }
            Some(_) => MatchQuality::PlaceholderOnly,
        };
        debug!(
            canonical = %canonical_name,
            count = kept.len(),
            ?quality,
            "matched products"
        );
        Ok(ProductMatches {
            products: kept,
            quality,
        })
    }

    /// True when the description carries a sweets/snack marker.
    pub fn is_cross_category(&self, product: &Product) -> bool {
        self.rules
            .cross_category_blocklist
            .iter()
            .any(|marker| contains_phrase(&product.description, marker))
    }

    /// Products whose description names the canonical or one of its
    /// category-expansion keywords, deduplicated by id.
    fn candidates(&self, canonical_name: &str) -> Result<Vec<Product>, StoreError> {
        let mut found: BTreeMap<String, Product> = BTreeMap::new();
        for term in self.rules.search_terms(canonical_name) {
            for product in self.store.products_containing(&term)? {
                if contains_phrase(&product.description, &term) {
                    found.entry(product.id.clone()).or_insert(product);
                }
            }
        }
        Ok(found.into_values().collect())
    }
}
