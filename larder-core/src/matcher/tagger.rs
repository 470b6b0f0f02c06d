use serde::Serialize;
use tracing::debug;

use super::scoring::KeywordModel;
use crate::error::StoreError;
use crate::normalizer::Normalizer;
use crate::resolver::{is_generic, AbsorptionGuard};
use crate::rules::RuleSet;
use crate::store::CatalogStore;
use crate::text::contains_phrase;
use crate::types::{term_key, Confidence, Product};

const TRAINING_PAGE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMethod {
    /// The description's lead segment normalizes to a canonical name.
    LeadSegment,
    /// A canonical name or alias appears inside the description.
    ContainedPhrase,
    /// Keyword model above threshold.
    Scored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagDecision {
    pub canonical: String,
    pub confidence: Confidence,
    pub method: TagMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagOutcome {
    Tagged(TagDecision),
    /// The scored canonical already absorbed its share of products this run.
    OverCap(String),
    NoMatch,
}

/// Assigns a canonical tag to an untagged catalog product.
///
/// Built once per batch run: it snapshots the canonical terms (longest first)
/// and trains the keyword model on products already tagged `confident`.
pub struct ProductTagger<'a> {
    store: &'a dyn CatalogStore,
    normalizer: &'a Normalizer,
    rules: &'a RuleSet,
    /// (lowercased term, canonical name), longest term first
    terms: Vec<(String, String)>,
    model: KeywordModel,
    guard: AbsorptionGuard,
}

impl<'a> ProductTagger<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        normalizer: &'a Normalizer,
        rules: &'a RuleSet,
    ) -> Result<Self, StoreError> {
        let mut terms = Vec::new();
        for canonical in store.canonicals()? {
            for term in canonical.terms() {
                terms.push((term_key(term), canonical.name.clone()));
            }
        }
        terms.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut sample = Vec::new();
        let mut offset = 0;
        loop {
            let page = store.products(offset, TRAINING_PAGE)?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            sample.extend(
                page.into_iter()
                    .filter(|p| p.canonical_tag_confidence == Some(Confidence::Confident)),
            );
        }
        let model = KeywordModel::train(&rules.matcher.scoring, &sample);
        debug!(
            terms = terms.len(),
            training_products = sample.len(),
            "product tagger ready"
        );

        Ok(Self {
            store,
            normalizer,
            rules,
            terms,
            model,
            guard: AbsorptionGuard::new(rules.matcher.scoring.max_accepted_per_canonical),
        })
    }

    pub fn classify(&self, product: &Product) -> Result<TagOutcome, StoreError> {
        if let Some(canonical) = self.lead_segment_match(product)? {
            return Ok(TagOutcome::Tagged(TagDecision {
                canonical,
                confidence: Confidence::Confident,
                method: TagMethod::LeadSegment,
            }));
        }
        if let Some(canonical) = self.contained_match(product) {
            return Ok(TagOutcome::Tagged(TagDecision {
                canonical,
                confidence: Confidence::Suggested,
                method: TagMethod::ContainedPhrase,
            }));
        }

        let Some((name, score)) = self.model.best_match(product) else {
            return Ok(TagOutcome::NoMatch);
        };
        if self.excluded(&name, product) {
            return Ok(TagOutcome::NoMatch);
        }
        let Some(canonical) = self.store.canonical_by_term(&name)? else {
            return Ok(TagOutcome::NoMatch);
        };
        if !self.guard.try_absorb(canonical.id) {
            return Ok(TagOutcome::OverCap(canonical.name));
        }
        debug!(product = %product.id, canonical = %canonical.name, score, "scored tag");
        Ok(TagOutcome::Tagged(TagDecision {
            canonical: canonical.name,
            confidence: Confidence::Low,
            method: TagMethod::Scored,
        }))
    }

    /// Return the cap slot a scored decision reserved when its tag was not written.
    pub fn release(&self, decision: &TagDecision) -> Result<(), StoreError> {
        if decision.method != TagMethod::Scored {
            return Ok(());
        }
        if let Some(canonical) = self.store.canonical_by_term(&decision.canonical)? {
            self.guard.release(canonical.id);
        }
        Ok(())
    }

    fn lead_segment_match(&self, product: &Product) -> Result<Option<String>, StoreError> {
        let lead = product
            .description
            .split([',', '(', ';'])
            .next()
            .unwrap_or_default();
        let normalized = self.normalizer.normalize(lead);
        if normalized.is_empty() {
            return Ok(None);
        }
        Ok(self
            .store
            .canonical_by_term(normalized.as_str())?
            .map(|c| c.name)
            .filter(|name| !self.excluded(name, product)))
    }

    fn contained_match(&self, product: &Product) -> Option<String> {
        self.terms
            .iter()
            .filter(|(term, name)| {
                contains_phrase(&product.description, term)
                    && !is_generic(name, &self.rules.resolver)
                    && !self.excluded(name, product)
            })
            .map(|(_, name)| name.clone())
            .next()
    }

    fn excluded(&self, canonical: &str, product: &Product) -> bool {
        let matcher = &self.rules.matcher;
        !matcher.is_sweets(canonical)
            && matcher
                .cross_category_blocklist
                .iter()
                .any(|marker| contains_phrase(&product.description, marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::CanonicalIngredient;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for name in ["almond milk", "milk", "flour", "greek yogurt", "sauce"] {
            store.insert_canonical(CanonicalIngredient::new(name)).unwrap();
        }
        store
    }

    fn classify(store: &MemoryStore, product: &Product) -> TagOutcome {
        let normalizer = Normalizer::builtin();
        let tagger = ProductTagger::new(store, &normalizer, RuleSet::builtin()).unwrap();
        tagger.classify(product).unwrap()
    }

    fn decision(outcome: TagOutcome) -> (String, Confidence, TagMethod) {
        match outcome {
            TagOutcome::Tagged(d) => (d.canonical, d.confidence, d.method),
            other => panic!("expected a tag, got {other:?}"),
        }
    }

    #[test]
    fn test_lead_segment_is_confident() {
        let store = store();
        let product = Product::new("p1", "Almond Milk, Unsweetened, 64 fl oz", "Silk");
        assert_eq!(
            decision(classify(&store, &product)),
            ("almond milk".to_string(), Confidence::Confident, TagMethod::LeadSegment)
        );
    }

    #[test]
    fn test_longest_contained_phrase_is_suggested() {
        let store = store();
        let product = Product::new("p2", "Organic Unsweetened Almond Milk Beverage", "Califia");
        assert_eq!(
            decision(classify(&store, &product)),
            ("almond milk".to_string(), Confidence::Suggested, TagMethod::ContainedPhrase)
        );
    }

    #[test]
    fn test_sweets_never_take_a_staple_tag() {
        let store = store();
        let product = Product::new("p3", "Milk Chocolate Candy with Flour", "Mars");
        assert_eq!(classify(&store, &product), TagOutcome::NoMatch);
    }

    #[test]
    fn test_generic_canonicals_are_not_contained_matches() {
        let store = store();
        let product = Product::new("p4", "Smoky Barbecue Sauce", "Stubbs");
        assert_eq!(classify(&store, &product), TagOutcome::NoMatch);
    }

    #[test]
    fn test_scored_tags_are_low_and_capped() {
        let store = store();
        for i in 0..3 {
            store
                .put_product(
                    Product::new(format!("t{i}"), "Greek Yogurt Strained Nonfat", "Fage")
                        .tagged("greek yogurt", Confidence::Confident),
                )
                .unwrap();
        }
        let mut rules = RuleSet::builtin().clone();
        rules.matcher.scoring.max_accepted_per_canonical = 1;
        let normalizer = Normalizer::builtin();
        let tagger = ProductTagger::new(&store, &normalizer, &rules).unwrap();

        let product = Product::new("p5", "Strained Nonfat Vanilla Cup", "Fage");
        assert_eq!(
            decision(tagger.classify(&product).unwrap()),
            ("greek yogurt".to_string(), Confidence::Low, TagMethod::Scored)
        );
        assert_eq!(
            tagger.classify(&product).unwrap(),
            TagOutcome::OverCap("greek yogurt".to_string())
        );
    }

    #[test]
    fn test_released_scored_tag_frees_its_slot() {
        let store = store();
        for i in 0..3 {
            store
                .put_product(
                    Product::new(format!("t{i}"), "Greek Yogurt Strained Nonfat", "Fage")
                        .tagged("greek yogurt", Confidence::Confident),
                )
                .unwrap();
        }
        let mut rules = RuleSet::builtin().clone();
        rules.matcher.scoring.max_accepted_per_canonical = 1;
        let normalizer = Normalizer::builtin();
        let tagger = ProductTagger::new(&store, &normalizer, &rules).unwrap();
        let product = Product::new("p5", "Strained Nonfat Vanilla Cup", "Fage");

        let TagOutcome::Tagged(first) = tagger.classify(&product).unwrap() else {
            panic!("expected a scored tag");
        };
        tagger.release(&first).unwrap();
        assert_eq!(
            decision(tagger.classify(&product).unwrap()),
            ("greek yogurt".to_string(), Confidence::Low, TagMethod::Scored)
        );
    }
}
