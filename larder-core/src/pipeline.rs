//! Online read path: one raw recipe line in, everything a recipe view needs out.
//!
//! Side-effect-free. Uses the online resolver chain (point lookups only) and
//! never writes to the store.

use serde::Serialize;
use tracing::{debug, info_span};

use crate::allergens::AllergenExpander;
use crate::error::PipelineError;
use crate::matcher::{MatchQuality, ProductMatcher, ProductMatches};
use crate::normalizer::Normalizer;
use crate::resolver::{ResolveOutcome, Resolver, UnresolvedReason};
use crate::rules::RuleSet;
use crate::store::CatalogStore;
use crate::substitution::{ExcludedSubstitute, Substitute, SubstitutionResolver};
use crate::types::{AllergenSet, CanonicalIngredient, Confidence, NormalizedName, Product};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstituteOption {
    #[serde(flatten)]
    pub substitute: Substitute,
    pub products: Vec<Product>,
    pub match_quality: MatchQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentionResolution {
    pub raw: String,
    pub normalized: NormalizedName,
    pub canonical: Option<CanonicalIngredient>,
    pub confidence: Option<Confidence>,
    pub strategy: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<UnresolvedReason>,
    pub allergens: AllergenSet,
    /// The canonical carries at least one of the user's allergens.
    pub flagged: bool,
    pub substitutes: Vec<SubstituteOption>,
    /// Configured substitutes withheld from the user, with the reason.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub withheld_substitutes: Vec<ExcludedSubstitute>,
    pub products: Vec<Product>,
    pub match_quality: MatchQuality,
}

impl MentionResolution {
    fn unresolved(raw: &str, normalized: NormalizedName, reason: UnresolvedReason) -> Self {
        Self {
            raw: raw.to_string(),
            normalized,
            canonical: None,
            confidence: None,
            strategy: None,
            unresolved: Some(reason),
            allergens: AllergenSet::new(),
            flagged: false,
            substitutes: Vec::new(),
            withheld_substitutes: Vec::new(),
            products: Vec::new(),
            match_quality: MatchQuality::Empty,
        }
    }
}

pub struct IngredientPipeline<'a> {
    store: &'a dyn CatalogStore,
    rules: &'a RuleSet,
    normalizer: Normalizer,
    /// Lowest product tag tier shown on the read path.
    required_confidence: Confidence,
}

impl<'a> IngredientPipeline<'a> {
    pub fn new(store: &'a dyn CatalogStore, rules: &'a RuleSet) -> Self {
        Self {
            store,
            rules,
            normalizer: Normalizer::new(&rules.normalizer),
            required_confidence: Confidence::Suggested,
        }
    }

    pub fn with_required_confidence(mut self, required: Confidence) -> Self {
        self.required_confidence = required;
        self
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn resolve_ingredient_mention(
        &self,
        raw: &str,
        user_allergens: &AllergenSet,
    ) -> Result<MentionResolution, PipelineError> {
        let _span = info_span!("resolve_mention").entered();
        let normalized = self.normalizer.normalize(raw);

        let resolver = Resolver::online(self.store, &self.rules.resolver);
        let resolution = match resolver.resolve(&normalized)? {
            ResolveOutcome::Resolved(resolution) => resolution,
            ResolveOutcome::Unresolved(reason) => {
                debug!(raw, normalized = %normalized, ?reason, "unresolved mention");
                return Ok(MentionResolution::unresolved(raw, normalized, reason));
            }
        };
        let canonical = resolution.canonical;

        let allergens = AllergenExpander::new(self.store).effective_allergens_of(&canonical)?;
        let flagged = !allergens.is_disjoint(user_allergens);

        let matcher = ProductMatcher::new(self.store, &self.rules.matcher);
        let mut substitutes = Vec::new();
        let mut withheld_substitutes = Vec::new();
        if flagged {
            let lookup = SubstitutionResolver::new(self.store, &self.normalizer, self.rules)
                .lookup(canonical.id, user_allergens)?;
            for substitute in lookup.substitutes {
                let ProductMatches { products, quality } = matcher.match_products(
                    &substitute.canonical.name,
                    self.required_confidence,
                    user_allergens,
                )?;
                substitutes.push(SubstituteOption {
                    substitute,
                    products,
                    match_quality: quality,
                });
            }
            withheld_substitutes = lookup.excluded;
        }

        let ProductMatches { products, quality } =
            matcher.match_products(&canonical.name, self.required_confidence, user_allergens)?;

        Ok(MentionResolution {
            raw: raw.to_string(),
            normalized,
            canonical: Some(canonical),
            confidence: Some(resolution.confidence),
            strategy: Some(resolution.strategy),
            unresolved: None,
            allergens,
            flagged,
            substitutes,
            withheld_substitutes,
            products,
            match_quality: quality,
        })
    }
}
