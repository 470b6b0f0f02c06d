//! Effective allergen computation.
//!
//! A canonical's effective allergens are its directly asserted tags plus every
//! derivative rule whose term equals its name or one of its aliases. The
//! closure is one level deep: a derivative never chains through another
//! derivative.

use tracing::debug;
use uuid::Uuid;

use crate::error::{PipelineError, StoreError};
use crate::store::CatalogStore;
use crate::text::contains_phrase;
use crate::types::{AllergenSet, CanonicalIngredient, Product};

pub struct AllergenExpander<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> AllergenExpander<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    pub fn effective_allergens(&self, canonical_id: Uuid) -> Result<AllergenSet, PipelineError> {
        let canonical = self
            .store
            .canonical(canonical_id)?
            .ok_or(PipelineError::UnknownCanonical(canonical_id))?;
        Ok(self.effective_allergens_of(&canonical)?)
    }

    pub fn effective_allergens_of(
        &self,
        canonical: &CanonicalIngredient,
    ) -> Result<AllergenSet, StoreError> {
        let mut allergens = canonical.allergen_tags.clone();
        for term in canonical.terms() {
            for derivative in self.store.derivatives_for_term(term)? {
                allergens.insert(derivative.allergen);
            }
        }
        debug!(canonical = %canonical.name, ?allergens, "effective allergens");
        Ok(allergens)
    }

    /// Allergens a catalog product carries: the effective set of the canonical
    /// it is tagged with, plus any derivative term named in its description.
    pub fn product_allergens(&self, product: &Product) -> Result<AllergenSet, StoreError> {
        let mut allergens = AllergenSet::new();
        if let Some(tag) = product.canonical_tag.as_deref() {
            if let Some(canonical) = self.store.canonical_by_term(tag)? {
                allergens.extend(self.effective_allergens_of(&canonical)?);
            }
        }
        for derivative in self.store.derivatives()? {
            if contains_phrase(&product.description, &derivative.derivative_term) {
                allergens.insert(derivative.allergen);
            }
        }
        Ok(allergens)
    }
}
