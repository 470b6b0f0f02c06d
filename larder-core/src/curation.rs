//! Explicit curation actions.
//!
//! Canonical names and aliases are stored in normalized form so every
//! canonical resolves to itself at `confident`, and a name that differs from
//! an existing one only by case or spacing is refused.

use tracing::info;
use uuid::Uuid;

use crate::error::{CurationError, StoreError};
use crate::normalizer::Normalizer;
use crate::store::CatalogStore;
use crate::types::{
    AllergenDerivative, AllergenKind, AllergenSet, CanonicalIngredient, Confidence,
    NormalizedName, Substitution, UpsertOutcome,
};

pub struct Curator<'a> {
    store: &'a dyn CatalogStore,
    normalizer: &'a Normalizer,
}

impl<'a> Curator<'a> {
    pub fn new(store: &'a dyn CatalogStore, normalizer: &'a Normalizer) -> Self {
        Self { store, normalizer }
    }

    pub fn create_canonical(
        &self,
        name: &str,
        aliases: &[String],
        allergens: &AllergenSet,
    ) -> Result<CanonicalIngredient, CurationError> {
        let normalized = self.normalized_term(name)?;
        let mut canonical = CanonicalIngredient::new(normalized.as_str());
        canonical.allergen_tags = allergens.clone();
        for alias in aliases {
            let alias = self.normalized_term(alias)?;
            if alias != normalized {
                canonical.aliases.insert(alias.into_string());
            }
        }
        for term in canonical.terms() {
            self.ensure_unused(term)?;
        }

        self.store.insert_canonical(canonical.clone())?;
        info!(name = %canonical.name, id = %canonical.id, "Created canonical ingredient");
        Ok(canonical)
    }

    pub fn add_alias(&self, canonical_id: Uuid, alias: &str) -> Result<(), CurationError> {
        let canonical = self
            .store
            .canonical(canonical_id)?
            .ok_or(CurationError::UnknownCanonical(canonical_id))?;
        let alias = self.normalized_term(alias)?;
        if canonical.terms().any(|t| t == alias.as_str()) {
            return Ok(());
        }
        self.ensure_unused(alias.as_str())?;
        self.store.add_alias(canonical_id, alias.as_str())?;
        info!(name = %canonical.name, alias = %alias, "Added alias");
        Ok(())
    }

    pub fn add_substitution(
        &self,
        canonical_id: Uuid,
        substitute_name: &str,
        notes: Option<String>,
    ) -> Result<(), CurationError> {
        if self.store.canonical(canonical_id)?.is_none() {
            return Err(CurationError::UnknownCanonical(canonical_id));
        }
        let substitute_name = self.normalized_term(substitute_name)?;
        self.store.add_substitution(Substitution {
            canonical_id,
            substitute_name: substitute_name.into_string(),
            notes,
        })?;
        Ok(())
    }

    pub fn add_derivative(&self, allergen: AllergenKind, term: &str) -> Result<(), CurationError> {
        let term = self.normalized_term(term)?;
        self.store
            .add_derivative(AllergenDerivative::new(allergen, term.into_string()))?;
        Ok(())
    }

    /// Tag a product by hand. Without `force` the usual tier ordering applies;
    /// with it the tag is written unconditionally (curator corrections).
    pub fn tag_product(
        &self,
        product_id: &str,
        canonical_name: &str,
        confidence: Confidence,
        force: bool,
    ) -> Result<UpsertOutcome, CurationError> {
        let canonical = self
            .store
            .canonical_by_term(canonical_name)?
            .ok_or_else(|| CurationError::UnknownTerm(canonical_name.to_string()))?;
        if !force {
            return Ok(self
                .store
                .upsert_product_tag(product_id, &canonical.name, confidence)?);
        }

        let mut product = self
            .store
            .product(product_id)?
            .ok_or_else(|| StoreError::MissingProduct(product_id.to_string()))?;
        let outcome = if product.canonical_tag.is_some() {
            UpsertOutcome::Upgraded
        } else {
            UpsertOutcome::Inserted
        };
        product.canonical_tag = Some(canonical.name.clone());
        product.canonical_tag_confidence = Some(confidence);
        self.store.put_product(product)?;
        info!(product = product_id, canonical = %canonical.name, %confidence, "Forced product tag");
        Ok(outcome)
    }

    fn normalized_term(&self, raw: &str) -> Result<NormalizedName, CurationError> {
        let normalized = self.normalizer.normalize(raw);
        if normalized.is_empty() {
            return Err(CurationError::EmptyName(raw.to_string()));
        }
        Ok(normalized)
    }

    fn ensure_unused(&self, term: &str) -> Result<(), CurationError> {
        match self.store.canonical_by_term(term)? {
            Some(existing) => Err(CurationError::Duplicate {
                term: term.to_string(),
                existing: existing.name,
            }),
            None => Ok(()),
        }
    }
}
