//! In-memory catalog store with JSON snapshot persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use super::{CatalogStore, Snapshot};
use crate::error::StoreError;
use crate::types::{
    term_key, AllergenDerivative, CanonicalIngredient, Confidence, Mapping, NormalizedName,
    Product, Substitution, UpsertOutcome,
};

#[derive(Default)]
struct Tables {
    canonicals: HashMap<Uuid, CanonicalIngredient>,
    /// Folded name/alias -> canonical id
    terms: HashMap<String, Uuid>,
    mappings: HashMap<NormalizedName, Mapping>,
    derivatives: Vec<AllergenDerivative>,
    substitutions: Vec<Substitution>,
    /// Ordered by id so paging is stable
    products: BTreeMap<String, Product>,
}

impl Tables {
    fn claim_terms(&mut self, canonical: &CanonicalIngredient) -> Result<(), StoreError> {
        for term in canonical.terms() {
            let key = term_key(term);
            if let Some(owner) = self.terms.get(&key) {
                if *owner != canonical.id {
                    return Err(StoreError::DuplicateCanonical(term.to_string()));
                }
            }
        }
        for term in canonical.terms() {
            self.terms.insert(term_key(term), canonical.id);
        }
        Ok(())
    }
}

/// Thread-safe store backed by hash maps behind a `RwLock`.
///
/// Used by tests, the CLI (via JSON snapshots) and as the reference
/// implementation of the conditional-write rules.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, validating uniqueness and mapping targets.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, StoreError> {
        let store = Self::new();
        {
            let mut tables = store.write()?;
            for canonical in snapshot.canonicals {
                tables.claim_terms(&canonical)?;
                tables.canonicals.insert(canonical.id, canonical);
            }
            for mapping in snapshot.mappings {
                if !tables.canonicals.contains_key(&mapping.canonical_id) {
                    return Err(StoreError::MissingCanonical(mapping.canonical_id));
                }
                tables.mappings.insert(mapping.normalized_name.clone(), mapping);
            }
            tables.derivatives = snapshot.derivatives;
            tables.derivatives.sort();
            tables.derivatives.dedup();
            tables.substitutions = snapshot.substitutions;
            tables.products = snapshot
                .products
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect();
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Self::from_snapshot(snapshot)
    }

    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let tables = self.read()?;
        let mut canonicals: Vec<_> = tables.canonicals.values().cloned().collect();
        canonicals.sort_by(|a, b| a.name.cmp(&b.name));
        let mut mappings: Vec<_> = tables.mappings.values().cloned().collect();
        mappings.sort_by(|a, b| a.normalized_name.cmp(&b.normalized_name));
        Ok(Snapshot {
            canonicals,
            mappings,
            derivatives: tables.derivatives.clone(),
            substitutions: tables.substitutions.clone(),
            products: tables.products.values().cloned().collect(),
        })
    }

    /// Write the snapshot atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.snapshot()?)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

impl CatalogStore for MemoryStore {
    fn canonical(&self, id: Uuid) -> Result<Option<CanonicalIngredient>, StoreError> {
        Ok(self.read()?.canonicals.get(&id).cloned())
    }

    fn canonical_by_term(&self, term: &str) -> Result<Option<CanonicalIngredient>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .terms
            .get(&term_key(term))
            .and_then(|id| tables.canonicals.get(id))
            .cloned())
    }

    fn canonicals(&self) -> Result<Vec<CanonicalIngredient>, StoreError> {
        let mut all: Vec<_> = self.read()?.canonicals.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn insert_canonical(&self, canonical: CanonicalIngredient) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.canonicals.contains_key(&canonical.id) {
            return Err(StoreError::DuplicateCanonical(canonical.name));
        }
        tables.claim_terms(&canonical)?;
        tables.canonicals.insert(canonical.id, canonical);
        Ok(())
    }

    fn add_alias(&self, id: Uuid, alias: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let key = term_key(alias);
        match tables.terms.get(&key) {
            Some(owner) if *owner == id => return Ok(()),
            Some(_) => return Err(StoreError::DuplicateCanonical(alias.to_string())),
            None => {}
        }
        let canonical = tables
            .canonicals
            .get_mut(&id)
            .ok_or(StoreError::MissingCanonical(id))?;
        canonical.aliases.insert(alias.to_string());
        tables.terms.insert(key, id);
        Ok(())
    }

    fn mapping(&self, normalized: &NormalizedName) -> Result<Option<Mapping>, StoreError> {
        Ok(self.read()?.mappings.get(normalized).cloned())
    }

    fn upsert_mapping(&self, mapping: Mapping) -> Result<UpsertOutcome, StoreError> {
        let mut tables = self.write()?;
        if !tables.canonicals.contains_key(&mapping.canonical_id) {
            return Err(StoreError::MissingCanonical(mapping.canonical_id));
        }
        let existing = tables
            .mappings
            .get(&mapping.normalized_name)
            .map(|m| m.confidence);
        let outcome = UpsertOutcome::decide(existing, mapping.confidence);
        if outcome.wrote() {
            tables
                .mappings
                .insert(mapping.normalized_name.clone(), mapping);
        }
        Ok(outcome)
    }

    fn derivatives(&self) -> Result<Vec<AllergenDerivative>, StoreError> {
        Ok(self.read()?.derivatives.clone())
    }

    fn derivatives_for_term(&self, term: &str) -> Result<Vec<AllergenDerivative>, StoreError> {
        let key = term_key(term);
        Ok(self
            .read()?
            .derivatives
            .iter()
            .filter(|d| term_key(&d.derivative_term) == key)
            .cloned()
            .collect())
    }

    fn add_derivative(&self, derivative: AllergenDerivative) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.derivatives.contains(&derivative) {
            tables.derivatives.push(derivative);
            tables.derivatives.sort();
        }
        Ok(())
    }

    fn substitutions(&self) -> Result<Vec<Substitution>, StoreError> {
        Ok(self.read()?.substitutions.clone())
    }

    fn substitutions_for(&self, canonical_id: Uuid) -> Result<Vec<Substitution>, StoreError> {
        Ok(self
            .read()?
            .substitutions
            .iter()
            .filter(|s| s.canonical_id == canonical_id)
            .cloned()
            .collect())
    }

    fn add_substitution(&self, substitution: Substitution) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.canonicals.contains_key(&substitution.canonical_id) {
            return Err(StoreError::MissingCanonical(substitution.canonical_id));
        }
        let exists = tables.substitutions.iter().any(|s| {
            s.canonical_id == substitution.canonical_id
                && term_key(&s.substitute_name) == term_key(&substitution.substitute_name)
        });
        if !exists {
            tables.substitutions.push(substitution);
        }
        Ok(())
    }

    fn remove_substitution(
        &self,
        canonical_id: Uuid,
        substitute_name: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let key = term_key(substitute_name);
        let before = tables.substitutions.len();
        tables
            .substitutions
            .retain(|s| !(s.canonical_id == canonical_id && term_key(&s.substitute_name) == key));
        Ok(tables.substitutions.len() != before)
    }

    fn product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(id).cloned())
    }

    fn products_containing(&self, term: &str) -> Result<Vec<Product>, StoreError> {
        let needle = term.to_lowercase();
        Ok(self
            .read()?
            .products
            .values()
            .filter(|p| p.description.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    fn products(&self, offset: usize, limit: usize) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .read()?
            .products
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn product_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.products.len())
    }

    fn put_product(&self, product: Product) -> Result<(), StoreError> {
        self.write()?.products.insert(product.id.clone(), product);
        Ok(())
    }

    fn upsert_product_tag(
        &self,
        product_id: &str,
        canonical_tag: &str,
        confidence: Confidence,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut tables = self.write()?;
        let product = tables
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::MissingProduct(product_id.to_string()))?;
        let existing = product
            .canonical_tag
            .as_ref()
            .and(product.canonical_tag_confidence);
        let outcome = UpsertOutcome::decide(existing, confidence);
        if outcome.wrote() {
            product.canonical_tag = Some(canonical_tag.to_string());
            product.canonical_tag_confidence = Some(confidence);
        }
        Ok(outcome)
    }
}
