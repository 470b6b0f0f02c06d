//! Storage abstraction over the canonical, mapping, derivative, substitution
//! and product tables.
//!
//! The pipeline never talks to a database directly; the serving layer and
//! the CLI hand it something implementing [`CatalogStore`].

mod memory;

pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    AllergenDerivative, CanonicalIngredient, Confidence, Mapping, NormalizedName, Product,
    Substitution, UpsertOutcome,
};

/// Keyed read/write access to the catalog tables.
///
/// Methods take `&self` so one store can be shared across batch workers;
/// implementations provide their own interior locking. Conditional writes
/// (`upsert_mapping`, `upsert_product_tag`) must be atomic per key.
pub trait CatalogStore: Send + Sync {
    fn canonical(&self, id: Uuid) -> Result<Option<CanonicalIngredient>, StoreError>;

    /// Look up a canonical whose name or alias equals `term` after case and
    /// whitespace folding.
    fn canonical_by_term(&self, term: &str) -> Result<Option<CanonicalIngredient>, StoreError>;

    fn canonicals(&self) -> Result<Vec<CanonicalIngredient>, StoreError>;

    /// Insert a new canonical. Fails if its name or any alias is already taken.
    fn insert_canonical(&self, canonical: CanonicalIngredient) -> Result<(), StoreError>;

    /// Attach an alias to an existing canonical. Fails if the alias is taken.
    fn add_alias(&self, id: Uuid, alias: &str) -> Result<(), StoreError>;

    fn mapping(&self, normalized: &NormalizedName) -> Result<Option<Mapping>, StoreError>;

    /// Insert-if-absent keyed by normalized name; a higher tier replaces a lower one.
    fn upsert_mapping(&self, mapping: Mapping) -> Result<UpsertOutcome, StoreError>;

    fn derivatives(&self) -> Result<Vec<AllergenDerivative>, StoreError>;

    fn derivatives_for_term(&self, term: &str) -> Result<Vec<AllergenDerivative>, StoreError>;

    fn add_derivative(&self, derivative: AllergenDerivative) -> Result<(), StoreError>;

    fn substitutions(&self) -> Result<Vec<Substitution>, StoreError>;

    /// Substitution rows for one canonical, in insertion order.
    fn substitutions_for(&self, canonical_id: Uuid) -> Result<Vec<Substitution>, StoreError>;

    fn add_substitution(&self, substitution: Substitution) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    fn remove_substitution(
        &self,
        canonical_id: Uuid,
        substitute_name: &str,
    ) -> Result<bool, StoreError>;

    fn product(&self, id: &str) -> Result<Option<Product>, StoreError>;

    /// Products whose description contains `term` (case-insensitive substring).
    fn products_containing(&self, term: &str) -> Result<Vec<Product>, StoreError>;

    /// A page of products in stable id order.
    fn products(&self, offset: usize, limit: usize) -> Result<Vec<Product>, StoreError>;

    fn product_count(&self) -> Result<usize, StoreError>;

    /// Ingest or replace a catalog row wholesale (feed import, curation).
    fn put_product(&self, product: Product) -> Result<(), StoreError>;

    /// Conditional tag write; a higher tier replaces a lower one, never the reverse.
    fn upsert_product_tag(
        &self,
        product_id: &str,
        canonical_tag: &str,
        confidence: Confidence,
    ) -> Result<UpsertOutcome, StoreError>;
}

/// Serializable image of every table, used for JSON catalog files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub canonicals: Vec<CanonicalIngredient>,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub derivatives: Vec<AllergenDerivative>,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    #[serde(default)]
    pub products: Vec<Product>,
}
