pub mod allergens;
pub mod batch;
pub mod curation;
pub mod error;
pub mod matcher;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod rules;
pub mod store;
pub mod substitution;
pub mod text;
pub mod types;

pub use allergens::AllergenExpander;
pub use batch::{BatchConfig, BatchOrchestrator, FlagReason, RunKind, RunReport};
pub use curation::Curator;
pub use error::{CurationError, PipelineError, RulesError, StoreError};
pub use matcher::{MatchQuality, ProductMatcher, ProductMatches, ProductTagger};
pub use normalizer::{normalize, Normalizer};
pub use pipeline::{IngredientPipeline, MentionResolution, SubstituteOption};
pub use resolver::{Resolution, ResolveOutcome, Resolver, UnresolvedReason};
pub use rules::RuleSet;
pub use store::{CatalogStore, MemoryStore, Snapshot};
pub use substitution::{audit_substitutions, Substitute, SubstitutionAudit, SubstitutionResolver};
pub use types::{
    AllergenDerivative, AllergenKind, AllergenSet, CanonicalIngredient, Confidence, Mapping,
    NormalizedName, Product, Substitution, UpsertOutcome,
};
