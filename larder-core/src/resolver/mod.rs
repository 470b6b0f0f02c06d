//! Canonical resolution.
//!
//! A [`Resolver`] runs an ordered chain of named strategies over a normalized
//! name; the first strategy that produces a match wins. A strategy may also
//! reject the name outright (for example a multi-ingredient line), which ends
//! the chain as unresolved.
//!
//! Standard chains:
//! - [`Resolver::online`]: exact, mapping, pattern
//! - [`Resolver::batch`]: exact, mapping, pattern, fuzzy

mod gates;
mod strategies;

pub use gates::{is_generic, AbsorptionGuard};
pub use strategies::{
    ExactStrategy, FuzzyStrategy, MappingStrategy, PatternStrategy, ResolveStrategy,
    StrategyOutcome,
};

use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;
use crate::rules::ResolverRules;
use crate::store::CatalogStore;
use crate::types::{CanonicalIngredient, Confidence, NormalizedName};

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub canonical: CanonicalIngredient,
    pub confidence: Confidence,
    /// Name of the strategy that produced the match
    pub strategy: &'static str,
}

/// Why a name did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum UnresolvedReason {
    Empty,
    NoMatch,
    /// The text names several distinct known ingredients.
    MultiIngredient { candidates: Vec<String> },
    /// The only candidate is on the generic blocklist.
    GenericCandidate { candidate: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ResolveOutcome {
    Resolved(Resolution),
    Unresolved(UnresolvedReason),
}

impl ResolveOutcome {
    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            ResolveOutcome::Resolved(r) => Some(r),
            ResolveOutcome::Unresolved(_) => None,
        }
    }

    pub fn into_resolution(self) -> Option<Resolution> {
        match self {
            ResolveOutcome::Resolved(r) => Some(r),
            ResolveOutcome::Unresolved(_) => None,
        }
    }
}

/// Data a strategy may consult.
pub struct ResolveContext<'a> {
    pub store: &'a dyn CatalogStore,
    pub rules: &'a ResolverRules,
}

pub struct Resolver<'a> {
    store: &'a dyn CatalogStore,
    rules: &'a ResolverRules,
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        rules: &'a ResolverRules,
        strategies: Vec<Box<dyn ResolveStrategy>>,
    ) -> Self {
        Self {
            store,
            rules,
            strategies,
        }
    }

    /// Request-path chain: point lookups only.
    pub fn online(store: &'a dyn CatalogStore, rules: &'a ResolverRules) -> Self {
        Self::new(
            store,
            rules,
            vec![
                Box::new(ExactStrategy),
                Box::new(MappingStrategy),
                Box::new(PatternStrategy),
            ],
        )
    }

    /// Offline chain: adds the fuzzy scan over every canonical name.
    pub fn batch(store: &'a dyn CatalogStore, rules: &'a ResolverRules) -> Self {
        let mut resolver = Self::online(store, rules);
        resolver.strategies.push(Box::new(FuzzyStrategy));
        resolver
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn resolve(&self, name: &NormalizedName) -> Result<ResolveOutcome, StoreError> {
        if name.is_empty() {
            return Ok(ResolveOutcome::Unresolved(UnresolvedReason::Empty));
        }
        let ctx = ResolveContext {
            store: self.store,
            rules: self.rules,
        };
        for strategy in &self.strategies {
            match strategy.attempt(&ctx, name)? {
                StrategyOutcome::Match(resolution) => {
                    debug!(
                        name = %name,
                        canonical = %resolution.canonical.name,
                        confidence = %resolution.confidence,
                        strategy = resolution.strategy,
                        "resolved"
                    );
                    return Ok(ResolveOutcome::Resolved(resolution));
                }
                StrategyOutcome::Reject(reason) => {
                    debug!(name = %name, strategy = strategy.name(), ?reason, "rejected");
                    return Ok(ResolveOutcome::Unresolved(reason));
                }
                StrategyOutcome::Pass => {}
            }
        }
        Ok(ResolveOutcome::Unresolved(UnresolvedReason::NoMatch))
    }
}
