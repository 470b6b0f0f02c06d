//! Allergen-triggered substitute lookup and the substitution table audit.
//!
//! Every configured substitute name is re-resolved to a canonical and its own
//! effective allergens are checked before it is offered. A substitute that
//! carries an allergen the user avoids is never returned; one that carries the
//! very allergen that triggered the lookup is a data defect and is logged and
//! reported for curator review.

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::allergens::AllergenExpander;
use crate::error::{PipelineError, StoreError};
use crate::normalizer::Normalizer;
use crate::resolver::Resolver;
use crate::rules::RuleSet;
use crate::store::CatalogStore;
use crate::types::{AllergenSet, CanonicalIngredient, Confidence, Substitution};

/// A substitute that passed the safety checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Substitute {
    pub canonical: CanonicalIngredient,
    pub allergens: AllergenSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Shares an allergen with the ingredient it replaces.
    SafetyViolation,
    /// Safe for the triggering allergen but carries another one the user avoids.
    ConflictsWithUser,
    /// The substitute name does not resolve to a canonical ingredient.
    Unresolvable,
    /// Resolves back to the original ingredient.
    SelfReference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedSubstitute {
    pub substitute_name: String,
    pub reason: ExclusionReason,
    pub shared_allergens: AllergenSet,
}

/// Full result of one lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubstituteLookup {
    /// Allergens of the original that the user avoids; empty means no lookup ran.
    pub triggered_by: AllergenSet,
    pub substitutes: Vec<Substitute>,
    pub excluded: Vec<ExcludedSubstitute>,
}

impl SubstituteLookup {
    /// True when some configured row should go to curator review.
    pub fn needs_review(&self) -> bool {
        self.excluded
            .iter()
            .any(|e| e.reason == ExclusionReason::SafetyViolation)
    }
}

pub struct SubstitutionResolver<'a> {
    store: &'a dyn CatalogStore,
    normalizer: &'a Normalizer,
    resolver: Resolver<'a>,
    expander: AllergenExpander<'a>,
}

impl<'a> SubstitutionResolver<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        normalizer: &'a Normalizer,
        rules: &'a RuleSet,
    ) -> Self {
        Self {
            store,
            normalizer,
            resolver: Resolver::online(store, &rules.resolver),
            expander: AllergenExpander::new(store),
        }
    }

    /// Safe substitutes for `canonical_id`, in configured order. Empty when the
    /// ingredient carries none of `user_allergens`.
    pub fn substitutes_for(
        &self,
        canonical_id: Uuid,
        user_allergens: &AllergenSet,
    ) -> Result<Vec<Substitute>, PipelineError> {
        Ok(self.lookup(canonical_id, user_allergens)?.substitutes)
    }

    pub fn lookup(
        &self,
        canonical_id: Uuid,
        user_allergens: &AllergenSet,
    ) -> Result<SubstituteLookup, PipelineError> {
        let original = self
            .store
            .canonical(canonical_id)?
            .ok_or(PipelineError::UnknownCanonical(canonical_id))?;
        let original_allergens = self.expander.effective_allergens_of(&original)?;
        let triggered_by: AllergenSet = original_allergens
            .intersection(user_allergens)
            .copied()
            .collect();
        if triggered_by.is_empty() {
            return Ok(SubstituteLookup::default());
        }

        let mut lookup = SubstituteLookup {
            triggered_by,
            ..Default::default()
        };
        for row in self.store.substitutions_for(canonical_id)? {
            match self.check(&original, &lookup.triggered_by, user_allergens, &row)? {
                Ok(substitute) => {
                    if lookup
                        .substitutes
                        .iter()
                        .all(|s| s.canonical.id != substitute.canonical.id)
                    {
                        lookup.substitutes.push(substitute);
                    }
                }
                Err(excluded) => {
                    if excluded.reason == ExclusionReason::SafetyViolation {
                        warn!(
                            ingredient = %original.name,
                            substitute = %excluded.substitute_name,
                            shared = ?excluded.shared_allergens,
                            "Excluded unsafe substitute"
                        );
                    } else {
                        debug!(
                            ingredient = %original.name,
                            substitute = %excluded.substitute_name,
                            reason = ?excluded.reason,
                            "Excluded substitute"
                        );
                    }
                    lookup.excluded.push(excluded);
                }
            }
        }
        Ok(lookup)
    }

    /// Resolve a substitute name to a canonical. Low-confidence resolutions
    /// are not trusted for safety decisions.
    pub fn resolve_substitute(
        &self,
        name: &str,
    ) -> Result<Option<CanonicalIngredient>, StoreError> {
        let normalized = self.normalizer.normalize(name);
        Ok(self
            .resolver
            .resolve(&normalized)?
            .into_resolution()
            .filter(|r| r.confidence >= Confidence::Suggested)
            .map(|r| r.canonical))
    }

    fn check(
        &self,
        original: &CanonicalIngredient,
        triggered_by: &AllergenSet,
        user_allergens: &AllergenSet,
        row: &Substitution,
    ) -> Result<Result<Substitute, ExcludedSubstitute>, StoreError> {
        let excluded = |reason, shared_allergens| ExcludedSubstitute {
            substitute_name: row.substitute_name.clone(),
            reason,
            shared_allergens,
        };

        let Some(canonical) = self.resolve_substitute(&row.substitute_name)? else {
            return Ok(Err(excluded(ExclusionReason::Unresolvable, AllergenSet::new())));
        };
        if canonical.id == original.id {
            return Ok(Err(excluded(ExclusionReason::SelfReference, AllergenSet::new())));
        }

        let allergens = self.expander.effective_allergens_of(&canonical)?;
        let shared: AllergenSet = allergens.intersection(triggered_by).copied().collect();
        if !shared.is_empty() {
            return Ok(Err(excluded(ExclusionReason::SafetyViolation, shared)));
        }
        let conflicts: AllergenSet = allergens.intersection(user_allergens).copied().collect();
        if !conflicts.is_empty() {
            return Ok(Err(excluded(ExclusionReason::ConflictsWithUser, conflicts)));
        }

        Ok(Ok(Substitute {
            canonical,
            allergens,
            notes: row.notes.clone(),
        }))
    }
}

/// One questionable substitution row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFinding {
    pub canonical: String,
    pub substitute_name: String,
    pub shared_allergens: AllergenSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubstitutionAudit {
    pub checked: usize,
    /// Rows whose substitute shares an allergen with the original.
    pub unsafe_rows: Vec<AuditFinding>,
    pub unresolved: Vec<AuditFinding>,
    /// Rows removed because the substitute carries every allergen of the original.
    pub quarantined: Vec<AuditFinding>,
}

/// Scan every substitution row for allergen-safety defects.
///
/// With `quarantine` set, rows that can never be served (the substitute
/// carries every allergen of the original) are deleted from the store.
pub fn audit_substitutions(
    store: &dyn CatalogStore,
    normalizer: &Normalizer,
    rules: &RuleSet,
    quarantine: bool,
) -> Result<SubstitutionAudit, StoreError> {
    let subs = SubstitutionResolver::new(store, normalizer, rules);
    let mut audit = SubstitutionAudit::default();

    for row in store.substitutions()? {
        audit.checked += 1;
        let Some(original) = store.canonical(row.canonical_id)? else {
            continue;
        };
        let finding = |shared_allergens| AuditFinding {
            canonical: original.name.clone(),
            substitute_name: row.substitute_name.clone(),
            shared_allergens,
        };

        let Some(substitute) = subs.resolve_substitute(&row.substitute_name)? else {
            audit.unresolved.push(finding(AllergenSet::new()));
            continue;
        };
        let original_allergens = subs.expander.effective_allergens_of(&original)?;
        let substitute_allergens = subs.expander.effective_allergens_of(&substitute)?;
        let shared: AllergenSet = original_allergens
            .intersection(&substitute_allergens)
            .copied()
            .collect();
        if shared.is_empty() {
            continue;
        }

        let unservable = shared == original_allergens;
        if quarantine && unservable {
            store.remove_substitution(row.canonical_id, &row.substitute_name)?;
            warn!(
                ingredient = %original.name,
                substitute = %row.substitute_name,
                "Quarantined substitution row"
            );
            audit.quarantined.push(finding(shared));
        } else {
            audit.unsafe_rows.push(finding(shared));
        }
    }

    info!(
        checked = audit.checked,
        unsafe_rows = audit.unsafe_rows.len(),
        unresolved = audit.unresolved.len(),
        quarantined = audit.quarantined.len(),
        "Substitution audit complete"
    );
    Ok(audit)
}
