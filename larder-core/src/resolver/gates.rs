use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::rules::ResolverRules;
use crate::types::term_key;

/// True when `name` is too generic to accept as a derived resolution target.
pub fn is_generic(name: &str, rules: &ResolverRules) -> bool {
    let key = term_key(name);
    rules.generic_blocklist.iter().any(|g| term_key(g) == key)
}

/// Caps how many non-confident mappings one canonical may absorb in a run.
///
/// A canonical that suddenly attracts dozens of suggestions is usually a
/// matching bug ("sauce" swallowing every sauce), so the excess goes to review.
#[derive(Debug)]
pub struct AbsorptionGuard {
    cap: usize,
    counts: Mutex<HashMap<Uuid, usize>>,
}

impl AbsorptionGuard {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve one slot for `canonical_id`; false once the cap is reached.
    pub fn try_absorb(&self, canonical_id: Uuid) -> bool {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = counts.entry(canonical_id).or_insert(0);
        if *count >= self.cap {
            return false;
        }
        *count += 1;
        true
    }

    /// Give back a slot reserved for a write that did not happen.
    pub fn release(&self, canonical_id: Uuid) {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = counts.get_mut(&canonical_id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn absorbed(&self, canonical_id: Uuid) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&canonical_id)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_names_fold_case() {
        let rules = &crate::rules::RuleSet::builtin().resolver;
        assert!(is_generic("Stock", rules));
        assert!(is_generic("  sauce ", rules));
        assert!(!is_generic("chicken stock", rules));
    }

    #[test]
    fn test_guard_stops_at_cap() {
        let guard = AbsorptionGuard::new(2);
        let id = Uuid::new_v4();
        assert!(guard.try_absorb(id));
        assert!(guard.try_absorb(id));
        assert!(!guard.try_absorb(id));
        assert_eq!(guard.absorbed(id), 2);
        assert!(guard.try_absorb(Uuid::new_v4()));
    }

    #[test]
    fn test_released_slot_can_be_reused() {
        let guard = AbsorptionGuard::new(1);
        let id = Uuid::new_v4();
        assert!(guard.try_absorb(id));
        guard.release(id);
        assert_eq!(guard.absorbed(id), 0);
        assert!(guard.try_absorb(id));
        guard.release(Uuid::new_v4());
        assert_eq!(guard.absorbed(id), 1);
    }
}
