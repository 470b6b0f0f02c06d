//! Catalog and rule loading shared by every command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use larder_core::{CanonicalIngredient, CatalogStore, MemoryStore, Normalizer, RuleSet, StoreError};
use serde::Serialize;
use tracing::info;

pub struct Workspace {
    catalog_path: Option<PathBuf>,
    pub store: MemoryStore,
    pub rules: RuleSet,
    pub normalizer: Normalizer,
}

impl Workspace {
    /// Rules without a catalog, for commands that never touch the store.
    pub fn rules_only(rules_path: Option<&Path>) -> Result<Self> {
        let rules = load_rules(rules_path)?;
        Ok(Self {
            catalog_path: None,
            store: MemoryStore::new(),
            normalizer: Normalizer::new(&rules.normalizer),
            rules,
        })
    }

    pub fn open(catalog_path: &Path, rules_path: Option<&Path>) -> Result<Self> {
        let rules = load_rules(rules_path)?;
        let store = if catalog_path.exists() {
            MemoryStore::load(catalog_path)
                .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?
        } else {
            info!(path = %catalog_path.display(), "Catalog not found; starting empty");
            MemoryStore::new()
        };
        Ok(Self {
            catalog_path: Some(catalog_path.to_path_buf()),
            store,
            normalizer: Normalizer::new(&rules.normalizer),
            rules,
        })
    }

    /// Persist the catalog snapshot. Used as the batch commit hook.
    pub fn save(&self) -> Result<(), StoreError> {
        match &self.catalog_path {
            Some(path) => self.store.save(path),
            None => Ok(()),
        }
    }

    /// Find a canonical by name or alias, normalizing the query first.
    pub fn find_canonical(&self, name: &str) -> Result<CanonicalIngredient> {
        let normalized = self.normalizer.normalize(name);
        self.store
            .canonical_by_term(normalized.as_str())?
            .with_context(|| format!("No canonical ingredient named {:?}", name))
    }
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(path) => RuleSet::from_path(path)
            .with_context(|| format!("Failed to load rules from {}", path.display())),
        None => Ok(RuleSet::builtin().clone()),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a report and optionally write it to `path`.
pub fn emit_report<T: Serialize>(report: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    if let Some(path) = path {
        fs::write(path, &json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote report");
    }
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::AllergenSet;
    use larder_core::Curator;

    #[test]
    fn test_missing_catalog_starts_empty_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let workspace = Workspace::open(&path, None).unwrap();
        assert!(workspace.store.canonicals().unwrap().is_empty());
        Curator::new(&workspace.store, &workspace.normalizer)
            .create_canonical("Peanut Butter", &[], &AllergenSet::new())
            .unwrap();
        workspace.save().unwrap();

        let reopened = Workspace::open(&path, None).unwrap();
        let found = reopened.find_canonical("2 tbsp peanut butter").unwrap();
        assert_eq!(found.name, "peanut butter");
        assert!(reopened.find_canonical("tahini").is_err());
    }

    #[test]
    fn test_report_is_written_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        emit_report(&serde_json::json!({ "processed": 3 }), Some(&path)).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["processed"], 3);
    }
}
