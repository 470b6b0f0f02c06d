//! Curation commands. Each one writes the catalog snapshot on success.

use anyhow::Result;
use larder_core::{AllergenKind, AllergenSet, Confidence, Curator};
use tracing::info;

use crate::workspace::{print_json, Workspace};

pub fn add_canonical(
    workspace: &Workspace,
    name: &str,
    aliases: &[String],
    allergens: &[AllergenKind],
) -> Result<()> {
    let allergens: AllergenSet = allergens.iter().copied().collect();
    let canonical = Curator::new(&workspace.store, &workspace.normalizer)
        .create_canonical(name, aliases, &allergens)?;
    workspace.save()?;
    print_json(&canonical)
}

pub fn add_alias(workspace: &Workspace, canonical: &str, alias: &str) -> Result<()> {
    let target = workspace.find_canonical(canonical)?;
    Curator::new(&workspace.store, &workspace.normalizer).add_alias(target.id, alias)?;
    workspace.save()?;
    println!("{} -> {}", alias, target.name);
    Ok(())
}

pub fn add_substitution(
    workspace: &Workspace,
    canonical: &str,
    substitute: &str,
    notes: Option<String>,
) -> Result<()> {
    let target = workspace.find_canonical(canonical)?;
    Curator::new(&workspace.store, &workspace.normalizer)
        .add_substitution(target.id, substitute, notes)?;
    workspace.save()?;
    info!(ingredient = %target.name, substitute, "Added substitution");
    Ok(())
}

pub fn add_derivative(workspace: &Workspace, allergen: AllergenKind, term: &str) -> Result<()> {
    Curator::new(&workspace.store, &workspace.normalizer).add_derivative(allergen, term)?;
    workspace.save()?;
    info!(%allergen, term, "Added allergen derivative");
    Ok(())
}

pub fn tag_product(
    workspace: &Workspace,
    product_id: &str,
    canonical: &str,
    confidence: Confidence,
    force: bool,
) -> Result<()> {
    let target = workspace.find_canonical(canonical)?;
    let outcome = Curator::new(&workspace.store, &workspace.normalizer).tag_product(
        product_id,
        &target.name,
        confidence,
        force,
    )?;
    if outcome.wrote() {
        workspace.save()?;
    }
    print_json(&outcome)
}
