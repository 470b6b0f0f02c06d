//! One-shot read-path commands.

use anyhow::Result;
use larder_core::{AllergenKind, AllergenSet, Confidence, IngredientPipeline, ProductMatcher};

use crate::workspace::{print_json, Workspace};

pub fn normalize(workspace: &Workspace, text: &str) -> Result<()> {
    println!("{}", workspace.normalizer.normalize(text));
    Ok(())
}

pub fn resolve(
    workspace: &Workspace,
    text: &str,
    allergens: &[AllergenKind],
    confidence: Confidence,
) -> Result<()> {
    let user_allergens: AllergenSet = allergens.iter().copied().collect();
    let pipeline = IngredientPipeline::new(&workspace.store, &workspace.rules)
        .with_required_confidence(confidence);
    let resolution = pipeline.resolve_ingredient_mention(text, &user_allergens)?;
    print_json(&resolution)
}

pub fn match_products(
    workspace: &Workspace,
    canonical: &str,
    confidence: Confidence,
    avoid: &[AllergenKind],
) -> Result<()> {
    let avoid: AllergenSet = avoid.iter().copied().collect();
    let name = match workspace.find_canonical(canonical) {
        Ok(found) => found.name,
        // Matching works on plain names too; the catalog may be tag-only.
        Err(_) => canonical.to_string(),
    };
    let matches = ProductMatcher::new(&workspace.store, &workspace.rules.matcher)
        .match_products(&name, confidence, &avoid)?;
    print_json(&matches)
}
