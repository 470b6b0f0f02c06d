//! End-to-end scenarios against the fixture catalog in tests/fixtures/catalog.json.

use std::path::PathBuf;

use larder_core::substitution::ExclusionReason;
use larder_core::{
    audit_substitutions, AllergenDerivative, AllergenExpander, AllergenKind, AllergenSet,
    BatchConfig, BatchOrchestrator, CatalogStore, Confidence, IngredientPipeline, MatchQuality,
    MemoryStore, NormalizedName, Normalizer, ProductMatcher, Resolver, RuleSet,
    SubstitutionResolver,
};
use uuid::Uuid;

fn catalog() -> MemoryStore {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/catalog.json");
    MemoryStore::load(&path).expect("fixture catalog loads")
}

fn canonical_id(store: &MemoryStore, name: &str) -> Uuid {
    store
        .canonical_by_term(name)
        .unwrap()
        .unwrap_or_else(|| panic!("no canonical named {name:?}"))
        .id
}

fn ids(products: &[larder_core::Product]) -> Vec<&str> {
    products.iter().map(|p| p.id.as_str()).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_honey_mustard_resolves_confidently() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);

    let normalized = normalizer.normalize("1/4 cup honey mustard");
    assert_eq!(normalized.as_str(), "honey mustard");

    let outcome = Resolver::online(&store, &rules.resolver)
        .resolve(&normalized)
        .unwrap();
    let resolution = outcome.resolution().expect("resolved");
    assert_eq!(resolution.canonical.name, "honey mustard");
    assert_eq!(resolution.confidence, Confidence::Confident);
}

#[test]
fn test_shrimp_carries_shellfish_through_a_derivative() {
    let store = catalog();
    let allergens = AllergenExpander::new(&store)
        .effective_allergens(canonical_id(&store, "shrimp"))
        .unwrap();
    assert_eq!(allergens, AllergenSet::from([AllergenKind::Shellfish]));
}

#[test]
fn test_milk_offers_dairy_free_substitutes_with_products() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);
    let milk = canonical_id(&store, "milk");
    let avoid = AllergenSet::from([AllergenKind::Milk]);

    let allergens = AllergenExpander::new(&store).effective_allergens(milk).unwrap();
    assert!(allergens.contains(&AllergenKind::Milk));

    let substitutes = SubstitutionResolver::new(&store, &normalizer, rules)
        .substitutes_for(milk, &avoid)
        .unwrap();
    let names: Vec<_> = substitutes.iter().map(|s| s.canonical.name.as_str()).collect();
    assert_eq!(names, vec!["almond milk", "soy milk", "oat milk"]);
    assert_eq!(substitutes[2].notes.as_deref(), Some("1:1"));

    let matches = ProductMatcher::new(&store, &rules.matcher)
        .match_products("almond milk", Confidence::Confident, &AllergenSet::new())
        .unwrap();
    assert_eq!(ids(&matches.products), vec!["am-1", "am-2"]);
    assert_eq!(matches.quality, MatchQuality::Branded);
    assert!(matches
        .products
        .iter()
        .all(|p| p.canonical_tag.as_deref() == Some("almond milk")));
}

#[test]
fn test_flour_matches_exclude_candy_and_lower_tiers() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let matches = ProductMatcher::new(&store, &rules.matcher)
        .match_products("flour", Confidence::Confident, &AllergenSet::new())
        .unwrap();

    assert_eq!(ids(&matches.products), vec!["fl-1", "fl-2"]);
    for product in &matches.products {
        let description = product.description.to_lowercase();
        assert!(!description.contains("m&m"), "{}", product.description);
        assert!(!description.contains("chocolate"), "{}", product.description);
    }
}

#[test]
fn test_pipeline_reports_flagged_mention_end_to_end() {
    let store = catalog();
    let pipeline = IngredientPipeline::new(&store, RuleSet::builtin());
    let avoid = AllergenSet::from([AllergenKind::Milk]);

    let result = pipeline.resolve_ingredient_mention("1 cup milk", &avoid).unwrap();
    assert!(result.flagged);
    assert_eq!(result.canonical.as_ref().unwrap().name, "milk");
    let names: Vec<_> = result
        .substitutes
        .iter()
        .map(|s| s.substitute.canonical.name.as_str())
        .collect();
    assert_eq!(names, vec!["almond milk", "soy milk", "oat milk"]);
    assert_eq!(ids(&result.substitutes[0].products), vec!["am-1", "am-3", "am-2"]);

    // No product shown to the user is tagged with the avoided ingredient.
    assert!(!ids(&result.products).contains(&"mk-1"));
    assert!(!result.products.is_empty());
}

#[test]
fn test_aliases_and_mappings_resolve() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);
    let resolver = Resolver::online(&store, &rules.resolver);

    let prawns = resolver.resolve(&normalizer.normalize("1 lb prawns")).unwrap();
    let prawns = prawns.resolution().expect("alias resolves");
    assert_eq!(prawns.canonical.name, "shrimp");
    assert_eq!(prawns.confidence, Confidence::Confident);

    let pb = resolver.resolve(&NormalizedName::from_normalized("pb")).unwrap();
    let pb = pb.resolution().expect("mapping resolves");
    assert_eq!(pb.canonical.name, "peanut butter");
    assert_eq!(pb.confidence, Confidence::Suggested);
}

#[test]
fn test_unsafe_substitution_rows_are_withheld_and_audited() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);
    let butter = canonical_id(&store, "butter");

    let lookup = SubstitutionResolver::new(&store, &normalizer, rules)
        .lookup(butter, &AllergenSet::from([AllergenKind::Milk]))
        .unwrap();
    let names: Vec<_> = lookup.substitutes.iter().map(|s| s.canonical.name.as_str()).collect();
    assert_eq!(names, vec!["coconut oil"]);
    assert_eq!(lookup.excluded.len(), 1);
    assert_eq!(lookup.excluded[0].substitute_name, "buttermilk");
    assert_eq!(lookup.excluded[0].reason, ExclusionReason::SafetyViolation);
    assert!(lookup.needs_review());

    let audit = audit_substitutions(&store, &normalizer, rules, false).unwrap();
    assert_eq!(audit.checked, 6);
    assert_eq!(audit.unsafe_rows.len(), 1);
    assert_eq!(audit.unsafe_rows[0].canonical, "butter");
    assert!(audit.quarantined.is_empty());

    let audit = audit_substitutions(&store, &normalizer, rules, true).unwrap();
    assert_eq!(audit.quarantined.len(), 1);
    assert_eq!(store.substitutions_for(butter).unwrap().len(), 1);
}

#[test]
fn test_batch_mapping_persists_through_commit_hook() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);
    let dir = tempfile::tempdir().unwrap();
    let saved = dir.path().join("catalog.json");

    let mentions: Vec<String> = ["2 cups shrimps", "1 lb shrimps", "1 tsp salt"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let orchestrator = BatchOrchestrator::new(&store, &normalizer, rules, BatchConfig::default());
    let report = orchestrator
        .map_mentions(&mentions, |_| store.save(&saved))
        .unwrap();
    assert_eq!(report.processed, 3);
    assert!(report.failures.is_empty());
    assert_eq!(report.last_committed_chunk, Some(0));

    let reloaded = MemoryStore::load(&saved).unwrap();
    let mapping = reloaded
        .mapping(&NormalizedName::from_normalized("shrimps"))
        .unwrap()
        .expect("mapping committed");
    assert_eq!(mapping.canonical_id, canonical_id(&store, "shrimp"));
    assert_eq!(mapping.confidence, Confidence::Suggested);

    let rerun = orchestrator.map_mentions(&mentions, |_| Ok(())).unwrap();
    assert_eq!(rerun.newly_mapped, 0);
    assert_eq!(rerun.upgraded, 0);
}

// ============================================================================
// Properties over the whole catalog
// ============================================================================

#[test]
fn test_normalization_is_idempotent_over_catalog_terms() {
    let store = catalog();
    let normalizer = Normalizer::builtin();
    let mut inputs: Vec<String> = store
        .canonicals()
        .unwrap()
        .iter()
        .flat_map(|c| c.terms().map(str::to_string).collect::<Vec<_>>())
        .collect();
    inputs.extend(
        store
            .products(0, 100)
            .unwrap()
            .into_iter()
            .map(|p| p.description),
    );

    for raw in &inputs {
        let once = normalizer.normalize(raw);
        let twice = normalizer.normalize(once.as_str());
        assert_eq!(once, twice, "not idempotent for {raw:?}");
    }
}

#[test]
fn test_every_canonical_resolves_to_itself() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);
    let resolver = Resolver::online(&store, &rules.resolver);

    for canonical in store.canonicals().unwrap() {
        for term in canonical.terms() {
            let outcome = resolver.resolve(&normalizer.normalize(term)).unwrap();
            let resolution = outcome
                .resolution()
                .unwrap_or_else(|| panic!("{term:?} did not resolve"));
            assert_eq!(resolution.canonical.id, canonical.id, "{term:?}");
            assert_eq!(resolution.confidence, Confidence::Confident, "{term:?}");
        }
    }
}

#[test]
fn test_adding_a_derivative_never_removes_allergens() {
    let store = catalog();
    let expander = AllergenExpander::new(&store);
    let canonicals = store.canonicals().unwrap();
    let before: Vec<AllergenSet> = canonicals
        .iter()
        .map(|c| expander.effective_allergens_of(c).unwrap())
        .collect();

    store
        .add_derivative(AllergenDerivative::new(AllergenKind::Sesame, "honey"))
        .unwrap();
    store
        .add_derivative(AllergenDerivative::new(AllergenKind::Eggs, "butter"))
        .unwrap();

    for (canonical, before) in canonicals.iter().zip(&before) {
        let after = expander.effective_allergens_of(canonical).unwrap();
        assert!(after.is_superset(before), "{} lost allergens", canonical.name);
    }
    let honey = expander
        .effective_allergens(canonical_id(&store, "honey"))
        .unwrap();
    assert!(honey.contains(&AllergenKind::Sesame));
    // One level only: honey mustard does not inherit from honey.
    let honey_mustard = expander
        .effective_allergens(canonical_id(&store, "honey mustard"))
        .unwrap();
    assert!(!honey_mustard.contains(&AllergenKind::Sesame));
}

#[test]
fn test_substitutes_never_share_the_triggering_allergen() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let normalizer = Normalizer::new(&rules.normalizer);
    let expander = AllergenExpander::new(&store);
    let subs = SubstitutionResolver::new(&store, &normalizer, rules);

    for canonical in store.canonicals().unwrap() {
        for allergen in expander.effective_allergens_of(&canonical).unwrap() {
            let avoid = AllergenSet::from([allergen]);
            for substitute in subs.substitutes_for(canonical.id, &avoid).unwrap() {
                let carried = expander.effective_allergens_of(&substitute.canonical).unwrap();
                assert!(
                    !carried.contains(&allergen),
                    "{} offered for {} despite {}",
                    substitute.canonical.name,
                    canonical.name,
                    allergen
                );
            }
        }
    }
}

#[test]
fn test_branded_products_rank_ahead_of_placeholders() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let matcher = ProductMatcher::new(&store, &rules.matcher);

    for canonical in store.canonicals().unwrap() {
        let matches = matcher
            .match_products(&canonical.name, Confidence::Low, &AllergenSet::new())
            .unwrap();
        let first_generic = matches.products.iter().position(|p| p.is_generic());
        if let Some(first_generic) = first_generic {
            assert!(
                matches.products[first_generic..].iter().all(|p| p.is_generic()),
                "branded product after placeholder for {}",
                canonical.name
            );
        }
    }
}

#[test]
fn test_cross_category_products_never_match_savory_canonicals() {
    let store = catalog();
    let rules = RuleSet::builtin();
    let matcher = ProductMatcher::new(&store, &rules.matcher);

    for canonical in store.canonicals().unwrap() {
        if rules.matcher.is_sweets(&canonical.name) {
            continue;
        }
        let matches = matcher
            .match_products(&canonical.name, Confidence::Low, &AllergenSet::new())
            .unwrap();
        for product in &matches.products {
            assert!(
                !matcher.is_cross_category(product),
                "{} matched {}",
                product.description,
                canonical.name
            );
        }
    }

    // Sweets canonicals are exempt from the filter.
    let chocolate = matcher
        .match_products("chocolate", Confidence::Confident, &AllergenSet::new())
        .unwrap();
    assert!(ids(&chocolate.products).contains(&"ch-1"));
}
