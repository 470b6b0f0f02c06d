//! Golden tests for ingredient-line normalization.
//!
//! Each fixture under tests/fixtures/normalization/ holds one raw recipe line
//! and the normalized name it must produce. Every fixture is also checked for
//! idempotence: normalizing the expected output must return it unchanged.

use glob::glob;
use larder_core::normalize;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct NormalizationCase {
    raw: String,
    expected: String,
}

fn load_test_cases() -> Vec<(String, NormalizationCase)> {
    let fixtures_dir =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/normalization");
    let pattern = fixtures_dir.join("*.json");
    let pattern_str = pattern.to_string_lossy();

    let mut cases = Vec::new();
    for entry in glob(&pattern_str).expect("Failed to read glob pattern") {
        let path = entry.expect("Failed to read fixture path");
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
        let case: NormalizationCase = serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path.display(), e));
        cases.push((name, case));
    }
    cases.sort_by(|a, b| a.0.cmp(&b.0));
    cases
}

#[test]
fn test_normalization_fixtures() {
    let cases = load_test_cases();
    if cases.is_empty() {
        println!("No test fixtures found in tests/fixtures/normalization/");
        return;
    }

    let mut failures = Vec::new();
    for (name, case) in &cases {
        let actual = normalize(&case.raw);
        if actual.as_str() != case.expected {
            failures.push((name.clone(), case, actual.into_string()));
            continue;
        }
        let again = normalize(actual.as_str());
        if again != actual {
            failures.push((
                name.clone(),
                case,
                format!("{} (second pass gave {:?})", actual, again.as_str()),
            ));
        }
    }

    if !failures.is_empty() {
        let mut msg = format!(
            "\n{} of {} normalization tests failed:\n",
            failures.len(),
            cases.len()
        );
        for (name, case, actual) in &failures {
            msg.push_str(&format!("\n=== {} ===\n", name));
            msg.push_str(&format!("Input:    {:?}\n", case.raw));
            msg.push_str(&format!("Expected: {:?}\n", case.expected));
            msg.push_str(&format!("Actual:   {:?}\n", actual));
        }
        panic!("{}", msg);
    }

    println!("All {} normalization tests passed!", cases.len());
}
