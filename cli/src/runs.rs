//! Batch commands: mention mapping, product tagging and the substitution audit.
//!
//! The catalog snapshot is saved after every committed wave, so an interrupted
//! run can restart with `--resume-from <last_committed_chunk + 1>`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use larder_core::{audit_substitutions, BatchConfig, BatchOrchestrator};
use tracing::info;

use crate::workspace::{emit_report, Workspace};
use crate::BatchArgs;

fn batch_config(args: &BatchArgs) -> BatchConfig {
    BatchConfig {
        chunk_size: args.chunk_size,
        workers: args.workers,
        threshold: args.threshold,
        resume_from_chunk: args.resume_from,
        ..Default::default()
    }
}

/// Non-empty lines of `input`, windowed by `offset` / `limit`.
fn read_mentions(input: &Path, offset: usize, limit: Option<usize>) -> Result<Vec<String>> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read mentions from {}", input.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(str::to_string)
        .collect())
}

pub fn map_mentions(
    workspace: &Workspace,
    input: &Path,
    create_novel: bool,
    min_frequency: usize,
    args: &BatchArgs,
) -> Result<()> {
    let mentions = read_mentions(input, args.offset, args.limit)?;
    info!(count = mentions.len(), input = %input.display(), "Mapping mentions");

    let config = BatchConfig {
        create_novel,
        min_frequency,
        ..batch_config(args)
    };
    let orchestrator =
        BatchOrchestrator::new(&workspace.store, &workspace.normalizer, &workspace.rules, config);
    let report = orchestrator.map_mentions(&mentions, |chunk| {
        workspace.save()?;
        info!(chunk, "Committed wave");
        Ok(())
    })?;
    // Novel canonicals are created after the last wave.
    workspace.save().context("Failed to save catalog")?;

    emit_report(&report, args.report.as_deref())
}

pub fn tag_products(workspace: &Workspace, args: &BatchArgs) -> Result<()> {
    let orchestrator = BatchOrchestrator::new(
        &workspace.store,
        &workspace.normalizer,
        &workspace.rules,
        batch_config(args),
    );
    let report = orchestrator.tag_products(args.offset, args.limit, |chunk| {
        workspace.save()?;
        info!(chunk, "Committed wave");
        Ok(())
    })?;
    workspace.save().context("Failed to save catalog")?;

    emit_report(&report, args.report.as_deref())
}

pub fn audit(workspace: &Workspace, quarantine: bool, report: Option<&Path>) -> Result<()> {
    let audit = audit_substitutions(
        &workspace.store,
        &workspace.normalizer,
        &workspace.rules,
        quarantine,
    )?;
    if !audit.quarantined.is_empty() {
        workspace.save().context("Failed to save catalog")?;
    }
    emit_report(&audit, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::{AllergenSet, CatalogStore, Confidence, Curator, NormalizedName};

    #[test]
    fn test_read_mentions_skips_blank_lines_and_windows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mentions.txt");
        fs::write(&input, "1 cup milk\n\n  2 eggs \n1 tsp salt\n3 cups flour\n").unwrap();

        let all = read_mentions(&input, 0, None).unwrap();
        assert_eq!(all, vec!["1 cup milk", "2 eggs", "1 tsp salt", "3 cups flour"]);
        let window = read_mentions(&input, 1, Some(2)).unwrap();
        assert_eq!(window, vec!["2 eggs", "1 tsp salt"]);
    }

    #[test]
    fn test_map_mentions_persists_catalog_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("catalog.json");
        let input = dir.path().join("mentions.txt");
        let report = dir.path().join("report.json");

        let workspace = Workspace::open(&catalog, None).unwrap();
        Curator::new(&workspace.store, &workspace.normalizer)
            .create_canonical("tomato", &[], &AllergenSet::new())
            .unwrap();
        fs::write(&input, "2 cups tomatoes\n1 tomato\n").unwrap();

        let args = BatchArgs {
            threshold: Confidence::Suggested,
            chunk_size: 1,
            workers: 1,
            resume_from: 0,
            offset: 0,
            limit: None,
            report: Some(report.clone()),
        };
        map_mentions(&workspace, &input, false, 3, &args).unwrap();

        let reopened = Workspace::open(&catalog, None).unwrap();
        let mapping = reopened
            .store
            .mapping(&NormalizedName::from_normalized("tomatoes"))
            .unwrap()
            .expect("plural mention mapped");
        assert_eq!(mapping.confidence, Confidence::Suggested);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(written["kind"], "map_mentions");
        assert_eq!(written["processed"], 2);
        assert_eq!(written["last_committed_chunk"], 1);
    }
}
