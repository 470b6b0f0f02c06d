//! Offline batch runs that materialize mention mappings and product tags.
//!
//! Input is split into fixed-size chunks; chunks are processed in waves of
//! `workers` chunks on the rayon pool. Every write goes through the store's
//! conditional upserts, so overlapping or repeated runs are safe. After each
//! wave the caller's commit hook runs (the CLI persists the snapshot there),
//! and a restart can resume from the chunk after the last committed one.

mod report;

pub use report::{FlagReason, FlaggedItem, RowFailure, RunKind, RunReport, UnmappedEntry};

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::curation::Curator;
use crate::error::{CurationError, StoreError};
use crate::matcher::{ProductMatcher, ProductTagger, TagOutcome};
use crate::normalizer::Normalizer;
use crate::resolver::{
    is_generic, AbsorptionGuard, Resolution, ResolveOutcome, Resolver, UnresolvedReason,
};
use crate::rules::RuleSet;
use crate::store::CatalogStore;
use crate::types::{AllergenSet, Confidence, Mapping, NormalizedName, Product, UpsertOutcome};
use report::ChunkTally;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub chunk_size: usize,
    /// Chunks processed concurrently per wave.
    pub workers: usize,
    /// Lowest confidence that is written; weaker results are only counted.
    pub threshold: Confidence,
    /// Skip chunks before this index (restart after the last committed chunk).
    pub resume_from_chunk: usize,
    /// Create canonicals for frequent unresolved names that pass the shape checks.
    pub create_novel: bool,
    /// Occurrences an unresolved name needs before it may become a canonical.
    pub min_frequency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            workers: 4,
            threshold: Confidence::Suggested,
            resume_from_chunk: 0,
            create_novel: false,
            min_frequency: 3,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct BatchOrchestrator<'a> {
    store: &'a dyn CatalogStore,
    normalizer: &'a Normalizer,
    rules: &'a RuleSet,
    config: BatchConfig,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        store: &'a dyn CatalogStore,
        normalizer: &'a Normalizer,
        rules: &'a RuleSet,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            normalizer,
            rules,
            config,
        }
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size.max(1)
    }

    fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Resolve raw mentions and write mappings at or above the threshold.
    ///
    /// `on_commit` receives the index of the last chunk in each finished wave.
    pub fn map_mentions<F>(
        &self,
        mentions: &[String],
        mut on_commit: F,
    ) -> Result<RunReport, StoreError>
    where
        F: FnMut(usize) -> Result<(), StoreError>,
    {
        let mut report =
            RunReport::new(RunKind::MapMentions, &self.rules.version, self.config.threshold);
        let resolver = Resolver::batch(self.store, &self.rules.resolver);
        let guard = AbsorptionGuard::new(self.rules.resolver.max_suggestions_per_canonical);
        let chunk_size = self.chunk_size();

        let chunks: Vec<(usize, &[String])> = mentions
            .chunks(chunk_size)
            .enumerate()
            .skip(self.config.resume_from_chunk)
            .collect();
        info!(
            run_id = %report.run_id,
            mentions = mentions.len(),
            chunks = chunks.len(),
            resume_from = self.config.resume_from_chunk,
            "Starting mention mapping"
        );

        let mut unmapped = HashMap::new();
        for wave in chunks.chunks(self.workers()) {
            let tallies: Vec<ChunkTally> = wave
                .par_iter()
                .map(|(index, rows)| {
                    let _span =
                        info_span!("batch_chunk", kind = "map_mentions", chunk = index).entered();
                    self.map_chunk(&resolver, &guard, index * chunk_size, rows)
                })
                .collect();
            for tally in tallies {
                report.absorb(tally, &mut unmapped);
            }
            if let Some((last, _)) = wave.last() {
                on_commit(*last)?;
                report.last_committed_chunk = Some(*last);
                info!(chunk = last, processed = report.processed, "Committed wave");
            }
        }

        if self.config.create_novel {
            self.create_novel(&mut report, &mut unmapped);
        }
        report.finish(unmapped);
        info!(
            run_id = %report.run_id,
            processed = report.processed,
            newly_mapped = report.newly_mapped,
            upgraded = report.upgraded,
            skipped_duplicate = report.skipped_duplicate,
            flagged = report.flagged.len(),
            unresolved = report.unresolved,
            failures = report.failures.len(),
            "Mention mapping complete"
        );
        Ok(report)
    }

    /// Tag catalog products in `[offset, offset + limit)` (stable id order).
    ///
    /// Chunk indices passed to `on_commit` and `resume_from_chunk` count from
    /// `offset`.
    pub fn tag_products<F>(
        &self,
        offset: usize,
        limit: Option<usize>,
        mut on_commit: F,
    ) -> Result<RunReport, StoreError>
    where
        F: FnMut(usize) -> Result<(), StoreError>,
    {
        let mut report =
            RunReport::new(RunKind::TagProducts, &self.rules.version, self.config.threshold);
        let tagger = ProductTagger::new(self.store, self.normalizer, self.rules)?;
        let chunk_size = self.chunk_size();

        let total = self.store.product_count()?;
        let end = limit.map_or(total, |l| offset.saturating_add(l).min(total));
        let chunks: Vec<(usize, usize)> = (offset..end)
            .step_by(chunk_size)
            .enumerate()
            .skip(self.config.resume_from_chunk)
            .collect();
        info!(
            run_id = %report.run_id,
            products = end.saturating_sub(offset),
            chunks = chunks.len(),
            "Starting product tagging"
        );

        let mut unmapped = HashMap::new();
        for wave in chunks.chunks(self.workers()) {
            let tallies: Vec<ChunkTally> = wave
                .par_iter()
                .map(|(index, start)| {
                    let _span =
                        info_span!("batch_chunk", kind = "tag_products", chunk = index).entered();
                    self.tag_chunk(&tagger, *start, chunk_size.min(end - start))
                })
                .collect();
            for tally in tallies {
                report.absorb(tally, &mut unmapped);
            }
            if let Some((last, _)) = wave.last() {
                on_commit(*last)?;
                report.last_committed_chunk = Some(*last);
                info!(chunk = last, processed = report.processed, "Committed wave");
            }
        }

        report.needs_products = self.coverage_gaps()?;
        report.finish(unmapped);
        info!(
            run_id = %report.run_id,
            processed = report.processed,
            newly_tagged = report.newly_mapped,
            upgraded = report.upgraded,
            needs_products = report.needs_products.len(),
            failures = report.failures.len(),
            "Product tagging complete"
        );
        Ok(report)
    }

    /// Canonicals without any product at `suggested` or better.
    pub fn coverage_gaps(&self) -> Result<Vec<String>, StoreError> {
        let matcher = ProductMatcher::new(self.store, &self.rules.matcher);
        let mut names: Vec<String> = self.store.canonicals()?.into_iter().map(|c| c.name).collect();
        names.sort();
        let mut gaps = Vec::new();
        for name in names {
            if matcher
                .match_products(&name, Confidence::Suggested, &AllergenSet::new())?
                .is_empty()
            {
                gaps.push(name);
            }
        }
        Ok(gaps)
    }

    /// Review routing based on the shape of the normalized text alone.
    pub fn shape_flag(&self, normalized: &NormalizedName) -> Option<FlagReason> {
        let rules = &self.rules.batch;
        let text = normalized.as_str();
        let tokens: Vec<&str> = normalized.tokens().collect();

        if tokens.is_empty()
            || tokens.iter().all(|t| {
                self.normalizer.is_unit(t) || t.chars().all(|c| !c.is_alphabetic())
            })
        {
            return Some(FlagReason::MeasurementLeftover);
        }
        let chars = text.chars().count();
        if chars < rules.min_chars {
            return Some(FlagReason::TooShort);
        }
        if chars > rules.max_chars || tokens.len() > rules.max_tokens {
            return Some(FlagReason::TooLong);
        }
        if is_generic(text, &self.rules.resolver) {
            return Some(FlagReason::GenericTerm);
        }
        None
    }

    fn map_chunk(
        &self,
        resolver: &Resolver<'_>,
        guard: &AbsorptionGuard,
        first_row: usize,
        rows: &[String],
    ) -> ChunkTally {
        let mut tally = ChunkTally::default();
        for (i, raw) in rows.iter().enumerate() {
            tally.processed += 1;
            if let Err(e) = self.map_one(resolver, guard, raw, &mut tally) {
                warn!(row = first_row + i, raw = %raw, error = %e, "Mention failed; continuing");
                tally.failures.push(RowFailure {
                    row: Some(first_row + i),
                    raw: raw.clone(),
                    error: e.to_string(),
                });
            }
        }
        debug!(rows = rows.len(), failures = tally.failures.len(), "chunk done");
        tally
    }

    fn map_one(
        &self,
        resolver: &Resolver<'_>,
        guard: &AbsorptionGuard,
        raw: &str,
        tally: &mut ChunkTally,
    ) -> Result<(), StoreError> {
        let normalized = self.normalizer.normalize(raw);
        if let Some(reason) = self.shape_flag(&normalized) {
            tally.flag(raw, normalized.as_str(), reason, None);
            return Ok(());
        }

        match resolver.resolve(&normalized)? {
            ResolveOutcome::Resolved(resolution) => {
                self.record_mapping(raw, &normalized, resolution, guard, tally)?
            }
            ResolveOutcome::Unresolved(UnresolvedReason::MultiIngredient { candidates }) => {
                tally.flag(
                    raw,
                    normalized.as_str(),
                    FlagReason::MultiIngredient,
                    Some(candidates.join(", ")),
                )
            }
            ResolveOutcome::Unresolved(UnresolvedReason::GenericCandidate { candidate }) => {
                tally.flag(raw, normalized.as_str(), FlagReason::GenericTerm, Some(candidate))
            }
            ResolveOutcome::Unresolved(_) => tally.unmapped(normalized.as_str()),
        }
        Ok(())
    }

    fn record_mapping(
        &self,
        raw: &str,
        normalized: &NormalizedName,
        resolution: Resolution,
        guard: &AbsorptionGuard,
        tally: &mut ChunkTally,
    ) -> Result<(), StoreError> {
        if resolution.confidence < self.config.threshold {
            tally.below_threshold += 1;
            return Ok(());
        }
        let existing = self.store.mapping(normalized)?.map(|m| m.confidence);
        if !UpsertOutcome::decide(existing, resolution.confidence).wrote() {
            tally.skipped_duplicate += 1;
            return Ok(());
        }
        // The read above may be stale; the slot is returned unless the upsert wrote.
        let reserved = resolution.confidence < Confidence::Confident;
        if reserved && !guard.try_absorb(resolution.canonical.id) {
            tally.flag(
                raw,
                normalized.as_str(),
                FlagReason::OverAbsorbed,
                Some(resolution.canonical.name),
            );
            return Ok(());
        }

        let written = self.store.upsert_mapping(Mapping {
            normalized_name: normalized.clone(),
            canonical_id: resolution.canonical.id,
            confidence: resolution.confidence,
        });
        if reserved && !written.as_ref().is_ok_and(UpsertOutcome::wrote) {
            guard.release(resolution.canonical.id);
        }
        let outcome = written?;
        match outcome {
            UpsertOutcome::Inserted => tally.newly_mapped += 1,
            UpsertOutcome::Upgraded => tally.upgraded += 1,
            UpsertOutcome::Unchanged => tally.skipped_duplicate += 1,
        }
        debug!(
            name = %normalized,
            canonical = %resolution.canonical.name,
            strategy = resolution.strategy,
            ?outcome,
            "mapping"
        );
        Ok(())
    }

    /// Promote frequent unresolved names to canonicals. Names that collide
    /// with an existing canonical after folding are skipped and logged.
    fn create_novel(&self, report: &mut RunReport, unmapped: &mut HashMap<String, usize>) {
        let curator = Curator::new(self.store, self.normalizer);
        let mut candidates: Vec<String> = unmapped
            .iter()
            .filter(|(_, count)| **count >= self.config.min_frequency)
            .map(|(name, _)| name.clone())
            .collect();
        candidates.sort();

        for name in candidates {
            if self
                .shape_flag(&NormalizedName::from_normalized(name.as_str()))
                .is_some()
            {
                continue;
            }
            match curator.create_canonical(&name, &[], &AllergenSet::new()) {
                Ok(canonical) => {
                    unmapped.remove(&name);
                    report.created_canonicals.push(canonical.name);
                }
                Err(CurationError::Duplicate { term, existing }) => {
                    debug!(term = %term, existing = %existing, "Skipped duplicate canonical");
                    report.skipped_duplicate += 1;
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "Failed to create canonical");
                    report.failures.push(RowFailure {
                        row: None,
                        raw: name,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn tag_chunk(&self, tagger: &ProductTagger<'_>, start: usize, len: usize) -> ChunkTally {
        let mut tally = ChunkTally::default();
        let products = match self.store.products(start, len) {
            Ok(products) => products,
            Err(e) => {
                warn!(start, len, error = %e, "Failed to load product chunk");
                tally.failures.push(RowFailure {
                    row: Some(start),
                    raw: format!("products[{start}..{}]", start + len),
                    error: e.to_string(),
                });
                return tally;
            }
        };
        for (i, product) in products.iter().enumerate() {
            tally.processed += 1;
            if let Err(e) = self.tag_one(tagger, product, &mut tally) {
                warn!(product = %product.id, error = %e, "Product failed; continuing");
                tally.failures.push(RowFailure {
                    row: Some(start + i),
                    raw: product.id.clone(),
                    error: e.to_string(),
                });
            }
        }
        tally
    }

    fn tag_one(
        &self,
        tagger: &ProductTagger<'_>,
        product: &Product,
        tally: &mut ChunkTally,
    ) -> Result<(), StoreError> {
        if product.canonical_tag_confidence == Some(Confidence::Confident) {
            tally.skipped_duplicate += 1;
            return Ok(());
        }
        match tagger.classify(product)? {
            TagOutcome::Tagged(decision) => {
                if decision.confidence < self.config.threshold {
                    tally.below_threshold += 1;
                    return tagger.release(&decision);
                }
                let written = self.store.upsert_product_tag(
                    &product.id,
                    &decision.canonical,
                    decision.confidence,
                );
                if !written.as_ref().is_ok_and(UpsertOutcome::wrote) {
                    tagger.release(&decision)?;
                }
                let outcome = written?;
                match outcome {
                    UpsertOutcome::Inserted => tally.newly_mapped += 1,
                    UpsertOutcome::Upgraded => tally.upgraded += 1,
                    UpsertOutcome::Unchanged => tally.skipped_duplicate += 1,
                }
                debug!(
                    product = %product.id,
                    canonical = %decision.canonical,
                    method = ?decision.method,
                    ?outcome,
                    "product tag"
                );
            }
            TagOutcome::OverCap(canonical) => {
                let normalized = self.normalizer.normalize(&product.description);
                tally.flag(
                    &product.description,
                    normalized.as_str(),
                    FlagReason::OverAbsorbed,
                    Some(canonical),
                );
            }
            TagOutcome::NoMatch => {
                let normalized = self.normalizer.normalize(&product.description);
                tally.unmapped(normalized.as_str());
            }
        }
        Ok(())
    }
}
