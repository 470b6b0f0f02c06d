use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Confidence;

// ============================================================================
// Run report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    MapMentions,
    TagProducts,
}

/// Why an item was routed to manual review instead of being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Nothing but quantities and units survived normalization.
    MeasurementLeftover,
    GenericTerm,
    TooShort,
    TooLong,
    MultiIngredient,
    /// The target canonical hit its per-run absorption cap.
    OverAbsorbed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedItem {
    pub raw: String,
    pub normalized: String,
    pub reason: FlagReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Input row (mentions) or catalog offset (products); absent for post-run steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub raw: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmappedEntry {
    pub normalized: String,
    pub count: usize,
}

/// Structured result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub rules_version: String,
    pub threshold: Confidence,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub newly_mapped: usize,
    pub upgraded: usize,
    pub skipped_duplicate: usize,
    pub below_threshold: usize,
    pub unresolved: usize,
    pub flagged: Vec<FlaggedItem>,
    pub failures: Vec<RowFailure>,
    /// Unresolved names by descending frequency, for curation priority.
    pub unmapped: Vec<UnmappedEntry>,
    /// Canonicals with no product at `suggested` or better.
    pub needs_products: Vec<String>,
    pub created_canonicals: Vec<String>,
    pub last_committed_chunk: Option<usize>,
}

impl RunReport {
    pub fn new(kind: RunKind, rules_version: &str, threshold: Confidence) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            rules_version: rules_version.to_string(),
            threshold,
            started_at: Utc::now(),
            completed_at: None,
            processed: 0,
            newly_mapped: 0,
            upgraded: 0,
            skipped_duplicate: 0,
            below_threshold: 0,
            unresolved: 0,
            flagged: Vec::new(),
            failures: Vec::new(),
            unmapped: Vec::new(),
            needs_products: Vec::new(),
            created_canonicals: Vec::new(),
            last_committed_chunk: None,
        }
    }

    pub fn flagged_count(&self, reason: FlagReason) -> usize {
        self.flagged.iter().filter(|f| f.reason == reason).count()
    }

    pub(crate) fn absorb(&mut self, tally: ChunkTally, unmapped: &mut HashMap<String, usize>) {
        self.processed += tally.processed;
        self.newly_mapped += tally.newly_mapped;
        self.upgraded += tally.upgraded;
        self.skipped_duplicate += tally.skipped_duplicate;
        self.below_threshold += tally.below_threshold;
        self.unresolved += tally.unresolved;
        self.flagged.extend(tally.flagged);
        self.failures.extend(tally.failures);
        for (name, count) in tally.unmapped {
            *unmapped.entry(name).or_insert(0) += count;
        }
    }

    pub(crate) fn finish(&mut self, unmapped: HashMap<String, usize>) {
        let mut entries: Vec<UnmappedEntry> = unmapped
            .into_iter()
            .map(|(normalized, count)| UnmappedEntry { normalized, count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.normalized.cmp(&b.normalized)));
        self.unmapped = entries;
        self.completed_at = Some(Utc::now());
    }
}

/// Counters from one chunk, merged into the run report after each wave.
#[derive(Debug, Default)]
pub(crate) struct ChunkTally {
    pub processed: usize,
    pub newly_mapped: usize,
    pub upgraded: usize,
    pub skipped_duplicate: usize,
    pub below_threshold: usize,
    pub unresolved: usize,
    pub flagged: Vec<FlaggedItem>,
    pub failures: Vec<RowFailure>,
    pub unmapped: HashMap<String, usize>,
}

impl ChunkTally {
    pub fn flag(
        &mut self,
        raw: &str,
        normalized: &str,
        reason: FlagReason,
        detail: Option<String>,
    ) {
        self.flagged.push(FlaggedItem {
            raw: raw.to_string(),
            normalized: normalized.to_string(),
            reason,
            detail,
        });
    }

    pub fn unmapped(&mut self, normalized: &str) {
        self.unresolved += 1;
        *self.unmapped.entry(normalized.to_string()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_entries_sort_by_frequency_then_name() {
        let mut report = RunReport::new(RunKind::MapMentions, "test", Confidence::Suggested);
        let mut unmapped = HashMap::new();

        let mut first = ChunkTally::default();
        first.unmapped("za'atar");
        first.unmapped("gochujang");
        let mut second = ChunkTally::default();
        second.unmapped("gochujang");
        second.unmapped("sumac");
        second.processed = 5;

        report.absorb(first, &mut unmapped);
        report.absorb(second, &mut unmapped);
        report.finish(unmapped);

        assert_eq!(report.unresolved, 4);
        assert_eq!(report.processed, 5);
        let names: Vec<_> = report.unmapped.iter().map(|e| e.normalized.as_str()).collect();
        assert_eq!(names, vec!["gochujang", "sumac", "za'atar"]);
        assert_eq!(report.unmapped[0].count, 2);
        assert!(report.completed_at.is_some());
    }

    #[test]
    fn test_report_serializes_with_snake_case_enums() {
        let mut report = RunReport::new(RunKind::TagProducts, "2024.1", Confidence::Low);
        let mut tally = ChunkTally::default();
        tally.flag("x", "x", FlagReason::TooShort, None);
        report.absorb(tally, &mut HashMap::new());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "tag_products");
        assert_eq!(json["threshold"], "low");
        assert_eq!(json["flagged"][0]["reason"], "too_short");
    }
}
