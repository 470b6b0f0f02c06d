use std::collections::HashSet;

use strsim::jaro_winkler;
use uuid::Uuid;

use super::gates::is_generic;
use super::{Resolution, ResolveContext, UnresolvedReason};
use crate::error::StoreError;
use crate::rules::ResolverRules;
use crate::types::{CanonicalIngredient, Confidence, NormalizedName};

/// What a single strategy concluded about a name.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Match(Resolution),
    /// Stop the chain; the name must not be resolved automatically.
    Reject(UnresolvedReason),
    /// No opinion; try the next strategy.
    Pass,
}

/// One step in a resolver chain.
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        name: &NormalizedName,
    ) -> Result<StrategyOutcome, StoreError>;
}

fn matched(
    canonical: CanonicalIngredient,
    confidence: Confidence,
    strategy: &'static str,
) -> StrategyOutcome {
    StrategyOutcome::Match(Resolution {
        canonical,
        confidence,
        strategy,
    })
}

/// Name or alias equal to the normalized text.
pub struct ExactStrategy;

impl ResolveStrategy for ExactStrategy {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        name: &NormalizedName,
    ) -> Result<StrategyOutcome, StoreError> {
        Ok(match ctx.store.canonical_by_term(name.as_str())? {
            Some(canonical) => matched(canonical, Confidence::Confident, self.name()),
            None => StrategyOutcome::Pass,
        })
    }
}

/// Previously stored mention mapping, at its stored confidence.
pub struct MappingStrategy;

impl ResolveStrategy for MappingStrategy {
    fn name(&self) -> &'static str {
        "mapping"
    }

    fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        name: &NormalizedName,
    ) -> Result<StrategyOutcome, StoreError> {
        let Some(mapping) = ctx.store.mapping(name)? else {
            return Ok(StrategyOutcome::Pass);
        };
        Ok(match ctx.store.canonical(mapping.canonical_id)? {
            Some(canonical) => matched(canonical, mapping.confidence, self.name()),
            None => StrategyOutcome::Pass,
        })
    }
}

/// Rule-based rewrites of the name, then a search for the longest contained
/// canonical. Every hit here is a suggestion, never confident.
///
/// Rewrites tried in order:
/// 1. spelling fixes ("allpurpose" -> "all-purpose")
/// 2. leading modifiers and trailing leftovers ("ground cumin", "ginger paste")
/// 3. singular/plural variations
pub struct PatternStrategy;

impl ResolveStrategy for PatternStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        name: &NormalizedName,
    ) -> Result<StrategyOutcome, StoreError> {
        let fixed = apply_spelling_fixes(name.as_str(), ctx.rules);

        for candidate in rewrites(&fixed, ctx.rules) {
            if candidate == name.as_str() {
                continue;
            }
            if let Some(canonical) = lookup_with_plurals(ctx, &candidate)? {
                return Ok(self.accept(canonical, ctx.rules));
            }
        }

        let hits = contained_canonicals(ctx, &fixed)?;
        match hits.as_slice() {
            [] => Ok(StrategyOutcome::Pass),
            [only] => Ok(self.accept(only.clone(), ctx.rules)),
            many => Ok(StrategyOutcome::Reject(UnresolvedReason::MultiIngredient {
                candidates: many.iter().map(|c| c.name.clone()).collect(),
            })),
        }
    }
}

impl PatternStrategy {
    /// Every pattern-derived hit passes the generic blocklist.
    fn accept(&self, canonical: CanonicalIngredient, rules: &ResolverRules) -> StrategyOutcome {
        if is_generic(&canonical.name, rules) {
            StrategyOutcome::Reject(UnresolvedReason::GenericCandidate {
                candidate: canonical.name,
            })
        } else {
            matched(canonical, Confidence::Suggested, self.name())
        }
    }
}

/// Best Jaro-Winkler match over every canonical term, above the threshold.
/// Low confidence; batch chains only.
pub struct FuzzyStrategy;

impl ResolveStrategy for FuzzyStrategy {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn attempt(
        &self,
        ctx: &ResolveContext<'_>,
        name: &NormalizedName,
    ) -> Result<StrategyOutcome, StoreError> {
        let mut best: Option<(f64, CanonicalIngredient)> = None;
        for canonical in ctx.store.canonicals()? {
            let score = canonical
                .terms()
                .map(|term| jaro_winkler(name.as_str(), &term.to_lowercase()))
                .fold(0.0_f64, f64::max);
            if score < ctx.rules.fuzzy_threshold {
                continue;
            }
            let better = match &best {
                None => true,
                Some((s, c)) => score > *s || (score == *s && canonical.name < c.name),
            };
            if better {
                best = Some((score, canonical));
            }
        }
        Ok(match best {
            Some((_, canonical)) if !is_generic(&canonical.name, ctx.rules) => {
                matched(canonical, Confidence::Low, self.name())
            }
            _ => StrategyOutcome::Pass,
        })
    }
}

/// Replace misspelled tokens and phrases on word boundaries in one left-to-right
/// pass. Longer keys win at each position, so "all purpose" is fixed before any
/// single-word key could split it. Replacement text is never rescanned.
pub(crate) fn apply_spelling_fixes(text: &str, rules: &ResolverRules) -> String {
    let mut fixes: Vec<(Vec<&str>, &str)> = rules
        .spelling_fixes
        .iter()
        .map(|(wrong, right)| (wrong.split_whitespace().collect::<Vec<_>>(), right.as_str()))
        .filter(|(wrong, _)| !wrong.is_empty())
        .collect();
    fixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    'scan: while i < tokens.len() {
        for (wrong, right) in &fixes {
            if tokens[i..].starts_with(wrong) {
                out.push(*right);
                i += wrong.len();
                continue 'scan;
            }
        }
        out.push(tokens[i]);
        i += 1;
    }
    out.join(" ")
}

/// Whole-name rewrites: the spelling-fixed text, then with leading modifiers
/// and trailing leftovers peeled off.
fn rewrites(fixed: &str, rules: &ResolverRules) -> Vec<String> {
    let mut out = vec![fixed.to_string()];
    let mut tokens: Vec<&str> = fixed.split_whitespace().collect();

    while tokens.len() > 1 && rules.leading_modifiers.iter().any(|m| m == tokens[0]) {
        tokens.remove(0);
        out.push(tokens.join(" "));
    }
    while tokens.len() > 1
        && rules
            .trailing_leftovers
            .iter()
            .any(|l| Some(&l.as_str()) == tokens.last())
    {
        tokens.pop();
        out.push(tokens.join(" "));
    }
    out
}

fn lookup_with_plurals(
    ctx: &ResolveContext<'_>,
    term: &str,
) -> Result<Option<CanonicalIngredient>, StoreError> {
    for variant in std::iter::once(term.to_string()).chain(plural_variations(term)) {
        if let Some(canonical) = ctx.store.canonical_by_term(&variant)? {
            return Ok(Some(canonical));
        }
    }
    Ok(None)
}

/// Singular/plural forms of the last word.
fn plural_variations(term: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(stem) = term.strip_suffix("ies") {
        out.push(format!("{stem}y"));
    }
    if let Some(stem) = term.strip_suffix("oes") {
        out.push(format!("{stem}o"));
    }
    if let Some(stem) = term.strip_suffix('s') {
        out.push(stem.to_string());
    } else {
        out.push(format!("{term}s"));
        if let Some(stem) = term.strip_suffix('y') {
            out.push(format!("{stem}ies"));
        }
    }
    out
}

/// Distinct canonicals named by non-overlapping n-grams, longest first.
fn contained_canonicals(
    ctx: &ResolveContext<'_>,
    text: &str,
) -> Result<Vec<CanonicalIngredient>, StoreError> {
    let tokens: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    let max_len = ctx.rules.max_ngram_tokens.max(1).min(tokens.len());

    let mut covered = vec![false; tokens.len()];
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut hits = Vec::new();

    for len in (1..=max_len).rev() {
        for start in 0..=tokens.len() - len {
            if covered[start..start + len].iter().any(|c| *c) {
                continue;
            }
            let gram = tokens[start..start + len].join(" ");
            if let Some(canonical) = lookup_with_plurals(ctx, &gram)? {
                covered[start..start + len].iter_mut().for_each(|c| *c = true);
                if seen.insert(canonical.id) {
                    hits.push(canonical);
                }
            }
        }
    }
    Ok(hits)
}
