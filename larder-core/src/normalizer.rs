//! Ingredient mention normalization.
//!
//! Turns a raw recipe line ("2 teaspoons crushed red pepper (optional)") into
//! the name used for canonical lookup ("red pepper"). The rule pipeline runs
//! in a fixed order over the lowercased text:
//!
//! 1. parenthetical asides and filler phrases
//! 2. quantities and fractions
//! 3. unit words
//! 4. preparation/state descriptors and identity-neutral colors
//! 5. punctuation and whitespace cleanup
//!
//! Passes repeat until the text settles, so `normalize` is idempotent.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::rules::{NormalizerRules, RuleSet};
use crate::types::NormalizedName;

/// Innermost parenthetical or bracketed aside.
static ASIDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)|\[[^\[\]]*\]").expect("aside regex"));

/// Quantity glued to a unit, e.g. "400g" or "1½cups".
static COMPACT_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9./½¼¾⅓⅔⅛⅜⅝⅞⅕-]*[0-9½¼¾⅓⅔⅛⅜⅝⅞⅕]([a-z]+)$").expect("compact quantity regex")
});

const FRACTION_CHARS: &str = "½¼¾⅓⅔⅛⅜⅝⅞⅕";
const MAX_PASSES: usize = 8;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Sep,
}

impl Token {
    fn word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Sep => None,
        }
    }
}

/// Deterministic, rule-driven ingredient text cleanup.
#[derive(Debug, Clone)]
pub struct Normalizer {
    units: HashSet<String>,
    ambiguous_units: HashSet<String>,
    filler_phrases: Vec<Vec<String>>,
    trailing_fillers: Vec<Vec<String>>,
    descriptor_phrases: Vec<Vec<String>>,
    descriptors: HashSet<String>,
    colors: HashSet<String>,
    color_bound_nouns: HashSet<String>,
}

impl Normalizer {
    pub fn new(rules: &NormalizerRules) -> Self {
        Self {
            units: lower_set(&rules.units),
            ambiguous_units: lower_set(&rules.ambiguous_units),
            filler_phrases: phrase_list(&rules.filler_phrases),
            trailing_fillers: phrase_list(&rules.trailing_fillers),
            descriptor_phrases: phrase_list(&rules.descriptor_phrases),
            descriptors: lower_set(&rules.descriptors),
            colors: lower_set(&rules.colors),
            color_bound_nouns: lower_set(&rules.color_bound_nouns),
        }
    }

    /// Normalizer over the embedded default rules.
    pub fn builtin() -> Self {
        Self::new(&RuleSet::builtin().normalizer)
    }

    pub fn normalize(&self, raw: &str) -> NormalizedName {
        let mut current = self.pass(raw);
        for _ in 1..MAX_PASSES {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        NormalizedName::from_normalized(current)
    }

    /// True when `word` is a unit in the closed vocabulary (either list).
    pub fn is_unit(&self, word: &str) -> bool {
        self.units.contains(word) || self.ambiguous_units.contains(word)
    }

    fn pass(&self, input: &str) -> String {
        let text = strip_asides(&input.to_lowercase());
        let tokens = tokenize(&text);
        let tokens = self.strip_fillers(tokens);
        let tokens = self.strip_quantities_and_units(tokens);
        let tokens = self.strip_descriptors(tokens);
        join(collapse(tokens))
    }

    fn strip_fillers(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        'scan: while i < tokens.len() {
            for phrase in &self.trailing_fillers {
                if phrase_at(&tokens, i, phrase) {
                    // Drop through to the end of the clause.
                    i += phrase.len();
                    while i < tokens.len() && tokens[i] != Token::Sep {
                        i += 1;
                    }
                    continue 'scan;
                }
            }
            for phrase in &self.filler_phrases {
                if phrase_at(&tokens, i, phrase) {
                    i += phrase.len();
                    continue 'scan;
                }
            }
            out.push(tokens[i].clone());
            i += 1;
        }
        out
    }

    fn strip_quantities_and_units(&self, tokens: Vec<Token>) -> Vec<Token> {
        #[derive(PartialEq, Clone, Copy)]
        enum Dropped {
            Nothing,
            Quantity,
            Unit,
        }

        let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
        let mut last = Dropped::Nothing;

        for (i, token) in tokens.iter().enumerate() {
            let Some(word) = token.word() else {
                out.push(token.clone());
                last = Dropped::Nothing;
                continue;
            };
            let next_word = tokens.get(i + 1).and_then(Token::word);

            if is_quantity(word) || self.is_compact_quantity(word) {
                last = Dropped::Quantity;
                continue;
            }
            let is_range_connector = matches!(word, "to" | "-" | "–" | "or")
                && last == Dropped::Quantity
                && next_word.is_some_and(|n| is_quantity(n) || self.is_compact_quantity(n));
            if is_range_connector {
                continue;
            }
            let is_unit = self.units.contains(word)
                || (self.ambiguous_units.contains(word) && last == Dropped::Quantity);
            if is_unit {
                if matches!(out.last().and_then(Token::word), Some("a" | "an")) {
                    out.pop();
                }
                last = Dropped::Unit;
                continue;
            }
            if word == "of" && last != Dropped::Nothing {
                last = Dropped::Nothing;
                continue;
            }

            out.push(token.clone());
            last = Dropped::Nothing;
        }
        out
    }

    fn strip_descriptors(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut kept = Vec::with_capacity(tokens.len());
        let mut i = 0;
        'scan: while i < tokens.len() {
            for phrase in &self.descriptor_phrases {
                if phrase_at(&tokens, i, phrase) {
                    i += phrase.len();
                    continue 'scan;
                }
            }
            if let Some(word) = tokens[i].word() {
                if self.is_descriptor(word) {
                    i += 1;
                    continue;
                }
            }
            kept.push(tokens[i].clone());
            i += 1;
        }

        // Colors survive only directly before a noun they help identify.
        let mut out = Vec::with_capacity(kept.len());
        for (i, token) in kept.iter().enumerate() {
            if let Some(word) = token.word() {
                if self.colors.contains(word) {
                    let bound = kept
                        .get(i + 1)
                        .and_then(Token::word)
                        .is_some_and(|n| self.color_bound_nouns.contains(n));
                    if !bound {
                        continue;
                    }
                }
            }
            out.push(token.clone());
        }
        out
    }

    fn is_descriptor(&self, word: &str) -> bool {
        if self.descriptors.contains(word) {
            return true;
        }
        // "finely-chopped" style compounds made only of descriptors
        word.contains('-')
            && word
                .split('-')
                .all(|part| !part.is_empty() && self.descriptors.contains(part))
    }

    fn is_compact_quantity(&self, word: &str) -> bool {
        COMPACT_QUANTITY
            .captures(word)
            .and_then(|c| c.get(1))
            .is_some_and(|unit| self.is_unit(unit.as_str()))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Normalize with the embedded default rules.
pub fn normalize(raw: &str) -> NormalizedName {
    static DEFAULT: LazyLock<Normalizer> = LazyLock::new(Normalizer::builtin);
    DEFAULT.normalize(raw)
}

fn lower_set(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.trim().to_lowercase()).collect()
}

/// Phrases as word sequences, longest first so "at room temperature" wins
/// over "room temperature".
fn phrase_list(items: &[String]) -> Vec<Vec<String>> {
    let mut phrases: Vec<Vec<String>> = items
        .iter()
        .map(|p| p.to_lowercase().split_whitespace().map(str::to_string).collect())
        .filter(|p: &Vec<String>| !p.is_empty())
        .collect();
    phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    phrases
}

fn phrase_at(tokens: &[Token], start: usize, phrase: &[String]) -> bool {
    if start + phrase.len() > tokens.len() {
        return false;
    }
    phrase
        .iter()
        .zip(&tokens[start..])
        .all(|(p, t)| t.word() == Some(p.as_str()))
}

/// Remove parenthetical/bracketed asides (innermost first), then any
/// unbalanced opener through the end of the text.
fn strip_asides(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = ASIDE.replace_all(&current, " ").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    if let Some(open) = current.find(['(', '[']) {
        current.truncate(open);
    }
    current.replace([')', ']'], " ")
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    let flush = |word: &mut String, tokens: &mut Vec<Token>| {
        let trimmed = word.trim_end_matches('.').trim_matches(['\'', '"']);
        if !trimmed.is_empty() {
            tokens.push(Token::Word(trimmed.to_string()));
        }
        word.clear();
    };

    for c in text.chars() {
        match c {
            ',' | ';' => {
                flush(&mut word, &mut tokens);
                tokens.push(Token::Sep);
            }
            c if c.is_whitespace() || matches!(c, '*' | ':' | '!' | '?' | '"' | '+') => {
                flush(&mut word, &mut tokens);
            }
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

fn is_quantity(word: &str) -> bool {
    let allowed = |c: char| {
        c.is_ascii_digit() || matches!(c, '.' | '/' | '-') || FRACTION_CHARS.contains(c)
    };
    let has_amount = word
        .chars()
        .any(|c| c.is_ascii_digit() || FRACTION_CHARS.contains(c));
    has_amount && word.chars().all(allowed)
}

/// Drop punctuation-only words, collapse separators, trim them at both ends.
fn collapse(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Word(w) => {
                let w = w.trim_matches(['-', '\'', '.', '/']);
                if w.chars().any(char::is_alphanumeric) {
                    out.push(Token::Word(w.to_string()));
                }
            }
            Token::Sep => {
                if matches!(out.last(), Some(Token::Word(_))) {
                    out.push(Token::Sep);
                }
            }
        }
    }
    while out.last() == Some(&Token::Sep) {
        out.pop();
    }
    out
}

fn join(tokens: Vec<Token>) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Word(w) => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&w);
            }
            Token::Sep => out.push(','),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: &str) -> String {
        normalize(raw).into_string()
    }

    #[test]
    fn test_strips_quantity_and_unit() {
        assert_eq!(n("1/4 cup honey mustard"), "honey mustard");
        assert_eq!(n("2 cups flour"), "flour");
        assert_eq!(n("1 1/2 cups water"), "water");
        assert_eq!(n("2.5 oz cream cheese"), "cream cheese");
    }

    #[test]
    fn test_strips_asides_and_fillers() {
        assert_eq!(n("2 teaspoons crushed red pepper (optional)"), "red pepper");
        assert_eq!(n("1 cup cheese, such as cheddar or gouda"), "cheese");
        assert_eq!(n("Salt, to taste"), "salt");
        assert_eq!(n("1 stick (113g) butter, softened"), "butter");
    }

    #[test]
    fn test_unicode_fractions_and_ranges() {
        assert_eq!(n("½ cup sugar"), "sugar");
        assert_eq!(n("2-3 tablespoons olive oil"), "olive oil");
        assert_eq!(n("2 to 3 cloves garlic, minced"), "garlic");
    }

    #[test]
    fn test_compact_quantities() {
        assert_eq!(n("400g chopped tomatoes"), "tomatoes");
        assert_eq!(n("8oz cream cheese"), "cream cheese");
    }

    #[test]
    fn test_ambiguous_units_need_a_quantity() {
        assert_eq!(n("2 c milk"), "milk");
        assert_eq!(n("vitamin c"), "vitamin c");
    }

    #[test]
    fn test_articles_and_of() {
        assert_eq!(n("a pinch of salt"), "salt");
        assert_eq!(n("2 cups of flour"), "flour");
    }

    #[test]
    fn test_colors_kept_only_when_bound() {
        assert_eq!(n("1 red onion, diced"), "red onion");
        assert_eq!(n("3 large green tomatoes"), "tomatoes");
        assert_eq!(n("1 red bell pepper"), "bell pepper");
    }

    #[test]
    fn test_descriptor_compounds() {
        assert_eq!(n("1/2 cup finely-chopped parsley"), "parsley");
        assert_eq!(n("3 tbsp extra-virgin olive oil"), "olive oil");
    }

    #[test]
    fn test_collapses_punctuation() {
        assert_eq!(n("  Garlic ,,  ,  "), "garlic");
        assert_eq!(n("salt, pepper"), "salt, pepper");
        assert_eq!(n(""), "");
    }

    #[test]
    fn test_idempotent() {
        for raw in [
            "2 teaspoons crushed red pepper (optional)",
            "1 (14 oz) can diced tomatoes, drained",
            "a handful of fresh basil leaves, torn",
            "Salt and freshly ground black pepper, to taste",
            "1 red (or yellow) bell pepper - seeded",
            "2 c. all purpose flour",
            "((nested (parens)) butter",
            "unbalanced ( aside",
        ] {
            let once = normalize(raw);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }
}
