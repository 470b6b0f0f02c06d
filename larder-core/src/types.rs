//! Shared data model for the ingredient pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Brand owner value that marks a catalog entry as a generic placeholder.
pub const GENERIC_BRAND_OWNER: &str = "generic";

/// Quality label on a mapping or product tag.
///
/// Variants are declared lowest first so the derived `Ord` gives
/// `Low < Suggested < Confident`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Suggested,
    Confident,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Suggested => "suggested",
            Confidence::Confident => "confident",
        }
    }

    /// True when a tag at `actual` satisfies a caller requiring `self`.
    /// A missing tier never satisfies anything.
    pub fn admits(&self, actual: Option<Confidence>) -> bool {
        actual.is_some_and(|a| a >= *self)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "suggested" => Ok(Confidence::Suggested),
            "confident" => Ok(Confidence::Confident),
            other => Err(format!("unknown confidence tier: {other}")),
        }
    }
}

/// Major allergen categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllergenKind {
    Milk,
    Eggs,
    Fish,
    Shellfish,
    TreeNuts,
    Peanuts,
    Wheat,
    Soy,
    Sesame,
    Gluten,
    Mustard,
    Sulfites,
}

impl AllergenKind {
    pub const ALL: [AllergenKind; 12] = [
        AllergenKind::Milk,
        AllergenKind::Eggs,
        AllergenKind::Fish,
        AllergenKind::Shellfish,
        AllergenKind::TreeNuts,
        AllergenKind::Peanuts,
        AllergenKind::Wheat,
        AllergenKind::Soy,
        AllergenKind::Sesame,
        AllergenKind::Gluten,
        AllergenKind::Mustard,
        AllergenKind::Sulfites,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AllergenKind::Milk => "milk",
            AllergenKind::Eggs => "eggs",
            AllergenKind::Fish => "fish",
            AllergenKind::Shellfish => "shellfish",
            AllergenKind::TreeNuts => "tree-nuts",
            AllergenKind::Peanuts => "peanuts",
            AllergenKind::Wheat => "wheat",
            AllergenKind::Soy => "soy",
            AllergenKind::Sesame => "sesame",
            AllergenKind::Gluten => "gluten",
            AllergenKind::Mustard => "mustard",
            AllergenKind::Sulfites => "sulfites",
        }
    }
}

impl fmt::Display for AllergenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllergenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['_', ' '], "-");
        AllergenKind::ALL
            .iter()
            .find(|k| k.as_str() == wanted)
            .copied()
            .ok_or_else(|| format!("unknown allergen: {s}"))
    }
}

/// Ordered set of allergens, so reports and API output are deterministic.
pub type AllergenSet = BTreeSet<AllergenKind>;

/// Output of the normalizer: lowercase, whitespace-collapsed ingredient text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Wrap text that is already known to be normalized (store keys, test data).
    pub fn from_normalized(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A standardized ingredient concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalIngredient {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub allergen_tags: AllergenSet,
}

impl CanonicalIngredient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            aliases: BTreeSet::new(),
            allergen_tags: AllergenSet::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    pub fn with_allergen(mut self, allergen: AllergenKind) -> Self {
        self.allergen_tags.insert(allergen);
        self
    }

    /// Name followed by every alias.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Association from a normalized mention to a canonical ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub normalized_name: NormalizedName,
    pub canonical_id: Uuid,
    pub confidence: Confidence,
}

/// One-level rule: a canonical named `derivative_term` carries `allergen`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllergenDerivative {
    pub allergen: AllergenKind,
    pub derivative_term: String,
}

impl AllergenDerivative {
    pub fn new(allergen: AllergenKind, term: impl Into<String>) -> Self {
        Self {
            allergen,
            derivative_term: term.into(),
        }
    }
}

/// A configured substitute for a canonical ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub canonical_id: Uuid,
    pub substitute_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub description: String,
    pub brand_owner: String,
    #[serde(default)]
    pub canonical_tag: Option<String>,
    #[serde(default)]
    pub canonical_tag_confidence: Option<Confidence>,
}

impl Product {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        brand_owner: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            brand_owner: brand_owner.into(),
            canonical_tag: None,
            canonical_tag_confidence: None,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>, confidence: Confidence) -> Self {
        self.canonical_tag = Some(tag.into());
        self.canonical_tag_confidence = Some(confidence);
        self
    }

    /// Generic placeholders carry the sentinel brand owner (or none at all).
    pub fn is_generic(&self) -> bool {
        let brand = self.brand_owner.trim();
        brand.is_empty() || brand.eq_ignore_ascii_case(GENERIC_BRAND_OWNER)
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No row existed; the new one was written.
    Inserted,
    /// A row existed at a lower tier and was replaced.
    Upgraded,
    /// A row existed at the same or a higher tier; nothing changed.
    Unchanged,
}

impl UpsertOutcome {
    /// Decide a tiered write: only a strictly higher tier replaces an existing row.
    pub fn decide(existing: Option<Confidence>, incoming: Confidence) -> Self {
        match existing {
            None => UpsertOutcome::Inserted,
            Some(current) if incoming > current => UpsertOutcome::Upgraded,
            Some(_) => UpsertOutcome::Unchanged,
        }
    }

    pub fn wrote(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Fold case and whitespace so "Peanut  Butter" and "peanut butter" collide.
pub fn term_key(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
