use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Canonical ingredient already exists for term: {0}")]
    DuplicateCanonical(String),

    #[error("Unknown canonical ingredient: {0}")]
    MissingCanonical(Uuid),

    #[error("Unknown product: {0}")]
    MissingProduct(String),

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rule file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CurationError {
    #[error("Name is empty after normalization: {0:?}")]
    EmptyName(String),

    #[error("{term:?} is already used by canonical {existing:?}")]
    Duplicate { term: String, existing: String },

    #[error("Unknown canonical ingredient: {0}")]
    UnknownCanonical(Uuid),

    #[error("No canonical ingredient named {0:?}")]
    UnknownTerm(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown canonical ingredient: {0}")]
    UnknownCanonical(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
