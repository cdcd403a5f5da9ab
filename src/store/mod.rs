mod in_memory;

pub use in_memory::InMemoryProfileStore;

use std::fmt;

pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreErrorCode {
    Unavailable,
    PermissionDenied,
    Internal,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::Unavailable => "store/unavailable",
            StoreErrorCode::PermissionDenied => "store/permission-denied",
            StoreErrorCode::Internal => "store/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreError {
    pub code: StoreErrorCode,
    message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn internal_error(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Internal, message)
}

/// Key-value-by-identifier document store consumed by the reconciler.
///
/// Records are flat JSON field maps. `set` with `merge` folds the given
/// fields over the stored document, last-write-wins per field; without
/// `merge` it replaces the document. Durability and replication are the
/// backend's concern, not this crate's.
pub trait ProfileStore: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Fields>>;

    fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> StoreResult<()>;
}
