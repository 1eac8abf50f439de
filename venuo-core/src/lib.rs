pub mod identity;
pub mod payment;
pub mod storage;

/// Errors surfaced by the ledger store itself, as opposed to the domain
/// rules layered on top of it. A `RevConflict` means another writer
/// committed first; callers refetch the aggregate and retry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("revision conflict")]
    RevConflict,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
