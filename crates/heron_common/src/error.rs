use thiserror::Error;

use crate::types::{PageNumber, TransactionId, XidStatus};

/// Convenience alias for `Result<T, TransamError>`.
pub type TransamResult<T> = Result<T, TransamError>;

/// Convenience alias for `Result<T, HeronError>`.
pub type HeronResult<T> = Result<T, HeronError>;

/// Error classification for recovery/halt decisions.
///
/// - `Usage`     — caller queried an id it never allocated; may be treated
///   locally as "in progress" but is logged
/// - `Transient` — I/O or durability-log failure; the enclosing transaction
///   fails and may be retried
/// - `Fatal`     — incompatible on-disk format or violated invariant;
///   startup/operation must halt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    Transient,
    Fatal,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum HeronError {
    #[error("Transaction access error: {0}")]
    Transam(#[from] TransamError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Transaction-identity subsystem errors.
#[derive(Error, Debug)]
pub enum TransamError {
    #[error("Transaction id {0} is below the first normal id")]
    XidOutOfRange(TransactionId),

    #[error("Status page {0} has never been written")]
    PageNotFound(PageNumber),

    #[error("Transaction system version mismatch: store has {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Transaction {xid} already recorded as {existing:?}, refusing to record {requested:?}")]
    OutcomeConflict {
        xid: TransactionId,
        existing: XidStatus,
        requested: XidStatus,
    },

    #[error("Cannot record {0:?}: only terminal statuses are written")]
    InvalidStatusWrite(XidStatus),

    #[error("Durability log error: {0}")]
    Log(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeronError {
    /// Classify this error for recovery/halt decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HeronError::Transam(e) => e.kind(),
            HeronError::Internal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}

impl TransamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Callers are expected to only query ids they allocated; these
            // are recoverable as "unknown / in progress" but logged.
            TransamError::XidOutOfRange(_) => ErrorKind::Usage,
            TransamError::PageNotFound(_) => ErrorKind::Usage,
            TransamError::InvalidStatusWrite(_) => ErrorKind::Usage,

            TransamError::Log(_) => ErrorKind::Transient,
            TransamError::Io(_) => ErrorKind::Transient,
            TransamError::Serialization(_) => ErrorKind::Transient,

            // Interpreting an incompatible layout risks silent corruption,
            // and a double outcome write is a logic bug.
            TransamError::VersionMismatch { .. } => ErrorKind::Fatal,
            TransamError::OutcomeConflict { .. } => ErrorKind::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}
