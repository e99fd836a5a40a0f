use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier. Strictly increasing allocation order, unique
/// for the lifetime of the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u32);

impl TransactionId {
    /// "No transaction" / invalid.
    pub const NULL: TransactionId = TransactionId(0);
    /// Used only during initial catalog load.
    pub const BOOTSTRAP: TransactionId = TransactionId(1);
    /// First ordinary transaction id ever issued.
    pub const FIRST_NORMAL: TransactionId = TransactionId(2);

    /// True for ids the allocator actually hands out; the reserved ids
    /// below `FIRST_NORMAL` never have a tracked outcome.
    pub fn is_normal(self) -> bool {
        self >= Self::FIRST_NORMAL
    }

    pub fn next(self) -> TransactionId {
        TransactionId(self.0 + 1)
    }
}

/// Identifier of a catalog/storage object. Uniqueness matters, allocation
/// order does not; ids below `FIRST_NORMAL` belong to built-in objects and
/// are never issued by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// First object id the allocator may hand out. Everything below is
    /// reserved for built-in catalog objects.
    pub const FIRST_NORMAL: ObjectId = ObjectId(16384);

    pub fn next(self) -> ObjectId {
        ObjectId(self.0 + 1)
    }
}

/// Number of a fixed-size page within the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageNumber(pub u64);

/// Log sequence number assigned by the durability log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Lsn(pub u64);

/// Outcome of a transaction id, representable in 2 bits. The codes are
/// the on-disk bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum XidStatus {
    InProgress = 0b00,
    Aborted = 0b01,
    Committed = 0b10,
    /// Commit of a subtransaction; counts as committed for visibility.
    SubCommitted = 0b11,
}

impl XidStatus {
    pub fn from_bits(bits: u8) -> XidStatus {
        match bits & 0b11 {
            0b00 => XidStatus::InProgress,
            0b01 => XidStatus::Aborted,
            0b10 => XidStatus::Committed,
            _ => XidStatus::SubCommitted,
        }
    }

    pub fn as_bits(self) -> u8 {
        self as u8
    }

    /// Terminal statuses are recorded at most once and never overwritten.
    pub fn is_terminal(self) -> bool {
        self != XidStatus::InProgress
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xid:{}", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lsn:{}", self.0)
    }
}
