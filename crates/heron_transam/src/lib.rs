//! Transaction-identity and outcome-tracking core: unique, monotonically
//! increasing transaction and object identifiers for concurrent backends,
//! and a durable, bit-packed record of each transaction's terminal outcome.

pub mod allocator;
pub mod bootstrap;
pub mod outcome;
pub mod page_store;
pub mod status_store;
pub mod system;
pub mod wal;


pub use allocator::{AllocatorState, IdentifierAllocator};
pub use bootstrap::{initialize_on_first_use, recover_allocator_state, validate_on_startup};
pub use outcome::{OutcomeMode, OutcomeService, SessionContext};
pub use page_store::{FilePageStore, MemPageStore, Page, PageStore};
pub use status_store::{StatusStore, PAGE_HEADER_SIZE, TRANSAM_FORMAT_VERSION};
pub use system::TransactionSystem;
pub use wal::{DurabilityLog, FileLog, LogRecord, MemLog};

// Re-export from heron_common for convenience
pub use heron_common::config::{SyncMode, TransamConfig};
pub use heron_common::error::{ErrorKind, TransamError, TransamResult};
pub use heron_common::types::{Lsn, ObjectId, PageNumber, TransactionId, XidStatus};
