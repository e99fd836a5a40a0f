//! One-time installation setup, startup validation, and allocator
//! recovery from the durability log.

use tracing::{error, info};

use heron_common::error::{TransamError, TransamResult};

use crate::allocator::AllocatorState;
use crate::status_store::{StatusStore, TRANSAM_FORMAT_VERSION};
use crate::wal::{DurabilityLog, LogRecord};

/// Create the transaction system for a brand-new installation: stamp the
/// store with the format version and seed the allocator. Invoked exactly
/// once, at installation creation.
pub fn initialize_on_first_use(
    store: &StatusStore,
    log: &dyn DurabilityLog,
) -> TransamResult<AllocatorState> {
    let state = AllocatorState::bootstrap();
    store.write_version_stamp(TRANSAM_FORMAT_VERSION)?;
    log.append(&LogRecord::Init {
        next_xid: state.next_xid,
        next_oid: state.next_oid,
    })?;
    store.flush()?;
    info!(
        version = TRANSAM_FORMAT_VERSION,
        "initialized transaction status store"
    );
    Ok(state)
}

/// Refuse to start against a store written by an incompatible format.
/// A mismatch is fatal: interpreting an unknown layout risks silent
/// corruption, so there is no recovery path.
pub fn validate_on_startup(store: &StatusStore) -> TransamResult<()> {
    let found = store.read_version_stamp()?;
    if found != TRANSAM_FORMAT_VERSION {
        error!(
            found,
            expected = TRANSAM_FORMAT_VERSION,
            "transaction store format version mismatch"
        );
        return Err(TransamError::VersionMismatch {
            found,
            expected: TRANSAM_FORMAT_VERSION,
        });
    }
    Ok(())
}

/// Rebuild the allocator counters from the durable log tail.
///
/// `Init` seeds both counters, `OidBoundary` raises the oid counter,
/// `XidHighWater` raises the xid counter. The batch remainder is always
/// zero after recovery: ids reserved but never handed out before the crash
/// are burned, never reissued.
pub fn recover_allocator_state(log: &dyn DurabilityLog) -> TransamResult<AllocatorState> {
    let mut state = AllocatorState::bootstrap();
    for record in log.records()? {
        match record {
            LogRecord::Init { next_xid, next_oid } => {
                state.next_xid = next_xid;
                state.next_oid = next_oid;
            }
            LogRecord::OidBoundary { boundary } => {
                state.next_oid = state.next_oid.max(boundary);
            }
            LogRecord::XidHighWater { next_xid } => {
                state.next_xid = state.next_xid.max(next_xid);
            }
        }
    }
    state.oid_batch_remaining = 0;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use heron_common::types::{ObjectId, TransactionId};

    use crate::page_store::MemPageStore;
    use crate::wal::MemLog;

    fn fresh_store() -> StatusStore {
        StatusStore::new(Arc::new(MemPageStore::new(64)))
    }

    #[test]
    fn test_initialize_then_validate() {
        let store = fresh_store();
        let log = MemLog::new();

        let state = initialize_on_first_use(&store, &log).unwrap();
        assert_eq!(state, AllocatorState::bootstrap());
        assert_eq!(state.next_xid, TransactionId(2));
        assert_eq!(state.next_oid, ObjectId(16384));

        validate_on_startup(&store).unwrap();
        assert_eq!(log.records().unwrap().len(), 1);
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let store = fresh_store();
        store
            .write_version_stamp(TRANSAM_FORMAT_VERSION + 1)
            .unwrap();

        let err = validate_on_startup(&store).unwrap_err();
        match err {
            TransamError::VersionMismatch { found, expected } => {
                assert_eq!(found, TRANSAM_FORMAT_VERSION + 1);
                assert_eq!(expected, TRANSAM_FORMAT_VERSION);
            }
            other => panic!("expected VersionMismatch, got {other}"),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_fails_on_virgin_store() {
        // No stamp was ever written; startup must not proceed silently.
        assert!(validate_on_startup(&fresh_store()).is_err());
    }

    #[test]
    fn test_recovery_replay() {
        let log = MemLog::new();
        log.append(&LogRecord::Init {
            next_xid: TransactionId(2),
            next_oid: ObjectId(16384),
        })
        .unwrap();
        log.append(&LogRecord::OidBoundary {
            boundary: ObjectId(24576),
        })
        .unwrap();
        log.append(&LogRecord::XidHighWater {
            next_xid: TransactionId(77),
        })
        .unwrap();
        // An older boundary must not drag the counter backwards.
        log.append(&LogRecord::OidBoundary {
            boundary: ObjectId(20000),
        })
        .unwrap();

        let state = recover_allocator_state(&log).unwrap();
        assert_eq!(state.next_xid, TransactionId(77));
        assert_eq!(state.next_oid, ObjectId(24576));
        assert_eq!(state.oid_batch_remaining, 0);
    }

    #[test]
    fn test_recovery_of_empty_log_yields_bootstrap_seeds() {
        let state = recover_allocator_state(&MemLog::new()).unwrap();
        assert_eq!(state, AllocatorState::bootstrap());
    }
}
