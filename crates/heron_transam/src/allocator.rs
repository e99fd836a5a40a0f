//! Shared, process-wide counters for the next transaction id and next
//! object id.
//!
//! The two counters are guarded by separate locks that are never held at
//! the same time and never held across blocking I/O — with one deliberate,
//! bounded exception: the single durability append that reserves a fresh
//! object-id batch.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use heron_common::config::TransamConfig;
use heron_common::error::TransamResult;
use heron_common::types::{Lsn, ObjectId, TransactionId};

use crate::wal::{DurabilityLog, LogRecord};

/// Snapshot of the allocator counters. Not independently durable;
/// reconstructed from the durability log at restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorState {
    pub next_xid: TransactionId,
    pub next_oid: ObjectId,
    /// Object ids already reserved through a durability write but not yet
    /// handed out.
    pub oid_batch_remaining: u32,
}

impl AllocatorState {
    /// Seeds for a freshly created installation.
    pub fn bootstrap() -> Self {
        Self {
            next_xid: TransactionId::FIRST_NORMAL,
            next_oid: ObjectId::FIRST_NORMAL,
            oid_batch_remaining: 0,
        }
    }
}

/// Object-id counter. Tracked as `(next, reserved_until)` rather than a
/// remaining count so that an external id jumping past the durable boundary
/// can never let an allocation escape the reservation.
struct OidCounter {
    next: u32,
    /// First object id NOT covered by a durable reservation.
    reserved_until: u32,
}

impl OidCounter {
    fn batch_remaining(&self) -> u32 {
        self.reserved_until.saturating_sub(self.next)
    }
}

/// Process-wide identifier allocator, shared by all backends.
pub struct IdentifierAllocator {
    next_xid: Mutex<TransactionId>,
    oid: Mutex<OidCounter>,
    log: Arc<dyn DurabilityLog>,
    oid_batch_size: u32,
}

impl IdentifierAllocator {
    pub fn new(
        state: AllocatorState,
        log: Arc<dyn DurabilityLog>,
        config: &TransamConfig,
    ) -> Self {
        Self {
            next_xid: Mutex::new(state.next_xid),
            oid: Mutex::new(OidCounter {
                next: state.next_oid.0,
                reserved_until: state.next_oid.0 + state.oid_batch_remaining,
            }),
            log,
            oid_batch_size: config.oid_batch_size,
        }
    }

    /// Hand out the next transaction id. No I/O under the lock.
    pub fn next_transaction_id(&self) -> TransactionId {
        let mut next = self.next_xid.lock();
        let xid = *next;
        *next = next.next();
        xid
    }

    /// Current xid high-water mark, without consuming an id.
    pub fn peek_transaction_id(&self) -> TransactionId {
        *self.next_xid.lock()
    }

    /// Hand out the next object id.
    ///
    /// When the current batch is exhausted, one durability record reserving
    /// `next + batch_size` is appended before any state advances; ids below
    /// a durable boundary are never reissued even across a crash. A failed
    /// append leaves the counter untouched and propagates to the caller.
    pub fn next_object_id(&self) -> TransamResult<ObjectId> {
        let mut oid = self.oid.lock();
        if oid.next >= oid.reserved_until {
            let boundary = oid.next + self.oid_batch_size;
            self.log
                .append(&LogRecord::OidBoundary {
                    boundary: ObjectId(boundary),
                })?;
            oid.reserved_until = boundary;
            debug!(boundary, "reserved object id batch");
        }
        let out = ObjectId(oid.next);
        oid.next += 1;
        Ok(out)
    }

    /// Make sure no future allocation collides with an object id assigned
    /// directly by an external process (bulk/bootstrap load). Best-effort;
    /// consumes no durability write.
    pub fn note_external_object_id(&self, assigned: ObjectId) {
        let mut oid = self.oid.lock();
        if assigned.0 >= oid.next {
            oid.next = assigned.0 + 1;
        }
    }

    /// Persist the current xid high-water mark so restart recovery can
    /// reseed the counter. The peek and the append are deliberately not
    /// atomic: the record is a floor, not an exact count, and the xid lock
    /// must never cover I/O.
    pub fn log_xid_high_water(&self) -> TransamResult<Lsn> {
        let next_xid = self.peek_transaction_id();
        self.log.append(&LogRecord::XidHighWater { next_xid })
    }

    /// Snapshot of both counters. The two locks are taken one after the
    /// other, so the snapshot is only consistent per counter.
    pub fn state(&self) -> AllocatorState {
        let next_xid = *self.next_xid.lock();
        let oid = self.oid.lock();
        AllocatorState {
            next_xid,
            next_oid: ObjectId(oid.next),
            oid_batch_remaining: oid.batch_remaining(),
        }
    }
}
