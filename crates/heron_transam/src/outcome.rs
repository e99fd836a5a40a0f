//! Commit/abort recording and outcome queries — the public face of the
//! transaction-identity core.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use heron_common::error::{TransamError, TransamResult};
use heron_common::types::{TransactionId, XidStatus};

use crate::status_store::StatusStore;

/// How outcome queries are answered for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutcomeMode {
    #[default]
    Normal,
    /// Initial catalog load: every id reports as committed and the store
    /// is bypassed entirely. Never valid during normal operation.
    BootstrapOverride,
}

/// Per-session context passed to outcome queries, so a bootstrap session
/// and normal sessions can coexist in one address space without a shared
/// process-wide flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext {
    pub mode: OutcomeMode,
}

impl SessionContext {
    pub fn normal() -> Self {
        Self {
            mode: OutcomeMode::Normal,
        }
    }

    pub fn bootstrap() -> Self {
        Self {
            mode: OutcomeMode::BootstrapOverride,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedOutcome {
    xid: TransactionId,
    status: XidStatus,
}

/// Records and queries transaction outcomes.
pub struct OutcomeService {
    store: Arc<StatusStore>,
    /// Most recently resolved (xid, status). Pure locality optimization:
    /// only terminal statuses are cached, and correctness never depends on
    /// a hit.
    cache: Mutex<Option<CachedOutcome>>,
}

impl OutcomeService {
    pub fn new(store: Arc<StatusStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    /// Record `xid` as committed. The caller must have made the commit
    /// durable (or replayable) in the outer write-ahead log first.
    pub fn commit(&self, xid: TransactionId) -> TransamResult<()> {
        self.record(xid, XidStatus::Committed)
    }

    /// Record `xid` as aborted.
    pub fn abort(&self, xid: TransactionId) -> TransamResult<()> {
        self.record(xid, XidStatus::Aborted)
    }

    /// Record the commit of a subtransaction. Counts as committed for
    /// `did_commit`, not as aborted for `did_abort`.
    pub fn commit_subtransaction(&self, xid: TransactionId) -> TransamResult<()> {
        self.record(xid, XidStatus::SubCommitted)
    }

    fn record(&self, xid: TransactionId, status: XidStatus) -> TransamResult<()> {
        self.store.set_status(xid, status)?;
        *self.cache.lock() = Some(CachedOutcome { xid, status });
        Ok(())
    }

    /// Did `xid` commit? In-progress ids and ids whose page was never
    /// written both answer false.
    pub fn did_commit(&self, cx: &SessionContext, xid: TransactionId) -> TransamResult<bool> {
        if cx.mode == OutcomeMode::BootstrapOverride {
            return Ok(true);
        }
        let status = self.lookup(xid)?;
        Ok(matches!(
            status,
            XidStatus::Committed | XidStatus::SubCommitted
        ))
    }

    /// Did `xid` abort?
    pub fn did_abort(&self, cx: &SessionContext, xid: TransactionId) -> TransamResult<bool> {
        if cx.mode == OutcomeMode::BootstrapOverride {
            return Ok(false);
        }
        Ok(self.lookup(xid)? == XidStatus::Aborted)
    }

    fn lookup(&self, xid: TransactionId) -> TransamResult<XidStatus> {
        if let Some(cached) = *self.cache.lock() {
            if cached.xid == xid {
                return Ok(cached.status);
            }
        }
        let status = match self.store.status(xid) {
            Ok(status) => status,
            // The page was never written: the id was never recorded, which
            // by convention reads as in-progress. Callers are expected to
            // only query ids they allocated, so this is logged upstream.
            Err(TransamError::PageNotFound(_)) => {
                warn!(%xid, "outcome query for an unrecorded id treated as in-progress");
                return Ok(XidStatus::InProgress);
            }
            Err(e) => return Err(e),
        };
        if status.is_terminal() {
            *self.cache.lock() = Some(CachedOutcome { xid, status });
        }
        Ok(status)
    }
}
