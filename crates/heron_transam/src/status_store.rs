//! Persistent, block-structured store mapping a transaction id to its
//! 2-bit outcome code.
//!
//! Layout: every page starts with a 16-byte header
//! `[lsn: u64 LE][version: u32 LE][reserved: u32]`; the version field is
//! meaningful on page 0 only. The rest of the page is a densely packed
//! array of 2-bit status fields, LSB-first: entry `i` lives in data byte
//! `i / 4`, bits `2*(i%4) .. 2*(i%4)+2`.

use std::sync::Arc;

use tracing::warn;

use heron_common::error::{TransamError, TransamResult};
use heron_common::types::{Lsn, PageNumber, TransactionId, XidStatus};

use crate::page_store::PageStore;

/// Transaction system format version, stamped on page 0 at installation
/// creation. Version 200 means major version 2, minor version 0; stores
/// with a different major version cannot be safely interpreted.
pub const TRANSAM_FORMAT_VERSION: u32 = 200;

/// Per-page header size: lsn (8) + version (4) + reserved (4).
pub const PAGE_HEADER_SIZE: usize = 16;

const LSN_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 8;

pub struct StatusStore {
    pages: Arc<dyn PageStore>,
    entries_per_page: u64,
}

impl StatusStore {
    pub fn new(pages: Arc<dyn PageStore>) -> Self {
        let page_size = pages.page_size();
        assert!(
            page_size > PAGE_HEADER_SIZE,
            "page size {page_size} leaves no room for status entries"
        );
        let entries_per_page = ((page_size - PAGE_HEADER_SIZE) * 4) as u64;
        Self {
            pages,
            entries_per_page,
        }
    }

    /// Number of 2-bit slots per page.
    pub fn entries_per_page(&self) -> u64 {
        self.entries_per_page
    }

    /// Map a transaction id to its page and bit offset within the page's
    /// data area. Pure; fails for the reserved ids below `FIRST_NORMAL`.
    pub fn locate(&self, xid: TransactionId) -> TransamResult<(PageNumber, u64)> {
        if !xid.is_normal() {
            return Err(TransamError::XidOutOfRange(xid));
        }
        let index = u64::from(xid.0 - TransactionId::FIRST_NORMAL.0);
        let page = PageNumber(index / self.entries_per_page);
        let bit = 2 * (index % self.entries_per_page);
        Ok((page, bit))
    }

    /// Read the recorded status of `xid`. Fails with `PageNotFound` when
    /// the id's page was never written; callers must only query ids they
    /// know were allocated (an unwritten slot reads as `InProgress`).
    pub fn status(&self, xid: TransactionId) -> TransamResult<XidStatus> {
        let (page_number, bit) = self.locate(xid)?;
        let page = self.pages.fetch(page_number).map_err(|e| {
            if matches!(e, TransamError::PageNotFound(_)) {
                warn!(%xid, %page_number, "status queried for an id whose page was never written");
            }
            e
        })?;
        let page = page.read();
        Ok(read_slot(&page.data, bit))
    }

    /// Record a terminal status for `xid` and mark the page dirty.
    ///
    /// A status transitions at most once: rewriting the same terminal value
    /// is an accepted no-op, a *different* terminal value is a logic error.
    pub fn set_status(&self, xid: TransactionId, status: XidStatus) -> TransamResult<()> {
        if !status.is_terminal() {
            // Absence of a record already means in-progress.
            return Err(TransamError::InvalidStatusWrite(status));
        }
        let (page_number, bit) = self.locate(xid)?;
        let page = self.pages.fetch_or_allocate(page_number)?;
        let mut page = page.write();
        let existing = read_slot(&page.data, bit);
        if existing.is_terminal() {
            if existing == status {
                return Ok(());
            }
            return Err(TransamError::OutcomeConflict {
                xid,
                existing,
                requested: status,
            });
        }
        write_slot(&mut page.data, bit, status);
        page.dirty = true;
        Ok(())
    }

    /// Stamp page 0 with a format version.
    pub fn write_version_stamp(&self, version: u32) -> TransamResult<()> {
        let page = self.pages.fetch_or_allocate(PageNumber(0))?;
        let mut page = page.write();
        page.data[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&version.to_le_bytes());
        page.dirty = true;
        Ok(())
    }

    /// Read the format version from page 0.
    pub fn read_version_stamp(&self) -> TransamResult<u32> {
        let page = self.pages.fetch(PageNumber(0))?;
        let page = page.read();
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&page.data[VERSION_OFFSET..VERSION_OFFSET + 4]);
        Ok(u32::from_le_bytes(raw))
    }

    /// Record the log-sequence marker for a page. Called by the outer
    /// write-ahead log to order page writeback against log flushes.
    pub fn set_page_lsn(&self, page_number: PageNumber, lsn: Lsn) -> TransamResult<()> {
        let page = self.pages.fetch_or_allocate(page_number)?;
        let mut page = page.write();
        page.data[LSN_OFFSET..LSN_OFFSET + 8].copy_from_slice(&lsn.0.to_le_bytes());
        page.dirty = true;
        Ok(())
    }

    pub fn page_lsn(&self, page_number: PageNumber) -> TransamResult<Lsn> {
        let page = self.pages.fetch(page_number)?;
        let page = page.read();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&page.data[LSN_OFFSET..LSN_OFFSET + 8]);
        Ok(Lsn(u64::from_le_bytes(raw)))
    }

    /// Write back dirty status pages.
    pub fn flush(&self) -> TransamResult<()> {
        self.pages.flush()
    }
}

fn read_slot(data: &[u8], bit: u64) -> XidStatus {
    let byte = PAGE_HEADER_SIZE + (bit / 8) as usize;
    let shift = (bit % 8) as u32;
    XidStatus::from_bits(data[byte] >> shift)
}

fn write_slot(data: &mut [u8], bit: u64, status: XidStatus) {
    let byte = PAGE_HEADER_SIZE + (bit / 8) as usize;
    let shift = (bit % 8) as u32;
    data[byte] = (data[byte] & !(0b11 << shift)) | (status.as_bits() << shift);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_store::MemPageStore;

    fn store_with_page_size(page_size: usize) -> StatusStore {
        StatusStore::new(Arc::new(MemPageStore::new(page_size)))
    }

    #[test]
    fn test_locate_rejects_reserved_ids() {
        let store = store_with_page_size(8192);
        assert!(store.locate(TransactionId::NULL).is_err());
        assert!(store.locate(TransactionId::BOOTSTRAP).is_err());
        assert!(store.locate(TransactionId::FIRST_NORMAL).is_ok());
    }

    #[test]
    fn test_locate_formula() {
        let store = store_with_page_size(8192);
        let entries = (8192 - PAGE_HEADER_SIZE as u64) * 4;
        assert_eq!(store.entries_per_page(), entries);

        // First normal id maps to slot 0 of page 0.
        assert_eq!(
            store.locate(TransactionId(2)).unwrap(),
            (PageNumber(0), 0)
        );
        assert_eq!(
            store.locate(TransactionId(3)).unwrap(),
            (PageNumber(0), 2)
        );
        // First id of page 1.
        let first_of_page_1 = TransactionId(2 + entries as u32);
        assert_eq!(
            store.locate(first_of_page_1).unwrap(),
            (PageNumber(1), 0)
        );
        // Last id of page 0.
        let last_of_page_0 = TransactionId(2 + entries as u32 - 1);
        assert_eq!(
            store.locate(last_of_page_0).unwrap(),
            (PageNumber(0), 2 * (entries - 1))
        );
    }

    #[test]
    fn test_set_and_get_status() {
        let store = store_with_page_size(64);
        store
            .set_status(TransactionId(2), XidStatus::Committed)
            .unwrap();
        assert_eq!(store.status(TransactionId(2)).unwrap(), XidStatus::Committed);
    }

    #[test]
    fn test_unwritten_page_is_not_found() {
        let store = store_with_page_size(64);
        let err = store.status(TransactionId(2)).unwrap_err();
        assert!(matches!(err, TransamError::PageNotFound(_)));
    }

    #[test]
    fn test_set_status_rejects_in_progress() {
        let store = store_with_page_size(64);
        let err = store
            .set_status(TransactionId(2), XidStatus::InProgress)
            .unwrap_err();
        assert!(matches!(err, TransamError::InvalidStatusWrite(_)));
    }

    #[test]
    fn test_idempotent_rewrite_and_conflict() {
        let store = store_with_page_size(64);
        store
            .set_status(TransactionId(4), XidStatus::Committed)
            .unwrap();
        // Same terminal value again: fine.
        store
            .set_status(TransactionId(4), XidStatus::Committed)
            .unwrap();
        // Different terminal value: logic error, original value survives.
        let err = store
            .set_status(TransactionId(4), XidStatus::Aborted)
            .unwrap_err();
        assert!(matches!(err, TransamError::OutcomeConflict { .. }));
        assert_eq!(store.status(TransactionId(4)).unwrap(), XidStatus::Committed);
    }

    #[test]
    fn test_bit_isolation_within_a_byte() {
        let store = store_with_page_size(64);
        // Xids 2..=5 share data byte 0 of page 0.
        store.set_status(TransactionId(2), XidStatus::Committed).unwrap();
        store.set_status(TransactionId(3), XidStatus::Aborted).unwrap();
        store.set_status(TransactionId(5), XidStatus::SubCommitted).unwrap();

        assert_eq!(store.status(TransactionId(2)).unwrap(), XidStatus::Committed);
        assert_eq!(store.status(TransactionId(3)).unwrap(), XidStatus::Aborted);
        assert_eq!(store.status(TransactionId(4)).unwrap(), XidStatus::InProgress);
        assert_eq!(store.status(TransactionId(5)).unwrap(), XidStatus::SubCommitted);
    }

    #[test]
    fn test_on_page_bit_packing_is_lsb_first() {
        let pages = Arc::new(MemPageStore::new(64));
        let store = StatusStore::new(pages.clone());
        store.set_status(TransactionId(2), XidStatus::Committed).unwrap(); // slot 0 = 0b10
        store.set_status(TransactionId(3), XidStatus::Aborted).unwrap(); // slot 1 = 0b01

        let page = pages.fetch(PageNumber(0)).unwrap();
        let page = page.read();
        // 0b10 at shift 0, 0b01 at shift 2.
        assert_eq!(page.data[PAGE_HEADER_SIZE], 0b0000_0110);
        assert!(page.dirty);
    }

    #[test]
    fn test_version_stamp_round_trip() {
        let store = store_with_page_size(64);
        store.write_version_stamp(TRANSAM_FORMAT_VERSION).unwrap();
        assert_eq!(store.read_version_stamp().unwrap(), TRANSAM_FORMAT_VERSION);
    }

    #[test]
    fn test_version_stamp_does_not_clobber_statuses() {
        let store = store_with_page_size(64);
        store.set_status(TransactionId(2), XidStatus::Committed).unwrap();
        store.write_version_stamp(TRANSAM_FORMAT_VERSION).unwrap();
        store.set_page_lsn(PageNumber(0), Lsn(42)).unwrap();
        assert_eq!(store.status(TransactionId(2)).unwrap(), XidStatus::Committed);
        assert_eq!(store.page_lsn(PageNumber(0)).unwrap(), Lsn(42));
        assert_eq!(store.read_version_stamp().unwrap(), TRANSAM_FORMAT_VERSION);
    }
}
