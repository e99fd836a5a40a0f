//! Page-store boundary consumed by the status store.
//!
//! Pages are handed out behind an `RwLock` so callers get block-granular
//! shared/exclusive latching: commits and aborts of unrelated transactions
//! only serialize when they land on the same page.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use heron_common::error::{TransamError, TransamResult};
use heron_common::types::PageNumber;

/// A single fixed-size page. `dirty` is caller-visible so the store knows
/// which pages need writeback.
#[derive(Debug)]
pub struct Page {
    pub data: Vec<u8>,
    pub dirty: bool,
}

impl Page {
    pub fn zeroed(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size],
            dirty: false,
        }
    }
}

/// Block-structured page storage.
///
/// `fetch` latches an existing page and fails with `PageNotFound` for pages
/// that were never written; `fetch_or_allocate` extends the store with
/// zeroed pages as needed. Read with `.read()`, write with `.write()` and
/// set `dirty`.
pub trait PageStore: Send + Sync {
    /// Page size in bytes. Fixed for the lifetime of the store.
    fn page_size(&self) -> usize;

    /// Latch an existing page.
    fn fetch(&self, page: PageNumber) -> TransamResult<Arc<RwLock<Page>>>;

    /// Latch a page, allocating it (zero-filled) if it does not exist yet.
    fn fetch_or_allocate(&self, page: PageNumber) -> TransamResult<Arc<RwLock<Page>>>;

    /// Write back dirty pages.
    fn flush(&self) -> TransamResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory page store
// ---------------------------------------------------------------------------

/// Heap-backed page store for tests and throwaway installations.
pub struct MemPageStore {
    page_size: usize,
    pages: RwLock<HashMap<u64, Arc<RwLock<Page>>>>,
}

impl MemPageStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: RwLock::new(HashMap::new()),
        }
    }
}

impl PageStore for MemPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn fetch(&self, page: PageNumber) -> TransamResult<Arc<RwLock<Page>>> {
        self.pages
            .read()
            .get(&page.0)
            .cloned()
            .ok_or(TransamError::PageNotFound(page))
    }

    fn fetch_or_allocate(&self, page: PageNumber) -> TransamResult<Arc<RwLock<Page>>> {
        if let Some(existing) = self.pages.read().get(&page.0) {
            return Ok(existing.clone());
        }
        let mut pages = self.pages.write();
        let entry = pages
            .entry(page.0)
            .or_insert_with(|| Arc::new(RwLock::new(Page::zeroed(self.page_size))));
        Ok(entry.clone())
    }

    fn flush(&self) -> TransamResult<()> {
        for page in self.pages.read().values() {
            page.write().dirty = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed page store
// ---------------------------------------------------------------------------

/// Single-file page store. Every touched page is kept resident in the page
/// table; `flush` writes the dirty ones back and syncs the file.
pub struct FilePageStore {
    page_size: usize,
    file: Mutex<File>,
    /// Pages in the on-disk extent when the store was opened. Pages at or
    /// beyond this number exist only once allocated through the table.
    disk_extent: u64,
    table: RwLock<HashMap<u64, Arc<RwLock<Page>>>>,
}

impl FilePageStore {
    pub fn open(path: &Path, page_size: usize) -> TransamResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let disk_extent = file.metadata()?.len() / page_size as u64;
        Ok(Self {
            page_size,
            file: Mutex::new(file),
            disk_extent,
            table: RwLock::new(HashMap::new()),
        })
    }

    fn read_from_disk(&self, page: PageNumber) -> TransamResult<Page> {
        let mut data = vec![0u8; self.page_size];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page.0 * self.page_size as u64))?;
        file.read_exact(&mut data)?;
        Ok(Page { data, dirty: false })
    }

    /// Fetch through the page table, falling back to disk for pages inside
    /// the on-disk extent. `allocate` controls what happens beyond it.
    fn fetch_inner(&self, page: PageNumber, allocate: bool) -> TransamResult<Arc<RwLock<Page>>> {
        if let Some(existing) = self.table.read().get(&page.0) {
            return Ok(existing.clone());
        }
        let mut table = self.table.write();
        // Re-check: another backend may have loaded it while we waited.
        if let Some(existing) = table.get(&page.0) {
            return Ok(existing.clone());
        }
        let loaded = if page.0 < self.disk_extent {
            self.read_from_disk(page)?
        } else if allocate {
            Page::zeroed(self.page_size)
        } else {
            return Err(TransamError::PageNotFound(page));
        };
        let entry = Arc::new(RwLock::new(loaded));
        table.insert(page.0, entry.clone());
        Ok(entry)
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn fetch(&self, page: PageNumber) -> TransamResult<Arc<RwLock<Page>>> {
        self.fetch_inner(page, false)
    }

    fn fetch_or_allocate(&self, page: PageNumber) -> TransamResult<Arc<RwLock<Page>>> {
        self.fetch_inner(page, true)
    }

    fn flush(&self) -> TransamResult<()> {
        let table = self.table.read();
        let mut file = self.file.lock();
        let mut wrote = false;
        for (number, page) in table.iter() {
            let mut page = page.write();
            if !page.dirty {
                continue;
            }
            file.seek(SeekFrom::Start(number * self.page_size as u64))?;
            file.write_all(&page.data)?;
            page.dirty = false;
            wrote = true;
        }
        if wrote {
            file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mem_store_fetch_missing_page() {
        let store = MemPageStore::new(64);
        let err = store.fetch(PageNumber(3)).unwrap_err();
        assert!(matches!(err, TransamError::PageNotFound(PageNumber(3))));
    }

    #[test]
    fn test_mem_store_allocate_then_fetch() {
        let store = MemPageStore::new(64);
        {
            let page = store.fetch_or_allocate(PageNumber(0)).unwrap();
            let mut page = page.write();
            page.data[0] = 0xAB;
            page.dirty = true;
        }
        let page = store.fetch(PageNumber(0)).unwrap();
        assert_eq!(page.read().data[0], 0xAB);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.pag");

        {
            let store = FilePageStore::open(&path, 64).unwrap();
            let page = store.fetch_or_allocate(PageNumber(2)).unwrap();
            {
                let mut page = page.write();
                page.data[5] = 0x7F;
                page.dirty = true;
            }
            store.flush().unwrap();
        }

        let store = FilePageStore::open(&path, 64).unwrap();
        let page = store.fetch(PageNumber(2)).unwrap();
        assert_eq!(page.read().data[5], 0x7F);
        // Page 3 was never written in either incarnation.
        assert!(store.fetch(PageNumber(3)).is_err());
    }

    #[test]
    fn test_file_store_unflushed_allocation_is_visible() {
        let dir = TempDir::new().unwrap();
        let store = FilePageStore::open(&dir.path().join("p"), 64).unwrap();
        store.fetch_or_allocate(PageNumber(9)).unwrap();
        // Visible through the table even before flush.
        assert!(store.fetch(PageNumber(9)).is_ok());
    }
}
