//! Engine-facing facade wiring the page store, durability log, allocator
//! and outcome service together.

use std::sync::Arc;

use heron_common::config::TransamConfig;
use heron_common::error::TransamResult;

use crate::allocator::IdentifierAllocator;
use crate::bootstrap;
use crate::outcome::OutcomeService;
use crate::page_store::PageStore;
use crate::status_store::StatusStore;
use crate::wal::DurabilityLog;

pub struct TransactionSystem {
    store: Arc<StatusStore>,
    allocator: IdentifierAllocator,
    outcomes: OutcomeService,
}

impl std::fmt::Debug for TransactionSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSystem").finish_non_exhaustive()
    }
}

impl TransactionSystem {
    /// Bootstrap a brand-new installation: stamp the store and seed the
    /// allocator with its initial values.
    pub fn create(
        pages: Arc<dyn PageStore>,
        log: Arc<dyn DurabilityLog>,
        config: &TransamConfig,
    ) -> TransamResult<Self> {
        let store = Arc::new(StatusStore::new(pages));
        let state = bootstrap::initialize_on_first_use(&store, log.as_ref())?;
        Ok(Self::assemble(store, log, state, config))
    }

    /// Open an existing installation: validate the format stamp first,
    /// then rebuild the allocator from the durable log tail. No state is
    /// touched when validation fails.
    pub fn open(
        pages: Arc<dyn PageStore>,
        log: Arc<dyn DurabilityLog>,
        config: &TransamConfig,
    ) -> TransamResult<Self> {
        let store = Arc::new(StatusStore::new(pages));
        bootstrap::validate_on_startup(&store)?;
        let state = bootstrap::recover_allocator_state(log.as_ref())?;
        Ok(Self::assemble(store, log, state, config))
    }

    fn assemble(
        store: Arc<StatusStore>,
        log: Arc<dyn DurabilityLog>,
        state: crate::allocator::AllocatorState,
        config: &TransamConfig,
    ) -> Self {
        let allocator = IdentifierAllocator::new(state, log, config);
        let outcomes = OutcomeService::new(store.clone());
        Self {
            store,
            allocator,
            outcomes,
        }
    }

    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    pub fn outcomes(&self) -> &OutcomeService {
        &self.outcomes
    }

    pub fn status_store(&self) -> &StatusStore {
        &self.store
    }
}
