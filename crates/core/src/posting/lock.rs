//! In-process per-tenant lock registry.
//!
//! Serializes workers of one process per tenant so they queue locally instead
//! of piling up on the database advisory lock. The advisory lock taken inside
//! the posting transaction remains the authoritative one; this registry is an
//! optimisation only.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ledgerline_shared::types::TenantId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

/// Ref-counted map of tenant to async mutex. Entries are created on first use
/// and removed when the last holder or waiter lets go.
#[derive(Debug, Clone, Default)]
pub struct TenantLockRegistry {
    slots: Arc<DashMap<TenantId, Slot>>,
}

impl TenantLockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the tenant's lock.
    pub async fn acquire(&self, tenant_id: TenantId) -> TenantLockGuard {
        let guard = self.slot(tenant_id).lock_owned().await;
        TenantLockGuard {
            guard: Some(guard),
            tenant_id,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Waits at most `wait` for the tenant's lock.
    pub async fn acquire_timeout(&self, tenant_id: TenantId, wait: Duration) -> Option<TenantLockGuard> {
        if let Ok(guard) = tokio::time::timeout(wait, self.slot(tenant_id).lock_owned()).await {
            Some(TenantLockGuard {
                guard: Some(guard),
                tenant_id,
                slots: Arc::clone(&self.slots),
            })
        } else {
            remove_if_unused(&self.slots, tenant_id);
            None
        }
    }

    /// Number of tenants currently holding or waiting for a lock.
    #[must_use]
    pub fn active_tenants(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, tenant_id: TenantId) -> Slot {
        Arc::clone(self.slots.entry(tenant_id).or_default().value())
    }
}

fn remove_if_unused(slots: &DashMap<TenantId, Slot>, tenant_id: TenantId) {
    // Only the map's own reference left: nobody holds or waits.
    slots.remove_if(&tenant_id, |_, slot| Arc::strong_count(slot) == 1);
}

/// Holds a tenant's lock until dropped.
#[derive(Debug)]
pub struct TenantLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    tenant_id: TenantId,
    slots: Arc<DashMap<TenantId, Slot>>,
}

impl TenantLockGuard {
    #[must_use]
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl Drop for TenantLockGuard {
    fn drop(&mut self) {
        // The owned guard holds an Arc to the slot; release it before counting.
        self.guard.take();
        remove_if_unused(&self.slots, self.tenant_id);
    }
}
