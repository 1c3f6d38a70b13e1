//! Who is posting, on behalf of which business.

use ledgerline_shared::types::{ActorId, TenantId};

use crate::event::envelope::LedgerEvent;

/// Display name recorded for postings made by the system actor.
pub const SYSTEM_ACTOR_NAME: &str = "system";

/// Actor and correlation details threaded through a posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingContext {
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    pub actor_name: String,
    pub correlation_id: String,
}

impl ProcessingContext {
    /// Context for background processing, which always runs as the system actor.
    #[must_use]
    pub fn system(tenant_id: TenantId, correlation_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor_id: ActorId::SYSTEM,
            actor_name: SYSTEM_ACTOR_NAME.to_string(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Context for applying an event.
    #[must_use]
    pub fn for_event(event: &LedgerEvent) -> Self {
        Self::system(event.tenant_id, event.correlation_id.clone())
    }

    /// Returns true if the posting is made by the system actor.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.actor_id.is_system()
    }
}
