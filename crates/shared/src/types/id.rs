//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing an `ActorId` where a `TenantId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

typed_id!(TenantId, "Unique identifier for a business (tenant).");
typed_id!(ActorId, "Unique identifier for the user or system actor behind a posting.");
typed_id!(OutboxRecordId, "Unique identifier for an outbox record.");
typed_id!(JournalId, "Unique identifier for a journal entry.");
typed_id!(AccountTransactionId, "Unique identifier for a journal leg.");
typed_id!(StockHistoryId, "Unique identifier for a stock history row.");

impl ActorId {
    /// The fixed identity used when the system itself posts.
    pub const SYSTEM: Self = Self(Uuid::nil());

    /// Returns true if this is the system actor.
    #[must_use]
    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
