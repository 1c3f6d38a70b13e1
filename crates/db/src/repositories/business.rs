//! Business (tenant) lookups, cached with Moka.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use ledgerline_shared::types::TenantId;
use moka::future::Cache;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};

use crate::entities::businesses;

/// Default cache capacity (number of businesses).
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default time-to-live for cached businesses (5 minutes).
const DEFAULT_TTL_SECS: u64 = 300;

/// Error types for business lookups.
#[derive(Debug, thiserror::Error)]
pub enum BusinessError {
    /// Business not found.
    #[error("Business not found: {0}")]
    NotFound(TenantId),

    /// Stored timezone is not a valid IANA name.
    #[error("Invalid timezone for business {tenant}: {timezone}")]
    InvalidTimezone {
        /// Business.
        tenant: TenantId,
        /// Stored value.
        timezone: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// The parts of a business the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessProfile {
    /// Business id.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Currency used when an event does not name one.
    pub base_currency: String,
    /// Business timezone.
    pub timezone: Tz,
    /// Default start date for backfills and rebuilds.
    pub migration_date: Option<NaiveDate>,
    /// Every date on or before this is closed.
    pub lock_date: Option<NaiveDate>,
}

impl TryFrom<businesses::Model> for BusinessProfile {
    type Error = BusinessError;

    fn try_from(model: businesses::Model) -> Result<Self, Self::Error> {
        let id = TenantId::from_uuid(model.id);
        let timezone = model
            .timezone
            .parse::<Tz>()
            .map_err(|_| BusinessError::InvalidTimezone {
                tenant: id,
                timezone: model.timezone.clone(),
            })?;
        Ok(Self {
            id,
            name: model.name,
            base_currency: model.base_currency,
            timezone,
            migration_date: model.migration_date,
            lock_date: model.lock_date,
        })
    }
}

/// Cached business repository.
#[derive(Debug, Clone)]
pub struct BusinessRepository {
    db: DatabaseConnection,
    cache: Cache<TenantId, Arc<BusinessProfile>>,
}

impl BusinessRepository {
    /// Creates a new business repository with default cache settings.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_cache_config(db, DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a new business repository with custom cache settings.
    #[must_use]
    pub fn with_cache_config(db: DatabaseConnection, max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { db, cache }
    }

    /// Returns a business, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the business does not exist or cannot be loaded.
    pub async fn get(&self, id: TenantId) -> Result<Arc<BusinessProfile>, BusinessError> {
        if let Some(profile) = self.cache.get(&id).await {
            return Ok(profile);
        }

        let model = businesses::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
            .ok_or(BusinessError::NotFound(id))?;
        let profile = Arc::new(BusinessProfile::try_from(model)?);
        self.cache.insert(id, Arc::clone(&profile)).await;
        Ok(profile)
    }

    /// Drops a business from the cache so the next `get` reads the row.
    pub async fn invalidate(&self, id: TenantId) {
        self.cache.invalidate(&id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn model(timezone: &str) -> businesses::Model {
        let now = Utc::now().into();
        businesses::Model {
            id: Uuid::now_v7(),
            name: "Acme".to_string(),
            base_currency: "USD".to_string(),
            timezone: timezone.to_string(),
            migration_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            lock_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_profile_parses_timezone() {
        let profile = BusinessProfile::try_from(model("Asia/Jakarta")).unwrap();
        assert_eq!(profile.timezone, chrono_tz::Asia::Jakarta);
        assert_eq!(profile.base_currency, "USD");
    }

    #[test]
    fn test_profile_rejects_unknown_timezone() {
        let result = BusinessProfile::try_from(model("Mars/Olympus"));
        assert!(matches!(result, Err(BusinessError::InvalidTimezone { .. })));
    }
}
