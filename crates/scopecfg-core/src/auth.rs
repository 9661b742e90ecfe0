//! API key activity checks performed before a merged read.

use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use scopecfg_config::AuthConfig;
use scopecfg_protocol::{ApiKey, ApiKeyId};
use scopecfg_store::ScopeCatalog;
use std::sync::Arc;

/// Why an existing API key was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRejection {
    /// `active_since` lies in the future.
    NotYetActive,
    /// `active_until` lies in the past.
    Expired,
}

/// Check a key's validity window, tolerating `skew` on both edges.
pub fn check_activity(
    key: &ApiKey,
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<(), KeyRejection> {
    let latest = now.checked_add_signed(skew).unwrap_or(DateTime::<Utc>::MAX_UTC);
    if key.active_since > latest {
        return Err(KeyRejection::NotYetActive);
    }
    if let Some(until) = key.active_until {
        let earliest = now.checked_sub_signed(skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
        if until < earliest {
            return Err(KeyRejection::Expired);
        }
    }
    Ok(())
}

/// Resolves API key ids and refuses keys outside their validity window.
pub struct ApiKeyGate {
    catalog: Arc<dyn ScopeCatalog>,
    clock_skew: Duration,
}

impl ApiKeyGate {
    /// Create a gate with an explicit clock skew tolerance.
    pub fn new(catalog: Arc<dyn ScopeCatalog>, clock_skew: Duration) -> Self {
        Self {
            catalog,
            clock_skew,
        }
    }

    /// Create a gate using the configured skew.
    pub fn from_config(catalog: Arc<dyn ScopeCatalog>, config: &AuthConfig) -> Self {
        let seconds = i64::try_from(config.clock_skew_seconds).unwrap_or(i64::MAX);
        let skew = Duration::try_seconds(seconds).unwrap_or(Duration::MAX);
        Self::new(catalog, skew)
    }

    /// Look up a key and confirm it is active at `now`.
    pub async fn authenticate(
        &self,
        id: ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, CoreError> {
        let Some(key) = self.catalog.find_api_key(id).await? else {
            warn!("unknown api key (id={id})");
            return Err(CoreError::NotFound(format!("api key {id}")));
        };
        match check_activity(&key, now, self.clock_skew) {
            Ok(()) => {
                debug!("api key accepted (id={id})");
                Ok(key)
            }
            Err(KeyRejection::NotYetActive) => {
                warn!("api key not yet active (id={id})");
                Err(CoreError::Unauthorized(format!("api key {id} is not yet active")))
            }
            Err(KeyRejection::Expired) => {
                warn!("api key expired (id={id})");
                Err(CoreError::Unauthorized(format!("api key {id} has expired")))
            }
        }
    }
}
