use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A memoized analysis result keyed by content fingerprint.
///
/// Expiry is passive: entries past `expires_at` must not be served, but the
/// row persists until an external reaper removes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex SHA-256 over `image_id + algorithm_type + normalized parameters`.
    pub cache_key: String,
    pub result_id: Uuid,
    /// Monotonically non-decreasing; bumped only on genuine (unexpired) hits.
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub size_bytes: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(expires_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            cache_key: "ab".repeat(32),
            result_id: Uuid::new_v4(),
            hit_count: 0,
            created_at: Utc::now(),
            expires_at,
            last_accessed_at: Utc::now(),
            size_bytes: 128,
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        assert!(!entry(now + Duration::seconds(60)).is_expired(now));
        assert!(entry(now - Duration::seconds(1)).is_expired(now));
        // An entry expiring exactly now is already inert.
        assert!(entry(now).is_expired(now));
    }
}
