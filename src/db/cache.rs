//! Fingerprint-keyed result cache over the `result_cache` table.
//!
//! Lookup and hit accounting are a single UPDATE so a genuine hit and its
//! `hit_count` bump cannot be torn apart. Expiry is passive: the UPDATE
//! simply refuses rows past `expires_at`, and the stale row lingers until an
//! external reaper removes it.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::cache::CacheEntry;

const CACHE_COLUMNS: &str =
    "cache_key, result_id, hit_count, created_at, expires_at, last_accessed_at, size_bytes";

fn entry_from_row(row: &PgRow) -> Result<CacheEntry, sqlx::Error> {
    Ok(CacheEntry {
        cache_key: row.try_get("cache_key")?,
        result_id: row.try_get("result_id")?,
        hit_count: row.try_get("hit_count")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        last_accessed_at: row.try_get("last_accessed_at")?,
        size_bytes: row.try_get("size_bytes")?,
    })
}

/// Look up an unexpired entry, bumping `hit_count` and `last_accessed_at`
/// as part of the same statement. Missing or expired entries return `None`
/// and leave the row untouched.
pub async fn lookup(pool: &PgPool, cache_key: &str) -> Result<Option<CacheEntry>, QueueError> {
    let sql = format!(
        r#"
        UPDATE result_cache
        SET hit_count = hit_count + 1,
            last_accessed_at = now()
        WHERE cache_key = $1 AND expires_at > now()
        RETURNING {CACHE_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(cache_key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => Ok(Some(entry_from_row(&r)?)),
        None => Ok(None),
    }
}

/// Idempotent upsert. Concurrent workers that both missed the same
/// fingerprint may race to populate it; the second write refreshes
/// `expires_at` and repoints `result_id` (last writer wins) instead of
/// erroring. `hit_count` survives the refresh.
pub async fn store(
    pool: &PgPool,
    cache_key: &str,
    result_id: Uuid,
    ttl_secs: i64,
    size_bytes: i64,
) -> Result<CacheEntry, QueueError> {
    let sql = format!(
        r#"
        INSERT INTO result_cache (cache_key, result_id, hit_count, expires_at, size_bytes)
        VALUES ($1, $2, 0, now() + make_interval(secs => $3::float8), $4)
        ON CONFLICT (cache_key) DO UPDATE
        SET result_id = EXCLUDED.result_id,
            expires_at = EXCLUDED.expires_at,
            size_bytes = EXCLUDED.size_bytes
        RETURNING {CACHE_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(cache_key)
        .bind(result_id)
        .bind(ttl_secs as f64)
        .bind(size_bytes)
        .fetch_one(pool)
        .await?;

    Ok(entry_from_row(&row)?)
}

/// Raw read of an entry regardless of expiry. Used by inspection tooling and
/// tests; serving decisions must go through [`lookup`].
pub async fn get_entry(pool: &PgPool, cache_key: &str) -> Result<Option<CacheEntry>, QueueError> {
    let sql = format!("SELECT {CACHE_COLUMNS} FROM result_cache WHERE cache_key = $1");

    let row = sqlx::query(&sql)
        .bind(cache_key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => Ok(Some(entry_from_row(&r)?)),
        None => Ok(None),
    }
}
