//! Single-use linking codes issued during the out-of-band pairing handshake.
//!
//! A code is stored when the handshake starts and redeemed (read and deleted
//! in one transaction) once the peer confirms it. Codes that are never
//! redeemed stay in the table until a caller sweeps them with
//! [`CodeRegistry::evict_expired`].

use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {async_trait::async_trait, rand::Rng, sqlx::Row, tracing::debug, uuid::Uuid};

use crate::{
    codec::IdCodec,
    error::{self, Error, Result},
};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Generate a random 6-digit linking code.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

/// Registry of outstanding linking codes.
///
/// Uniqueness of outstanding codes is the issuer's concern; this layer does
/// not deduplicate.
#[async_trait]
pub trait CodeRegistry: Send + Sync {
    /// The user awaiting confirmation under `code`, if any. Non-destructive.
    async fn lookup(&self, code: &str) -> Result<Option<Uuid>>;

    /// Snapshot of all outstanding codes.
    async fn list(&self) -> Result<HashMap<String, Uuid>>;

    /// Record `code` as pending for `user_id`.
    async fn store(&self, code: &str, user_id: Uuid) -> Result<()>;

    /// Look up and remove `code` in one step, making it single-use.
    async fn redeem(&self, code: &str) -> Result<Option<Uuid>>;

    /// Remove codes older than `ttl`. Returns the number evicted.
    async fn evict_expired(&self, ttl: Duration) -> Result<u64>;
}

/// SQLite-backed [`CodeRegistry`].
#[derive(Debug)]
pub struct SqliteCodeRegistry {
    pool: sqlx::SqlitePool,
    codec: IdCodec,
}

impl SqliteCodeRegistry {
    pub fn new(pool: sqlx::SqlitePool, codec: IdCodec) -> Self {
        Self { pool, codec }
    }
}

#[async_trait]
impl CodeRegistry for SqliteCodeRegistry {
    async fn lookup(&self, code: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT user_id FROM codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| error::storage("SqliteCodeRegistry::lookup", code, e))?;
        row.map(|r| self.codec.decode(&r, "user_id")).transpose()
    }

    async fn list(&self) -> Result<HashMap<String, Uuid>> {
        let rows = sqlx::query("SELECT code, user_id FROM codes")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| error::storage("SqliteCodeRegistry::list", "*", e))?;

        let mut codes = HashMap::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.try_get("code").map_err(Error::malformed_id)?;
            codes.insert(code, self.codec.decode(row, "user_id")?);
        }
        Ok(codes)
    }

    async fn store(&self, code: &str, user_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO codes (code, user_id, created_at) VALUES (?, ?, ?)")
            .bind(code)
            .bind(self.codec.encode(user_id))
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(|e| error::storage("SqliteCodeRegistry::store", code, e))?;
        debug!(code, %user_id, "linking code stored");
        Ok(())
    }

    async fn redeem(&self, code: &str) -> Result<Option<Uuid>> {
        const OP: &str = "SqliteCodeRegistry::redeem";

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| error::storage(OP, code, e))?;
        let row = sqlx::query("SELECT user_id FROM codes WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| error::storage(OP, code, e))?;
        let user_id = row.map(|r| self.codec.decode(&r, "user_id")).transpose()?;
        if user_id.is_some() {
            sqlx::query("DELETE FROM codes WHERE code = ?")
                .bind(code)
                .execute(&mut *tx)
                .await
                .map_err(|e| error::storage(OP, code, e))?;
        }
        tx.commit().await.map_err(|e| error::storage(OP, code, e))?;

        if let Some(user_id) = user_id {
            debug!(code, %user_id, "linking code redeemed");
        }
        Ok(user_id)
    }

    async fn evict_expired(&self, ttl: Duration) -> Result<u64> {
        let cutoff = now_ms() - ttl.as_millis() as i64;
        let result = sqlx::query("DELETE FROM codes WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| error::storage("SqliteCodeRegistry::evict_expired", "*", e))?;
        Ok(result.rows_affected())
    }
}
