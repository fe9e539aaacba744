//! Table definitions for the linking store.

use crate::{
    codec::IdCodec,
    error::{self, Result},
};

/// Create the `accounts` and `codes` tables if they do not exist.
///
/// Uniqueness of either identity is enforced by the store logic, not the
/// schema, so both tables carry plain lookup indexes only. The user id
/// column type follows the active codec.
pub async fn init(pool: &sqlx::SqlitePool, codec: IdCodec) -> Result<()> {
    let id_type = codec.column_type();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS accounts (
            user_id {id_type} NOT NULL,
            peer_id TEXT NOT NULL
        )"
    ))
    .execute(pool)
    .await
    .map_err(|e| error::storage("schema::init", "accounts", e))?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS codes (
            code       TEXT NOT NULL,
            user_id    {id_type} NOT NULL,
            created_at INTEGER NOT NULL
        )"
    ))
    .execute(pool)
    .await
    .map_err(|e| error::storage("schema::init", "codes", e))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_user_id ON accounts(user_id)")
        .execute(pool)
        .await
        .ok();
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_peer_id ON accounts(peer_id)")
        .execute(pool)
        .await
        .ok();
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_codes_code ON codes(code)")
        .execute(pool)
        .await
        .ok();

    Ok(())
}
