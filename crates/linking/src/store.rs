//! Durable 1:1 links between local users and chat-platform peers.

use std::{fmt, sync::Arc};

use {async_trait::async_trait, tracing::debug, uuid::Uuid};

use crate::{
    codec::IdCodec,
    error::{self, Result},
    events::LinkEvents,
};

/// Durable account-link storage, addressable from either identity space.
///
/// The store keeps at most one link per user and at most one per peer.
/// Lookups that find nothing return `None`; only failed statements are
/// errors.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// The peer linked to `user_id`, if any.
    async fn peer_for(&self, user_id: Uuid) -> Result<Option<String>>;

    /// The user linked to `peer_id`, if any.
    async fn user_for(&self, peer_id: &str) -> Result<Option<Uuid>>;

    /// Link `user_id` to `peer_id`, or remove its link when `peer_id` is
    /// `None`. Fires [`LinkEvents::on_linked`] after a successful write and
    /// [`LinkEvents::on_unlinked`] after a removal that had a counterpart.
    async fn set_peer(&self, user_id: Uuid, peer_id: Option<&str>) -> Result<()>;

    /// Link `peer_id` to `user_id`, or remove its link when `user_id` is
    /// `None`. Symmetric to [`LinkStore::set_peer`], keyed from the peer
    /// side.
    async fn set_user(&self, peer_id: &str, user_id: Option<Uuid>) -> Result<()>;

    /// True if `user_id` currently has a link.
    async fn is_linked(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.peer_for(user_id).await?.is_some())
    }

    /// True if `peer_id` currently has a link.
    async fn is_linked_peer(&self, peer_id: &str) -> Result<bool> {
        Ok(self.user_for(peer_id).await?.is_some())
    }

    /// Release the underlying connection resource. Safe to call on an
    /// already-closed store.
    async fn close(&self) -> Result<()>;
}

// ── SQLite implementation ───────────────────────────────────────────────────

/// SQLite-backed [`LinkStore`].
///
/// Mutations run as single transactions so a link is created, re-pointed, or
/// removed atomically; concurrent callers can never observe (or create) two
/// rows for the same identity.
pub struct SqliteLinkStore {
    pool: sqlx::SqlitePool,
    codec: IdCodec,
    events: Arc<dyn LinkEvents>,
}

impl SqliteLinkStore {
    pub fn new(pool: sqlx::SqlitePool, codec: IdCodec, events: Arc<dyn LinkEvents>) -> Self {
        Self {
            pool,
            codec,
            events,
        }
    }
}

impl fmt::Debug for SqliteLinkStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteLinkStore")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn peer_for(&self, user_id: Uuid) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT peer_id FROM accounts WHERE user_id = ?")
            .bind(self.codec.encode(user_id))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| error::storage("SqliteLinkStore::peer_for", user_id, e))
    }

    async fn user_for(&self, peer_id: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT user_id FROM accounts WHERE peer_id = ?")
            .bind(peer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| error::storage("SqliteLinkStore::user_for", peer_id, e))?;
        row.map(|r| self.codec.decode(&r, "user_id")).transpose()
    }

    async fn set_peer(&self, user_id: Uuid, peer_id: Option<&str>) -> Result<()> {
        const OP: &str = "SqliteLinkStore::set_peer";
        let id = self.codec.encode(user_id);

        match peer_id {
            Some(peer_id) => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;
                // A peer can point at only one user; drop any stale claim.
                sqlx::query("DELETE FROM accounts WHERE peer_id = ? AND user_id <> ?")
                    .bind(peer_id)
                    .bind(id.clone())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;
                let updated = sqlx::query("UPDATE accounts SET peer_id = ? WHERE user_id = ?")
                    .bind(peer_id)
                    .bind(id.clone())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;
                if updated.rows_affected() == 0 {
                    sqlx::query("INSERT INTO accounts (user_id, peer_id) VALUES (?, ?)")
                        .bind(id)
                        .bind(peer_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| error::storage(OP, user_id, e))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;

                debug!(%user_id, peer_id, "account linked");
                self.events.on_linked(peer_id, user_id).await;
                Ok(())
            },
            None => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;
                let previous = sqlx::query_scalar::<_, String>(
                    "SELECT peer_id FROM accounts WHERE user_id = ?",
                )
                .bind(id.clone())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| error::storage(OP, user_id, e))?;
                sqlx::query("DELETE FROM accounts WHERE user_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;
                tx.commit()
                    .await
                    .map_err(|e| error::storage(OP, user_id, e))?;

                if let Some(peer_id) = previous {
                    debug!(%user_id, peer_id, "account unlinked");
                    self.events.on_unlinked(&peer_id, user_id).await;
                }
                Ok(())
            },
        }
    }

    async fn set_user(&self, peer_id: &str, user_id: Option<Uuid>) -> Result<()> {
        const OP: &str = "SqliteLinkStore::set_user";

        match user_id {
            Some(user_id) => {
                let id = self.codec.encode(user_id);
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;
                // A user can point at only one peer; drop any stale claim.
                sqlx::query("DELETE FROM accounts WHERE user_id = ? AND peer_id <> ?")
                    .bind(id.clone())
                    .bind(peer_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;
                let updated = sqlx::query("UPDATE accounts SET user_id = ? WHERE peer_id = ?")
                    .bind(id.clone())
                    .bind(peer_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;
                if updated.rows_affected() == 0 {
                    sqlx::query("INSERT INTO accounts (user_id, peer_id) VALUES (?, ?)")
                        .bind(id)
                        .bind(peer_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| error::storage(OP, peer_id, e))?;
                }
                tx.commit()
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;

                debug!(%user_id, peer_id, "account linked");
                self.events.on_linked(peer_id, user_id).await;
                Ok(())
            },
            None => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;
                let row = sqlx::query("SELECT user_id FROM accounts WHERE peer_id = ?")
                    .bind(peer_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;
                let previous = row.map(|r| self.codec.decode(&r, "user_id")).transpose()?;
                sqlx::query("DELETE FROM accounts WHERE peer_id = ?")
                    .bind(peer_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;
                tx.commit()
                    .await
                    .map_err(|e| error::storage(OP, peer_id, e))?;

                if let Some(user_id) = previous {
                    debug!(%user_id, peer_id, "account unlinked");
                    self.events.on_unlinked(peer_id, user_id).await;
                }
                Ok(())
            },
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{events::NullEvents, schema};

    /// Records every notification for assertions.
    #[derive(Default)]
    struct RecordingEvents {
        linked: Mutex<Vec<(String, Uuid)>>,
        unlinked: Mutex<Vec<(String, Uuid)>>,
    }

    #[async_trait]
    impl LinkEvents for RecordingEvents {
        async fn on_linked(&self, peer_id: &str, user_id: Uuid) {
            self.linked
                .lock()
                .unwrap()
                .push((peer_id.to_string(), user_id));
        }

        async fn on_unlinked(&self, peer_id: &str, user_id: Uuid) {
            self.unlinked
                .lock()
                .unwrap()
                .push((peer_id.to_string(), user_id));
        }
    }

    async fn test_store(codec: IdCodec) -> SqliteLinkStore {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        schema::init(&pool, codec).await.unwrap();
        SqliteLinkStore::new(pool, codec, Arc::new(NullEvents))
    }

    async fn recording_store(codec: IdCodec) -> (SqliteLinkStore, Arc<RecordingEvents>) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        schema::init(&pool, codec).await.unwrap();
        let events = Arc::new(RecordingEvents::default());
        let store = SqliteLinkStore::new(pool, codec, Arc::clone(&events) as Arc<dyn LinkEvents>);
        (store, events)
    }

    async fn row_count(store: &SqliteLinkStore) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn link_resolves_in_both_directions() {
        for codec in [IdCodec::Native, IdCodec::Text] {
            let store = test_store(codec).await;
            let user = Uuid::new_v4();

            store.set_peer(user, Some("198237640912")).await.unwrap();
            assert_eq!(
                store.peer_for(user).await.unwrap().as_deref(),
                Some("198237640912")
            );
            assert_eq!(store.user_for("198237640912").await.unwrap(), Some(user));
            assert!(store.is_linked(user).await.unwrap());
            assert!(store.is_linked_peer("198237640912").await.unwrap());
        }
    }

    #[tokio::test]
    async fn unknown_lookups_are_none() {
        let store = test_store(IdCodec::Native).await;

        assert_eq!(store.peer_for(Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(store.user_for("404").await.unwrap(), None);
        assert!(!store.is_linked(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn relink_overwrites_in_place() {
        let store = test_store(IdCodec::Native).await;
        let user = Uuid::new_v4();

        store.set_peer(user, Some("D1")).await.unwrap();
        store.set_peer(user, Some("D2")).await.unwrap();

        assert_eq!(store.peer_for(user).await.unwrap().as_deref(), Some("D2"));
        assert_eq!(store.user_for("D1").await.unwrap(), None);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn relink_same_peer_is_idempotent() {
        let (store, events) = recording_store(IdCodec::Native).await;
        let user = Uuid::new_v4();

        store.set_peer(user, Some("D1")).await.unwrap();
        store.set_peer(user, Some("D1")).await.unwrap();

        assert_eq!(store.peer_for(user).await.unwrap().as_deref(), Some("D1"));
        assert_eq!(row_count(&store).await, 1);
        // Each write still notifies.
        assert_eq!(events.linked.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unlink_notifies_with_prior_counterpart() {
        let (store, events) = recording_store(IdCodec::Native).await;
        let user = Uuid::new_v4();

        store.set_peer(user, Some("D1")).await.unwrap();
        store.set_peer(user, Some("D2")).await.unwrap();
        store.set_peer(user, None).await.unwrap();

        assert_eq!(store.peer_for(user).await.unwrap(), None);
        assert_eq!(
            *events.unlinked.lock().unwrap(),
            vec![("D2".to_string(), user)]
        );
    }

    #[tokio::test]
    async fn unlink_without_link_is_silent() {
        let (store, events) = recording_store(IdCodec::Native).await;

        store.set_peer(Uuid::new_v4(), None).await.unwrap();

        assert!(events.unlinked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_user_links_and_unlinks() {
        let (store, events) = recording_store(IdCodec::Text).await;
        let user = Uuid::new_v4();

        store.set_user("777", Some(user)).await.unwrap();
        assert_eq!(store.user_for("777").await.unwrap(), Some(user));
        assert_eq!(store.peer_for(user).await.unwrap().as_deref(), Some("777"));

        store.set_user("777", None).await.unwrap();
        assert_eq!(store.user_for("777").await.unwrap(), None);
        assert_eq!(
            *events.unlinked.lock().unwrap(),
            vec![("777".to_string(), user)]
        );
    }

    #[tokio::test]
    async fn peer_reclaimed_by_new_user() {
        let store = test_store(IdCodec::Native).await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.set_peer(first, Some("D1")).await.unwrap();
        store.set_peer(second, Some("D1")).await.unwrap();

        assert_eq!(store.user_for("D1").await.unwrap(), Some(second));
        assert_eq!(store.peer_for(first).await.unwrap(), None);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn user_reclaimed_by_new_peer() {
        let store = test_store(IdCodec::Native).await;
        let user = Uuid::new_v4();

        store.set_user("A", Some(user)).await.unwrap();
        store.set_user("B", Some(user)).await.unwrap();

        assert_eq!(store.peer_for(user).await.unwrap().as_deref(), Some("B"));
        assert_eq!(store.user_for("A").await.unwrap(), None);
        assert_eq!(row_count(&store).await, 1);
    }

    #[tokio::test]
    async fn native_mode_stores_sixteen_byte_blobs() {
        let store = test_store(IdCodec::Native).await;
        let user = Uuid::new_v4();

        store.set_peer(user, Some("1")).await.unwrap();

        let raw: Vec<u8> = sqlx::query_scalar("SELECT user_id FROM accounts")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(raw.len(), 16);
        assert_eq!(Uuid::from_slice(&raw).unwrap(), user);
    }

    #[tokio::test]
    async fn text_mode_stores_hyphenated_text() {
        let store = test_store(IdCodec::Text).await;
        let user = Uuid::new_v4();

        store.set_peer(user, Some("1")).await.unwrap();

        let raw: String = sqlx::query_scalar("SELECT user_id FROM accounts")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(raw, user.as_hyphenated().to_string());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_fails_later_calls() {
        let store = test_store(IdCodec::Native).await;

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(store.peer_for(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(dir.path().join("links.db"))
            .create_if_missing(true);
        let user = Uuid::new_v4();

        let pool = sqlx::SqlitePool::connect_with(options.clone()).await.unwrap();
        schema::init(&pool, IdCodec::Native).await.unwrap();
        let store = SqliteLinkStore::new(pool, IdCodec::Native, Arc::new(NullEvents));
        store.set_peer(user, Some("42")).await.unwrap();
        store.close().await.unwrap();

        let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
        let store = SqliteLinkStore::new(pool, IdCodec::Native, Arc::new(NullEvents));
        assert_eq!(store.peer_for(user).await.unwrap().as_deref(), Some("42"));
    }
}
