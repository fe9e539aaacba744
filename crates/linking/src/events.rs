//! Link lifecycle notifications.

use {async_trait::async_trait, uuid::Uuid};

/// Receives a notification after every successful link and unlink.
///
/// Implementations fan the event out to whatever needs to react (role sync,
/// display-name sync, rewards). The store guarantees the call happens after
/// the row change is durable, and nothing else.
#[async_trait]
pub trait LinkEvents: Send + Sync {
    /// `user_id` is now linked to `peer_id` (new link or re-point).
    async fn on_linked(&self, peer_id: &str, user_id: Uuid);

    /// The link between `user_id` and `peer_id` was removed. `peer_id` is
    /// the counterpart that existed immediately before removal.
    async fn on_unlinked(&self, peer_id: &str, user_id: Uuid);
}

/// Event sink that drops all notifications.
pub struct NullEvents;

#[async_trait]
impl LinkEvents for NullEvents {
    async fn on_linked(&self, _peer_id: &str, _user_id: Uuid) {}

    async fn on_unlinked(&self, _peer_id: &str, _user_id: Uuid) {}
}
