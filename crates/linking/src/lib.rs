//! Durable account linking between local users and chat-platform peers.
//!
//! Two relations back the feature: `accounts` holds the current 1:1 link
//! between a local user id and an external peer id, and `codes` holds the
//! short-lived codes handed out during the out-of-band pairing handshake.
//! Both consult a per-backend [`IdCodec`] deciding whether user ids are
//! stored natively (16-byte blobs) or as canonical text.
//!
//! Call [`schema::init`] once at startup before constructing the stores.

pub mod codec;
pub mod codes;
pub mod config;
pub mod error;
pub mod events;
pub mod schema;
pub mod store;

pub use {
    codec::IdCodec,
    codes::{CodeRegistry, SqliteCodeRegistry, generate_code},
    config::LinkingConfig,
    error::{Error, Result},
    events::{LinkEvents, NullEvents},
    store::{LinkStore, SqliteLinkStore},
};
