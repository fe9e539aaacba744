use std::fmt;

/// Crate-wide result type for linking operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors for link storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A statement against the backing database failed.
    #[error("storage failure in {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A stored user id could not be decoded back into a UUID.
    #[error("malformed stored user id: {message}")]
    MalformedId { message: String },
}

impl Error {
    #[must_use]
    pub fn malformed_id(message: impl fmt::Display) -> Self {
        Self::MalformedId {
            message: message.to_string(),
        }
    }
}

/// Log a failed statement once at the point of detection, then wrap it for
/// propagation. Callers never swallow or retry the result.
pub(crate) fn storage(op: &'static str, identity: impl fmt::Display, source: sqlx::Error) -> Error {
    tracing::error!(op, identity = %identity, error = %source, "link storage statement failed");
    Error::Storage { op, source }
}
