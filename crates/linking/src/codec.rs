//! Storage representation of local user ids.
//!
//! Backends that can hold a 16-byte value keep user ids in their native
//! binary form; others fall back to the canonical hyphenated text form. The
//! codec is decided once at store construction and consulted on every read
//! and write, so the relational logic never branches on the mode inline.

use std::borrow::Cow;

use {
    sqlx::{
        Encode, Row, Type,
        encode::IsNull,
        error::BoxDynError,
        sqlite::{Sqlite, SqliteArgumentValue, SqliteRow, SqliteTypeInfo},
    },
    uuid::Uuid,
};

use crate::error::{Error, Result};

/// How local user ids are written to backend columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdCodec {
    /// 16-byte native form.
    Native,
    /// Canonical hyphenated text form.
    Text,
}

/// A user id encoded for binding as a statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedId {
    Binary([u8; 16]),
    Text(String),
}

impl IdCodec {
    /// Encode `user_id` for binding into a statement.
    #[must_use]
    pub fn encode(self, user_id: Uuid) -> EncodedId {
        match self {
            Self::Native => EncodedId::Binary(*user_id.as_bytes()),
            Self::Text => EncodedId::Text(user_id.as_hyphenated().to_string()),
        }
    }

    /// Decode the user id stored in `column` of a fetched row.
    pub fn decode(self, row: &SqliteRow, column: &str) -> Result<Uuid> {
        match self {
            Self::Native => {
                let bytes: Vec<u8> = row.try_get(column).map_err(Error::malformed_id)?;
                Uuid::from_slice(&bytes).map_err(Error::malformed_id)
            },
            Self::Text => {
                let text: String = row.try_get(column).map_err(Error::malformed_id)?;
                Uuid::parse_str(&text).map_err(Error::malformed_id)
            },
        }
    }

    /// SQLite column type for user id columns under this codec.
    #[must_use]
    pub fn column_type(self) -> &'static str {
        match self {
            Self::Native => "BLOB",
            Self::Text => "TEXT",
        }
    }
}

impl Type<Sqlite> for EncodedId {
    fn type_info() -> SqliteTypeInfo {
        <&[u8] as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <&[u8] as Type<Sqlite>>::compatible(ty) || <&str as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for EncodedId {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        match self {
            Self::Binary(bytes) => args.push(SqliteArgumentValue::Blob(Cow::Owned(bytes.to_vec()))),
            Self::Text(text) => args.push(SqliteArgumentValue::Text(Cow::Owned(text.clone()))),
        }
        Ok(IsNull::No)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_encodes_sixteen_bytes() {
        let id = Uuid::new_v4();
        match IdCodec::Native.encode(id) {
            EncodedId::Binary(bytes) => assert_eq!(bytes, *id.as_bytes()),
            other => panic!("expected Binary, got {other:?}"),
        }
    }

    #[test]
    fn text_encodes_canonical_form() {
        let id = Uuid::new_v4();
        match IdCodec::Text.encode(id) {
            EncodedId::Text(text) => {
                assert_eq!(text, id.as_hyphenated().to_string());
                assert_eq!(Uuid::parse_str(&text).unwrap(), id);
            },
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn column_types() {
        assert_eq!(IdCodec::Native.column_type(), "BLOB");
        assert_eq!(IdCodec::Text.column_type(), "TEXT");
    }
}
