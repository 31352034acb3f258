//! [`Session`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf};
use derive_more::{AsRef, Display, From, FromStr};
use serde::{Deserialize, Serialize};

use crate::domain::guest;

/// Session of a user authenticated by the hosted auth service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Session {
    /// ID of the user this [`Session`] belongs to.
    ///
    /// Stored in [`guest::Guest::id`] of the reservations the user makes.
    #[serde(rename = "sub")]
    pub user_id: guest::Id,

    /// [`DateTime`] when this [`Session`] expires.
    #[serde(rename = "exp", with = "common::datetime::serde::unix_timestamp")]
    pub expires_at: ExpirationDateTime,

    /// [`Role`] of the user.
    #[serde(default)]
    pub role: Role,
}

impl Session {
    /// Indicates whether this [`Session`] is allowed to perform hotel staff
    /// actions.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }
}

/// Role of an authenticated user.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Hotel staff member.
    #[display("staff")]
    Staff,

    /// Back-office administrator.
    #[display("admin")]
    Admin,

    /// Regular guest of the hotel.
    #[default]
    #[display("guest")]
    #[serde(other)]
    Guest,
}

/// Access token of a [`Session`], as issued by the hosted auth service.
///
/// Any string is accepted here, the signature is checked on decoding.
#[derive(AsRef, Clone, Debug, Display, From, FromStr)]
pub struct Token(String);

/// [`DateTime`] of a [`Session`] expiration.
pub type ExpirationDateTime = DateTimeOf<(Session, unit::Expiration)>;

#[cfg(test)]
mod spec {
    use super::{Role, Session};

    #[test]
    fn deserializes_claims() {
        let session: Session = serde_json::from_str(
            r#"{"sub":"user-1","exp":1900000000,"role":"staff"}"#,
        )
        .unwrap();

        assert_eq!(session.user_id.as_ref(), "user-1");
        assert_eq!(session.expires_at.unix_timestamp(), 1_900_000_000);
        assert!(session.is_staff());
    }

    #[test]
    fn unknown_or_missing_role_is_guest() {
        let session: Session = serde_json::from_str(
            r#"{"sub":"user-1","exp":1900000000,"role":"authenticated"}"#,
        )
        .unwrap();
        assert_eq!(session.role, Role::Guest);
        assert!(!session.is_staff());

        let session: Session =
            serde_json::from_str(r#"{"sub":"user-1","exp":1900000000}"#)
                .unwrap();
        assert_eq!(session.role, Role::Guest);
    }
}
