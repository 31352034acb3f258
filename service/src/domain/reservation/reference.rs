//! Booking [`Reference`] definitions.

use std::str::FromStr;

use common::DateTime;
use derive_more::{AsRef, Display, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Reservation;

/// Human-readable unique reference of a [`Reservation`].
///
/// Has the `PREFIX-<unix millis>-<6 random digits>` format, and doubles as
/// the payment gateway transaction reference.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, Into, PartialEq)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Reference(String);

impl Reference {
    /// Generates a new random [`Reference`].
    ///
    /// Uniqueness is not guaranteed, so it must be checked against the
    /// storage before use.
    #[must_use]
    pub fn generate(prefix: &Prefix, at: DateTime) -> Self {
        let suffix = Uuid::new_v4().as_u128() % 1_000_000;
        Self(format!("{prefix}-{}-{suffix:06}", at.unix_timestamp_millis()))
    }

    /// Creates a new [`Reference`] if the given `reference` is valid.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Option<Self> {
        let reference = reference.into();
        Self::check(&reference).then_some(Self(reference))
    }

    /// Checks whether the given `reference` is a valid [`Reference`].
    fn check(reference: impl AsRef<str>) -> bool {
        let reference = reference.as_ref();
        !reference.is_empty()
            && reference.len() <= 64
            && !reference.starts_with('-')
            && reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    }
}

impl FromStr for Reference {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `reservation::Reference`")
    }
}

/// Prefix of generated [`Reference`]s.
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str)]
pub struct Prefix(String);

impl Prefix {
    /// Creates a new [`Prefix`] if the given `prefix` is valid.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Option<Self> {
        let prefix = prefix.into();
        (!prefix.is_empty()
            && prefix.len() <= 8
            && prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()))
        .then_some(Self(prefix))
    }
}

impl Default for Prefix {
    fn default() -> Self {
        Self("RM".into())
    }
}

impl FromStr for Prefix {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `reservation::Prefix`")
    }
}
