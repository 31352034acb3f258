//! [`Room`] definitions.

use common::Money;
use derive_more::{AsRef, Display};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};

/// Bookable room (or room category) of the hotel.
///
/// Content of a [`Room`] is managed outside of the reservation core, so here
/// it's only read.
#[derive(Clone, Debug)]
pub struct Room {
    /// [`Key`] of this [`Room`].
    pub key: Key,

    /// [`Name`] of this [`Room`].
    pub name: Name,

    /// Price of a single night in this [`Room`].
    pub nightly_rate: Money,

    /// Maximum number of guests this [`Room`] accommodates.
    pub capacity: Capacity,
}

/// Key of a [`Room`]: its number or category slug.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Key(String);

impl Key {
    /// Creates a new [`Key`] if the given `key` is valid.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        Self::check(&key).then_some(Self(key))
    }

    /// Checks whether the given `key` is a valid [`Key`].
    fn check(key: impl AsRef<str>) -> bool {
        let key = key.as_ref();
        !key.is_empty()
            && key.len() <= 64
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    }
}

impl std::str::FromStr for Key {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `room::Key`")
    }
}

/// Name of a [`Room`].
#[derive(AsRef, Clone, Debug, Display, Eq, PartialEq)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Name(String);

impl Name {
    /// Creates a new [`Name`] if the given `name` is valid.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        (name.trim() == name && !name.is_empty() && name.len() <= 256)
            .then_some(Self(name))
    }
}

/// Capacity of a [`Room`] in guests.
pub type Capacity = u16;

#[cfg(test)]
mod spec {
    use super::Key;

    #[test]
    fn validates_key() {
        assert!(Key::new("101").is_some());
        assert!(Key::new("deluxe-suite").is_some());
        assert!(Key::new("family_room_2").is_some());

        assert!(Key::new("").is_none());
        assert!(Key::new("room 101").is_none());
        assert!(Key::new("x".repeat(65)).is_none());
    }
}
