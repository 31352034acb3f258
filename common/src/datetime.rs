//! [`DateTime`] definitions.

#[cfg(feature = "postgres")]
use std::error::Error as StdError;
use std::{cmp::Ordering, marker::PhantomData, ops, time::Duration};

use derive_more::{Debug, Display, Error, From};
#[cfg(feature = "postgres")]
use postgres_types::{
    accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql, Type,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

use crate::Date;

/// [`DateTimeOf`] not bound to any particular event.
pub type DateTime = DateTimeOf;

/// Moment in UTC with a microsecond precision, tagged with the `Of` event it
/// marks.
///
/// The precision matches the one of `TIMESTAMPTZ`, so a [`DateTimeOf`] stays
/// the same after a database round trip.
#[derive(Debug)]
#[debug("{inner}")]
pub struct DateTimeOf<Of: ?Sized = ()> {
    /// Underlying UTC moment, truncated to microseconds.
    inner: OffsetDateTime,

    /// Event this moment marks.
    _of: PhantomData<Of>,
}

impl<Of: ?Sized> DateTimeOf<Of> {
    /// Wraps the provided moment, normalizing it to UTC and truncating to
    /// microseconds.
    fn normalized(dt: OffsetDateTime) -> Self {
        let dt = dt.to_offset(UtcOffset::UTC);
        let sub_micros = dt.nanosecond() % 1_000;
        Self {
            inner: dt - time::Duration::nanoseconds(sub_micros.into()),
            _of: PhantomData,
        }
    }

    /// Returns the current [`DateTimeOf`].
    #[must_use]
    pub fn now() -> Self {
        Self::normalized(OffsetDateTime::now_utc())
    }

    /// Creates a [`DateTimeOf`] from the provided Unix timestamp in seconds.
    ///
    /// [`None`] is returned if the timestamp is out of range.
    #[must_use]
    pub fn from_unix_timestamp(secs: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp(secs)
            .ok()
            .map(Self::normalized)
    }

    /// Returns the Unix timestamp of this [`DateTimeOf`] in seconds.
    #[must_use]
    pub fn unix_timestamp(&self) -> i64 {
        self.inner.unix_timestamp()
    }

    /// Returns the Unix timestamp of this [`DateTimeOf`] in milliseconds.
    #[must_use]
    pub fn unix_timestamp_millis(&self) -> i64 {
        self.unix_timestamp() * 1_000 + i64::from(self.inner.millisecond())
    }

    /// Parses a [RFC 3339] string, as the payment gateway and GraphQL clients
    /// send it.
    ///
    /// # Errors
    ///
    /// If the string is not a valid [RFC 3339] moment.
    ///
    /// [RFC 3339]: https://tools.ietf.org/html/rfc3339
    pub fn from_rfc3339(input: &str) -> Result<Self, ParseError> {
        Ok(Self::normalized(OffsetDateTime::parse(input, &Rfc3339)?))
    }

    /// Formats this [`DateTimeOf`] as a [RFC 3339] string.
    ///
    /// [RFC 3339]: https://tools.ietf.org/html/rfc3339
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        // UTC moments within `time`'s supported years are always formattable.
        self.inner
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.inner.to_string())
    }

    /// Returns the UTC calendar [`Date`] of this [`DateTimeOf`].
    #[must_use]
    pub fn date(&self) -> Date {
        self.inner.date().into()
    }

    /// Retags this moment as marking another `NewOf` event.
    #[must_use]
    pub fn coerce<NewOf: ?Sized>(self) -> DateTimeOf<NewOf> {
        DateTimeOf {
            inner: self.inner,
            _of: PhantomData,
        }
    }
}

/// Error of parsing a [`DateTimeOf`] from a string.
#[derive(Clone, Copy, Debug, Display, Error, From)]
#[display("invalid RFC 3339 date and time: {_0}")]
pub struct ParseError(time::error::Parse);

impl<Of: ?Sized> Copy for DateTimeOf<Of> {}
impl<Of: ?Sized> Clone for DateTimeOf<Of> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Of: ?Sized> Eq for DateTimeOf<Of> {}
impl<Of: ?Sized> PartialEq for DateTimeOf<Of> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<Of: ?Sized> Ord for DateTimeOf<Of> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}
impl<Of: ?Sized> PartialOrd for DateTimeOf<Of> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Of: ?Sized> ops::Sub<Duration> for DateTimeOf<Of> {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self {
            inner: self.inner - rhs,
            _of: PhantomData,
        }
    }
}

#[cfg(feature = "postgres")]
impl<Of: ?Sized> FromSql<'_> for DateTimeOf<Of> {
    accepts!(TIMESTAMPTZ);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        OffsetDateTime::from_sql(ty, raw).map(Self::normalized)
    }
}

#[cfg(feature = "postgres")]
impl<Of: ?Sized> ToSql for DateTimeOf<Of> {
    accepts!(TIMESTAMPTZ);
    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        w: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.inner.to_sql(ty, w)
    }
}

#[cfg(feature = "serde")]
pub mod serde {
    //! [`serde`] representations of a [`DateTimeOf`].

    pub mod unix_timestamp {
        //! [`DateTimeOf`] as a Unix timestamp in seconds, like the `exp`
        //! claim of a JWT.
        //!
        //! [`DateTimeOf`]: crate::DateTimeOf

        use serde::{
            de::Error as _, Deserialize as _, Deserializer, Serializer,
        };

        use crate::DateTimeOf;

        /// Serializes the [`DateTimeOf`] as a Unix timestamp.
        ///
        /// # Errors
        ///
        /// If the `serializer` fails.
        pub fn serialize<Of, S>(
            dt: &DateTimeOf<Of>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            Of: ?Sized,
            S: Serializer,
        {
            serializer.serialize_i64(dt.unix_timestamp())
        }

        /// Deserializes a [`DateTimeOf`] from a Unix timestamp.
        ///
        /// # Errors
        ///
        /// If the timestamp is not an integer or is out of range.
        pub fn deserialize<'de, Of, D>(
            deserializer: D,
        ) -> Result<DateTimeOf<Of>, D::Error>
        where
            Of: ?Sized,
            D: Deserializer<'de>,
        {
            let secs = i64::deserialize(deserializer)?;
            DateTimeOf::from_unix_timestamp(secs).ok_or_else(|| {
                D::Error::custom(format!("timestamp `{secs}` is out of range"))
            })
        }
    }
}

#[cfg(feature = "juniper")]
mod juniper {
    //! [`juniper`] scalar of a [`DateTime`].

    use juniper::{graphql_scalar, InputValue, ScalarValue, Value};

    /// Moment in [RFC 3339] format with a microsecond precision, e.g.
    /// `2031-03-01T12:30:00.123456Z`.
    ///
    /// [RFC 3339]: https://tools.ietf.org/html/rfc3339
    #[graphql_scalar(with = Self, parse_token(String))]
    type DateTime = crate::DateTime;

    impl DateTime {
        fn to_output<S: ScalarValue>(dt: &DateTime) -> Value<S> {
            Value::scalar(dt.to_rfc3339())
        }

        fn from_input<S: ScalarValue>(
            input: &InputValue<S>,
        ) -> Result<Self, String> {
            let s = input.as_string_value().ok_or_else(|| {
                format!("`DateTime` must be a string, found: {input}")
            })?;
            Self::from_rfc3339(s).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod spec {
    use super::DateTime;

    #[test]
    fn truncates_to_microseconds() {
        let dt = DateTime::from_rfc3339("2031-03-01T12:30:00.123456789Z")
            .unwrap();

        assert_eq!(dt.to_rfc3339(), "2031-03-01T12:30:00.123456Z");
    }

    #[test]
    fn normalizes_to_utc() {
        let dt =
            DateTime::from_rfc3339("2031-03-01T01:30:00+02:00").unwrap();

        assert_eq!(dt.to_rfc3339(), "2031-02-28T23:30:00Z");
        assert_eq!(dt.date().to_string(), "2031-02-28");
    }

    #[test]
    fn rejects_non_rfc3339_input() {
        assert!(DateTime::from_rfc3339("2031-03-01 12:30").is_err());
    }
}
