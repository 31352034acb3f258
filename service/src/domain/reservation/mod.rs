//! [`Reservation`] definitions.

pub mod reference;
mod transition;

use common::{define_kind, unit, DateRange, DateTime, DateTimeOf, Money};
use derive_more::{Display, Error, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{guest, payment, room, Guest, Room};

pub use self::{
    reference::{Prefix, Reference},
    transition::{Event, TransitionError},
};

/// Booking of a single [`Room`] for a contiguous stay.
#[derive(Clone, Debug)]
pub struct Reservation {
    /// ID of this [`Reservation`].
    pub id: Id,

    /// Booking [`Reference`] of this [`Reservation`].
    pub reference: Reference,

    /// [`room::Key`] of the booked [`Room`].
    pub room_key: room::Key,

    /// [`Guest`] who made this [`Reservation`].
    pub guest: Guest,

    /// Nights booked by this [`Reservation`].
    pub stay: DateRange,

    /// Number of guests staying.
    pub guests_count: GuestsCount,

    /// Snapshot of the [`Room`] nightly rate at the booking time.
    pub nightly_rate: Money,

    /// Total price of the stay.
    ///
    /// Always equals [`DateRange::nights()`] times the `nightly_rate`.
    pub total: Money,

    /// [`Status`] of this [`Reservation`].
    pub status: Status,

    /// [`Payment`] details of this [`Reservation`].
    pub payment: Payment,

    /// [`Cancellation`] details, if this [`Reservation`] is cancelled.
    pub cancellation: Option<Cancellation>,

    /// [`DateTime`] when this [`Reservation`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Reservation`] was modified the last time.
    pub updated_at: ModificationDateTime,
}

impl Reservation {
    /// Books the provided [`Room`], creating a new [`Status::Pending`]
    /// [`Reservation`].
    ///
    /// # Errors
    ///
    /// - If the [`Room`] doesn't accommodate the requested number of guests.
    /// - If the total price of the stay overflows.
    pub fn book(booking: Booking<'_>) -> Result<Self, BookingError> {
        let Booking {
            reference,
            room,
            guest,
            stay,
            guests_count,
            at,
        } = booking;

        if guests_count == 0 || guests_count > room.capacity {
            return Err(BookingError::CapacityExceeded {
                capacity: room.capacity,
                requested: guests_count,
            });
        }

        let total = room
            .nightly_rate
            .times(stay.nights())
            .ok_or(BookingError::TotalOverflow)?;

        Ok(Self {
            id: Id::new(),
            reference,
            room_key: room.key.clone(),
            guest,
            stay,
            guests_count,
            nightly_rate: room.nightly_rate,
            total,
            status: Status::Pending,
            payment: Payment {
                status: PaymentStatus::Pending,
                reference: None,
                method: None,
                authorization: None,
            },
            cancellation: None,
            created_at: at.coerce(),
            updated_at: at.coerce(),
        })
    }

    /// Indicates whether this [`Reservation`] was made by the [`Guest`] with
    /// the provided [`guest::Id`].
    #[must_use]
    pub fn is_made_by(&self, guest_id: &guest::Id) -> bool {
        self.guest.id.as_ref() == Some(guest_id)
    }

    /// Checks that fields of this [`Reservation`] don't contradict each other.
    ///
    /// That is:
    /// - a paid [`Reservation`] is never left pending or cancelled without a
    ///   refund;
    /// - the `total` matches the `stay` and `nightly_rate`;
    /// - only a cancelled [`Reservation`] has [`Cancellation`] details.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let paid_consistently = self.payment.status != PaymentStatus::Paid
            || matches!(
                self.status,
                Status::Confirmed | Status::CheckedIn | Status::CheckedOut,
            );
        let total_consistent =
            self.nightly_rate.times(self.stay.nights()) == Some(self.total);
        let cancelled_consistently =
            (self.status == Status::Cancelled) == self.cancellation.is_some();

        paid_consistently && total_consistent && cancelled_consistently
    }
}

/// Parameters of [`Reservation::book()`].
#[derive(Clone, Debug)]
pub struct Booking<'r> {
    /// Unique booking [`Reference`] of the new [`Reservation`].
    pub reference: Reference,

    /// [`Room`] to be booked.
    pub room: &'r Room,

    /// [`Guest`] making the [`Reservation`].
    pub guest: Guest,

    /// Nights to be booked.
    pub stay: DateRange,

    /// Number of guests staying.
    pub guests_count: GuestsCount,

    /// [`DateTime`] of booking.
    pub at: DateTime,
}

/// Error of [`Reservation::book()`].
#[derive(Clone, Copy, Debug, Display, Error)]
pub enum BookingError {
    /// [`Room`] doesn't accommodate the requested number of guests.
    #[display("`Room` accommodates {capacity} guests, but {requested} requested")]
    CapacityExceeded {
        /// Capacity of the [`Room`].
        capacity: room::Capacity,

        /// Requested number of guests.
        requested: GuestsCount,
    },

    /// Total price of the stay overflows.
    #[display("total price overflows")]
    TotalOverflow,
}

/// ID of a [`Reservation`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Number of guests staying under a [`Reservation`].
pub type GuestsCount = u16;

/// Payment details of a [`Reservation`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payment {
    /// [`PaymentStatus`] of the [`Reservation`].
    pub status: PaymentStatus,

    /// [`payment::Reference`] of the gateway transaction, once initiated.
    pub reference: Option<payment::Reference>,

    /// [`payment::Method`] the [`Reservation`] was paid with, once paid.
    pub method: Option<payment::Method>,

    /// [`payment::Authorization`] of the started gateway transaction, handed
    /// out again on repeated initiations.
    pub authorization: Option<payment::Authorization>,
}

/// Details of a cancelled [`Reservation`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cancellation {
    /// [`CancellationReason`] of the [`Reservation`].
    pub reason: CancellationReason,

    /// Amount to be refunded to the [`Guest`], if any money was captured.
    ///
    /// Set exactly once: when the [`Reservation`] is cancelled, or when its
    /// payment is verified as captured after the cancellation. Refund
    /// execution itself happens outside.
    pub refund: Option<Money>,

    /// [`DateTime`] when the [`Reservation`] was cancelled.
    pub cancelled_at: CancellationDateTime,
}

define_kind! {
    #[doc = "Lifecycle status of a [`Reservation`]."]
    #[case = "kebab-case"]
    enum Status {
        #[doc = "Booked, but not paid yet."]
        Pending = 1,

        #[doc = "Paid and holding the [`Room`]."]
        Confirmed = 2,

        #[doc = "Cancelled. Terminal."]
        Cancelled = 3,

        #[doc = "Guest is staying in the [`Room`]."]
        CheckedIn = 4,

        #[doc = "Guest has left the [`Room`]. Terminal."]
        CheckedOut = 5,
    }
}

impl Status {
    /// Statuses of [`Reservation`]s holding their [`Room`]s.
    pub const ACTIVE: [Self; 2] = [Self::Confirmed, Self::CheckedIn];

    /// Indicates whether this [`Status`] holds the [`Room`], making it
    /// unavailable for overlapping stays.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Confirmed | Self::CheckedIn)
    }

    /// Indicates whether no transition leaves this [`Status`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::CheckedOut)
    }
}

define_kind! {
    #[doc = "Status of a [`Reservation`] payment."]
    #[case = "kebab-case"]
    enum PaymentStatus {
        #[doc = "Nothing is captured yet."]
        Pending = 1,

        #[doc = "Total is captured."]
        Paid = 2,

        #[doc = "Less than the total is captured."]
        Partial = 3,

        #[doc = "Captured money is flagged to be returned."]
        Refunded = 4,
    }
}

define_kind! {
    #[doc = "Reason of a [`Reservation`] cancellation."]
    #[case = "kebab-case"]
    enum CancellationReason {
        #[doc = "Payment gateway reported a non-successful transaction."]
        PaymentFailed = 1,

        #[doc = "Payment wasn't completed in time."]
        PaymentAbandoned = 2,

        #[doc = "Captured amount doesn't cover the total."]
        AmountMismatch = 3,

        #[doc = "[`Room`] was booked by someone else while paying."]
        AvailabilityLost = 4,

        #[doc = "Cancelled by the [`Guest`]."]
        GuestRequest = 5,

        #[doc = "Cancelled by the hotel staff."]
        StaffRequest = 6,
    }
}

/// Marker of a cancelled [`Reservation`] without a flagged refund.
///
/// Compared and swapped to flag a refund of money captured after the
/// cancellation.
#[derive(Clone, Copy, Debug)]
pub struct Unrefunded;

/// [`DateTime`] when a [`Reservation`] was created.
pub type CreationDateTime = DateTimeOf<(Reservation, unit::Creation)>;

/// [`DateTime`] when a [`Reservation`] was modified the last time.
pub type ModificationDateTime = DateTimeOf<(Reservation, unit::Modification)>;

/// [`DateTime`] when a [`Reservation`] was cancelled.
pub type CancellationDateTime = DateTimeOf<(Reservation, unit::Cancellation)>;

#[cfg(test)]
pub(crate) mod spec {
    use std::str::FromStr as _;

    use common::{Date, DateRange, DateTime, Money};

    use crate::domain::{guest, room, Guest, Room};

    use super::{
        Booking, BookingError, PaymentStatus, Prefix, Reference, Reservation,
        Status,
    };

    pub(crate) fn room() -> Room {
        Room {
            key: room::Key::new("deluxe-101").unwrap(),
            name: room::Name::new("Deluxe 101").unwrap(),
            nightly_rate: Money::from_str("15000NGN").unwrap(),
            capacity: 2,
        }
    }

    pub(crate) fn stay(from: u8, to: u8) -> DateRange {
        DateRange::new(
            Date::from_ymd(2031, 3, from).unwrap(),
            Date::from_ymd(2031, 3, to).unwrap(),
        )
        .unwrap()
    }

    pub(crate) fn pending(stay: DateRange) -> Reservation {
        let room = room();
        Reservation::book(Booking {
            reference: Reference::generate(&Prefix::default(), DateTime::now()),
            room: &room,
            guest: Guest {
                id: guest::Id::new("anon-1"),
                name: guest::Name::new("Ada Lovelace").unwrap(),
                email: guest::Email::new("ada@example.com").unwrap(),
                phone: None,
            },
            stay,
            guests_count: 2,
            at: DateTime::now(),
        })
        .unwrap()
    }

    #[test]
    fn books_pending_with_total() {
        let r = pending(stay(2, 5));

        assert_eq!(r.status, Status::Pending);
        assert_eq!(r.payment.status, PaymentStatus::Pending);
        assert_eq!(r.total, Money::from_str("45000NGN").unwrap());
        assert!(r.cancellation.is_none());
        assert!(r.is_consistent());
    }

    #[test]
    fn rejects_exceeding_capacity() {
        let room = room();
        let err = Reservation::book(Booking {
            reference: Reference::generate(&Prefix::default(), DateTime::now()),
            room: &room,
            guest: pending(stay(2, 5)).guest,
            stay: stay(2, 5),
            guests_count: 3,
            at: DateTime::now(),
        })
        .unwrap_err();

        assert!(matches!(
            err,
            BookingError::CapacityExceeded { capacity: 2, requested: 3 },
        ));
    }

    #[test]
    fn only_confirmed_and_checked_in_are_active() {
        let active = Status::ALL
            .iter()
            .copied()
            .filter(|s| s.is_active())
            .collect::<Vec<_>>();

        assert_eq!(active, Status::ACTIVE);
        assert_eq!(Status::from_str("checked-in"), Ok(Status::CheckedIn));
        assert_eq!(Status::CheckedOut.to_string(), "checked-out");
    }
}
