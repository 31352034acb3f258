//! [`Reservation`]-related definitions.

use common::{Date, DateTime, Money};
use derive_more::{AsRef, Display, From, Into};
use juniper::{graphql_object, GraphQLEnum, GraphQLObject, GraphQLScalar};
use service::{
    domain::{self, reservation::TransitionError},
    query, read, Query as _,
};
use uuid::Uuid;

use crate::{api, api::scalar, define_error, AsError, Context, Error};

/// A room booking.
#[derive(Clone, Debug, From, Into)]
pub struct Reservation(domain::Reservation);

/// A room booking.
#[graphql_object(context = Context)]
impl Reservation {
    /// Unique identifier of this `Reservation`.
    pub fn id(&self) -> Id {
        self.0.id.into()
    }

    /// Human-readable booking reference of this `Reservation`.
    ///
    /// Doubles as the reference of its payment transaction.
    pub fn reference(&self) -> Reference {
        self.0.reference.clone().into()
    }

    /// Booked `Room`.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `ROOM_NOT_EXISTS` - the `Room` has been removed since.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Reservation.room",
            otel.name = api::Query::SPAN_NAME,
            room = %self.0.room_key,
        ),
    )]
    pub async fn room(&self, ctx: &Context) -> Result<api::Room, Error> {
        ctx.service()
            .execute(query::room::ByKey::by(self.0.room_key.clone()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| api::query::RoomError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Name of the guest.
    pub fn guest_name(&self) -> String {
        self.0.guest.name.to_string()
    }

    /// Email of the guest.
    pub fn guest_email(&self) -> String {
        self.0.guest.email.to_string()
    }

    /// Phone of the guest, if provided.
    pub fn guest_phone(&self) -> Option<String> {
        self.0.guest.phone.as_ref().map(ToString::to_string)
    }

    /// Booked stay.
    pub fn stay(&self) -> Stay {
        self.0.stay.into()
    }

    /// Number of guests staying.
    pub fn guests_count(&self) -> i32 {
        self.0.guests_count.into()
    }

    /// Price of a single night, as it was at the booking time.
    pub fn nightly_rate(&self) -> Money {
        self.0.nightly_rate
    }

    /// Total price of the stay.
    pub fn total(&self) -> Money {
        self.0.total
    }

    /// Lifecycle status of this `Reservation`.
    pub fn status(&self) -> Status {
        self.0.status.into()
    }

    /// Status of the payment of this `Reservation`.
    pub fn payment_status(&self) -> PaymentStatus {
        self.0.payment.status.into()
    }

    /// Reference of the payment transaction, once started.
    pub fn payment_reference(&self) -> Option<PaymentReference> {
        self.0.payment.reference.clone().map(Into::into)
    }

    /// Channel the payment was made through, once paid.
    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.0.payment.method.map(Into::into)
    }

    /// Details of the cancellation, if this `Reservation` is cancelled.
    pub fn cancellation(&self) -> Option<Cancellation> {
        self.0.cancellation.as_ref().map(|c| Cancellation {
            reason: c.reason.into(),
            refund: c.refund,
            cancelled_at: c.cancelled_at.coerce(),
        })
    }

    /// `DateTime` when this `Reservation` was created.
    pub fn created_at(&self) -> DateTime {
        self.0.created_at.coerce()
    }

    /// `DateTime` when this `Reservation` was last modified.
    pub fn updated_at(&self) -> DateTime {
        self.0.updated_at.coerce()
    }
}

/// Unique identifier of a `Reservation`.
#[derive(Clone, Copy, Debug, Display, From, GraphQLScalar, Into)]
#[from(domain::reservation::Id)]
#[into(domain::reservation::Id)]
#[graphql(name = "ReservationId", transparent)]
pub struct Id(Uuid);

/// Booking reference of a `Reservation`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ReservationReference",
    with = scalar::Parsed::<domain::reservation::Reference>,
)]
pub struct Reference(domain::reservation::Reference);

/// Reference of a payment transaction.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "PaymentReference",
    with = scalar::Parsed::<domain::payment::Reference>,
)]
pub struct PaymentReference(domain::payment::Reference);

/// Identifier of a guest: either ID of an authenticated user, or an
/// anonymous guest ID.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "GuestId", with = scalar::Parsed::<domain::guest::Id>)]
pub struct GuestId(domain::guest::Id);

/// Name of a guest.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "GuestName", with = scalar::Parsed::<domain::guest::Name>)]
pub struct GuestName(domain::guest::Name);

/// Email of a guest.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "GuestEmail", with = scalar::Parsed::<domain::guest::Email>)]
pub struct GuestEmail(domain::guest::Email);

/// Phone of a guest.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "GuestPhone", with = scalar::Parsed::<domain::guest::Phone>)]
pub struct GuestPhone(domain::guest::Phone);

/// Stay of a `Reservation`.
#[derive(Clone, Copy, Debug, GraphQLObject)]
pub struct Stay {
    /// First night of the stay.
    pub check_in: Date,

    /// Day the stay ends at.
    pub check_out: Date,

    /// Number of nights.
    pub nights: i32,
}

impl From<common::DateRange> for Stay {
    fn from(range: common::DateRange) -> Self {
        Self {
            check_in: range.start(),
            check_out: range.end(),
            nights: i32::try_from(range.nights()).unwrap_or(i32::MAX),
        }
    }
}

/// Cancellation of a `Reservation`.
#[derive(Clone, Debug, GraphQLObject)]
pub struct Cancellation {
    /// Reason of the cancellation.
    pub reason: CancellationReason,

    /// Amount flagged for a refund, if any.
    pub refund: Option<Money>,

    /// `DateTime` when the `Reservation` was cancelled.
    pub cancelled_at: DateTime,
}

/// Availability of a `Room` for a stay.
#[derive(Clone, Debug, From)]
pub struct Availability(read::Availability);

/// Availability of a `Room` for a stay.
#[graphql_object(context = Context)]
impl Availability {
    /// Indicates whether the `Room` is free for the whole stay.
    pub fn available(&self) -> bool {
        self.0.is_available()
    }

    /// Already booked stays overlapping the requested one.
    pub fn conflicts(&self) -> Vec<Stay> {
        self.0.conflicting_stays().iter().copied().map(Into::into).collect()
    }
}

/// Payment transaction started in the payment gateway.
#[derive(Clone, Debug, From)]
pub struct PaymentAuthorization(domain::payment::Authorization);

/// Payment transaction started in the payment gateway, awaiting the payer.
#[graphql_object(context = Context)]
impl PaymentAuthorization {
    /// URL of the gateway checkout page to redirect the payer to.
    pub fn authorization_url(&self) -> &str {
        &self.0.authorization_url
    }

    /// Code of the checkout for inline (popup) payments.
    pub fn access_code(&self) -> &str {
        &self.0.access_code
    }

    /// Reference of the transaction.
    pub fn reference(&self) -> PaymentReference {
        self.0.reference.clone().into()
    }
}

/// Lifecycle status of a `Reservation`.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
#[graphql(name = "ReservationStatus")]
pub enum Status {
    /// Awaiting its payment.
    Pending,

    /// Paid and holding the `Room`.
    Confirmed,

    /// Cancelled.
    Cancelled,

    /// Guest has arrived.
    CheckedIn,

    /// Guest has left.
    CheckedOut,
}

impl From<domain::reservation::Status> for Status {
    fn from(status: domain::reservation::Status) -> Self {
        use domain::reservation::Status as S;
        match status {
            S::Pending => Self::Pending,
            S::Confirmed => Self::Confirmed,
            S::Cancelled => Self::Cancelled,
            S::CheckedIn => Self::CheckedIn,
            S::CheckedOut => Self::CheckedOut,
        }
    }
}

/// Status of a `Reservation` payment.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
pub enum PaymentStatus {
    /// Not paid yet.
    Pending,

    /// Fully paid.
    Paid,

    /// Paid partially.
    Partial,

    /// Flagged for a refund.
    Refunded,
}

impl From<domain::reservation::PaymentStatus> for PaymentStatus {
    fn from(status: domain::reservation::PaymentStatus) -> Self {
        use domain::reservation::PaymentStatus as S;
        match status {
            S::Pending => Self::Pending,
            S::Paid => Self::Paid,
            S::Partial => Self::Partial,
            S::Refunded => Self::Refunded,
        }
    }
}

/// Channel a payment was made through.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
pub enum PaymentMethod {
    /// Debit or credit card.
    Card,

    /// Direct bank account debit.
    Bank,

    /// Bank transfer.
    BankTransfer,

    /// USSD code.
    Ussd,

    /// Mobile money wallet.
    MobileMoney,

    /// QR code scan.
    Qr,
}

impl From<domain::payment::Method> for PaymentMethod {
    fn from(method: domain::payment::Method) -> Self {
        use domain::payment::Method as M;
        match method {
            M::Card => Self::Card,
            M::Bank => Self::Bank,
            M::BankTransfer => Self::BankTransfer,
            M::Ussd => Self::Ussd,
            M::MobileMoney => Self::MobileMoney,
            M::Qr => Self::Qr,
        }
    }
}

/// Reason of a `Reservation` cancellation.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
pub enum CancellationReason {
    /// Payment gateway reported the payment as unsuccessful.
    PaymentFailed,

    /// Payment was never completed in time.
    PaymentAbandoned,

    /// Captured amount didn't cover the total.
    AmountMismatch,

    /// `Room` got booked by someone else while paying.
    AvailabilityLost,

    /// Guest cancelled.
    GuestRequest,

    /// Hotel staff cancelled.
    StaffRequest,
}

impl From<domain::reservation::CancellationReason> for CancellationReason {
    fn from(reason: domain::reservation::CancellationReason) -> Self {
        use domain::reservation::CancellationReason as R;
        match reason {
            R::PaymentFailed => Self::PaymentFailed,
            R::PaymentAbandoned => Self::PaymentAbandoned,
            R::AmountMismatch => Self::AmountMismatch,
            R::AvailabilityLost => Self::AvailabilityLost,
            R::GuestRequest => Self::GuestRequest,
            R::StaffRequest => Self::StaffRequest,
        }
    }
}

define_error! {
    enum ReservationError {
        #[code = "RESERVATION_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`Reservation` with the specified ID does not exist"]
        NotExists,

        #[code = "WRONG_STATUS"]
        #[status = CONFLICT]
        #[message = "`Reservation` is not in a suitable status"]
        WrongStatus,

        #[code = "PAYMENT_FAILED"]
        #[status = PAYMENT_REQUIRED]
        #[message = "Payment is not successful"]
        PaymentFailed,

        #[code = "STAY_NOT_STARTED"]
        #[status = CONFLICT]
        #[message = "Stay has not started yet"]
        StayNotStarted,
    }
}

impl AsError for TransitionError {
    fn try_as_error(&self) -> Option<Error> {
        let kind = match self {
            Self::WrongStatus { .. }
            | Self::PaymentAlreadyAttached(_)
            | Self::RefundAlreadyFlagged(_) => ReservationError::WrongStatus,
            Self::Underpaid { .. } => ReservationError::PaymentFailed,
            Self::StayNotStarted(_) => ReservationError::StayNotStarted,
        };
        Some(Error {
            message: format!("{kind}: {self}"),
            ..kind.into()
        })
    }
}
