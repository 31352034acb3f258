//! GraphQL [`Mutation`]s definitions.

use common::Date;
use juniper::graphql_object;
use service::{
    command::{self, Initiator},
    domain::{reservation::BookingError, Guest},
    Command as _,
};

use crate::{
    api, context::AuthError, define_error, AsError, Context, Error,
};

/// Root of all GraphQL mutations.
#[derive(Clone, Copy, Debug)]
pub struct Mutation;

impl Mutation {
    /// Name of the [`tracing::Span`] for the mutations.
    const SPAN_NAME: &'static str = "GraphQL mutation";
}

#[graphql_object(context = Context)]
impl Mutation {
    /// Books the `Room` for the stay, creating a pending `Reservation`
    /// awaiting its payment.
    ///
    /// The `Reservation` is attributed to the authenticated user, or to the
    /// provided anonymous `guestId` otherwise.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `INVALID_RANGE` - `checkOut` is not after `checkIn`;
    /// - `PAST_DATES` - the stay starts in the past;
    /// - `INVALID_GUESTS_COUNT` - `guestsCount` is not positive;
    /// - `ROOM_NOT_EXISTS` - the `Room` with the specified key does not exist;
    /// - `CAPACITY_EXCEEDED` - the `Room` cannot accommodate so many guests;
    /// - `ROOM_UNAVAILABLE` - the `Room` is already booked for the stay.
    #[tracing::instrument(
        skip_all,
        fields(
            check_in = %check_in,
            check_out = %check_out,
            gql.name = "createReservation",
            guests_count = guests_count,
            otel.name = Self::SPAN_NAME,
            room = %room,
        ),
    )]
    #[expect(clippy::too_many_arguments, reason = "GraphQL arguments")]
    pub async fn create_reservation(
        room: api::room::Key,
        check_in: Date,
        check_out: Date,
        guests_count: i32,
        guest_name: api::reservation::GuestName,
        guest_email: api::reservation::GuestEmail,
        guest_phone: Option<api::reservation::GuestPhone>,
        guest_id: Option<api::reservation::GuestId>,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        let guests_count = u16::try_from(guests_count)
            .ok()
            .filter(|count| *count > 0)
            .ok_or_else(|| GuestsCountError::Invalid.into())
            .map_err(ctx.error())?;
        let guest_id = match ctx.try_current_session().await? {
            Some(session) => Some(session.user_id),
            None => guest_id.map(Into::into),
        };

        ctx.service()
            .execute(command::CreateReservation {
                room_key: room.into(),
                check_in,
                check_out,
                guests_count,
                guest: Guest {
                    id: guest_id,
                    name: guest_name.into(),
                    email: guest_email.into(),
                    phone: guest_phone.map(Into::into),
                },
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Starts the payment of the pending `Reservation` in the payment
    /// gateway.
    ///
    /// Starting it again returns the checkout of the same payment transaction.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `RESERVATION_NOT_EXISTS` - the `Reservation` with the specified ID
    ///                              does not exist;
    /// - `WRONG_STATUS` - the `Reservation` is not pending;
    /// - `GATEWAY_UNAVAILABLE` - the payment gateway cannot be reached.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "initiatePayment",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn initiate_payment(
        id: api::reservation::Id,
        ctx: &Context,
    ) -> Result<api::reservation::PaymentAuthorization, Error> {
        ctx.service()
            .execute(command::InitiatePayment {
                reservation_id: id.into(),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Settles the `Reservation` paid via the specified transaction, once
    /// the payment gateway verifies it.
    ///
    /// Confirming an already settled `Reservation` changes nothing. Money
    /// captured for an already cancelled `Reservation` is flagged for a
    /// refund.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `RESERVATION_NOT_EXISTS` - no `Reservation` is paid with the
    ///                              specified reference;
    /// - `PAYMENT_FAILED` - the payment is not successful, so the
    ///                      `Reservation` is cancelled;
    /// - `GATEWAY_UNAVAILABLE` - the payment gateway cannot be reached;
    /// - `TRY_AGAIN` - the `Reservation` is being modified concurrently.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "confirmPayment",
            otel.name = Self::SPAN_NAME,
            reference = %reference,
        ),
    )]
    pub async fn confirm_payment(
        reference: api::reservation::PaymentReference,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        ctx.service()
            .execute(command::ConfirmPayment {
                reference: reference.into(),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(|outcome| outcome.into_reservation().into())
    }

    /// Cancels the `Reservation`.
    ///
    /// Guests may cancel only their own `Reservation`s, identified either by
    /// the authenticated user or by the provided anonymous `guestId`. A paid
    /// `Reservation` gets its total flagged for a refund. A pending one with a
    /// started payment gets the amount captured so far flagged instead.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `AUTHORIZATION_REQUIRED` - neither authorized nor `guestId` provided;
    /// - `RESERVATION_NOT_EXISTS` - the `Reservation` with the specified ID
    ///                              does not exist;
    /// - `NOT_OWNER` - the `Reservation` is made by another guest;
    /// - `WRONG_STATUS` - the `Reservation` is already finished;
    /// - `GATEWAY_UNAVAILABLE` - the started payment cannot be verified.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "cancelReservation",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn cancel_reservation(
        id: api::reservation::Id,
        guest_id: Option<api::reservation::GuestId>,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        let initiator = match (ctx.try_current_session().await?, guest_id) {
            (Some(session), _) => Initiator::from(&session),
            (None, Some(guest_id)) => Initiator::Guest(guest_id.into()),
            (None, None) => {
                return Err(AuthError::AuthorizationRequired.into())
                    .map_err(ctx.error());
            }
        };

        ctx.service()
            .execute(command::CancelReservation {
                reservation_id: id.into(),
                initiator,
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Checks in the guest of the confirmed `Reservation`.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `AUTHORIZATION_REQUIRED` - the request is not authorized;
    /// - `NOT_STAFF` - the current user is not a hotel staff member;
    /// - `RESERVATION_NOT_EXISTS` - the `Reservation` with the specified ID
    ///                              does not exist;
    /// - `WRONG_STATUS` - the `Reservation` is not confirmed;
    /// - `STAY_NOT_STARTED` - the stay hasn't started yet.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "checkInReservation",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn check_in_reservation(
        id: api::reservation::Id,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        let session = ctx.current_session().await?;

        ctx.service()
            .execute(command::CheckInReservation {
                reservation_id: id.into(),
                initiator: Initiator::from(&session),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Checks out the guest of the checked-in `Reservation`.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `AUTHORIZATION_REQUIRED` - the request is not authorized;
    /// - `NOT_STAFF` - the current user is not a hotel staff member;
    /// - `RESERVATION_NOT_EXISTS` - the `Reservation` with the specified ID
    ///                              does not exist;
    /// - `WRONG_STATUS` - the `Reservation` is not checked in.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "checkOutReservation",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn check_out_reservation(
        id: api::reservation::Id,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        let session = ctx.current_session().await?;

        ctx.service()
            .execute(command::CheckOutReservation {
                reservation_id: id.into(),
                initiator: Initiator::from(&session),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }
}

define_error! {
    enum GuestsCountError {
        #[code = "INVALID_GUESTS_COUNT"]
        #[status = BAD_REQUEST]
        #[message = "Number of guests must be positive"]
        Invalid,
    }
}

define_error! {
    enum OwnerError {
        #[code = "NOT_OWNER"]
        #[status = FORBIDDEN]
        #[message = "`Reservation` is made by another guest"]
        NotOwner,
    }
}

impl AsError for command::create_reservation::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "CAPACITY_EXCEEDED"]
                #[status = BAD_REQUEST]
                #[message = "`Room` cannot accommodate so many guests"]
                CapacityExceeded,

                #[code = "ROOM_UNAVAILABLE"]
                #[status = CONFLICT]
                #[message = "`Room` is already booked for those dates"]
                RoomUnavailable,
            }
        }

        Some(match self {
            Self::Booking(BookingError::CapacityExceeded { .. }) => {
                Error::CapacityExceeded.into()
            }
            Self::Booking(BookingError::TotalOverflow)
            | Self::ReferenceExhausted => return None,
            Self::Db(e) => return e.try_as_error(),
            Self::InvalidRange { .. } => api::query::RangeError::Invalid.into(),
            Self::PastDates(_) => api::query::RangeError::Past.into(),
            Self::RoomNotExists(_) => api::query::RoomError::NotExists.into(),
            Self::Unavailable(conflicts) => crate::Error {
                message: format!(
                    "`Room` is already booked for: {conflicts}",
                ),
                ..Error::RoomUnavailable.into()
            },
        })
    }
}

impl AsError for command::initiate_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::Gateway(e) => return e.try_as_error(),
            Self::ReferenceMismatch(_) | Self::UnsupportedCurrency(_) => {
                return None;
            }
            Self::ReservationNotExists(_) => {
                api::reservation::ReservationError::NotExists.into()
            }
            Self::Stale(_) => api::StaleError::Reservation.into(),
            Self::Transition(e) => return e.try_as_error(),
        })
    }
}

impl AsError for command::confirm_payment::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::Gateway(e) => return e.try_as_error(),
            Self::ReservationNotExists(_) => {
                api::reservation::ReservationError::NotExists.into()
            }
            Self::Stale(_) => api::StaleError::Reservation.into(),
            Self::Transition(e) => return e.try_as_error(),
            Self::VerificationFailed(_) => {
                api::reservation::ReservationError::PaymentFailed.into()
            }
        })
    }
}

impl AsError for command::cancel_reservation::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::Gateway(e) => return e.try_as_error(),
            Self::NotOwner(_) => OwnerError::NotOwner.into(),
            Self::ReservationNotExists(_) => {
                api::reservation::ReservationError::NotExists.into()
            }
            Self::Stale(_) => api::StaleError::Reservation.into(),
            Self::Transition(e) => return e.try_as_error(),
        })
    }
}

impl AsError for command::check_in_reservation::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NotStaff => api::PrivilegeError::Staff.into(),
            Self::ReservationNotExists(_) => {
                api::reservation::ReservationError::NotExists.into()
            }
            Self::Stale(_) => api::StaleError::Reservation.into(),
            Self::Transition(e) => return e.try_as_error(),
        })
    }
}

impl AsError for command::check_out_reservation::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        Some(match self {
            Self::Db(e) => return e.try_as_error(),
            Self::NotStaff => api::PrivilegeError::Staff.into(),
            Self::ReservationNotExists(_) => {
                api::reservation::ReservationError::NotExists.into()
            }
            Self::Stale(_) => api::StaleError::Reservation.into(),
            Self::Transition(e) => return e.try_as_error(),
        })
    }
}
