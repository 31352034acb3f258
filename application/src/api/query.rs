//! GraphQL [`Query`]s definitions.

use common::{Date, DateRange};
use juniper::graphql_object;
use service::{query, Query as _};

use crate::{api, define_error, AsError, Context, Error};

/// Root of all GraphQL queries.
#[derive(Clone, Copy, Debug)]
pub struct Query;

impl Query {
    /// Name of the [`tracing::Span`] for the queries.
    pub(crate) const SPAN_NAME: &'static str = "GraphQL query";
}

#[graphql_object(context = Context)]
impl Query {
    /// Checks whether the `Room` is free for the whole stay.
    ///
    /// Only confirmed and checked-in `Reservation`s occupy a `Room`.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `INVALID_RANGE` - `checkOut` is not after `checkIn`;
    /// - `PAST_DATES` - the stay starts in the past.
    #[tracing::instrument(
        skip_all,
        fields(
            check_in = %check_in,
            check_out = %check_out,
            gql.name = "availability",
            otel.name = Self::SPAN_NAME,
            room = %room,
        ),
    )]
    pub async fn availability(
        room: api::room::Key,
        check_in: Date,
        check_out: Date,
        ctx: &Context,
    ) -> Result<api::reservation::Availability, Error> {
        let stay = DateRange::new(check_in, check_out)
            .map_err(|_| RangeError::Invalid.into())
            .map_err(ctx.error())?;

        ctx.service()
            .execute(query::CheckAvailability {
                room_key: room.into(),
                stay,
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the `Reservation` with the specified ID.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `RESERVATION_NOT_EXISTS` - the `Reservation` with the specified ID
    ///                              does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "reservation",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn reservation(
        id: api::reservation::Id,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        ctx.service()
            .execute(query::reservation::ById::by(id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| {
                api::reservation::ReservationError::NotExists.into()
            })
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the `Reservation` with the specified booking reference.
    ///
    /// Available to hotel staff only.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `AUTHORIZATION_REQUIRED` - the request is not authorized;
    /// - `NOT_STAFF` - the current user is not a hotel staff member;
    /// - `RESERVATION_NOT_EXISTS` - the `Reservation` with the specified
    ///                              reference does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "reservationByReference",
            otel.name = Self::SPAN_NAME,
            reference = %reference,
        ),
    )]
    pub async fn reservation_by_reference(
        reference: api::reservation::Reference,
        ctx: &Context,
    ) -> Result<api::Reservation, Error> {
        if !ctx.current_session().await?.is_staff() {
            return Err(api::PrivilegeError::Staff.into())
                .map_err(ctx.error());
        }

        ctx.service()
            .execute(query::reservation::ByReference::by(reference.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| {
                api::reservation::ReservationError::NotExists.into()
            })
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the `Room` with the specified key.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `ROOM_NOT_EXISTS` - the `Room` with the specified key does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "room",
            key = %key,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn room(
        key: api::room::Key,
        ctx: &Context,
    ) -> Result<api::Room, Error> {
        ctx.service()
            .execute(query::room::ByKey::by(key.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| RoomError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the public key of the payment gateway for inline payments.
    pub fn payment_public_key(ctx: &Context) -> Option<String> {
        ctx.payment_public_key().map(|key| key.0.clone())
    }
}

impl AsError for query::check_availability::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::PastDates(_) => Some(RangeError::Past.into()),
        }
    }
}

define_error! {
    enum RangeError {
        #[code = "INVALID_RANGE"]
        #[status = BAD_REQUEST]
        #[message = "Check-out must be after check-in"]
        Invalid,

        #[code = "PAST_DATES"]
        #[status = BAD_REQUEST]
        #[message = "Stay cannot start in the past"]
        Past,
    }
}

define_error! {
    enum RoomError {
        #[code = "ROOM_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`Room` with the specified key does not exist"]
        NotExists,
    }
}
