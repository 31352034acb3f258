//! [`Command`] for creating a new [`Reservation`].

use common::{
    operations::{By, Insert, Select},
    Date, DateRange, DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        reservation::{self, Booking, BookingError},
        room, Guest, Reservation, Room,
    },
    infra::{database, Database},
    query::{check_availability, CheckAvailability},
    read::{reservation::Active, Conflicts},
    Service,
};

use super::Command;

/// [`Command`] for creating a new [`Reservation`] awaiting its payment.
#[derive(Clone, Debug)]
pub struct CreateReservation {
    /// Key of the [`Room`] to be booked.
    pub room_key: room::Key,

    /// First night of the stay.
    pub check_in: Date,

    /// Day the stay ends at.
    pub check_out: Date,

    /// Number of guests staying.
    pub guests_count: reservation::GuestsCount,

    /// [`Guest`] making the [`Reservation`].
    pub guest: Guest,
}

/// Maximum number of attempts to generate a unique booking
/// [`reservation::Reference`].
const REFERENCE_ATTEMPTS: usize = 5;

impl<Db, Gw> Command<CreateReservation> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Room>, room::Key>>,
            Ok = Option<Room>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Reservation>, reservation::Reference>>,
            Ok = Option<Reservation>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<Active<Reservation>>, room::Key>>,
            Ok = Vec<Active<Reservation>>,
            Err = Traced<database::Error>,
        > + Database<Insert<Reservation>, Err = Traced<database::Error>>,
{
    type Ok = Reservation;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreateReservation,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateReservation {
            room_key,
            check_in,
            check_out,
            guests_count,
            guest,
        } = cmd;

        let stay = DateRange::new(check_in, check_out).map_err(|_| {
            tracerr::new!(E::InvalidRange {
                check_in,
                check_out,
            })
        })?;

        let room = self
            .database()
            .execute(Select(By::<Option<Room>, _>::new(room_key.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::RoomNotExists(room_key.clone()))
            .map_err(tracerr::wrap!())?;

        let availability = self
            .execute(CheckAvailability {
                room_key: room.key.clone(),
                stay,
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if !availability.is_available() {
            return Err(tracerr::new!(E::Unavailable(
                availability.conflicting_stays()
            )));
        }

        for _ in 0..REFERENCE_ATTEMPTS {
            let now = DateTime::now();
            let reference = reservation::Reference::generate(
                &self.config().booking_reference_prefix,
                now,
            );

            let taken = self
                .database()
                .execute(Select(By::<Option<Reservation>, _>::new(
                    reference.clone(),
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .is_some();
            if taken {
                continue;
            }

            let reservation = Reservation::book(Booking {
                reference,
                room: &room,
                guest: guest.clone(),
                stay,
                guests_count,
                at: now,
            })
            .map_err(tracerr::from_and_wrap!(=> E))?;

            match self.database().execute(Insert(reservation.clone())).await {
                Ok(_) => {
                    log::info!(
                        reference = %reservation.reference,
                        room = %reservation.room_key,
                        stay = %reservation.stay,
                        total = %reservation.total,
                        "reservation created",
                    );
                    return Ok(reservation);
                }
                Err(e)
                    if e.as_ref().is_unique_violation(Some(
                        database::constraint::RESERVATION_REFERENCE,
                    )) =>
                {
                    continue;
                }
                Err(e) => {
                    return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
                }
            }
        }

        Err(tracerr::new!(E::ReferenceExhausted))
    }
}

/// Error of [`CreateReservation`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Reservation`] cannot be booked.
    #[display("Cannot book `Reservation`: {_0}")]
    Booking(BookingError),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// Check-out is not after check-in.
    #[display("Check-out `{check_out}` is not after check-in `{check_in}`")]
    #[from(ignore)]
    InvalidRange {
        /// Requested check-in [`Date`].
        check_in: Date,

        /// Requested check-out [`Date`].
        check_out: Date,
    },

    /// Stay starts in the past.
    #[display("Stay starts in the past: {_0}")]
    #[from(ignore)]
    PastDates(#[error(not(source))] Date),

    /// Failed to generate a unique booking [`reservation::Reference`].
    #[display("Failed to generate a unique booking reference")]
    #[from(ignore)]
    ReferenceExhausted,

    /// [`Room`] with the provided key does not exist.
    #[display("`Room(key: {_0})` does not exist")]
    #[from(ignore)]
    RoomNotExists(#[error(not(source))] room::Key),

    /// [`Room`] is already booked for the requested stay.
    #[display("`Room` is already booked for: {_0}")]
    #[from(ignore)]
    Unavailable(#[error(not(source))] Conflicts),
}

impl From<check_availability::ExecutionError> for ExecutionError {
    fn from(e: check_availability::ExecutionError) -> Self {
        use check_availability::ExecutionError as E;

        match e {
            E::Db(e) => Self::Db(e),
            E::PastDates(date) => Self::PastDates(date),
        }
    }
}
