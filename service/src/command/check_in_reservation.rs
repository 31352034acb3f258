//! [`Command`] for checking in a [`Reservation`].

use common::{
    operations::{By, CompareAndSwap, Select},
    Date, DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        reservation::{self, Status, TransitionError},
        Reservation,
    },
    infra::{database, Database},
    Service,
};

use super::{Command, Initiator};

/// [`Command`] for checking in the guest of a confirmed [`Reservation`].
///
/// Only hotel staff may perform it.
#[derive(Clone, Debug)]
pub struct CheckInReservation {
    /// ID of the [`Reservation`] to be checked in.
    pub reservation_id: reservation::Id,

    /// [`Initiator`] of the check-in.
    pub initiator: Initiator,
}

impl<Db, Gw> Command<CheckInReservation> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Reservation>, reservation::Id>>,
            Ok = Option<Reservation>,
            Err = Traced<database::Error>,
        > + Database<
            CompareAndSwap<Reservation, reservation::Status>,
            Ok = bool,
            Err = Traced<database::Error>,
        >,
{
    type Ok = Reservation;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CheckInReservation,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CheckInReservation {
            reservation_id,
            initiator,
        } = cmd;

        if initiator != Initiator::Staff {
            return Err(tracerr::new!(E::NotStaff));
        }

        let mut reservation = self
            .database()
            .execute(Select(By::<Option<Reservation>, _>::new(reservation_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ReservationNotExists(reservation_id))
            .map_err(tracerr::wrap!())?;

        reservation
            .check_in(Date::today(), DateTime::now())
            .map_err(tracerr::from_and_wrap!(=> E))?;

        let swapped = self
            .database()
            .execute(CompareAndSwap {
                value: reservation.clone(),
                expected: Status::Confirmed,
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if !swapped {
            return Err(tracerr::new!(E::Stale(reservation_id)));
        }

        log::info!(
            reference = %reservation.reference,
            room = %reservation.room_key,
            "guest checked in",
        );
        Ok(reservation)
    }
}

/// Error of [`CheckInReservation`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Initiator`] is not a hotel staff member.
    #[display("Only staff may check in a `Reservation`")]
    #[from(ignore)]
    NotStaff,

    /// [`Reservation`] with the provided ID does not exist.
    #[display("`Reservation(id: {_0})` does not exist")]
    #[from(ignore)]
    ReservationNotExists(#[error(not(source))] reservation::Id),

    /// [`Reservation`] has been concurrently modified.
    #[display("`Reservation(id: {_0})` has been concurrently modified")]
    #[from(ignore)]
    Stale(#[error(not(source))] reservation::Id),

    /// [`Reservation`] cannot be checked in.
    #[display("Cannot check in `Reservation`: {_0}")]
    Transition(TransitionError),
}
