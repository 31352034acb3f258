//! [`Command`] for checking out a [`Reservation`].

use common::{
    operations::{By, CompareAndSwap, Select},
    DateTime,
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

/// [`Command`] for checking out the guest of a checked-in [`Reservation`].
///
/// Only hotel staff may perform it.
#[derive(Clone, Debug)]
pub struct CheckOutReservation {
    /// ID of the [`Reservation`] to be checked out.
    pub reservation_id: reservation::Id,

    /// [`Initiator`] of the check-out.
    pub initiator: Initiator,
}

impl<Db, Gw> Command<CheckOutReservation> for Service<Db, Gw>
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
        cmd: CheckOutReservation,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CheckOutReservation {
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
            .check_out(DateTime::now())
            .map_err(tracerr::from_and_wrap!(=> E))?;

        let swapped = self
            .database()
            .execute(CompareAndSwap {
                value: reservation.clone(),
                expected: Status::CheckedIn,
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if !swapped {
            return Err(tracerr::new!(E::Stale(reservation_id)));
        }

        log::info!(
            reference = %reservation.reference,
            room = %reservation.room_key,
            "guest checked out",
        );
        Ok(reservation)
    }
}

/// Error of [`CheckOutReservation`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Initiator`] is not a hotel staff member.
    #[display("Only staff may check out a `Reservation`")]
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

    /// [`Reservation`] cannot be checked out.
    #[display("Cannot check out `Reservation`: {_0}")]
    Transition(TransitionError),
}
