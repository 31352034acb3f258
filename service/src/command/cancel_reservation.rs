//! [`Command`] for cancelling a [`Reservation`].

use common::{
    operations::{By, CompareAndSwap, Select, Verify},
    DateTime, Money,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        guest, payment,
        reservation::{self, CancellationReason, Status, TransitionError},
        Reservation,
    },
    infra::{database, gateway, Database, Gateway},
    Service,
};

use super::{Command, Initiator};

/// [`Command`] for cancelling a [`Reservation`].
///
/// A paid [`Reservation`] has its total flagged for a refund. A pending
/// [`Reservation`] with a started payment has it verified in the payment
/// [`Gateway`] first, so the money captured already is flagged for a refund
/// too.
#[derive(Clone, Debug)]
pub struct CancelReservation {
    /// ID of the [`Reservation`] to be cancelled.
    pub reservation_id: reservation::Id,

    /// [`Initiator`] of the cancellation.
    pub initiator: Initiator,
}

/// Maximum number of times a cancellation is re-evaluated after losing a race
/// to a concurrent modification.
const MAX_REEVALUATIONS: usize = 3;

impl<Db, Gw> Command<CancelReservation> for Service<Db, Gw>
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
    Gw: Gateway<
        Verify<By<payment::Verification, payment::Reference>>,
        Ok = payment::Verification,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Reservation;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CancelReservation,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CancelReservation {
            reservation_id,
            initiator,
        } = cmd;

        let reason = match &initiator {
            Initiator::Guest(_) => CancellationReason::GuestRequest,
            Initiator::Staff => CancellationReason::StaffRequest,
            Initiator::System => CancellationReason::PaymentAbandoned,
        };

        for _ in 0..MAX_REEVALUATIONS {
            let mut reservation = self
                .database()
                .execute(Select(By::<Option<Reservation>, _>::new(
                    reservation_id,
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or(E::ReservationNotExists(reservation_id))
                .map_err(tracerr::wrap!())?;
            if let Initiator::Guest(id) = &initiator {
                if !reservation.is_made_by(id) {
                    return Err(tracerr::new!(E::NotOwner(id.clone())));
                }
            }

            let captured = match &reservation.payment.reference {
                Some(reference) if reservation.status == Status::Pending => {
                    self.captured_payment(reference)
                        .await
                        .map_err(tracerr::wrap!())?
                }
                Some(_) | None => None,
            };

            let expected = reservation.status;
            reservation
                .cancel(reason, captured, DateTime::now())
                .map_err(tracerr::from_and_wrap!(=> E))?;

            let swapped = self
                .database()
                .execute(CompareAndSwap {
                    value: reservation.clone(),
                    expected,
                })
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            if swapped {
                log::info!(
                    reference = %reservation.reference,
                    %reason,
                    refund = ?reservation
                        .cancellation
                        .as_ref()
                        .and_then(|c| c.refund),
                    "reservation cancelled",
                );
                return Ok(reservation);
            }
        }

        Err(tracerr::new!(E::Stale(reservation_id)))
    }
}

impl<Db, Gw> Service<Db, Gw> {
    /// Returns the amount captured by the payment [`Gateway`] for the
    /// transaction with the provided [`payment::Reference`], if any.
    async fn captured_payment(
        &self,
        reference: &payment::Reference,
    ) -> Result<Option<Money>, Traced<ExecutionError>>
    where
        Gw: Gateway<
            Verify<By<payment::Verification, payment::Reference>>,
            Ok = payment::Verification,
            Err = Traced<gateway::Error>,
        >,
    {
        let verification = self
            .verify_payment(reference)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> ExecutionError))?;
        Ok(match verification {
            payment::Verification::Success(receipt)
                if receipt.reference == *reference =>
            {
                log::warn!(
                    %reference,
                    captured = %receipt.amount,
                    "payment captured for reservation being cancelled",
                );
                Some(receipt.amount)
            }
            payment::Verification::Success(_)
            | payment::Verification::Failure { .. }
            | payment::Verification::Unknown => None,
        })
    }
}

/// Error of [`CancelReservation`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Gateway`] error.
    #[display("`Gateway` operation failed: {_0}")]
    Gateway(gateway::Error),

    /// [`Reservation`] is made by another [`Guest`].
    ///
    /// [`Guest`]: crate::domain::Guest
    #[display("`Guest(id: {_0})` is not the owner of the `Reservation`")]
    #[from(ignore)]
    NotOwner(#[error(not(source))] guest::Id),

    /// [`Reservation`] with the provided ID does not exist.
    #[display("`Reservation(id: {_0})` does not exist")]
    #[from(ignore)]
    ReservationNotExists(#[error(not(source))] reservation::Id),

    /// [`Reservation`] keeps being concurrently modified.
    #[display("`Reservation(id: {_0})` keeps being concurrently modified")]
    #[from(ignore)]
    Stale(#[error(not(source))] reservation::Id),

    /// [`Reservation`] cannot be cancelled.
    #[display("Cannot cancel `Reservation`: {_0}")]
    Transition(TransitionError),
}
