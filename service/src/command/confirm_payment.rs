//! [`Command`] for confirming a [`Reservation`] once its payment succeeds.

use common::{
    operations::{
        By, Commit, CompareAndSwap, Lock, Select, Transact, Transacted, Verify,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        payment,
        reservation::{self, CancellationReason, Status, TransitionError},
        room, Reservation, Room,
    },
    infra::{database, gateway, Database, Gateway},
    read::{reservation::Active, Availability},
    Service,
};

use super::Command;

/// [`Command`] for settling a pending [`Reservation`] by the verdict of the
/// payment [`Gateway`] about its transaction.
///
/// Money captured for a [`Reservation`] cancelled meanwhile is flagged for a
/// refund.
///
/// Executing it again with the same reference changes nothing and returns
/// the already settled [`Outcome`], or the same error.
#[derive(Clone, Debug)]
pub struct ConfirmPayment {
    /// [`payment::Reference`] of the transaction to be verified.
    pub reference: payment::Reference,
}

/// Final state of a [`Reservation`] after a [`ConfirmPayment`].
#[derive(Clone, Debug)]
pub enum Outcome {
    /// [`Reservation`] has been confirmed by this [`ConfirmPayment`].
    Confirmed(Reservation),

    /// [`Reservation`] was confirmed before.
    AlreadyConfirmed(Reservation),

    /// [`Reservation`] is cancelled, either by this [`ConfirmPayment`] or
    /// before.
    Cancelled(Reservation),
}

impl Outcome {
    /// Returns the settled [`Reservation`].
    #[must_use]
    pub fn reservation(&self) -> &Reservation {
        match self {
            Self::Confirmed(r) | Self::AlreadyConfirmed(r) | Self::Cancelled(r) => r,
        }
    }

    /// Converts this [`Outcome`] into the settled [`Reservation`].
    #[must_use]
    pub fn into_reservation(self) -> Reservation {
        match self {
            Self::Confirmed(r) | Self::AlreadyConfirmed(r) | Self::Cancelled(r) => r,
        }
    }

    /// Returns the [`Outcome`] of a [`Reservation`] whose payment needs no
    /// more verification, or gives back one that does.
    ///
    /// Payment of a cancelled [`Reservation`] without a flagged refund is
    /// still verified, as its money might have been captured after the
    /// cancellation.
    fn of_verified(reservation: Reservation) -> Result<Self, Reservation> {
        let unrefunded = reservation
            .cancellation
            .as_ref()
            .is_some_and(|c| c.refund.is_none());
        match reservation.status {
            Status::Cancelled if unrefunded => Err(reservation),
            _ => Self::of_settled(reservation),
        }
    }

    /// Returns the [`Outcome`] of an already settled [`Reservation`], or
    /// gives back a still pending one.
    fn of_settled(reservation: Reservation) -> Result<Self, Reservation> {
        match reservation.status {
            Status::Pending => Err(reservation),
            Status::Cancelled => Ok(Self::Cancelled(reservation)),
            Status::Confirmed | Status::CheckedIn | Status::CheckedOut => {
                Ok(Self::AlreadyConfirmed(reservation))
            }
        }
    }
}

/// Maximum number of times a settlement is re-evaluated after losing a race
/// to a concurrent modification.
const MAX_REEVALUATIONS: usize = 3;

impl<Db, Gw> Command<ConfirmPayment> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Reservation>, reservation::Reference>>,
            Ok = Option<Reservation>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Reservation>, reservation::Id>>,
            Ok = Option<Reservation>,
            Err = Traced<database::Error>,
        > + Database<
            CompareAndSwap<Reservation, reservation::Status>,
            Ok = bool,
            Err = Traced<database::Error>,
        > + Database<
            CompareAndSwap<Reservation, reservation::Unrefunded>,
            Ok = bool,
            Err = Traced<database::Error>,
        > + Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Room, room::Key>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Reservation>, reservation::Id>>,
            Ok = Option<Reservation>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<Active<Reservation>>, room::Key>>,
            Ok = Vec<Active<Reservation>>,
            Err = Traced<database::Error>,
        > + Database<
            CompareAndSwap<Reservation, reservation::Status>,
            Ok = bool,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<
        Verify<By<payment::Verification, payment::Reference>>,
        Ok = payment::Verification,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Outcome;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: ConfirmPayment) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ConfirmPayment { reference } = cmd;

        let booking_reference = reservation::Reference::new(reference.as_ref())
            .ok_or_else(|| E::ReservationNotExists(reference.clone()))
            .map_err(tracerr::wrap!())?;
        let reservation = self
            .database()
            .execute(Select(By::<Option<Reservation>, _>::new(
                booking_reference,
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::ReservationNotExists(reference.clone()))
            .map_err(tracerr::wrap!())?;
        let reservation = match Outcome::of_verified(reservation) {
            Ok(outcome) => {
                log::debug!(
                    %reference,
                    status = %outcome.reservation().status,
                    "duplicate payment confirmation ignored",
                );
                return Ok(outcome);
            }
            Err(unsettled) => unsettled,
        };

        let verification = self
            .verify_payment(&reference)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        match verification {
            payment::Verification::Success(receipt)
                if receipt.reference == reference =>
            {
                if reservation.status == Status::Cancelled {
                    return self
                        .refund_cancelled(reservation.id, &receipt)
                        .await;
                }
                if receipt.covers(reservation.total) {
                    return self.commit_paid(&reservation, &receipt).await;
                }

                log::warn!(
                    %reference,
                    captured = %receipt.amount,
                    total = %reservation.total,
                    "captured amount doesn't cover the total, refund flagged",
                );
                self.cancel_pending(
                    reservation.id,
                    CancellationReason::AmountMismatch,
                    Some(&receipt),
                )
                .await
            }
            payment::Verification::Success(receipt) => {
                log::warn!(
                    %reference,
                    foreign = %receipt.reference,
                    "anomaly: payment gateway verified a foreign transaction",
                );
                self.fail_pending(&reservation, reference).await
            }
            payment::Verification::Failure { status } => {
                log::warn!(%reference, %status, "payment verification failed");
                self.fail_pending(&reservation, reference).await
            }
            payment::Verification::Unknown => {
                log::warn!(
                    %reference,
                    "anomaly: payment gateway doesn't know the transaction",
                );
                self.fail_pending(&reservation, reference).await
            }
        }
    }
}

impl<Db, Gw> Service<Db, Gw> {
    /// Commits the verified [`payment::Receipt`] into the provided pending
    /// [`Reservation`].
    ///
    /// The [`Reservation`] is confirmed only if its [`Room`] is still free at
    /// the commit time. Otherwise, it's cancelled with the captured amount
    /// flagged for a refund. The same refund is flagged if the
    /// [`Reservation`] has been cancelled concurrently.
    async fn commit_paid(
        &self,
        reservation: &Reservation,
        receipt: &payment::Receipt,
    ) -> Result<Outcome, Traced<ExecutionError>>
    where
        Db: Database<
                Select<By<Option<Reservation>, reservation::Id>>,
                Ok = Option<Reservation>,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Unrefunded>,
                Ok = bool,
                Err = Traced<database::Error>,
            > + Database<Transact, Err = Traced<database::Error>>,
        Transacted<Db>: Database<
                Lock<By<Room, room::Key>>,
                Err = Traced<database::Error>,
            > + Database<
                Select<By<Option<Reservation>, reservation::Id>>,
                Ok = Option<Reservation>,
                Err = Traced<database::Error>,
            > + Database<
                Select<By<Vec<Active<Reservation>>, room::Key>>,
                Ok = Vec<Active<Reservation>>,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Status>,
                Ok = bool,
                Err = Traced<database::Error>,
            > + Database<Commit, Err = Traced<database::Error>>,
    {
        use ExecutionError as E;

        for _ in 0..MAX_REEVALUATIONS {
            let tx = self
                .database()
                .execute(Transact)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;

            // Serialize commits upon the same `Room`.
            tx.execute(Lock(By::<Room, _>::new(reservation.room_key.clone())))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            let current = tx
                .execute(Select(By::<Option<Reservation>, _>::new(
                    reservation.id,
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or_else(|| {
                    E::ReservationNotExists(receipt.reference.clone())
                })
                .map_err(tracerr::wrap!())?;
            let mut current = match Outcome::of_settled(current) {
                Ok(Outcome::Cancelled(cancelled)) => {
                    // `Memory` transaction holds the whole storage.
                    drop(tx);
                    return self.refund_cancelled(cancelled.id, receipt).await;
                }
                Ok(outcome) => return Ok(outcome),
                Err(pending) => pending,
            };

            let active = tx
                .execute(Select(By::<Vec<Active<Reservation>>, _>::new(
                    current.room_key.clone(),
                )))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            let availability = Availability::among(
                &current.stay,
                active.into_iter().filter(|r| r.id != current.id),
            );

            let now = DateTime::now();
            if availability.is_available() {
                current
                    .confirm(receipt, now)
                    .map_err(tracerr::from_and_wrap!(=> E))?;
            } else {
                current
                    .cancel(
                        CancellationReason::AvailabilityLost,
                        Some(receipt.amount),
                        now,
                    )
                    .map_err(tracerr::from_and_wrap!(=> E))?;
            }

            match tx
                .execute(CompareAndSwap {
                    value: current.clone(),
                    expected: Status::Pending,
                })
                .await
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e)
                    if e.as_ref().is_exclusion_violation(Some(
                        database::constraint::RESERVATION_OVERLAP,
                    )) =>
                {
                    continue;
                }
                Err(e) => {
                    return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
                }
            }

            tx.execute(Commit)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            return Ok(if availability.is_available() {
                log::info!(
                    reference = %current.reference,
                    room = %current.room_key,
                    stay = %current.stay,
                    "payment confirmed",
                );
                Outcome::Confirmed(current)
            } else {
                log::warn!(
                    reference = %current.reference,
                    room = %current.room_key,
                    conflicts = %availability.conflicting_stays(),
                    refund = %receipt.amount,
                    "availability lost while paying, refund flagged",
                );
                Outcome::Cancelled(current)
            });
        }

        Err(tracerr::new!(E::Stale(reservation.id)))
    }

    /// Cancels the provided pending [`Reservation`] as failed to be paid.
    ///
    /// # Errors
    ///
    /// With [`ExecutionError::VerificationFailed`], once cancelled, either
    /// by this call or before.
    async fn fail_pending(
        &self,
        reservation: &Reservation,
        reference: payment::Reference,
    ) -> Result<Outcome, Traced<ExecutionError>>
    where
        Db: Database<
                Select<By<Option<Reservation>, reservation::Id>>,
                Ok = Option<Reservation>,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Status>,
                Ok = bool,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Unrefunded>,
                Ok = bool,
                Err = Traced<database::Error>,
            >,
    {
        match self
            .cancel_pending(
                reservation.id,
                CancellationReason::PaymentFailed,
                None,
            )
            .await?
        {
            Outcome::Cancelled(_) => Err(tracerr::new!(
                ExecutionError::VerificationFailed(reference)
            )),
            outcome @ (Outcome::Confirmed(_) | Outcome::AlreadyConfirmed(_)) => {
                Ok(outcome)
            }
        }
    }

    /// Cancels the [`Reservation`] with the provided [`reservation::Id`] if
    /// it's still pending.
    ///
    /// Amount of the `captured` [`payment::Receipt`] is flagged for a refund,
    /// even if the [`Reservation`] has been cancelled concurrently.
    async fn cancel_pending(
        &self,
        id: reservation::Id,
        reason: CancellationReason,
        captured: Option<&payment::Receipt>,
    ) -> Result<Outcome, Traced<ExecutionError>>
    where
        Db: Database<
                Select<By<Option<Reservation>, reservation::Id>>,
                Ok = Option<Reservation>,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Status>,
                Ok = bool,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Unrefunded>,
                Ok = bool,
                Err = Traced<database::Error>,
            >,
    {
        use ExecutionError as E;

        for _ in 0..MAX_REEVALUATIONS {
            let current = self
                .database()
                .execute(Select(By::<Option<Reservation>, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or(E::Stale(id))
                .map_err(tracerr::wrap!())?;
            let mut current = match (Outcome::of_settled(current), captured) {
                (Ok(Outcome::Cancelled(cancelled)), Some(receipt)) => {
                    return self.refund_cancelled(cancelled.id, receipt).await;
                }
                (Ok(outcome), _) => return Ok(outcome),
                (Err(pending), _) => pending,
            };

            current
                .cancel(reason, captured.map(|r| r.amount), DateTime::now())
                .map_err(tracerr::from_and_wrap!(=> E))?;

            let swapped = self
                .database()
                .execute(CompareAndSwap {
                    value: current.clone(),
                    expected: Status::Pending,
                })
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            if swapped {
                log::info!(
                    reference = %current.reference,
                    %reason,
                    "reservation cancelled",
                );
                return Ok(Outcome::Cancelled(current));
            }
        }

        Err(tracerr::new!(E::Stale(id)))
    }

    /// Flags the amount of the verified [`payment::Receipt`] for a refund on
    /// the cancelled [`Reservation`] with the provided [`reservation::Id`].
    ///
    /// A refund is flagged at most once, so a [`Reservation`] already having
    /// one is returned as is.
    async fn refund_cancelled(
        &self,
        id: reservation::Id,
        receipt: &payment::Receipt,
    ) -> Result<Outcome, Traced<ExecutionError>>
    where
        Db: Database<
                Select<By<Option<Reservation>, reservation::Id>>,
                Ok = Option<Reservation>,
                Err = Traced<database::Error>,
            > + Database<
                CompareAndSwap<Reservation, reservation::Unrefunded>,
                Ok = bool,
                Err = Traced<database::Error>,
            >,
    {
        use ExecutionError as E;

        for _ in 0..MAX_REEVALUATIONS {
            let mut current = self
                .database()
                .execute(Select(By::<Option<Reservation>, _>::new(id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or(E::Stale(id))
                .map_err(tracerr::wrap!())?;

            match current.flag_refund(receipt.amount, DateTime::now()) {
                Ok(()) => {}
                Err(TransitionError::RefundAlreadyFlagged(_)) => {
                    return Ok(Outcome::Cancelled(current));
                }
                Err(e) => return Err(tracerr::new!(E::Transition(e))),
            }

            let swapped = self
                .database()
                .execute(CompareAndSwap {
                    value: current.clone(),
                    expected: reservation::Unrefunded,
                })
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            if swapped {
                log::warn!(
                    reference = %current.reference,
                    payment = %receipt.reference,
                    refund = %receipt.amount,
                    "payment captured for cancelled reservation, \
                     refund flagged",
                );
                return Ok(Outcome::Cancelled(current));
            }
        }

        Err(tracerr::new!(E::Stale(id)))
    }
}

/// Error of [`ConfirmPayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Gateway`] error.
    #[display("`Gateway` operation failed: {_0}")]
    Gateway(gateway::Error),

    /// No [`Reservation`] is paid with the provided [`payment::Reference`].
    #[display("`Reservation(reference: {_0})` does not exist")]
    #[from(ignore)]
    ReservationNotExists(#[error(not(source))] payment::Reference),

    /// [`Reservation`] keeps being concurrently modified.
    #[display("`Reservation(id: {_0})` keeps being concurrently modified")]
    #[from(ignore)]
    Stale(#[error(not(source))] reservation::Id),

    /// [`Reservation`] cannot be settled.
    #[display("Cannot settle `Reservation`: {_0}")]
    Transition(TransitionError),

    /// Payment [`Gateway`] doesn't report the transaction as successful, so
    /// the [`Reservation`] is cancelled.
    #[display("Payment `{_0}` is not successful")]
    #[from(ignore)]
    VerificationFailed(#[error(not(source))] payment::Reference),
}
