//! [`Command`] for initiating a payment of a [`Reservation`].

use common::{
    money::Currency,
    operations::{By, CompareAndSwap, Initiate, Select},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        payment,
        reservation::{self, TransitionError},
        Reservation,
    },
    infra::{database, gateway, Database, Gateway},
    Service,
};

use super::Command;

/// [`Command`] for starting a payment transaction of a pending
/// [`Reservation`] in the payment [`Gateway`].
///
/// The booking [`reservation::Reference`] is used as the transaction
/// reference, so initiating a payment of the same [`Reservation`] again
/// refers to the same transaction and returns its stored
/// [`payment::Authorization`].
#[derive(Clone, Copy, Debug)]
pub struct InitiatePayment {
    /// ID of the [`Reservation`] to be paid.
    pub reservation_id: reservation::Id,
}

impl<Db, Gw> Command<InitiatePayment> for Service<Db, Gw>
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
        Initiate<payment::Initiation>,
        Ok = payment::Authorization,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = payment::Authorization;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: InitiatePayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let InitiatePayment { reservation_id } = cmd;

        let mut reservation = self
            .database()
            .execute(Select(By::<Option<Reservation>, _>::new(reservation_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ReservationNotExists(reservation_id))
            .map_err(tracerr::wrap!())?;

        let currency = reservation.total.currency;
        if currency != self.config().payment.currency {
            return Err(tracerr::new!(E::UnsupportedCurrency(currency)));
        }

        if let Some(authorization) = reservation.payment.authorization.clone() {
            // Checks the `Reservation` is still payable.
            reservation
                .authorize_payment(authorization.clone(), DateTime::now())
                .map_err(tracerr::from_and_wrap!(=> E))?;
            log::debug!(
                reference = %reservation.reference,
                "payment checkout reused",
            );
            return Ok(authorization);
        }

        let reference = payment::Reference::from(reservation.reference.clone());
        let is_attached = reservation.payment.reference.is_some();
        reservation
            .attach_payment(reference.clone(), DateTime::now())
            .map_err(tracerr::from_and_wrap!(=> E))?;
        if !is_attached {
            // Persisted before contacting the gateway, so the transaction is
            // verified on expiration even if the rest of this is lost.
            self.store_pending(&reservation).await?;
        }

        let authorization = self
            .gateway()
            .execute(Initiate(payment::Initiation {
                reference: reference.clone(),
                email: reservation.guest.email.clone(),
                amount: reservation.total,
                callback_url: self.config().payment.callback_url.clone(),
            }))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if authorization.reference != reference {
            return Err(tracerr::new!(E::ReferenceMismatch(
                authorization.reference
            )));
        }

        reservation
            .authorize_payment(authorization.clone(), DateTime::now())
            .map_err(tracerr::from_and_wrap!(=> E))?;
        self.store_pending(&reservation).await?;

        log::info!(
            reference = %reservation.reference,
            amount = %reservation.total,
            "payment initiated",
        );

        Ok(authorization)
    }
}

impl<Db, Gw> Service<Db, Gw> {
    /// Stores payment details of the provided [`Reservation`], if it's still
    /// pending.
    ///
    /// # Errors
    ///
    /// - With [`ExecutionError::Transition`], if the [`Reservation`] has left
    ///   [`reservation::Status::Pending`] meanwhile.
    /// - With [`ExecutionError::Stale`], if it has been modified otherwise.
    async fn store_pending(
        &self,
        reservation: &Reservation,
    ) -> Result<(), Traced<ExecutionError>>
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
        use ExecutionError as E;

        let swapped = self
            .database()
            .execute(CompareAndSwap {
                value: reservation.clone(),
                expected: reservation::Status::Pending,
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if swapped {
            return Ok(());
        }

        let mut current = self
            .database()
            .execute(Select(By::<Option<Reservation>, _>::new(reservation.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ReservationNotExists(reservation.id))
            .map_err(tracerr::wrap!())?;
        if let Some(reference) = reservation.payment.reference.clone() {
            current
                .attach_payment(reference, DateTime::now())
                .map_err(tracerr::from_and_wrap!(=> E))?;
        }
        Err(tracerr::new!(E::Stale(reservation.id)))
    }
}

/// Error of [`InitiatePayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// [`Gateway`] error.
    #[display("`Gateway` operation failed: {_0}")]
    Gateway(gateway::Error),

    /// [`Gateway`] started a transaction with an unexpected reference.
    #[display("`Gateway` responded with foreign reference `{_0}`")]
    #[from(ignore)]
    ReferenceMismatch(#[error(not(source))] payment::Reference),

    /// [`Reservation`] with the provided ID does not exist.
    #[display("`Reservation(id: {_0})` does not exist")]
    #[from(ignore)]
    ReservationNotExists(#[error(not(source))] reservation::Id),

    /// [`Reservation`] was concurrently modified.
    #[display("`Reservation(id: {_0})` was concurrently modified")]
    #[from(ignore)]
    Stale(#[error(not(source))] reservation::Id),

    /// [`Reservation`] cannot be paid in its current state.
    #[display("Cannot pay `Reservation`: {_0}")]
    Transition(TransitionError),

    /// [`Reservation`] is priced in a [`Currency`] the [`Gateway`] doesn't
    /// charge in.
    #[display("`{_0}` payments are not supported")]
    #[from(ignore)]
    UnsupportedCurrency(#[error(not(source))] Currency),
}
