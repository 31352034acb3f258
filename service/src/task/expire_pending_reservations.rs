//! [`ExpirePendingReservations`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::operations::{By, Perform, Select, Start};
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

use crate::{
    command::{
        cancel_reservation, confirm_payment, CancelReservation,
        ConfirmPayment, Initiator,
    },
    domain::{reservation, Reservation},
    infra::{database, Database},
    read::reservation::Pending,
    Command, Service,
};

use super::Task;

/// Configuration for [`ExpirePendingReservations`] [`Task`].
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Interval between sweeps.
    pub interval: time::Duration,

    /// Timeout after which a pending [`Reservation`] is considered abandoned.
    pub timeout: time::Duration,
}

/// [`Task`] for settling [`Reservation`]s left pending for too long.
///
/// A [`Reservation`] with a started payment is settled by the verdict of the
/// payment gateway, so a late success still confirms it. Any other one is
/// cancelled as abandoned.
#[derive(Clone, Copy, Debug)]
pub struct ExpirePendingReservations<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

impl<S> ExpirePendingReservations<S> {
    /// Creates a new [`ExpirePendingReservations`] [`Task`] sweeping with the
    /// provided [`Service`].
    #[must_use]
    pub const fn new(config: Config, service: S) -> Self {
        Self { config, service }
    }
}

impl<Db, Gw> Task<Start<By<ExpirePendingReservations<Self>, Config>>>
    for Service<Db, Gw>
where
    ExpirePendingReservations<Service<Db, Gw>>:
        Task<Perform<()>, Ok = (), Err: Error> + 'static,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<ExpirePendingReservations<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let task =
            ExpirePendingReservations::new(by.into_inner(), self.clone());

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            _ = task.execute(Perform(())).await.map_err(|e| {
                log::error!("`task::ExpirePendingReservations` failed: {e}");
            });
        }
    }
}

impl<Db, Gw> Task<Perform<()>> for ExpirePendingReservations<Service<Db, Gw>>
where
    Db: Database<
        Select<By<Vec<Pending<Reservation>>, reservation::CreationDateTime>>,
        Ok = Vec<Pending<Reservation>>,
        Err = Traced<database::Error>,
    >,
    Service<Db, Gw>: Command<
            ConfirmPayment,
            Ok = confirm_payment::Outcome,
            Err = Traced<confirm_payment::ExecutionError>,
        > + Command<
            CancelReservation,
            Ok = Reservation,
            Err = Traced<cancel_reservation::ExecutionError>,
        >,
{
    type Ok = ();
    type Err = ExecutionError;

    async fn execute(&self, _: Perform<()>) -> Result<Self::Ok, Self::Err> {
        let deadline =
            reservation::CreationDateTime::now() - self.config.timeout;
        let pending = self
            .service
            .database()
            .execute(Select(By::new(deadline)))
            .await
            .map_err(tracerr::wrap!())?;

        for Pending(reservation) in pending {
            if let Some(reference) = reservation.payment.reference.clone() {
                match self.service.execute(ConfirmPayment { reference }).await {
                    Ok(outcome) => log::info!(
                        reference = %reservation.reference,
                        status = %outcome.reservation().status,
                        "late payment settled",
                    ),
                    Err(e)
                        if matches!(
                            e.as_ref(),
                            confirm_payment::ExecutionError::VerificationFailed(
                                _
                            ),
                        ) =>
                    {
                        log::info!(
                            reference = %reservation.reference,
                            "payment not completed, pending reservation \
                             expired",
                        );
                    }
                    Err(e) => log::warn!(
                        reference = %reservation.reference,
                        "failed to settle late payment: {e}",
                    ),
                }
            } else {
                match self
                    .service
                    .execute(CancelReservation {
                        reservation_id: reservation.id,
                        initiator: Initiator::System,
                    })
                    .await
                {
                    Ok(_) => log::info!(
                        reference = %reservation.reference,
                        "pending reservation expired",
                    ),
                    Err(e) => log::warn!(
                        reference = %reservation.reference,
                        "failed to expire pending reservation: {e}",
                    ),
                }
            }
        }

        Ok(())
    }
}

/// Error of [`ExpirePendingReservations`] execution.
pub type ExecutionError = Traced<database::Error>;
