//! [`Command`] definition.

pub mod authorize_session;
pub mod cancel_reservation;
pub mod check_in_reservation;
pub mod check_out_reservation;
pub mod confirm_payment;
pub mod create_reservation;
pub mod initiate_payment;

use common::operations::{By, Verify};
use tokio::time;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{guest, payment, Session},
    infra::{gateway, Gateway},
    Service,
};
#[cfg(doc)]
use crate::domain::{Guest, Reservation};

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    authorize_session::AuthorizeSession,
    cancel_reservation::CancelReservation,
    check_in_reservation::CheckInReservation,
    check_out_reservation::CheckOutReservation,
    confirm_payment::ConfirmPayment, create_reservation::CreateReservation,
    initiate_payment::InitiatePayment,
};

/// Party initiating a [`Command`] upon an existing [`Reservation`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Initiator {
    /// [`Guest`] identified by the provided [`guest::Id`].
    Guest(guest::Id),

    /// Hotel staff member.
    Staff,

    /// The system itself (background jobs).
    System,
}

impl From<&Session> for Initiator {
    fn from(session: &Session) -> Self {
        if session.is_staff() {
            Self::Staff
        } else {
            Self::Guest(session.user_id.clone())
        }
    }
}

impl<Db, Gw> Service<Db, Gw> {
    /// Verifies the transaction with the provided [`payment::Reference`] in
    /// the payment [`Gateway`], retrying while it's unavailable.
    pub(crate) async fn verify_payment(
        &self,
        reference: &payment::Reference,
    ) -> Result<payment::Verification, Traced<gateway::Error>>
    where
        Gw: Gateway<
            Verify<By<payment::Verification, payment::Reference>>,
            Ok = payment::Verification,
            Err = Traced<gateway::Error>,
        >,
    {
        let attempts = self.config().payment.verification_attempts.max(1);
        let backoff = self.config().payment.verification_backoff;

        let mut attempt = 1;
        loop {
            match self
                .gateway()
                .execute(Verify(By::new(reference.clone())))
                .await
            {
                Ok(verification) => return Ok(verification),
                Err(e) if e.as_ref().is_transient() && attempt < attempts => {
                    log::warn!(
                        %reference,
                        attempt,
                        "payment verification is retried: {e}",
                    );
                    time::sleep(backoff * u32::from(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e).map_err(tracerr::wrap!()),
            }
        }
    }
}
