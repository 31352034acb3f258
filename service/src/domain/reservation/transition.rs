//! [`Reservation`] lifecycle transitions.

use common::{Date, DateTime, Money};
use derive_more::{Display, Error};

use crate::domain::payment;

use super::{
    Cancellation, CancellationReason, PaymentStatus, Reservation, Status,
};

/// Event moving a [`Reservation`] through its lifecycle.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Event {
    /// Payment transaction is started in a gateway.
    #[display("attach payment to")]
    AttachPayment,

    /// Payment is verified as successful.
    #[display("confirm")]
    Confirm,

    /// Guest, staff or the system cancels.
    #[display("cancel")]
    Cancel,

    /// Guest arrives.
    #[display("check in")]
    CheckIn,

    /// Guest leaves.
    #[display("check out")]
    CheckOut,

    /// Money captured after cancellation is flagged to be returned.
    #[display("flag refund of")]
    FlagRefund,
}

/// Error of a [`Reservation`] transition.
///
/// A failed transition leaves the [`Reservation`] untouched.
#[derive(Clone, Debug, Display, Error)]
pub enum TransitionError {
    /// [`Event`] is not allowed in the current [`Status`].
    #[display("cannot {event} a `{status}` `Reservation`")]
    WrongStatus {
        /// Rejected [`Event`].
        event: Event,

        /// Current [`Status`].
        status: Status,
    },

    /// Another payment transaction is already attached.
    #[display("`Reservation` is already paid via `{_0}`")]
    PaymentAlreadyAttached(#[error(not(source))] payment::Reference),

    /// Captured amount doesn't cover the total.
    #[display("captured {paid} doesn't cover total {total}")]
    Underpaid {
        /// Captured amount.
        paid: Money,

        /// Total of the [`Reservation`].
        total: Money,
    },

    /// Stay hasn't started yet.
    #[display("stay starts at {_0}")]
    StayNotStarted(#[error(not(source))] Date),

    /// Refund is already flagged for the cancelled [`Reservation`].
    #[display("refund of {_0} is already flagged")]
    RefundAlreadyFlagged(#[error(not(source))] Money),
}

impl Reservation {
    /// Attaches the provided [`payment::Reference`] to this pending
    /// [`Reservation`].
    ///
    /// Attaching the same [`payment::Reference`] again changes nothing.
    ///
    /// # Errors
    ///
    /// - If this [`Reservation`] is not [`Status::Pending`].
    /// - If a different [`payment::Reference`] is already attached.
    pub fn attach_payment(
        &mut self,
        reference: payment::Reference,
        at: DateTime,
    ) -> Result<(), TransitionError> {
        self.expect_status(Event::AttachPayment, &[Status::Pending])?;
        match &self.payment.reference {
            Some(attached) if *attached == reference => Ok(()),
            Some(attached) => {
                Err(TransitionError::PaymentAlreadyAttached(attached.clone()))
            }
            None => {
                self.payment.reference = Some(reference);
                self.updated_at = at.coerce();
                Ok(())
            }
        }
    }

    /// Stores the provided [`payment::Authorization`] of the started gateway
    /// transaction, attaching its [`payment::Reference`] if not yet.
    ///
    /// # Errors
    ///
    /// - If this [`Reservation`] is not [`Status::Pending`].
    /// - If a different [`payment::Reference`] is already attached.
    pub fn authorize_payment(
        &mut self,
        authorization: payment::Authorization,
        at: DateTime,
    ) -> Result<(), TransitionError> {
        self.attach_payment(authorization.reference.clone(), at)?;
        if self.payment.authorization.as_ref() != Some(&authorization) {
            self.payment.authorization = Some(authorization);
            self.updated_at = at.coerce();
        }
        Ok(())
    }

    /// Confirms this pending [`Reservation`] with the provided verified
    /// [`payment::Receipt`].
    ///
    /// Availability must be re-checked by the caller before persisting the
    /// result.
    ///
    /// # Errors
    ///
    /// - If this [`Reservation`] is not [`Status::Pending`].
    /// - If the [`payment::Receipt`] doesn't cover the total.
    pub fn confirm(
        &mut self,
        receipt: &payment::Receipt,
        at: DateTime,
    ) -> Result<(), TransitionError> {
        self.expect_status(Event::Confirm, &[Status::Pending])?;
        if !receipt.covers(self.total) {
            return Err(TransitionError::Underpaid {
                paid: receipt.amount,
                total: self.total,
            });
        }

        self.status = Status::Confirmed;
        self.payment.status = PaymentStatus::Paid;
        self.payment.reference = Some(receipt.reference.clone());
        self.payment.method = receipt.method;
        self.updated_at = at.coerce();
        Ok(())
    }

    /// Cancels this [`Reservation`] for the provided [`CancellationReason`].
    ///
    /// Refund is flagged:
    /// - for the `captured` amount, if money was captured for a pending
    ///   [`Reservation`] that cannot be confirmed;
    /// - for the paid total, if this [`Reservation`] is already paid.
    ///
    /// # Errors
    ///
    /// If this [`Reservation`] is in a terminal [`Status`].
    pub fn cancel(
        &mut self,
        reason: CancellationReason,
        captured: Option<Money>,
        at: DateTime,
    ) -> Result<(), TransitionError> {
        self.expect_status(
            Event::Cancel,
            &[Status::Pending, Status::Confirmed, Status::CheckedIn],
        )?;

        let refund = match self.payment.status {
            PaymentStatus::Paid | PaymentStatus::Partial => {
                Some(captured.unwrap_or(self.total))
            }
            PaymentStatus::Pending | PaymentStatus::Refunded => captured,
        };
        if refund.is_some() {
            self.payment.status = PaymentStatus::Refunded;
        }

        self.status = Status::Cancelled;
        self.cancellation = Some(Cancellation {
            reason,
            refund,
            cancelled_at: at.coerce(),
        });
        self.updated_at = at.coerce();
        Ok(())
    }

    /// Flags the `captured` amount for a refund on this cancelled
    /// [`Reservation`], whose payment was captured only after the
    /// cancellation.
    ///
    /// # Errors
    ///
    /// - If this [`Reservation`] is not [`Status::Cancelled`].
    /// - If a refund is already flagged.
    pub fn flag_refund(
        &mut self,
        captured: Money,
        at: DateTime,
    ) -> Result<(), TransitionError> {
        self.expect_status(Event::FlagRefund, &[Status::Cancelled])?;
        let Some(cancellation) = self.cancellation.as_mut() else {
            return Err(TransitionError::WrongStatus {
                event: Event::FlagRefund,
                status: self.status,
            });
        };
        if let Some(refund) = cancellation.refund {
            return Err(TransitionError::RefundAlreadyFlagged(refund));
        }

        cancellation.refund = Some(captured);
        self.payment.status = PaymentStatus::Refunded;
        self.updated_at = at.coerce();
        Ok(())
    }

    /// Checks in the [`Guest`] of this confirmed [`Reservation`].
    ///
    /// [`Guest`]: crate::domain::Guest
    ///
    /// # Errors
    ///
    /// - If this [`Reservation`] is not [`Status::Confirmed`].
    /// - If the stay hasn't started by the provided `today`.
    pub fn check_in(
        &mut self,
        today: Date,
        at: DateTime,
    ) -> Result<(), TransitionError> {
        self.expect_status(Event::CheckIn, &[Status::Confirmed])?;
        if today < self.stay.start() {
            return Err(TransitionError::StayNotStarted(self.stay.start()));
        }

        self.status = Status::CheckedIn;
        self.updated_at = at.coerce();
        Ok(())
    }

    /// Checks out the [`Guest`] of this checked-in [`Reservation`].
    ///
    /// [`Guest`]: crate::domain::Guest
    ///
    /// # Errors
    ///
    /// If this [`Reservation`] is not [`Status::CheckedIn`].
    pub fn check_out(&mut self, at: DateTime) -> Result<(), TransitionError> {
        self.expect_status(Event::CheckOut, &[Status::CheckedIn])?;

        self.status = Status::CheckedOut;
        self.updated_at = at.coerce();
        Ok(())
    }

    /// Ensures this [`Reservation`] is in one of the `allowed` [`Status`]es
    /// for the provided [`Event`].
    fn expect_status(
        &self,
        event: Event,
        allowed: &[Status],
    ) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError::WrongStatus {
                event,
                status: self.status,
            })
        }
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{Date, DateTime, Money};

    use crate::domain::{
        payment,
        reservation::{
            spec::{pending, stay},
            CancellationReason, PaymentStatus, Reservation, Status,
        },
    };

    use super::{Event, TransitionError};

    fn receipt(r: &Reservation, amount: &str) -> payment::Receipt {
        payment::Receipt {
            reference: r.reference.clone().into(),
            amount: Money::from_str(amount).unwrap(),
            method: Some(payment::Method::Card),
            paid_at: None,
        }
    }

    fn confirmed() -> Reservation {
        let mut r = pending(stay(2, 5));
        let receipt = receipt(&r, "45000NGN");
        r.confirm(&receipt, DateTime::now()).unwrap();
        r
    }

    #[test]
    fn attaches_payment_idempotently() {
        let mut r = pending(stay(2, 5));
        let reference = payment::Reference::from(r.reference.clone());

        r.attach_payment(reference.clone(), DateTime::now()).unwrap();
        r.attach_payment(reference.clone(), DateTime::now()).unwrap();
        assert_eq!(r.payment.reference, Some(reference));
        assert_eq!(r.status, Status::Pending);

        let other = payment::Reference::new("RM-0-000000").unwrap();
        assert!(matches!(
            r.attach_payment(other, DateTime::now()),
            Err(TransitionError::PaymentAlreadyAttached(_)),
        ));
    }

    #[test]
    fn confirms_pending_with_covering_receipt() {
        let r = confirmed();

        assert_eq!(r.status, Status::Confirmed);
        assert_eq!(r.payment.status, PaymentStatus::Paid);
        assert_eq!(r.payment.method, Some(payment::Method::Card));
        assert_eq!(r.total, Money::from_str("45000NGN").unwrap());
        assert!(r.is_consistent());
    }

    #[test]
    fn rejects_underpaid_confirmation_untouched() {
        let mut r = pending(stay(2, 5));
        let receipt = receipt(&r, "30000NGN");

        assert!(matches!(
            r.confirm(&receipt, DateTime::now()),
            Err(TransitionError::Underpaid { .. }),
        ));
        assert_eq!(r.status, Status::Pending);
        assert_eq!(r.payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn confirms_only_once() {
        let mut r = confirmed();
        let receipt = receipt(&r, "45000NGN");

        assert!(matches!(
            r.confirm(&receipt, DateTime::now()),
            Err(TransitionError::WrongStatus {
                event: Event::Confirm,
                status: Status::Confirmed,
            }),
        ));
    }

    #[test]
    fn cancels_pending_without_refund() {
        let mut r = pending(stay(2, 5));
        r.cancel(CancellationReason::PaymentFailed, None, DateTime::now())
            .unwrap();

        assert_eq!(r.status, Status::Cancelled);
        assert_eq!(r.payment.status, PaymentStatus::Pending);
        let cancellation = r.cancellation.as_ref().unwrap();
        assert_eq!(cancellation.reason, CancellationReason::PaymentFailed);
        assert_eq!(cancellation.refund, None);
        assert!(r.is_consistent());
    }

    #[test]
    fn cancels_pending_with_captured_refund() {
        let mut r = pending(stay(2, 5));
        let captured = Money::from_str("45000NGN").unwrap();
        r.cancel(
            CancellationReason::AvailabilityLost,
            Some(captured),
            DateTime::now(),
        )
        .unwrap();

        assert_eq!(r.payment.status, PaymentStatus::Refunded);
        assert_eq!(r.cancellation.as_ref().unwrap().refund, Some(captured));
        assert!(r.is_consistent());
    }

    #[test]
    fn cancels_paid_with_total_refund() {
        let mut r = confirmed();
        r.cancel(CancellationReason::GuestRequest, None, DateTime::now())
            .unwrap();

        assert_eq!(r.status, Status::Cancelled);
        assert_eq!(r.payment.status, PaymentStatus::Refunded);
        assert_eq!(r.cancellation.as_ref().unwrap().refund, Some(r.total));
        assert!(r.is_consistent());
    }

    #[test]
    fn terminal_statuses_are_never_left() {
        let mut cancelled = pending(stay(2, 5));
        cancelled
            .cancel(CancellationReason::StaffRequest, None, DateTime::now())
            .unwrap();
        let before = cancelled.cancellation.clone();

        assert!(cancelled
            .cancel(CancellationReason::GuestRequest, None, DateTime::now())
            .is_err());
        assert!(cancelled.check_out(DateTime::now()).is_err());
        assert_eq!(cancelled.cancellation, before);

        let mut out = confirmed();
        out.check_in(out.stay.start(), DateTime::now()).unwrap();
        out.check_out(DateTime::now()).unwrap();
        assert_eq!(out.status, Status::CheckedOut);
        assert!(out
            .cancel(CancellationReason::GuestRequest, None, DateTime::now())
            .is_err());
        assert!(out.is_consistent());
    }

    #[test]
    fn flags_late_captured_refund_once() {
        let mut r = pending(stay(2, 5));
        r.cancel(CancellationReason::GuestRequest, None, DateTime::now())
            .unwrap();
        let captured = Money::from_str("45000NGN").unwrap();

        r.flag_refund(captured, DateTime::now()).unwrap();
        assert_eq!(r.status, Status::Cancelled);
        assert_eq!(r.payment.status, PaymentStatus::Refunded);
        assert_eq!(r.cancellation.as_ref().unwrap().refund, Some(captured));
        assert!(r.is_consistent());

        assert!(matches!(
            r.flag_refund(captured, DateTime::now()),
            Err(TransitionError::RefundAlreadyFlagged(m)) if m == captured,
        ));
    }

    #[test]
    fn flags_refund_only_when_cancelled() {
        let mut r = pending(stay(2, 5));
        let captured = Money::from_str("45000NGN").unwrap();

        assert!(matches!(
            r.flag_refund(captured, DateTime::now()),
            Err(TransitionError::WrongStatus {
                event: Event::FlagRefund,
                status: Status::Pending,
            }),
        ));
        assert_eq!(r.payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn stores_authorization_of_attached_reference() {
        let mut r = pending(stay(2, 5));
        let authorization = payment::Authorization {
            authorization_url: "https://checkout.test/1".into(),
            access_code: "access".into(),
            reference: r.reference.clone().into(),
        };

        r.authorize_payment(authorization.clone(), DateTime::now())
            .unwrap();
        assert_eq!(
            r.payment.reference.as_ref(),
            Some(&authorization.reference),
        );
        assert_eq!(r.payment.authorization, Some(authorization.clone()));

        let foreign = payment::Authorization {
            reference: payment::Reference::new("RM-0-000000").unwrap(),
            ..authorization
        };
        assert!(matches!(
            r.authorize_payment(foreign, DateTime::now()),
            Err(TransitionError::PaymentAlreadyAttached(_)),
        ));
    }

    #[test]
    fn checks_in_once_stay_started() {
        let mut r = confirmed();
        let day_before = Date::from_ymd(2031, 3, 1).unwrap();

        assert!(matches!(
            r.check_in(day_before, DateTime::now()),
            Err(TransitionError::StayNotStarted(_)),
        ));
        assert_eq!(r.status, Status::Confirmed);

        r.check_in(r.stay.start(), DateTime::now()).unwrap();
        assert_eq!(r.status, Status::CheckedIn);
    }

    #[test]
    fn checks_in_only_confirmed() {
        let mut r = pending(stay(2, 5));

        assert!(matches!(
            r.check_in(r.stay.start(), DateTime::now()),
            Err(TransitionError::WrongStatus {
                event: Event::CheckIn,
                status: Status::Pending,
            }),
        ));
        assert!(r.check_out(DateTime::now()).is_err());
    }
}
