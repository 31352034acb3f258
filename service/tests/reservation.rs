//! Reservation lifecycle driven through the [`Service`] against the in-memory
//! database and a scripted payment gateway.

use std::{
    collections::HashMap,
    str::FromStr as _,
    sync::{Arc, Mutex},
    time::Duration,
};

use common::{
    money::Currency,
    operations::{By, Initiate, Insert, Perform, Select, Verify},
    Date, DateRange, DateTime, Handler, Money,
};
use jsonwebtoken::DecodingKey;
use tokio::sync::oneshot;
use service::{
    command::{
        cancel_reservation, check_in_reservation, confirm_payment,
        create_reservation, initiate_payment, CancelReservation, CheckInReservation,
        CheckOutReservation, ConfirmPayment, CreateReservation,
        InitiatePayment, Initiator,
    },
    domain::{
        guest, payment,
        reservation::{self, CancellationReason, PaymentStatus, Status},
        room, Guest, Reservation, Room,
    },
    infra::{gateway, Memory},
    query::{self, CheckAvailability},
    read::reservation::Pending,
    task::{expire_pending_reservations, ExpirePendingReservations},
    Config, PaymentConfig, Service,
};
use tracerr::Traced;

/// Scripted verdict of the [`FakeGateway`].
#[derive(Clone, Debug)]
enum Verdict {
    Paid(Money),
    Failed,
    Unknown,
    Unavailable,
}

/// Pause of the next [`Verify`] in the [`FakeGateway`].
#[derive(Debug)]
struct Hold {
    /// Notified once [`Verify`] is paused.
    reached: oneshot::Sender<()>,

    /// Resumes the paused [`Verify`].
    release: oneshot::Receiver<()>,
}

#[derive(Debug, Default)]
struct Script {
    verdicts: HashMap<payment::Reference, Vec<Verdict>>,
    initiated: Vec<payment::Reference>,
    verifications: usize,
    initiation_down: bool,
    hold: Option<Hold>,
}

/// Payment gateway answering with scripted [`Verdict`]s.
///
/// The last scripted [`Verdict`] of a reference is repeated forever. Like a
/// real gateway, it rejects initiating a transaction with an already used
/// reference.
#[derive(Clone, Debug, Default)]
struct FakeGateway(Arc<Mutex<Script>>);

impl FakeGateway {
    fn set_initiation_down(&self, down: bool) {
        self.0.lock().unwrap().initiation_down = down;
    }

    /// Pauses the next [`Verify`] after it has been answered by the gateway,
    /// but before its verdict is returned.
    ///
    /// Returns the receiver notified once paused, and the sender resuming.
    fn hold_next_verification(
        &self,
    ) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached, paused) = oneshot::channel();
        let (resume, release) = oneshot::channel();
        self.0.lock().unwrap().hold = Some(Hold { reached, release });
        (paused, resume)
    }

    fn script(&self, reference: &payment::Reference, verdicts: Vec<Verdict>) {
        _ = self
            .0
            .lock()
            .unwrap()
            .verdicts
            .insert(reference.clone(), verdicts);
    }

    fn verifications(&self) -> usize {
        self.0.lock().unwrap().verifications
    }

    fn initiated(&self) -> Vec<payment::Reference> {
        self.0.lock().unwrap().initiated.clone()
    }
}

impl Handler<Initiate<payment::Initiation>> for FakeGateway {
    type Ok = payment::Authorization;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Initiate(initiation): Initiate<payment::Initiation>,
    ) -> Result<Self::Ok, Self::Err> {
        {
            let mut script = self.0.lock().unwrap();
            if script.initiation_down {
                return Err(tracerr::new!(gateway::Error::Unavailable(
                    "connection reset".into(),
                )));
            }
            if script.initiated.contains(&initiation.reference) {
                return Err(tracerr::new!(gateway::Error::Rejected(
                    "Duplicate Transaction Reference".into(),
                )));
            }
            script.initiated.push(initiation.reference.clone());
        }
        Ok(payment::Authorization {
            authorization_url: format!(
                "https://checkout.test/{}",
                initiation.reference,
            ),
            access_code: "access".into(),
            reference: initiation.reference,
        })
    }
}

impl Handler<Verify<By<payment::Verification, payment::Reference>>>
    for FakeGateway
{
    type Ok = payment::Verification;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Verify(by): Verify<By<payment::Verification, payment::Reference>>,
    ) -> Result<Self::Ok, Self::Err> {
        let reference = by.into_inner();

        let (verdict, hold) = {
            let mut script = self.0.lock().unwrap();
            script.verifications += 1;
            let verdict = match script.verdicts.get_mut(&reference) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) => {
                    queue.first().cloned().unwrap_or(Verdict::Unknown)
                }
                None => Verdict::Unknown,
            };
            (verdict, script.hold.take())
        };
        if let Some(Hold { reached, release }) = hold {
            _ = reached.send(());
            _ = release.await;
        }

        match verdict {
            Verdict::Paid(amount) => {
                Ok(payment::Verification::Success(payment::Receipt {
                    reference,
                    amount,
                    method: Some(payment::Method::Card),
                    paid_at: Some(DateTime::now()),
                }))
            }
            Verdict::Failed => Ok(payment::Verification::Failure {
                status: "failed".into(),
            }),
            Verdict::Unknown => Ok(payment::Verification::Unknown),
            Verdict::Unavailable => Err(tracerr::new!(
                gateway::Error::Unavailable("connection reset".into())
            )),
        }
    }
}

type TestService = Service<Memory, FakeGateway>;

fn config(timeout: Duration) -> Config {
    Config {
        jwt_decoding_key: DecodingKey::from_secret(b"secret"),
        booking_reference_prefix: Default::default(),
        payment: PaymentConfig {
            currency: Currency::Ngn,
            verification_attempts: 3,
            verification_backoff: Duration::ZERO,
            callback_url: None,
        },
        expire_pending_reservations: expire_pending_reservations::Config {
            interval: Duration::from_secs(60),
            timeout,
        },
    }
}

fn room() -> Room {
    Room {
        key: room::Key::new("deluxe-101").unwrap(),
        name: room::Name::new("Deluxe 101").unwrap(),
        nightly_rate: rate(),
        capacity: 2,
    }
}

fn rate() -> Money {
    Money::from_str("15000NGN").unwrap()
}

fn guest(id: &str) -> Guest {
    Guest {
        id: guest::Id::new(id),
        name: guest::Name::new("Ada Lovelace").unwrap(),
        email: guest::Email::new("ada@example.com").unwrap(),
        phone: None,
    }
}

/// Returns the [`Date`] the provided number of `days` after today.
fn day(days: i64) -> Date {
    Date::today().checked_add_days(days).unwrap()
}

async fn setup() -> (TestService, FakeGateway) {
    let db = Memory::new();
    db.execute(Insert(room())).await.unwrap();

    let gateway = FakeGateway::default();
    let (service, _) = Service::new(
        config(Duration::from_secs(1800)),
        db,
        gateway.clone(),
    );
    (service, gateway)
}

async fn book(
    service: &TestService,
    check_in: i64,
    check_out: i64,
) -> Reservation {
    service
        .execute(CreateReservation {
            room_key: room().key,
            check_in: day(check_in),
            check_out: day(check_out),
            guests_count: 2,
            guest: guest("anon-1"),
        })
        .await
        .unwrap()
}

fn reference_of(reservation: &Reservation) -> payment::Reference {
    reservation.reference.clone().into()
}

async fn pay(
    service: &TestService,
    gateway: &FakeGateway,
    reservation: &Reservation,
) -> confirm_payment::Outcome {
    let reference = reference_of(reservation);
    gateway.script(&reference, vec![Verdict::Paid(reservation.total)]);
    service
        .execute(ConfirmPayment { reference })
        .await
        .unwrap()
}

async fn stored(service: &TestService, reservation: &Reservation) -> Reservation {
    service
        .execute(query::reservation::ById::by(reservation.id))
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn books_and_confirms_free_room() {
    let (service, gateway) = setup().await;

    let availability = service
        .execute(CheckAvailability {
            room_key: room().key,
            stay: DateRange::new(day(2), day(5)).unwrap(),
        })
        .await
        .unwrap();
    assert!(availability.is_available());

    let reservation = book(&service, 2, 5).await;
    assert_eq!(reservation.status, Status::Pending);
    assert_eq!(reservation.total, rate().times(3).unwrap());

    let auth = service
        .execute(InitiatePayment {
            reservation_id: reservation.id,
        })
        .await
        .unwrap();
    assert_eq!(auth.reference, reference_of(&reservation));

    let outcome = pay(&service, &gateway, &reservation).await;
    assert!(matches!(outcome, confirm_payment::Outcome::Confirmed(_)));

    let confirmed = stored(&service, &reservation).await;
    assert_eq!(confirmed.status, Status::Confirmed);
    assert_eq!(confirmed.payment.status, PaymentStatus::Paid);
    assert_eq!(confirmed.payment.reference, Some(auth.reference));
    assert_eq!(confirmed.total, reservation.total);
    assert!(confirmed.is_consistent());
}

#[tokio::test]
async fn pending_reservation_does_not_block() {
    let (service, _) = setup().await;
    drop(book(&service, 2, 5).await);

    let availability = service
        .execute(CheckAvailability {
            room_key: room().key,
            stay: DateRange::new(day(4), day(6)).unwrap(),
        })
        .await
        .unwrap();

    assert!(availability.is_available());
}

#[tokio::test]
async fn confirmed_reservation_blocks_overlaps_only() {
    let (service, gateway) = setup().await;
    let first = book(&service, 2, 5).await;
    drop(pay(&service, &gateway, &first).await);

    let err = service
        .execute(CreateReservation {
            room_key: room().key,
            check_in: day(4),
            check_out: day(6),
            guests_count: 1,
            guest: guest("anon-2"),
        })
        .await
        .unwrap_err();
    match err.as_ref() {
        create_reservation::ExecutionError::Unavailable(conflicts) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0], first.stay);
        }
        e => panic!("unexpected error: {e}"),
    }

    let back_to_back = book(&service, 5, 7).await;
    assert_eq!(back_to_back.status, Status::Pending);
}

#[tokio::test]
async fn only_one_of_concurrent_overlapping_confirmations_wins() {
    let (service, gateway) = setup().await;
    let first = book(&service, 2, 5).await;
    let second = book(&service, 4, 6).await;

    let (a, b) = tokio::join!(
        pay(&service, &gateway, &first),
        pay(&service, &gateway, &second),
    );

    let outcomes = [a, b];
    let confirmed = outcomes
        .iter()
        .filter(|o| matches!(o, confirm_payment::Outcome::Confirmed(_)))
        .count();
    assert_eq!(confirmed, 1);

    let loser = outcomes
        .iter()
        .find(|o| matches!(o, confirm_payment::Outcome::Cancelled(_)))
        .map(confirm_payment::Outcome::reservation)
        .unwrap();
    let loser = stored(&service, loser).await;
    assert_eq!(loser.status, Status::Cancelled);
    assert_eq!(loser.payment.status, PaymentStatus::Refunded);
    let cancellation = loser.cancellation.unwrap();
    assert_eq!(cancellation.reason, CancellationReason::AvailabilityLost);
    assert_eq!(cancellation.refund, Some(loser.total));
}

#[tokio::test]
async fn repeated_confirmation_is_noop() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;

    let first = pay(&service, &gateway, &reservation).await;
    let confirmed = stored(&service, &reservation).await;
    let second = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap();

    assert!(matches!(first, confirm_payment::Outcome::Confirmed(_)));
    assert!(matches!(second, confirm_payment::Outcome::AlreadyConfirmed(_)));
    assert_eq!(gateway.verifications(), 1);

    let after = stored(&service, &reservation).await;
    assert_eq!(after.updated_at, confirmed.updated_at);
    assert_eq!(after.status, Status::Confirmed);
}

#[tokio::test]
async fn rejects_empty_range_before_touching_storage() {
    let (service, gateway) = setup().await;

    let err = service
        .execute(CreateReservation {
            room_key: room().key,
            check_in: day(3),
            check_out: day(3),
            guests_count: 1,
            guest: guest("anon-1"),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        create_reservation::ExecutionError::InvalidRange { .. },
    ));
    assert!(gateway.initiated().is_empty());
}

#[tokio::test]
async fn rejects_past_dates() {
    let (service, _) = setup().await;

    let err = service
        .execute(CreateReservation {
            room_key: room().key,
            check_in: day(-1),
            check_out: day(2),
            guests_count: 1,
            guest: guest("anon-1"),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        create_reservation::ExecutionError::PastDates(_),
    ));
}

#[tokio::test]
async fn failed_verification_cancels_without_refund() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(&reference_of(&reservation), vec![Verdict::Failed]);

    let err = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        confirm_payment::ExecutionError::VerificationFailed(_),
    ));
    let cancelled = stored(&service, &reservation).await;
    assert_eq!(cancelled.status, Status::Cancelled);
    assert_eq!(cancelled.payment.status, PaymentStatus::Pending);
    let cancellation = cancelled.cancellation.unwrap();
    assert_eq!(cancellation.reason, CancellationReason::PaymentFailed);
    assert_eq!(cancellation.refund, None);
}

#[tokio::test]
async fn unknown_reference_is_treated_as_failure() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(&reference_of(&reservation), vec![Verdict::Unknown]);

    let err = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        confirm_payment::ExecutionError::VerificationFailed(_),
    ));
    assert_eq!(stored(&service, &reservation).await.status, Status::Cancelled);
}

#[tokio::test]
async fn underpayment_cancels_with_refund() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    let captured = rate();
    gateway.script(&reference_of(&reservation), vec![Verdict::Paid(captured)]);

    let outcome = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap();

    assert!(matches!(outcome, confirm_payment::Outcome::Cancelled(_)));
    let cancelled = stored(&service, &reservation).await;
    assert_eq!(cancelled.payment.status, PaymentStatus::Refunded);
    let cancellation = cancelled.cancellation.unwrap();
    assert_eq!(cancellation.reason, CancellationReason::AmountMismatch);
    assert_eq!(cancellation.refund, Some(captured));
}

#[tokio::test]
async fn retries_transient_gateway_failures() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(
        &reference_of(&reservation),
        vec![
            Verdict::Unavailable,
            Verdict::Unavailable,
            Verdict::Paid(reservation.total),
        ],
    );

    let outcome = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap();

    assert!(matches!(outcome, confirm_payment::Outcome::Confirmed(_)));
    assert_eq!(gateway.verifications(), 3);
}

#[tokio::test]
async fn surfaces_persistent_gateway_unavailability() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(&reference_of(&reservation), vec![Verdict::Unavailable]);

    let err = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        confirm_payment::ExecutionError::Gateway(e) if e.is_transient(),
    ));
    assert_eq!(gateway.verifications(), 3);
    assert_eq!(stored(&service, &reservation).await.status, Status::Pending);
}

#[tokio::test]
async fn never_observes_paid_pending_reservation() {
    let (service, gateway) = setup().await;
    let first = book(&service, 2, 5).await;
    let second = book(&service, 3, 4).await;
    let third = book(&service, 6, 8).await;
    gateway.script(&reference_of(&third), vec![Verdict::Failed]);

    drop(pay(&service, &gateway, &first).await);
    drop(pay(&service, &gateway, &second).await);
    drop(
        service
            .execute(ConfirmPayment {
                reference: reference_of(&third),
            })
            .await,
    );

    for r in [&first, &second, &third] {
        let r = stored(&service, r).await;
        assert!(
            !(r.payment.status == PaymentStatus::Paid
                && r.status == Status::Pending),
        );
        assert!(r.is_consistent());
    }
}

#[tokio::test]
async fn guest_cancels_own_reservation_only() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    drop(pay(&service, &gateway, &reservation).await);

    let err = service
        .execute(CancelReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Guest(guest::Id::new("anon-2").unwrap()),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        cancel_reservation::ExecutionError::NotOwner(_),
    ));

    let cancelled = service
        .execute(CancelReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Guest(guest::Id::new("anon-1").unwrap()),
        })
        .await
        .unwrap();
    assert_eq!(cancelled.status, Status::Cancelled);
    let cancellation = cancelled.cancellation.unwrap();
    assert_eq!(cancellation.reason, CancellationReason::GuestRequest);
    assert_eq!(cancellation.refund, Some(reservation.total));

    let again = service
        .execute(CancelReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Staff,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        again.as_ref(),
        cancel_reservation::ExecutionError::Transition(_),
    ));
}

#[tokio::test]
async fn staff_checks_in_and_out() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 0, 2).await;
    drop(pay(&service, &gateway, &reservation).await);

    let err = service
        .execute(CheckInReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Guest(guest::Id::new("anon-1").unwrap()),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        check_in_reservation::ExecutionError::NotStaff,
    ));

    let checked_in = service
        .execute(CheckInReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Staff,
        })
        .await
        .unwrap();
    assert_eq!(checked_in.status, Status::CheckedIn);

    let checked_out = service
        .execute(CheckOutReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Staff,
        })
        .await
        .unwrap();
    assert_eq!(checked_out.status, Status::CheckedOut);
    assert_eq!(checked_out.total, reservation.total);
}

#[tokio::test]
async fn check_in_waits_for_stay_start() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    drop(pay(&service, &gateway, &reservation).await);

    let err = service
        .execute(CheckInReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Staff,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        check_in_reservation::ExecutionError::Transition(_),
    ));
    assert_eq!(stored(&service, &reservation).await.status, Status::Confirmed);
}

#[tokio::test]
async fn sweep_settles_stale_pending_reservations() {
    let db = Memory::new();
    db.execute(Insert(room())).await.unwrap();
    let gateway = FakeGateway::default();
    let (service, _) =
        Service::new(config(Duration::ZERO), db, gateway.clone());

    let abandoned = book(&service, 2, 3).await;
    let late = book(&service, 4, 5).await;
    let failed = book(&service, 6, 7).await;
    for r in [&late, &failed] {
        drop(
            service
                .execute(InitiatePayment {
                    reservation_id: r.id,
                })
                .await
                .unwrap(),
        );
    }
    gateway.script(&reference_of(&late), vec![Verdict::Paid(late.total)]);
    gateway.script(&reference_of(&failed), vec![Verdict::Failed]);
    tokio::time::sleep(Duration::from_millis(5)).await;

    ExpirePendingReservations::new(
        service.config().expire_pending_reservations,
        service.clone(),
    )
    .execute(Perform(()))
    .await
    .unwrap();

    let abandoned = stored(&service, &abandoned).await;
    assert_eq!(abandoned.status, Status::Cancelled);
    assert_eq!(
        abandoned.cancellation.map(|c| c.reason),
        Some(CancellationReason::PaymentAbandoned),
    );
    assert_eq!(stored(&service, &late).await.status, Status::Confirmed);
    let failed = stored(&service, &failed).await;
    assert_eq!(failed.status, Status::Cancelled);
    assert_eq!(
        failed.cancellation.map(|c| c.reason),
        Some(CancellationReason::PaymentFailed),
    );

    let pending = service
        .database()
        .execute(Select(By::<Vec<Pending<Reservation>>, _>::new(
            reservation::CreationDateTime::now(),
        )))
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn repeated_initiation_returns_stored_checkout() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;

    let first = service
        .execute(InitiatePayment {
            reservation_id: reservation.id,
        })
        .await
        .unwrap();
    let second = service
        .execute(InitiatePayment {
            reservation_id: reservation.id,
        })
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(gateway.initiated(), vec![reference_of(&reservation)]);
    let stored = stored(&service, &reservation).await;
    assert_eq!(stored.payment.reference, Some(first.reference.clone()));
    assert_eq!(stored.payment.authorization, Some(first));
    assert_eq!(stored.status, Status::Pending);
}

#[tokio::test]
async fn initiation_of_cancelled_reservation_is_rejected() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    drop(
        service
            .execute(InitiatePayment {
                reservation_id: reservation.id,
            })
            .await
            .unwrap(),
    );
    gateway.script(&reference_of(&reservation), vec![Verdict::Failed]);
    drop(
        service
            .execute(CancelReservation {
                reservation_id: reservation.id,
                initiator: Initiator::Staff,
            })
            .await
            .unwrap(),
    );

    let err = service
        .execute(InitiatePayment {
            reservation_id: reservation.id,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        initiate_payment::ExecutionError::Transition(_),
    ));
}

#[tokio::test]
async fn reference_is_stored_before_gateway_is_contacted() {
    let db = Memory::new();
    db.execute(Insert(room())).await.unwrap();
    let gateway = FakeGateway::default();
    let (service, _) =
        Service::new(config(Duration::ZERO), db, gateway.clone());
    let reservation = book(&service, 2, 5).await;

    gateway.set_initiation_down(true);
    let err = service
        .execute(InitiatePayment {
            reservation_id: reservation.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        initiate_payment::ExecutionError::Gateway(_),
    ));

    let attached = stored(&service, &reservation).await;
    assert_eq!(attached.payment.reference, Some(reference_of(&reservation)));
    assert_eq!(attached.payment.authorization, None);

    // Guest has paid through a checkout the lost response referred to.
    gateway.script(
        &reference_of(&reservation),
        vec![Verdict::Paid(reservation.total)],
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    ExpirePendingReservations::new(
        service.config().expire_pending_reservations,
        service.clone(),
    )
    .execute(Perform(()))
    .await
    .unwrap();

    assert_eq!(gateway.verifications(), 1);
    assert_eq!(stored(&service, &reservation).await.status, Status::Confirmed);
}

#[tokio::test]
async fn initiation_retried_once_gateway_recovers() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;

    gateway.set_initiation_down(true);
    drop(
        service
            .execute(InitiatePayment {
                reservation_id: reservation.id,
            })
            .await
            .unwrap_err(),
    );
    gateway.set_initiation_down(false);

    let authorization = service
        .execute(InitiatePayment {
            reservation_id: reservation.id,
        })
        .await
        .unwrap();

    assert_eq!(authorization.reference, reference_of(&reservation));
    assert_eq!(
        stored(&service, &reservation).await.payment.authorization,
        Some(authorization),
    );
}

#[tokio::test]
async fn guest_cancellation_refunds_payment_in_flight() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    drop(
        service
            .execute(InitiatePayment {
                reservation_id: reservation.id,
            })
            .await
            .unwrap(),
    );
    gateway.script(
        &reference_of(&reservation),
        vec![Verdict::Paid(reservation.total)],
    );

    let cancelled = service
        .execute(CancelReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Guest(guest::Id::new("anon-1").unwrap()),
        })
        .await
        .unwrap();
    assert_eq!(gateway.verifications(), 1);
    assert_eq!(cancelled.payment.status, PaymentStatus::Refunded);
    assert_eq!(
        cancelled.cancellation.as_ref().and_then(|c| c.refund),
        Some(reservation.total),
    );

    let outcome = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, confirm_payment::Outcome::Cancelled(_)));
    assert_eq!(gateway.verifications(), 1);

    let after = stored(&service, &reservation).await;
    assert_eq!(after.cancellation, cancelled.cancellation);
    assert!(after.is_consistent());
}

#[tokio::test]
async fn cancellation_fails_while_payment_is_unverifiable() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    drop(
        service
            .execute(InitiatePayment {
                reservation_id: reservation.id,
            })
            .await
            .unwrap(),
    );
    gateway.script(&reference_of(&reservation), vec![Verdict::Unavailable]);

    let err = service
        .execute(CancelReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Staff,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        cancel_reservation::ExecutionError::Gateway(e) if e.is_transient(),
    ));
    assert_eq!(stored(&service, &reservation).await.status, Status::Pending);
}

#[tokio::test]
async fn payment_captured_after_cancellation_is_refunded() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(
        &reference_of(&reservation),
        vec![Verdict::Paid(reservation.total)],
    );

    let cancelled = service
        .execute(CancelReservation {
            reservation_id: reservation.id,
            initiator: Initiator::Guest(guest::Id::new("anon-1").unwrap()),
        })
        .await
        .unwrap();
    assert_eq!(cancelled.cancellation.as_ref().unwrap().refund, None);

    let outcome = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, confirm_payment::Outcome::Cancelled(_)));

    let refunded = stored(&service, &reservation).await;
    assert_eq!(refunded.status, Status::Cancelled);
    assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
    let cancellation = refunded.cancellation.clone().unwrap();
    assert_eq!(cancellation.reason, CancellationReason::GuestRequest);
    assert_eq!(cancellation.refund, Some(reservation.total));
    assert!(refunded.is_consistent());

    let again = service
        .execute(ConfirmPayment {
            reference: reference_of(&reservation),
        })
        .await
        .unwrap();
    assert!(matches!(again, confirm_payment::Outcome::Cancelled(_)));
    assert_eq!(gateway.verifications(), 1);
    assert_eq!(
        stored(&service, &reservation).await.updated_at,
        refunded.updated_at,
    );
}

#[tokio::test]
async fn cancellation_racing_verified_payment_keeps_refund() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(
        &reference_of(&reservation),
        vec![Verdict::Paid(reservation.total)],
    );
    let (paused, resume) = gateway.hold_next_verification();

    let (outcome, cancelled) = tokio::join!(
        service.execute(ConfirmPayment {
            reference: reference_of(&reservation),
        }),
        async {
            paused.await.unwrap();
            let cancelled = service
                .execute(CancelReservation {
                    reservation_id: reservation.id,
                    initiator: Initiator::Guest(
                        guest::Id::new("anon-1").unwrap(),
                    ),
                })
                .await;
            resume.send(()).unwrap();
            cancelled
        },
    );

    assert_eq!(cancelled.unwrap().cancellation.unwrap().refund, None);
    assert!(matches!(
        outcome.unwrap(),
        confirm_payment::Outcome::Cancelled(_),
    ));

    let refunded = stored(&service, &reservation).await;
    assert_eq!(refunded.status, Status::Cancelled);
    assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
    let cancellation = refunded.cancellation.unwrap();
    assert_eq!(cancellation.reason, CancellationReason::GuestRequest);
    assert_eq!(cancellation.refund, Some(reservation.total));
}

#[tokio::test]
async fn repeated_failed_confirmation_fails_alike() {
    let (service, gateway) = setup().await;
    let reservation = book(&service, 2, 5).await;
    gateway.script(&reference_of(&reservation), vec![Verdict::Failed]);

    for _ in 0..2 {
        let err = service
            .execute(ConfirmPayment {
                reference: reference_of(&reservation),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            confirm_payment::ExecutionError::VerificationFailed(_),
        ));
    }

    let cancelled = stored(&service, &reservation).await;
    assert_eq!(cancelled.status, Status::Cancelled);
    assert_eq!(cancelled.cancellation.unwrap().refund, None);
}
