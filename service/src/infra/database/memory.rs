//! In-memory [`Database`] implementation.

use std::{collections::HashMap, sync::Arc};

use common::operations::{
    By, Commit, CompareAndSwap, Insert, Lock, Select, Transact,
};
use derive_more::{Display, Error as StdError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{reservation, room, Reservation, Room},
    infra::{database, Database},
    read::reservation::{Active, Pending},
};

/// In-memory [`Database`].
///
/// Transactions are serializable: a [`Tx`] holds the whole storage exclusively
/// until committed or dropped, and its changes are discarded unless
/// [`Commit`]ted.
#[derive(Clone, Debug, Default)]
pub struct Memory<C = NonTx>(C);

impl Memory {
    /// Creates a new empty [`Memory`] database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Non-transactional [`Memory`] client.
#[derive(Clone, Debug, Default)]
pub struct NonTx(Arc<Mutex<State>>);

/// Transactional [`Memory`] client.
#[derive(Clone, Debug)]
pub struct Tx(Arc<Mutex<Option<Draft>>>);

/// Uncommitted changes of a [`Tx`].
#[derive(Debug)]
struct Draft {
    /// Exclusive access to the committed [`State`].
    committed: OwnedMutexGuard<State>,

    /// [`State`] with the changes applied.
    changed: State,
}

/// Stored data.
#[derive(Clone, Debug, Default)]
pub struct State {
    /// Stored [`Room`]s.
    rooms: HashMap<room::Key, Room>,

    /// Stored [`Reservation`]s.
    reservations: HashMap<reservation::Id, Reservation>,
}

/// [`Memory`] database error.
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// Unique constraint is violated.
    #[display("unique constraint `{_0}` is violated")]
    UniqueViolation(#[error(not(source))] &'static str),

    /// Exclusion constraint is violated.
    #[display("exclusion constraint `{_0}` is violated")]
    ExclusionViolation(#[error(not(source))] &'static str),

    /// [`Tx`] is used after being committed.
    #[display("`Tx` is already committed")]
    AlreadyCommitted,
}

impl Error {
    /// Checks if the error is a unique violation of the specified constraint.
    #[must_use]
    pub fn is_unique_violation(&self, constraint: Option<&str>) -> bool {
        match self {
            Self::UniqueViolation(c) => constraint.map_or(true, |x| x == *c),
            Self::ExclusionViolation(..) | Self::AlreadyCommitted => false,
        }
    }

    /// Checks if the error is an exclusion violation of the specified
    /// constraint.
    #[must_use]
    pub fn is_exclusion_violation(&self, constraint: Option<&str>) -> bool {
        match self {
            Self::ExclusionViolation(c) => {
                constraint.map_or(true, |x| x == *c)
            }
            Self::UniqueViolation(..) | Self::AlreadyCommitted => false,
        }
    }
}

impl State {
    /// Checks whether the provided [`Reservation`] would overlap another
    /// active one of the same [`Room`], if stored with the provided
    /// [`reservation::Status`].
    fn overlaps_active(
        &self,
        reservation: &Reservation,
        status: reservation::Status,
    ) -> bool {
        status.is_active()
            && self.reservations.values().any(|r| {
                r.id != reservation.id
                    && r.room_key == reservation.room_key
                    && r.status.is_active()
                    && r.stay.overlaps(&reservation.stay)
            })
    }
}

/// Access to the [`State`] of a [`Memory`] client.
pub trait Access {
    /// Reads the [`State`] with the provided function.
    ///
    /// # Errors
    ///
    /// If the [`State`] is not accessible anymore.
    fn read<R>(
        &self,
        f: impl FnOnce(&State) -> R,
    ) -> impl std::future::Future<Output = Result<R, Traced<database::Error>>>;

    /// Modifies the [`State`] with the provided function.
    ///
    /// The function must leave the [`State`] untouched on error.
    ///
    /// # Errors
    ///
    /// - If the [`State`] is not accessible anymore.
    /// - If the function fails.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> impl std::future::Future<Output = Result<R, Traced<database::Error>>>;
}

impl Access for NonTx {
    async fn read<R>(
        &self,
        f: impl FnOnce(&State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        Ok(f(&*self.0.lock().await))
    }

    async fn write<R>(
        &self,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Traced<database::Error>> {
        f(&mut *self.0.lock().await)
            .map_err(tracerr::from_and_wrap!(=> database::Error))
    }
}

impl Access for Tx {
    async fn read<R>(
        &self,
        f: impl FnOnce(&State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        let draft = self.0.lock().await;
        let draft = draft
            .as_ref()
            .ok_or_else(|| tracerr::new!(Error::AlreadyCommitted))
            .map_err(tracerr::map_from)?;
        Ok(f(&draft.changed))
    }

    async fn write<R>(
        &self,
        f: impl FnOnce(&mut State) -> Result<R, Error>,
    ) -> Result<R, Traced<database::Error>> {
        let mut draft = self.0.lock().await;
        let draft = draft
            .as_mut()
            .ok_or_else(|| tracerr::new!(Error::AlreadyCommitted))
            .map_err(tracerr::map_from)?;
        f(&mut draft.changed)
            .map_err(tracerr::from_and_wrap!(=> database::Error))
    }
}

impl Database<Transact> for Memory<NonTx> {
    type Ok = Memory<Tx>;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        let Memory(NonTx(state)) = self;
        let committed = Arc::clone(state).lock_owned().await;
        let changed = committed.clone();
        Ok(Memory(Tx(Arc::new(Mutex::new(Some(Draft {
            committed,
            changed,
        }))))))
    }
}

impl Database<Transact> for Memory<Tx> {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl Database<Commit> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        let Memory(Tx(draft)) = self;
        let Draft {
            mut committed,
            changed,
        } = draft
            .lock()
            .await
            .take()
            .ok_or_else(|| tracerr::new!(Error::AlreadyCommitted))
            .map_err(tracerr::map_from)?;
        *committed = changed;
        Ok(())
    }
}

impl<C: Access> Database<Insert<Room>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(room): Insert<Room>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .write(|s| {
                _ = s.rooms.insert(room.key.clone(), room);
                Ok(())
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access> Database<Select<By<Option<Room>, room::Key>>> for Memory<C> {
    type Ok = Option<Room>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Room>, room::Key>>,
    ) -> Result<Self::Ok, Self::Err> {
        let key = by.into_inner();
        self.0
            .read(|s| s.rooms.get(&key).cloned())
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access> Database<Lock<By<Room, room::Key>>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Room, room::Key>>,
    ) -> Result<Self::Ok, Self::Err> {
        // `Tx` already holds the whole storage exclusively.
        Ok(())
    }
}

impl<C: Access> Database<Select<By<Option<Reservation>, reservation::Id>>>
    for Memory<C>
{
    type Ok = Option<Reservation>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Reservation>, reservation::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.0
            .read(|s| s.reservations.get(&id).cloned())
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access>
    Database<Select<By<Option<Reservation>, reservation::Reference>>>
    for Memory<C>
{
    type Ok = Option<Reservation>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Reservation>, reservation::Reference>>,
    ) -> Result<Self::Ok, Self::Err> {
        let reference = by.into_inner();
        self.0
            .read(|s| {
                s.reservations
                    .values()
                    .find(|r| r.reference == reference)
                    .cloned()
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access> Database<Select<By<Vec<Active<Reservation>>, room::Key>>>
    for Memory<C>
{
    type Ok = Vec<Active<Reservation>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Active<Reservation>>, room::Key>>,
    ) -> Result<Self::Ok, Self::Err> {
        let key = by.into_inner();
        self.0
            .read(|s| {
                let mut active = s
                    .reservations
                    .values()
                    .filter(|r| r.room_key == key && r.status.is_active())
                    .cloned()
                    .map(Active)
                    .collect::<Vec<_>>();
                active.sort_by_key(|r| r.stay.start());
                active
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access>
    Database<
        Select<By<Vec<Pending<Reservation>>, reservation::CreationDateTime>>,
    > for Memory<C>
{
    type Ok = Vec<Pending<Reservation>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Vec<Pending<Reservation>>, reservation::CreationDateTime>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let deadline = by.into_inner();
        self.0
            .read(|s| {
                let mut pending = s
                    .reservations
                    .values()
                    .filter(|r| {
                        r.status == reservation::Status::Pending
                            && r.created_at < deadline
                    })
                    .cloned()
                    .map(Pending)
                    .collect::<Vec<_>>();
                pending.sort_by_key(|r| r.created_at);
                pending
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access> Database<Insert<Reservation>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(reservation): Insert<Reservation>,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .write(|s| {
                if s.reservations.values().any(|r| {
                    r.id == reservation.id
                        || r.reference == reservation.reference
                }) {
                    return Err(Error::UniqueViolation(
                        database::constraint::RESERVATION_REFERENCE,
                    ));
                }
                if s.overlaps_active(&reservation, reservation.status) {
                    return Err(Error::ExclusionViolation(
                        database::constraint::RESERVATION_OVERLAP,
                    ));
                }
                _ = s.reservations.insert(reservation.id, reservation);
                Ok(())
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access>
    Database<CompareAndSwap<Reservation, reservation::Status>> for Memory<C>
{
    type Ok = bool;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        CompareAndSwap { value, expected }: CompareAndSwap<
            Reservation,
            reservation::Status,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .write(|s| {
                let is_expected = s
                    .reservations
                    .get(&value.id)
                    .is_some_and(|r| r.status == expected);
                if !is_expected {
                    return Ok(false);
                }
                if s.overlaps_active(&value, value.status) {
                    return Err(Error::ExclusionViolation(
                        database::constraint::RESERVATION_OVERLAP,
                    ));
                }

                if let Some(stored) = s.reservations.get_mut(&value.id) {
                    stored.status = value.status;
                    stored.payment = value.payment;
                    stored.cancellation = value.cancellation;
                    stored.updated_at = value.updated_at;
                }
                Ok(true)
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Access>
    Database<CompareAndSwap<Reservation, reservation::Unrefunded>>
    for Memory<C>
{
    type Ok = bool;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        CompareAndSwap { value, .. }: CompareAndSwap<
            Reservation,
            reservation::Unrefunded,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        self.0
            .write(|s| {
                let Some(stored) = s.reservations.get_mut(&value.id) else {
                    return Ok(false);
                };
                let is_unrefunded = stored.status
                    == reservation::Status::Cancelled
                    && stored
                        .cancellation
                        .as_ref()
                        .is_some_and(|c| c.refund.is_none());
                if !is_unrefunded {
                    return Ok(false);
                }

                // Only the refund is flagged, the rest stays as cancelled.
                if let (Some(stored), Some(flagged)) =
                    (stored.cancellation.as_mut(), value.cancellation)
                {
                    stored.refund = flagged.refund;
                }
                stored.payment.status = value.payment.status;
                stored.updated_at = value.updated_at;
                Ok(true)
            })
            .await
            .map_err(tracerr::wrap!())
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{
        operations::{By, CompareAndSwap, Insert, Select},
        DateTime, Handler as _, Money,
    };

    use crate::domain::{
        reservation::{
            self,
            spec::{pending, stay},
            CancellationReason, PaymentStatus,
        },
        Reservation,
    };

    use super::Memory;

    #[tokio::test]
    async fn flags_refund_of_unrefunded_only_once() {
        let db = Memory::new();
        let mut r = pending(stay(2, 5));
        r.cancel(CancellationReason::GuestRequest, None, DateTime::now())
            .unwrap();
        db.execute(Insert(r.clone())).await.unwrap();

        let mut first = r.clone();
        first
            .flag_refund(Money::from_str("45000NGN").unwrap(), DateTime::now())
            .unwrap();
        let mut second = r.clone();
        second
            .flag_refund(Money::from_str("1NGN").unwrap(), DateTime::now())
            .unwrap();

        let swap = |value| CompareAndSwap {
            value,
            expected: reservation::Unrefunded,
        };
        assert!(db.execute(swap(first.clone())).await.unwrap());
        assert!(!db.execute(swap(second)).await.unwrap());

        let stored = db
            .execute(Select(By::<Option<Reservation>, _>::new(r.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Refunded);
        assert_eq!(stored.cancellation, first.cancellation);
    }

    #[tokio::test]
    async fn never_flags_refund_of_pending() {
        let db = Memory::new();
        let r = pending(stay(2, 5));
        db.execute(Insert(r.clone())).await.unwrap();

        let mut cancelled = r.clone();
        cancelled
            .cancel(CancellationReason::GuestRequest, None, DateTime::now())
            .unwrap();
        cancelled
            .flag_refund(Money::from_str("45000NGN").unwrap(), DateTime::now())
            .unwrap();

        assert!(!db
            .execute(CompareAndSwap {
                value: cancelled,
                expected: reservation::Unrefunded,
            })
            .await
            .unwrap());
    }
}
