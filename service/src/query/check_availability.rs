//! [`CheckAvailability`] [`Query`].

use common::{
    operations::{By, Select},
    Date, DateRange,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{room, Reservation},
    infra::{database, Database},
    read::{reservation::Active, Availability},
    Service,
};
#[cfg(doc)]
use crate::domain::Room;

use super::Query;

/// [`Query`] checking whether a [`Room`] is free for some stay.
///
/// Only [`Active`] [`Reservation`]s block a [`Room`], so pending ones never
/// make it unavailable.
#[derive(Clone, Debug)]
pub struct CheckAvailability {
    /// Key of the [`Room`] to check.
    pub room_key: room::Key,

    /// Stay to check the [`Room`] for.
    pub stay: DateRange,
}

impl<Db, Gw> Query<CheckAvailability> for Service<Db, Gw>
where
    Db: Database<
        Select<By<Vec<Active<Reservation>>, room::Key>>,
        Ok = Vec<Active<Reservation>>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Availability;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        query: CheckAvailability,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CheckAvailability { room_key, stay } = query;

        if stay.start() < Date::today() {
            return Err(tracerr::new!(E::PastDates(stay.start())));
        }

        let active = self
            .database()
            .execute(Select(By::<Vec<Active<Reservation>>, _>::new(room_key)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        Ok(Availability::among(&stay, active))
    }
}

/// Error of [`CheckAvailability`] [`Query`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    Db(database::Error),

    /// Stay starts in the past.
    #[display("stay starts in the past: {_0}")]
    #[from(ignore)]
    PastDates(#[error(not(source))] Date),
}
