//! [`Room`]-related [`Database`] implementations.

use common::{
    operations::{By, Lock, Select},
    Money,
};
use tracerr::Traced;

use crate::{
    domain::{room, Room},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

impl<C> Database<Select<By<Option<Room>, room::Key>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Room>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Room>, room::Key>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let key: room::Key = by.into_inner();

        const SQL: &str = "\
            SELECT key, name, nightly_rate, currency, capacity \
            FROM rooms \
            WHERE key = $1::VARCHAR \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&key])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Room {
                key: row.get("key"),
                name: row.get("name"),
                nightly_rate: Money {
                    amount: row.get("nightly_rate"),
                    currency: row.get("currency"),
                },
                capacity: u16::try_from(row.get::<_, i16>("capacity"))
                    .expect("`capacity` is positive"),
            }))
    }
}

impl<C> Database<Lock<By<Room, room::Key>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Room, room::Key>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let key: room::Key = by.into_inner();

        const SQL: &str = "\
            SELECT key \
            FROM rooms \
            WHERE key = $1::VARCHAR \
            FOR UPDATE";
        self.query_opt(SQL, &[&key])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
