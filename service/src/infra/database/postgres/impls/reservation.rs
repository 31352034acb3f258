//! [`Reservation`]-related [`Database`] implementations.

use common::{
    operations::{By, CompareAndSwap, Insert, Select},
    DateRange, Money,
};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{
        payment,
        reservation::{self, Cancellation, Payment},
        room, Guest, Reservation,
    },
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read::reservation::{Active, Pending},
};

/// Expands into the list of `reservations` table columns, decodable by
/// [`from_row()`].
macro_rules! columns {
    () => {
        "id, booking_id, room_key, \
         user_id, guest_name, guest_email, guest_phone, \
         check_in_date, check_out_date, guests_count, \
         price_per_night, total_amount, currency, \
         payment_status, payment_method, payment_reference, \
         payment_authorization_url, payment_access_code, \
         booking_status, cancellation_reason, refund_amount, cancelled_at, \
         created_at, updated_at"
    };
}

/// Decodes a [`Reservation`] from the provided [`Row`] having [`columns!`].
fn from_row(row: &Row) -> Reservation {
    let currency = row.get("currency");
    let money = |amount| Money { amount, currency };

    Reservation {
        id: row.get("id"),
        reference: row.get("booking_id"),
        room_key: row.get("room_key"),
        guest: Guest {
            id: row.get("user_id"),
            name: row.get("guest_name"),
            email: row.get("guest_email"),
            phone: row.get("guest_phone"),
        },
        stay: DateRange::new(
            row.get("check_in_date"),
            row.get("check_out_date"),
        )
        .expect("`reservations_stay_check` guards the range"),
        guests_count: u16::try_from(row.get::<_, i16>("guests_count"))
            .expect("`guests_count` is positive"),
        nightly_rate: money(row.get("price_per_night")),
        total: money(row.get("total_amount")),
        status: row.get("booking_status"),
        payment: Payment {
            status: row.get("payment_status"),
            reference: row.get("payment_reference"),
            method: row.get("payment_method"),
            authorization: authorization_from_row(row),
        },
        cancellation: row
            .get::<_, Option<reservation::CancellationReason>>(
                "cancellation_reason",
            )
            .map(|reason| Cancellation {
                reason,
                refund: row.get::<_, Option<_>>("refund_amount").map(money),
                cancelled_at: row.get("cancelled_at"),
            }),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Decodes a [`payment::Authorization`] from the provided [`Row`] having
/// [`columns!`], if stored.
fn authorization_from_row(row: &Row) -> Option<payment::Authorization> {
    Some(payment::Authorization {
        authorization_url: row
            .get::<_, Option<String>>("payment_authorization_url")?,
        access_code: row.get::<_, Option<String>>("payment_access_code")?,
        reference: row
            .get::<_, Option<payment::Reference>>("payment_reference")?,
    })
}

impl<C> Database<Select<By<Option<Reservation>, reservation::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Reservation>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Reservation>, reservation::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: reservation::Id = by.into_inner();

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM reservations \
              WHERE id = $1::UUID \
              LIMIT 1",
        );
        self.query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.as_ref().map(from_row))
    }
}

impl<C> Database<Select<By<Option<Reservation>, reservation::Reference>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Reservation>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Reservation>, reservation::Reference>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let reference: reservation::Reference = by.into_inner();

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM reservations \
              WHERE booking_id = $1::VARCHAR \
              LIMIT 1",
        );
        self.query_opt(SQL, &[&reference])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.as_ref().map(from_row))
    }
}

impl<C> Database<Select<By<Vec<Active<Reservation>>, room::Key>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<Active<Reservation>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Active<Reservation>>, room::Key>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let room_key: room::Key = by.into_inner();
        let [confirmed, checked_in] = reservation::Status::ACTIVE;

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM reservations \
              WHERE room_key = $1::VARCHAR \
                AND booking_status IN ($2::INT2, $3::INT2) \
              ORDER BY check_in_date ASC",
        );
        Ok(self
            .query(SQL, &[&room_key, &confirmed, &checked_in])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(|row| Active(from_row(row)))
            .collect())
    }
}

impl<C>
    Database<
        Select<By<Vec<Pending<Reservation>>, reservation::CreationDateTime>>,
    > for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<Pending<Reservation>>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Vec<Pending<Reservation>>, reservation::CreationDateTime>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let deadline: reservation::CreationDateTime = by.into_inner();

        const SQL: &str = concat!(
            "SELECT ",
            columns!(),
            " FROM reservations \
              WHERE booking_status = $1::INT2 \
                AND created_at < $2::TIMESTAMPTZ \
              ORDER BY created_at ASC",
        );
        Ok(self
            .query(SQL, &[&reservation::Status::Pending, &deadline])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(|row| Pending(from_row(row)))
            .collect())
    }
}

impl<C> Database<Insert<Reservation>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(reservation): Insert<Reservation>,
    ) -> Result<Self::Ok, Self::Err> {
        let Reservation {
            id,
            reference,
            room_key,
            guest:
                Guest {
                    id: guest_id,
                    name: guest_name,
                    email: guest_email,
                    phone: guest_phone,
                },
            stay,
            guests_count,
            nightly_rate,
            total,
            status,
            payment,
            cancellation,
            created_at,
            updated_at,
        } = reservation;

        let check_in_date = stay.start();
        let check_out_date = stay.end();
        let no_of_nights = i32::try_from(stay.nights()).unwrap_or(i32::MAX);
        let guests_count = i16::try_from(guests_count).unwrap_or(i16::MAX);
        let Cancelled {
            reason,
            refund,
            at: cancelled_at,
        } = Cancelled::from(cancellation);
        let Checkout {
            authorization_url,
            access_code,
        } = Checkout::from(payment.authorization);

        const SQL: &str = "\
            INSERT INTO reservations (\
                id, booking_id, room_key, \
                user_id, guest_name, guest_email, guest_phone, \
                check_in_date, check_out_date, no_of_nights, guests_count, \
                price_per_night, total_amount, currency, \
                payment_status, payment_method, payment_reference, \
                payment_authorization_url, payment_access_code, \
                booking_status, \
                cancellation_reason, refund_amount, cancelled_at, \
                created_at, updated_at\
            ) VALUES (\
                $1::UUID, $2::VARCHAR, $3::VARCHAR, \
                $4::VARCHAR, $5::VARCHAR, $6::VARCHAR, $7::VARCHAR, \
                $8::DATE, $9::DATE, $10::INT4, $11::INT2, \
                $12::NUMERIC, $13::NUMERIC, $14::INT2, \
                $15::INT2, $16::INT2, $17::VARCHAR, \
                $18::VARCHAR, $19::VARCHAR, \
                $20::INT2, \
                $21::INT2, $22::NUMERIC, $23::TIMESTAMPTZ, \
                $24::TIMESTAMPTZ, $25::TIMESTAMPTZ\
            )";
        self.exec(
            SQL,
            &[
                &id,
                &reference,
                &room_key,
                &guest_id,
                &guest_name,
                &guest_email,
                &guest_phone,
                &check_in_date,
                &check_out_date,
                &no_of_nights,
                &guests_count,
                &nightly_rate.amount,
                &total.amount,
                &total.currency,
                &payment.status,
                &payment.method,
                &payment.reference,
                &authorization_url,
                &access_code,
                &status,
                &reason,
                &refund,
                &cancelled_at,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<CompareAndSwap<Reservation, reservation::Status>>
    for Postgres<C>
where
    C: Connection,
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
        let Reservation {
            id,
            status,
            payment,
            cancellation,
            updated_at,
            ..
        } = value;
        let Cancelled {
            reason,
            refund,
            at: cancelled_at,
        } = Cancelled::from(cancellation);
        let Checkout {
            authorization_url,
            access_code,
        } = Checkout::from(payment.authorization);

        // Stay, rates and total are never updated once stored.
        const SQL: &str = "\
            UPDATE reservations \
            SET booking_status = $3::INT2, \
                payment_status = $4::INT2, \
                payment_method = $5::INT2, \
                payment_reference = $6::VARCHAR, \
                payment_authorization_url = $7::VARCHAR, \
                payment_access_code = $8::VARCHAR, \
                cancellation_reason = $9::INT2, \
                refund_amount = $10::NUMERIC, \
                cancelled_at = $11::TIMESTAMPTZ, \
                updated_at = $12::TIMESTAMPTZ \
            WHERE id = $1::UUID \
              AND booking_status = $2::INT2";
        self.exec(
            SQL,
            &[
                &id,
                &expected,
                &status,
                &payment.status,
                &payment.method,
                &payment.reference,
                &authorization_url,
                &access_code,
                &reason,
                &refund,
                &cancelled_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(|updated| updated == 1)
    }
}

impl<C> Database<CompareAndSwap<Reservation, reservation::Unrefunded>>
    for Postgres<C>
where
    C: Connection,
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
        let Reservation {
            id,
            payment,
            cancellation,
            updated_at,
            ..
        } = value;
        let Cancelled { refund, .. } = Cancelled::from(cancellation);

        const SQL: &str = "\
            UPDATE reservations \
            SET payment_status = $3::INT2, \
                refund_amount = $4::NUMERIC, \
                updated_at = $5::TIMESTAMPTZ \
            WHERE id = $1::UUID \
              AND booking_status = $2::INT2 \
              AND refund_amount IS NULL";
        self.exec(
            SQL,
            &[
                &id,
                &reservation::Status::Cancelled,
                &payment.status,
                &refund,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(|updated| updated == 1)
    }
}

/// Flattened [`payment::Authorization`] columns.
struct Checkout {
    /// `payment_authorization_url` column.
    authorization_url: Option<String>,

    /// `payment_access_code` column.
    access_code: Option<String>,
}

impl From<Option<payment::Authorization>> for Checkout {
    fn from(authorization: Option<payment::Authorization>) -> Self {
        let (authorization_url, access_code) = authorization
            .map(|a| (a.authorization_url, a.access_code))
            .unzip();
        Self {
            authorization_url,
            access_code,
        }
    }
}

/// Flattened [`Cancellation`] columns.
struct Cancelled {
    /// `cancellation_reason` column.
    reason: Option<reservation::CancellationReason>,

    /// `refund_amount` column.
    refund: Option<rust_decimal::Decimal>,

    /// `cancelled_at` column.
    at: Option<reservation::CancellationDateTime>,
}

impl From<Option<Cancellation>> for Cancelled {
    fn from(cancellation: Option<Cancellation>) -> Self {
        match cancellation {
            Some(Cancellation {
                reason,
                refund,
                cancelled_at,
            }) => Self {
                reason: Some(reason),
                refund: refund.map(|m| m.amount),
                at: Some(cancelled_at),
            },
            None => Self {
                reason: None,
                refund: None,
                at: None,
            },
        }
    }
}

