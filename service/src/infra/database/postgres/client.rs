//! Postgres database clients.

use std::{mem, sync::Arc};

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_postgres::{Row, ToStatement};
use tracerr::Traced;

use crate::infra::database::{
    self,
    postgres::{
        self,
        connection::{self, Params},
        Connection,
    },
};

/// Non-transactional Postgres client.
///
/// Every statement runs in its own [`connection::Pooled`] connection.
#[derive(Clone, Debug)]
pub struct NonTx {
    /// [`connection::Pool`] to take connections from.
    pool: connection::Pool,
}

impl NonTx {
    /// Creates a new [`NonTx`] client over the provided [`connection::Pool`].
    #[must_use]
    pub(crate) fn from_pool(pool: connection::Pool) -> Self {
        Self { pool }
    }

    /// Takes a [`connection::Pooled`] connection from the pool.
    pub(crate) async fn pooled(
        &self,
    ) -> Result<connection::Pooled, Traced<database::Error>> {
        self.pool
            .get()
            .await
            .map_err(tracerr::from_and_wrap!(=> postgres::Error))
            .map_err(tracerr::map_from)
    }

    /// Creates a new [`Tx`] client, sharing the pool of this one.
    ///
    /// The transaction is opened on the first statement only.
    #[must_use]
    pub fn transaction(&self) -> Tx {
        Tx {
            client: self.clone(),
            state: Arc::new(Mutex::new(TxState::Idle)),
        }
    }
}

impl Connection for NonTx {
    async fn query<S>(
        &self,
        stmt: &S,
        params: Params<'_>,
    ) -> Result<Vec<Row>, Traced<database::Error>>
    where
        S: ToStatement + ?Sized,
    {
        self.pooled()
            .await
            .map_err(tracerr::wrap!())?
            .query(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn query_opt<S>(
        &self,
        stmt: &S,
        params: Params<'_>,
    ) -> Result<Option<Row>, Traced<database::Error>>
    where
        S: ToStatement + ?Sized,
    {
        self.pooled()
            .await
            .map_err(tracerr::wrap!())?
            .query_opt(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn exec<S>(
        &self,
        stmt: &S,
        params: Params<'_>,
    ) -> Result<u64, Traced<database::Error>>
    where
        S: ToStatement + ?Sized,
    {
        self.pooled()
            .await
            .map_err(tracerr::wrap!())?
            .exec(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }
}

/// Transactional Postgres client.
///
/// Clones share the same transaction. It's rolled back once the last clone is
/// dropped without [`Tx::commit()`].
#[derive(Clone, Debug)]
pub struct Tx {
    /// [`NonTx`] client to take the connection from.
    client: NonTx,

    /// [`TxState`] of this [`Tx`].
    state: Arc<Mutex<TxState>>,
}

/// State of a [`Tx`] client.
#[derive(Debug)]
enum TxState {
    /// No statement has run yet.
    Idle,

    /// Transaction is open.
    Open(connection::Transaction),

    /// Transaction is committed.
    Committed,
}

impl Tx {
    /// Returns the open [`connection::Transaction`], opening it if needed.
    async fn transaction(
        &self,
    ) -> Result<
        MappedMutexGuard<'_, connection::Transaction>,
        Traced<database::Error>,
    > {
        let mut state = self.state.lock().await;
        if matches!(*state, TxState::Idle) {
            let conn = self.client.pooled().await.map_err(tracerr::wrap!())?;
            *state = TxState::Open(
                connection::Transaction::begin(conn)
                    .await
                    .map_err(tracerr::wrap!())?,
            );
        }

        MutexGuard::try_map(state, |s| match s {
            TxState::Open(tx) => Some(tx),
            TxState::Idle | TxState::Committed => None,
        })
        .map_err(|_| tracerr::new!(postgres::Error::TxFinished))
        .map_err(tracerr::map_from)
    }

    /// Commits this [`Tx`].
    ///
    /// Committing a [`Tx`] that ran no statements does nothing.
    ///
    /// # Errors
    ///
    /// If `COMMIT` fails, or this [`Tx`] is committed already.
    pub async fn commit(&self) -> Result<(), Traced<database::Error>> {
        let mut state = self.state.lock().await;
        match mem::replace(&mut *state, TxState::Committed) {
            TxState::Open(tx) => tx.commit().await.map_err(tracerr::wrap!()),
            TxState::Idle => Ok(()),
            TxState::Committed => Err(tracerr::new!(postgres::Error::TxFinished))
                .map_err(tracerr::map_from),
        }
    }
}

impl Connection for Tx {
    async fn query<S>(
        &self,
        stmt: &S,
        params: Params<'_>,
    ) -> Result<Vec<Row>, Traced<database::Error>>
    where
        S: ToStatement + ?Sized,
    {
        self.transaction()
            .await
            .map_err(tracerr::wrap!())?
            .query(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn query_opt<S>(
        &self,
        stmt: &S,
        params: Params<'_>,
    ) -> Result<Option<Row>, Traced<database::Error>>
    where
        S: ToStatement + ?Sized,
    {
        self.transaction()
            .await
            .map_err(tracerr::wrap!())?
            .query_opt(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }

    async fn exec<S>(
        &self,
        stmt: &S,
        params: Params<'_>,
    ) -> Result<u64, Traced<database::Error>>
    where
        S: ToStatement + ?Sized,
    {
        self.transaction()
            .await
            .map_err(tracerr::wrap!())?
            .exec(stmt, params)
            .await
            .map_err(tracerr::wrap!())
    }
}
