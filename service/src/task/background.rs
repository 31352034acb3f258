//! [`Background`] environment running [`Task`]s.

use std::{
    error::Error,
    future::{Future, IntoFuture},
};

use derive_more::{Display, Error as StdError};
use futures::{
    future::{self, LocalBoxFuture},
    FutureExt as _, TryFutureExt as _,
};
use tokio::task;

#[cfg(doc)]
use crate::Task;

/// Type-erased error of a [`Task`].
type BoxError = Box<dyn Error + 'static>;

/// Environment running long-living [`Task`]s on the current thread.
///
/// Spawned [`Task`]s make no progress until the [`Background`] is awaited.
#[derive(Debug, Default)]
pub struct Background {
    /// Set the [`Task`]s are spawned into.
    set: task::LocalSet,

    /// Names and handles of the spawned [`Task`]s.
    handles: Vec<(&'static str, task::JoinHandle<Result<(), BoxError>>)>,
}

impl Background {
    /// Spawns the named [`Task`] inside this [`Background`] environment.
    pub fn spawn<F, E>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: Error + 'static,
    {
        let handle = self
            .set
            .spawn_local(task.map_err(BoxError::from));
        self.handles.push((name, handle));
    }
}

/// [`Task`] of a [`Background`] stopped with an error.
#[derive(Debug, Display, StdError)]
#[display("`{task}` failed: {error}")]
pub struct Failure {
    /// Name of the failed [`Task`].
    pub task: &'static str,

    /// Error the [`Task`] failed with.
    pub error: BoxError,
}

impl IntoFuture for Background {
    type Output = Result<(), Failure>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let Self { set, handles } = self;
        let tasks =
            future::try_join_all(handles.into_iter().map(|(task, handle)| {
                handle.map(move |res| match res {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => Err(Failure { task, error }),
                    Err(e) => Err(Failure {
                        task,
                        error: BoxError::from(e),
                    }),
                })
            }));

        async move { set.run_until(tasks).await.map(drop) }.boxed_local()
    }
}
