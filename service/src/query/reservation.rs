//! [`Query`] collection related to a single [`Reservation`].

use common::operations::By;

use crate::domain::{reservation, Reservation};
#[cfg(doc)]
use crate::Query;

use super::DatabaseQuery;

/// Queries a [`Reservation`] by its [`reservation::Id`].
pub type ById = DatabaseQuery<By<Option<Reservation>, reservation::Id>>;

/// Queries a [`Reservation`] by its booking [`reservation::Reference`].
pub type ByReference =
    DatabaseQuery<By<Option<Reservation>, reservation::Reference>>;
