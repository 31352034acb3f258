//! GraphQL API definitions.

mod mutation;
mod query;
pub mod reservation;
pub mod room;
pub mod scalar;

use juniper::EmptySubscription;

use crate::{define_error, Context};

pub use self::{
    mutation::Mutation, query::Query, reservation::Reservation, room::Room,
};

/// GraphQL schema.
pub type Schema =
    juniper::RootNode<'static, Query, Mutation, EmptySubscription<Context>>;

define_error! {
    enum PrivilegeError {
        #[code = "NOT_STAFF"]
        #[status = FORBIDDEN]
        #[message = "Authenticated user must be a hotel staff member"]
        Staff,
    }
}

define_error! {
    enum StaleError {
        #[code = "TRY_AGAIN"]
        #[status = CONFLICT]
        #[message = "`Reservation` is being modified concurrently, try again"]
        Reservation,
    }
}
