//! Background [`Task`]s definitions.

mod background;
pub mod expire_pending_reservations;

pub use common::Handler as Task;

pub use self::{
    background::{Background, Failure},
    expire_pending_reservations::ExpirePendingReservations,
};
