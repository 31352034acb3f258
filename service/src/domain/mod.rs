//! Domain definitions.

pub mod guest;
pub mod payment;
pub mod reservation;
pub mod room;
pub mod session;

pub use self::{
    guest::Guest, reservation::Reservation, room::Room, session::Session,
};
