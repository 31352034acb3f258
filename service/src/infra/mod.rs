//! Infrastructure layer.

pub mod database;
pub mod gateway;

pub use self::{
    database::{Database, Memory},
    gateway::Gateway,
};
#[cfg(feature = "postgres")]
pub use self::database::{postgres, Postgres};
#[cfg(feature = "paystack")]
pub use self::gateway::{paystack, Paystack};
