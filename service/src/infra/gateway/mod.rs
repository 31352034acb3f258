//! [`Gateway`]-related implementations.

#[cfg(feature = "paystack")]
pub mod paystack;

use derive_more::{Display, Error as StdError};

#[cfg(feature = "paystack")]
pub use self::paystack::Paystack;

/// Payment gateway operation.
pub use common::Handler as Gateway;

/// [`Gateway`] error.
#[derive(Clone, Debug, Display, StdError)]
pub enum Error {
    /// [`Gateway`] cannot be reached or is overloaded at the moment.
    #[display("payment gateway is unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),

    /// [`Gateway`] refused to perform the operation.
    #[display("payment gateway rejected the request: {_0}")]
    Rejected(#[error(not(source))] String),

    /// [`Gateway`] responded with something unexpected.
    #[display("unexpected payment gateway response: {_0}")]
    Malformed(#[error(not(source))] String),
}

impl Error {
    /// Indicates whether the failed operation is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(..) => true,
            Self::Rejected(..) | Self::Malformed(..) => false,
        }
    }
}
