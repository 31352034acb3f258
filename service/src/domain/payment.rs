//! Payment definitions.

use common::{define_kind, DateTime, Money};
use derive_more::{AsRef, Display};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};

use crate::domain::{guest, reservation};

/// Reference of a transaction in a payment gateway.
///
/// The booking [`reservation::Reference`] doubles as this [`Reference`], so
/// the gateway uses it as an idempotency key.
#[derive(AsRef, Clone, Debug, Display, Eq, Hash, PartialEq)]
#[as_ref(str)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct Reference(String);

impl Reference {
    /// Creates a new [`Reference`] if the given `reference` is valid.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Option<Self> {
        let reference = reference.into();
        (!reference.is_empty()
            && reference.len() <= 100
            && reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '=')))
        .then_some(Self(reference))
    }
}

impl std::str::FromStr for Reference {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `payment::Reference`")
    }
}

impl From<reservation::Reference> for Reference {
    fn from(reference: reservation::Reference) -> Self {
        Self(reference.into())
    }
}

define_kind! {
    #[doc = "Channel a payment was made through."]
    #[case = "snake_case"]
    enum Method {
        #[doc = "Debit or credit card."]
        Card = 1,

        #[doc = "Direct bank account debit."]
        Bank = 2,

        #[doc = "Bank transfer to a virtual account."]
        BankTransfer = 3,

        #[doc = "USSD code."]
        Ussd = 4,

        #[doc = "Mobile money wallet."]
        MobileMoney = 5,

        #[doc = "QR code scan."]
        Qr = 6,
    }
}

/// Request to start a transaction in a payment gateway.
#[derive(Clone, Debug)]
pub struct Initiation {
    /// [`Reference`] of the transaction.
    pub reference: Reference,

    /// [`guest::Email`] of the payer.
    pub email: guest::Email,

    /// Amount to be charged.
    pub amount: Money,

    /// URL the payer is redirected to once the transaction completes.
    pub callback_url: Option<String>,
}

/// Transaction started in a payment gateway, awaiting the payer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Authorization {
    /// URL of the gateway's checkout page.
    pub authorization_url: String,

    /// Code identifying the checkout for inline (popup) payments.
    pub access_code: String,

    /// [`Reference`] of the transaction, as echoed by the gateway.
    pub reference: Reference,
}

/// Verified evidence of money captured by a payment gateway.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Receipt {
    /// [`Reference`] of the paid transaction.
    pub reference: Reference,

    /// Captured amount.
    pub amount: Money,

    /// [`Method`] the payment was made with, if reported.
    pub method: Option<Method>,

    /// [`DateTime`] when the payment was made, if reported.
    pub paid_at: Option<DateTime>,
}

impl Receipt {
    /// Indicates whether this [`Receipt`] fully covers the provided `total`.
    #[must_use]
    pub fn covers(&self, total: Money) -> bool {
        self.amount.currency == total.currency
            && self.amount.amount >= total.amount
    }
}

/// Verdict of a payment gateway about a transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verification {
    /// Transaction succeeded and the money was captured.
    Success(Receipt),

    /// Transaction exists, but didn't succeed.
    Failure {
        /// Status reported by the gateway (`failed`, `abandoned`, etc).
        status: String,
    },

    /// Gateway knows nothing about the transaction.
    Unknown,
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{money::Currency, Money};

    use super::{Method, Receipt, Reference};

    fn receipt(amount: &str) -> Receipt {
        Receipt {
            reference: Reference::new("RM-1-000001").unwrap(),
            amount: Money::from_str(amount).unwrap(),
            method: Some(Method::Card),
            paid_at: None,
        }
    }

    #[test]
    fn covers_total_only_in_full_and_same_currency() {
        let total = Money::from_str("45000NGN").unwrap();

        assert!(receipt("45000NGN").covers(total));
        assert!(receipt("45000.50NGN").covers(total));
        assert!(!receipt("44999.99NGN").covers(total));
        assert!(!receipt("45000GHS").covers(total));
        assert_eq!(total.currency, Currency::Ngn);
    }

    #[test]
    fn parses_method() {
        assert_eq!(Method::from_str("mobile_money"), Ok(Method::MobileMoney));
        assert_eq!(Method::from_str("card"), Ok(Method::Card));
        assert!(Method::from_str("cash").is_err());
    }

    #[test]
    fn validates_reference() {
        assert!(Reference::new("RM-1741000000000-123456").is_some());
        assert!(Reference::new("").is_none());
        assert!(Reference::new("RM 1").is_none());
    }
}
