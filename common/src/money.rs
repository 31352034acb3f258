//! [`Money`]-related definitions.

use std::{fmt, str::FromStr};

use rust_decimal::{prelude::ToPrimitive as _, Decimal};

use crate::define_kind;

/// Amount of money in some [`Currency`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Money {
    /// Amount of this [`Money`].
    pub amount: Decimal,

    /// [`Currency`] of this amount.
    pub currency: Currency,
}

impl Money {
    /// Number of minor units (kobo, cents, pesewas) in a major one.
    const MINOR_UNITS: i64 = 100;

    /// Multiplies this [`Money`] by the provided number of `times`.
    ///
    /// [`None`] is returned on overflow.
    #[must_use]
    pub fn times(self, times: u32) -> Option<Self> {
        Some(Self {
            amount: self.amount.checked_mul(Decimal::from(times))?,
            currency: self.currency,
        })
    }

    /// Converts this [`Money`] into the integer amount of minor units, as
    /// payment gateways expect.
    ///
    /// [`None`] is returned if this [`Money`] has a sub-minor fraction or
    /// doesn't fit into [`i64`].
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i64> {
        let minor = self.amount.checked_mul(Decimal::from(Self::MINOR_UNITS))?;
        if minor.is_integer() {
            minor.to_i64()
        } else {
            None
        }
    }

    /// Creates a new [`Money`] out of the provided amount of minor units.
    #[must_use]
    pub fn from_minor_units(minor: i64, currency: Currency) -> Self {
        Self {
            amount: Decimal::new(minor, 2).normalize(),
            currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { amount, currency } = self;
        match amount.is_integer().then(|| amount.to_i128()).flatten() {
            Some(whole) => write!(f, "{whole}{currency}"),
            None => write!(f, "{amount}{currency}"),
        }
    }
}

impl FromStr for Money {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 4 || !s.is_char_boundary(s.len() - 3) {
            return Err("too short");
        }

        let (amount, currency) = s.split_at(s.len() - 3);
        let amount = Decimal::from_str(amount).map_err(|_| "invalid amount")?;
        let currency =
            Currency::from_str(currency).map_err(|_| "invalid currency")?;

        Ok(Self { amount, currency })
    }
}

define_kind! {
    #[doc = "Currency of a [`Money`] amount."]
    #[case = "UPPERCASE"]
    enum Currency {
        #[doc = "Nigerian Naira."]
        Ngn = 1,

        #[doc = "Ghanaian Cedi."]
        Ghs = 2,

        #[doc = "South African Rand."]
        Zar = 3,

        #[doc = "Kenyan Shilling."]
        Kes = 4,

        #[doc = "US Dollar."]
        Usd = 5,
    }
}

#[cfg(feature = "juniper")]
mod juniper {
    //! Module providing integration with [`juniper`] crate.

    use std::str::FromStr as _;

    use juniper::{graphql_scalar, InputValue, ScalarValue, Value};

    /// Money in `{major}.{minor}{currency}` format, where:
    /// - `major` is an integer;
    /// - `minor` is an optional integer;
    /// - `currency` is a three-letter currency code.
    #[graphql_scalar(with = Self, parse_token(String))]
    type Money = super::Money;

    impl Money {
        fn to_output<S: ScalarValue>(m: &Money) -> Value<S> {
            Value::scalar(m.to_string())
        }

        fn from_input<S: ScalarValue>(
            input: &InputValue<S>,
        ) -> Result<Self, String> {
            input
                .as_string_value()
                .ok_or_else(|| {
                    format!(
                        "Cannot parse `Money` input scalar from \
                         non-string value: {input}",
                    )
                })
                .and_then(|s| {
                    Self::from_str(s).map_err(|e| {
                        format!("Cannot parse `Money` input scalar: {e}")
                    })
                })
        }
    }
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use rust_decimal::Decimal;

    use super::{Currency, Money};

    fn decimal(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn money(amount: &str, currency: Currency) -> Money {
        Money {
            amount: decimal(amount),
            currency,
        }
    }

    #[test]
    fn from_str() {
        assert_eq!(
            Money::from_str("15000.50NGN").unwrap(),
            money("15000.50", Currency::Ngn),
        );
        assert_eq!(
            Money::from_str("120USD").unwrap(),
            money("120", Currency::Usd),
        );

        assert!(Money::from_str("123.45").is_err());
        assert!(Money::from_str("123.45Ng").is_err());
        assert!(Money::from_str("123.45Naira").is_err());
        assert!(Money::from_str("NGN").is_err());
    }

    #[test]
    fn to_string() {
        assert_eq!(money("15000.50", Currency::Ngn).to_string(), "15000.50NGN");
        assert_eq!(money("15000.00", Currency::Ngn).to_string(), "15000NGN");
        assert_eq!(money("42", Currency::Ghs).to_string(), "42GHS");
    }

    #[test]
    fn multiplies_by_nights() {
        assert_eq!(
            money("25000.50", Currency::Ngn).times(3),
            Some(money("75001.50", Currency::Ngn)),
        );
        assert_eq!(
            money("25000", Currency::Ngn).times(0),
            Some(money("0", Currency::Ngn)),
        );
        assert_eq!(
            Money {
                amount: Decimal::MAX,
                currency: Currency::Usd,
            }
            .times(2),
            None,
        );
    }

    #[test]
    fn converts_minor_units() {
        assert_eq!(
            money("75001.50", Currency::Ngn).to_minor_units(),
            Some(7_500_150),
        );
        assert_eq!(money("0.005", Currency::Ngn).to_minor_units(), None);

        assert_eq!(
            Money::from_minor_units(7_500_150, Currency::Ngn),
            money("75001.5", Currency::Ngn),
        );
        assert_eq!(
            Money::from_minor_units(7_500_000, Currency::Ngn).to_string(),
            "75000NGN",
        );
    }
}
