//! Helpers for GraphQL scalars wrapping domain values.

use std::{fmt, marker::PhantomData, str::FromStr};

use juniper::{
    GraphQLType, InputValue, ParseScalarResult, ParseScalarValue, ScalarToken,
    ScalarValue, Value,
};

/// Helper type to use in `#[graphql(with = ..)]` attribute of a scalar
/// wrapping the `As` domain value.
///
/// The scalar is represented as a GraphQL string, produced by the [`Display`]
/// impl of `As`, and parsed back with its [`FromStr`] impl. Surrounding
/// whitespace of the input is ignored.
///
/// [`Display`]: fmt::Display
#[derive(Debug)]
pub struct Parsed<As>(PhantomData<As>);

impl<As> Parsed<As> {
    /// Outputs the wrapped `As` value as a GraphQL string.
    pub fn to_output<T, S>(value: &T) -> Value<S>
    where
        As: fmt::Display,
        T: AsRef<As>,
        S: ScalarValue,
    {
        Value::scalar(value.as_ref().to_string())
    }

    /// Parses the scalar from the provided GraphQL string.
    ///
    /// # Errors
    ///
    /// If the input is not a string, or is not a valid `As` value.
    pub fn from_input<T, S>(input: &InputValue<S>) -> Result<T, String>
    where
        As: FromStr,
        As::Err: fmt::Display,
        T: From<As> + GraphQLType<S, TypeInfo = ()>,
        S: ScalarValue,
    {
        let name = T::name(&()).unwrap_or("scalar");
        let raw = input.as_string_value().ok_or_else(|| {
            format!("`{name}` must be a string, found: {input}")
        })?;

        raw.trim()
            .parse::<As>()
            .map(T::from)
            .map_err(|e| format!("Invalid `{name}` \"{raw}\": {e}"))
    }

    /// Parses the provided [`ScalarToken`] as a string.
    ///
    /// # Errors
    ///
    /// If the token is not a string.
    pub fn parse_token<S: ScalarValue>(
        value: ScalarToken<'_>,
    ) -> ParseScalarResult<S> {
        <String as ParseScalarValue<S>>::from_str(value)
    }
}
