//! [`Error`]-related definitions.

use std::fmt;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::typed_header::TypedHeaderRejection;
use derive_more::Error as StdError;
use itertools::Itertools as _;
use juniper::IntoFieldError;
use serde::Serialize;
use service::infra::{database, gateway};
use tracerr::{Trace, Traced};
use tracing as log;

/// Defines an enum of API errors, each having a stable `code`, an HTTP
/// `status` and a human-readable `message`.
#[expect(clippy::module_name_repetitions, reason = "more readable")]
#[macro_export]
macro_rules! define_error {
    (
        enum $name:ident {
            $(
                #[code = $code:literal]
                #[status = $status_code:ident]
                #[message = $message:literal]
                $variant:ident
            ),* $(,)?
        }
    ) => {
        /// Error type.
        #[derive(
            Clone,
            Copy,
            Debug,
            ::derive_more::Display,
            ::derive_more::Error
        )]
        pub enum $name {
            $(
                #[display($message)]
                #[doc = $message]
                $variant,
            )*
        }

        impl $name {
            /// Returns the stable code of this error.
            pub const fn code(self) -> $crate::error::Code {
                match self {
                    $( Self::$variant => $code, )*
                }
            }

            /// Returns the HTTP status of this error.
            pub const fn status_code(self) -> ::http::StatusCode {
                match self {
                    $( Self::$variant => ::http::StatusCode::$status_code, )*
                }
            }
        }

        impl From<$name> for $crate::Error {
            fn from(err: $name) -> Self {
                Self {
                    code: err.code(),
                    status_code: err.status_code(),
                    message: err.to_string(),
                    backtrace: None,
                }
            }
        }
    };
}

/// API [`Error`], rendered either as a GraphQL field error or as a JSON
/// response body.
#[derive(Clone, Debug, StdError)]
pub struct Error {
    /// Stable [`Code`] of this [`Error`], for clients to match on.
    pub code: Code,

    /// HTTP status of the response failed with this [`Error`].
    pub status_code: http::StatusCode,

    /// [`Trace`] of where this [`Error`] happened, if known.
    #[error(not(backtrace))]
    pub backtrace: Option<Trace>,

    /// Human-readable message.
    pub message: String,
}

impl Error {
    /// Creates a new [`Error`] not meant to be handled by clients.
    ///
    /// The provided `cause` is logged, but never exposed.
    #[must_use]
    pub fn internal(cause: &impl fmt::Display) -> Self {
        log::error!("internal error: {cause}");
        Self {
            code: "INTERNAL_SERVER_ERROR",
            status_code: http::StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_owned(),
            backtrace: None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.code, self.message)?;
        if let Some(trace) = &self.backtrace {
            write!(f, "\n{}", trace.iter().format("\n"))?;
        }
        Ok(())
    }
}

impl<S> IntoFieldError<S> for Error
where
    S: From<String>,
{
    fn into_field_error(self) -> juniper::FieldError<S> {
        let Self {
            code,
            status_code: _,
            backtrace,
            message,
        } = self;

        let mut extensions = juniper::Object::with_capacity(2);
        _ = extensions
            .add_field("code", juniper::Value::scalar(code.to_owned()));
        if let Some(trace) = backtrace {
            _ = extensions.add_field(
                "backtrace",
                juniper::Value::list(
                    trace
                        .iter()
                        .map(|frame| juniper::Value::scalar(frame.to_string()))
                        .collect(),
                ),
            );
        }
        juniper::FieldError::new(message, juniper::Value::object(extensions))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        /// JSON body of an [`Error`] response.
        #[derive(Serialize)]
        struct Body {
            code: Code,
            message: String,
        }

        let Self {
            code,
            status_code,
            backtrace: _,
            message,
        } = self;
        (status_code, Json(Body { code, message })).into_response()
    }
}

/// Stable code of an [`Error`], like `ROOM_UNAVAILABLE`.
pub type Code = &'static str;

/// Conversion of failures into API [`Error`]s.
pub trait AsError {
    /// Returns the [`Error`] clients are expected to handle, if any.
    ///
    /// [`None`] means an internal failure.
    fn try_as_error(&self) -> Option<Error>;

    /// Returns the [`Error`] to respond with, falling back to an internal
    /// one.
    fn as_error(&self) -> Error
    where
        Self: fmt::Display,
    {
        self.try_as_error()
            .unwrap_or_else(|| Error::internal(&self))
    }

    /// Same as [`AsError::as_error()`], but consumes the value.
    fn into_error(self) -> Error
    where
        Self: fmt::Display + Sized,
    {
        self.as_error()
    }
}

impl<E: AsError> AsError for Traced<E> {
    fn try_as_error(&self) -> Option<Error> {
        self.as_ref().try_as_error().map(|mut error| {
            error.backtrace = Some(self.trace().clone());
            error
        })
    }
}

impl AsError for TypedHeaderRejection {
    fn try_as_error(&self) -> Option<Error> {
        Some(Error {
            code: "BAD_REQUEST",
            status_code: http::StatusCode::BAD_REQUEST,
            message: self.to_string(),
            backtrace: None,
        })
    }
}

impl AsError for database::Error {
    fn try_as_error(&self) -> Option<Error> {
        None
    }
}

impl AsError for gateway::Error {
    fn try_as_error(&self) -> Option<Error> {
        crate::define_error! {
            enum GatewayError {
                #[code = "GATEWAY_UNAVAILABLE"]
                #[status = SERVICE_UNAVAILABLE]
                #[message = "Payment gateway is unavailable, try again later"]
                Unavailable,
            }
        }

        match self {
            Self::Unavailable(_) | Self::Rejected(_) => {
                Some(GatewayError::Unavailable.into())
            }
            Self::Malformed(_) => None,
        }
    }
}
