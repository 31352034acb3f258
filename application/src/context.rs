//! [`Context`] of GraphQL requests.

use std::sync::atomic::{AtomicU16, Ordering};

use axum::{async_trait, extract::FromRequestParts, RequestPartsExt as _};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use juniper::{
    http::{GraphQLBatchResponse, GraphQLResponse},
    IntoFieldError as _,
};
use service::{
    command::{self, Command as _},
    domain::{session, Session},
};
use tokio::sync::OnceCell;

use crate::{
    define_error, AsError, Error, JuniperResponse, PaymentPublicKey, Service,
};

/// Per-request GraphQL context.
#[derive(Debug)]
pub struct Context {
    /// [`Service`] executing the request.
    service: Service,

    /// [`PaymentPublicKey`] handed to clients, if configured.
    payment_public_key: Option<PaymentPublicKey>,

    /// HTTP status code of the response, if it fails.
    error_status_code: AtomicU16,

    /// `Authorization` header of the request, if any.
    authorization: Option<Result<session::Token, Error>>,

    /// Result of authenticating the request, once done.
    ///
    /// [`None`] stands for an anonymous guest.
    session: OnceCell<Result<Option<Session>, Error>>,
}

impl Context {
    /// Returns the [`Service`] executing the request.
    #[must_use]
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Returns the [`PaymentPublicKey`], if configured.
    #[must_use]
    pub fn payment_public_key(&self) -> Option<&PaymentPublicKey> {
        self.payment_public_key.as_ref()
    }

    /// Returns the HTTP status code of the response, if it fails.
    #[must_use]
    pub fn error_status_code(&self) -> http::StatusCode {
        http::StatusCode::from_u16(
            self.error_status_code.load(Ordering::Relaxed),
        )
        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Sets the HTTP status code of the response, if it fails.
    pub fn set_error_status_code(&self, status_code: http::StatusCode) {
        self.error_status_code
            .store(status_code.as_u16(), Ordering::Relaxed);
    }

    /// Returns a closure recording the status code of the passed [`Error`],
    /// to be used in [`Result::map_err()`].
    pub fn error(&self) -> impl FnOnce(Error) -> Error + '_ {
        move |err| {
            self.set_error_status_code(err.status_code);
            err
        }
    }

    /// Returns the [`Session`] of the request, or [`None`] for an anonymous
    /// guest.
    ///
    /// # Errors
    ///
    /// If the provided access token is invalid or expired.
    pub async fn try_current_session(&self) -> Result<Option<Session>, Error> {
        self.session
            .get_or_init(|| self.authenticate())
            .await
            .clone()
            .map_err(self.error())
    }

    /// Returns the [`Session`] of the request.
    ///
    /// # Errors
    ///
    /// If the request is anonymous, or its access token is invalid or
    /// expired.
    pub async fn current_session(&self) -> Result<Session, Error> {
        self.try_current_session().await?.ok_or_else(|| {
            self.error()(AuthError::AuthorizationRequired.into())
        })
    }

    /// Authenticates the request by its `Authorization` header.
    async fn authenticate(&self) -> Result<Option<Session>, Error> {
        let token = match &self.authorization {
            None => return Ok(None),
            Some(Err(e)) => return Err(e.clone()),
            Some(Ok(token)) => token.clone(),
        };

        self.service
            .execute(command::AuthorizeSession { token })
            .await
            .map(Some)
            .map_err(AsError::into_error)
    }
}

impl juniper::Context for Context {}

#[async_trait]
impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = JuniperResponse;

    async fn from_request_parts(
        parts: &mut http::request::Parts,
        _: &S,
    ) -> Result<Self, Self::Rejection> {
        let service =
            parts.extensions.get::<Service>().cloned().ok_or_else(|| {
                JuniperResponse {
                    status_code: http::StatusCode::INTERNAL_SERVER_ERROR,
                    response: GraphQLBatchResponse::Single(
                        GraphQLResponse::error(
                            Error::internal(&"missing `Service` extension")
                                .into_field_error(),
                        ),
                    ),
                }
            })?;
        let payment_public_key =
            parts.extensions.get::<PaymentPublicKey>().cloned();

        let authorization = match parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
        {
            Ok(TypedHeader(Authorization(bearer))) => {
                Some(Ok(session::Token::from(bearer.token().to_owned())))
            }
            Err(e) if e.is_missing() => None,
            Err(e) => Some(Err(e.into_error())),
        };

        Ok(Self {
            service,
            payment_public_key,
            error_status_code: AtomicU16::new(
                http::StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            ),
            authorization,
            session: OnceCell::new(),
        })
    }
}

impl AsError for command::authorize_session::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::JsonWebTokenDecodeError(_) => {
                Some(AuthError::InvalidToken.into())
            }
        }
    }
}

define_error! {
    enum AuthError {
        #[code = "AUTHORIZATION_REQUIRED"]
        #[status = UNAUTHORIZED]
        #[message = "Authorization required"]
        AuthorizationRequired,

        #[code = "INVALID_TOKEN"]
        #[status = UNAUTHORIZED]
        #[message = "Access token is invalid or expired"]
        InvalidToken,
    }
}
