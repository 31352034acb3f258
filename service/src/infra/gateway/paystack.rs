//! [Paystack] [`Gateway`] implementation.
//!
//! [Paystack]: https://paystack.com/docs/api

use std::{str::FromStr as _, time::Duration};

use common::{
    money::Currency,
    operations::{By, Initiate, Verify},
    DateTime, Money,
};
use reqwest::StatusCode;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::payment,
    infra::{gateway, Gateway},
};

/// [`Paystack`] configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the Paystack API.
    pub base_url: String,

    /// Secret key authorizing the requests.
    pub secret_key: SecretString,

    /// Timeout of a single request.
    pub timeout: Duration,
}

/// [Paystack] payment [`Gateway`] client.
///
/// [Paystack]: https://paystack.com
#[derive(Clone, Debug)]
pub struct Paystack {
    /// HTTP client performing the requests.
    client: reqwest::Client,

    /// Base URL of the Paystack API, without a trailing slash.
    base_url: String,

    /// Secret key authorizing the requests.
    secret_key: SecretString,
}

impl Paystack {
    /// Creates a new [`Paystack`] client with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If failed to initialize the HTTP client.
    pub fn new(conf: Config) -> Result<Self, Traced<gateway::Error>> {
        let Config {
            base_url,
            secret_key,
            timeout,
        } = conf;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracerr::new!(gateway::Error::Unavailable(e.to_string()))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            secret_key,
        })
    }
}

impl Gateway<Initiate<payment::Initiation>> for Paystack {
    type Ok = payment::Authorization;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Initiate(initiation): Initiate<payment::Initiation>,
    ) -> Result<Self::Ok, Self::Err> {
        let payment::Initiation {
            reference,
            email,
            amount,
            callback_url,
        } = initiation;

        let body = InitializeRequest {
            email: email.as_ref(),
            amount: amount.to_minor_units().ok_or_else(|| {
                tracerr::new!(gateway::Error::Rejected(format!(
                    "`{amount}` is not representable in minor units",
                )))
            })?,
            currency: amount.currency.to_string(),
            reference: reference.as_ref(),
            callback_url: callback_url.as_deref(),
        };

        let resp = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| tracerr::new!(from_reqwest(&e)))?;
        let status = resp.status();
        if let Some(e) = unavailability(status) {
            return Err(tracerr::new!(e));
        }
        let envelope = resp
            .json::<Envelope<Authorization>>()
            .await
            .map_err(|e| tracerr::new!(from_reqwest(&e)))?;

        authorization(status, envelope).map_err(tracerr::wrap!())
    }
}

impl Gateway<Verify<By<payment::Verification, payment::Reference>>>
    for Paystack
{
    type Ok = payment::Verification;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Verify(by): Verify<By<payment::Verification, payment::Reference>>,
    ) -> Result<Self::Ok, Self::Err> {
        let reference = by.into_inner();

        let resp = self
            .client
            .get(format!(
                "{}/transaction/verify/{reference}",
                self.base_url,
            ))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| tracerr::new!(from_reqwest(&e)))?;
        let status = resp.status();
        if let Some(e) = unavailability(status) {
            return Err(tracerr::new!(e));
        }
        let envelope = resp
            .json::<Envelope<Transaction>>()
            .await
            .map_err(|e| tracerr::new!(from_reqwest(&e)))?;

        verification(status, envelope).map_err(tracerr::wrap!())
    }
}

/// Body of a `POST /transaction/initialize` request.
#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    /// Email of the payer.
    email: &'a str,

    /// Amount in minor units.
    amount: i64,

    /// ISO 4217 code of the currency.
    currency: String,

    /// Transaction reference.
    reference: &'a str,

    /// URL to redirect the payer to.
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

/// Common envelope of Paystack API responses.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// Indicator whether the request succeeded.
    status: bool,

    /// Human-readable description of the result.
    #[serde(default)]
    message: String,

    /// Payload of the response.
    data: Option<T>,
}

/// Payload of a `POST /transaction/initialize` response.
#[derive(Debug, Deserialize)]
struct Authorization {
    /// URL of the checkout page.
    authorization_url: String,

    /// Code of the checkout for inline payments.
    access_code: String,

    /// Transaction reference.
    reference: String,
}

/// Payload of a `GET /transaction/verify/{reference}` response.
#[derive(Debug, Deserialize)]
struct Transaction {
    /// Status of the transaction (`success`, `failed`, `abandoned`, etc).
    status: String,

    /// Transaction reference.
    reference: String,

    /// Captured amount in minor units.
    amount: i64,

    /// ISO 4217 code of the currency.
    currency: String,

    /// Payment channel (`card`, `bank`, `ussd`, etc).
    #[serde(default)]
    channel: Option<String>,

    /// RFC 3339 date and time of the payment.
    #[serde(default)]
    paid_at: Option<String>,
}

/// Returns a transient [`gateway::Error`] if the provided [`StatusCode`]
/// signals that Paystack is unavailable at the moment.
fn unavailability(status: StatusCode) -> Option<gateway::Error> {
    (status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
        .then(|| gateway::Error::Unavailable(format!("HTTP {status}")))
}

/// Converts a [`reqwest::Error`] into a [`gateway::Error`].
fn from_reqwest(e: &reqwest::Error) -> gateway::Error {
    if e.is_decode() {
        gateway::Error::Malformed(e.to_string())
    } else {
        gateway::Error::Unavailable(e.to_string())
    }
}

/// Interprets a `POST /transaction/initialize` response.
fn authorization(
    status: StatusCode,
    envelope: Envelope<Authorization>,
) -> Result<payment::Authorization, gateway::Error> {
    let Envelope {
        status: succeeded,
        message,
        data,
    } = envelope;

    let Some(data) = data.filter(|_| succeeded && status.is_success()) else {
        return Err(gateway::Error::Rejected(message));
    };

    Ok(payment::Authorization {
        authorization_url: data.authorization_url,
        access_code: data.access_code,
        reference: payment::Reference::new(&data.reference).ok_or_else(
            || {
                gateway::Error::Malformed(format!(
                    "invalid reference `{}`",
                    data.reference,
                ))
            },
        )?,
    })
}

/// Interprets a `GET /transaction/verify/{reference}` response.
///
/// A success is trusted only when both the envelope and the transaction
/// report it.
fn verification(
    status: StatusCode,
    envelope: Envelope<Transaction>,
) -> Result<payment::Verification, gateway::Error> {
    let Envelope {
        status: succeeded,
        message,
        data,
    } = envelope;

    if !succeeded {
        return if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND
        ) {
            log::debug!("Paystack doesn't know the transaction: {message}");
            Ok(payment::Verification::Unknown)
        } else {
            Err(gateway::Error::Rejected(message))
        };
    }

    let tx = data.ok_or_else(|| {
        gateway::Error::Malformed("no transaction in response".into())
    })?;
    if tx.status != "success" {
        return Ok(payment::Verification::Failure { status: tx.status });
    }

    let currency = Currency::from_str(&tx.currency).map_err(|_| {
        gateway::Error::Malformed(format!(
            "unsupported currency `{}`",
            tx.currency,
        ))
    })?;
    let reference =
        payment::Reference::new(&tx.reference).ok_or_else(|| {
            gateway::Error::Malformed(format!(
                "invalid reference `{}`",
                tx.reference,
            ))
        })?;

    Ok(payment::Verification::Success(payment::Receipt {
        reference,
        amount: Money::from_minor_units(tx.amount, currency),
        method: tx
            .channel
            .as_deref()
            .and_then(|c| payment::Method::from_str(c).ok()),
        paid_at: tx
            .paid_at
            .as_deref()
            .and_then(|at| DateTime::from_rfc3339(at).ok()),
    }))
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::Money;
    use reqwest::StatusCode;

    use crate::{domain::payment, infra::gateway};

    use super::{authorization, verification, Envelope};

    fn envelope<T: serde::de::DeserializeOwned>(json: &str) -> Envelope<T> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn trusts_only_successful_transaction() {
        let verified = verification(
            StatusCode::OK,
            envelope(
                r#"{
                    "status": true,
                    "message": "Verification successful",
                    "data": {
                        "id": 4099260516,
                        "status": "success",
                        "reference": "RM-1741000000000-123456",
                        "amount": 4500000,
                        "currency": "NGN",
                        "channel": "card",
                        "paid_at": "2025-03-03T10:15:30.000Z",
                        "metadata": ""
                    }
                }"#,
            ),
        )
        .unwrap();

        let payment::Verification::Success(receipt) = verified else {
            panic!("expected success, got: {verified:?}");
        };
        assert_eq!(receipt.reference.as_ref(), "RM-1741000000000-123456");
        assert_eq!(receipt.amount, Money::from_str("45000NGN").unwrap());
        assert_eq!(receipt.method, Some(payment::Method::Card));
        assert!(receipt.paid_at.is_some());
    }

    #[test]
    fn reports_non_successful_transaction_as_failure() {
        for status in ["failed", "abandoned", "ongoing", "reversed"] {
            let verified = verification(
                StatusCode::OK,
                envelope(&format!(
                    r#"{{
                        "status": true,
                        "message": "Verification successful",
                        "data": {{
                            "status": "{status}",
                            "reference": "RM-1-000001",
                            "amount": 4500000,
                            "currency": "NGN"
                        }}
                    }}"#,
                )),
            )
            .unwrap();

            assert_eq!(
                verified,
                payment::Verification::Failure {
                    status: status.into(),
                },
            );
        }
    }

    #[test]
    fn reports_unknown_reference() {
        let verified = verification(
            StatusCode::BAD_REQUEST,
            envelope(
                r#"{"status":false,"message":"Transaction reference not found"}"#,
            ),
        )
        .unwrap();

        assert_eq!(verified, payment::Verification::Unknown);
    }

    #[test]
    fn rejects_unsuccessful_envelope() {
        let err = verification(
            StatusCode::UNAUTHORIZED,
            envelope(r#"{"status":false,"message":"Invalid key"}"#),
        )
        .unwrap_err();

        assert!(matches!(err, gateway::Error::Rejected(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn treats_overload_as_transient() {
        for code in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(super::unavailability(code)
                .is_some_and(|e| e.is_transient()));
        }
        assert!(super::unavailability(StatusCode::OK).is_none());
        assert!(super::unavailability(StatusCode::NOT_FOUND).is_none());
    }

    #[test]
    fn parses_authorization() {
        let auth = authorization(
            StatusCode::OK,
            envelope(
                r#"{
                    "status": true,
                    "message": "Authorization URL created",
                    "data": {
                        "authorization_url": "https://checkout.paystack.com/0peioxfhpn",
                        "access_code": "0peioxfhpn",
                        "reference": "RM-1741000000000-123456"
                    }
                }"#,
            ),
        )
        .unwrap();

        assert_eq!(auth.access_code, "0peioxfhpn");
        assert_eq!(auth.reference.as_ref(), "RM-1741000000000-123456");
    }

    #[test]
    fn rejects_failed_authorization() {
        let err = authorization(
            StatusCode::BAD_REQUEST,
            envelope(
                r#"{"status":false,"message":"Duplicate Transaction Reference"}"#,
            ),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            gateway::Error::Rejected(m) if m.contains("Duplicate"),
        ));
    }
}
