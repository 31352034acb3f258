//! [`Config`]-related definitions.

use std::time;

use common::money::Currency;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use derive_more::{Display, Error};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use service::domain::reservation;
use smart_default::SmartDefault;

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: Server,

    /// Service configuration.
    pub service: Service,

    /// Paystack configuration.
    pub paystack: Paystack,

    /// Postgres configuration.
    pub postgres: Postgres,

    /// Log configuration.
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("0.0.0.0".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Service configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Service {
    /// Secret of the [JWT]s issued by the auth service.
    ///
    /// [JWT]: https://wikipedia.org/wiki/JSON_Web_Token
    #[default(SecretString::from("secret".to_owned()))]
    pub jwt_secret: SecretString,

    /// Prefix of the generated booking references.
    #[default("RM".to_owned())]
    pub booking_reference_prefix: String,

    /// Payment configuration.
    pub payment: Payment,

    /// Service tasks configuration.
    pub tasks: Tasks,
}

impl Service {
    /// Converts this [`Service`] configuration into a [`service::Config`],
    /// redirecting payers to the provided `callback_url`.
    ///
    /// # Errors
    ///
    /// If any of the values is invalid.
    pub fn into_service_config(
        self,
        callback_url: Option<String>,
    ) -> Result<service::Config, InvalidError> {
        let Service {
            jwt_secret,
            booking_reference_prefix,
            payment,
            tasks:
                Tasks {
                    expire_pending_reservations,
                },
        } = self;

        let prefix = reservation::Prefix::new(booking_reference_prefix.clone())
            .ok_or(InvalidError::BookingReferencePrefix(
                booking_reference_prefix,
            ))?;
        let currency = payment
            .currency
            .parse::<Currency>()
            .map_err(|_| InvalidError::Currency(payment.currency.clone()))?;

        Ok(service::Config {
            jwt_decoding_key: jsonwebtoken::DecodingKey::from_secret(
                jwt_secret.expose_secret().as_bytes(),
            ),
            booking_reference_prefix: prefix,
            payment: service::PaymentConfig {
                currency,
                verification_attempts: payment.verification_attempts,
                verification_backoff: payment.verification_backoff,
                callback_url,
            },
            expire_pending_reservations:
                service::task::expire_pending_reservations::Config {
                    interval: expire_pending_reservations.interval,
                    timeout: expire_pending_reservations.timeout,
                },
        })
    }
}

/// Error of an invalid [`Service`] configuration value.
#[derive(Clone, Debug, Display, Error)]
pub enum InvalidError {
    /// Booking reference prefix is not 1 to 8 uppercase letters or digits.
    #[display("invalid `service.booking_reference_prefix`: `{_0}`")]
    BookingReferencePrefix(#[error(not(source))] String),

    /// Currency is not supported.
    #[display("unsupported `service.payment.currency`: `{_0}`")]
    Currency(#[error(not(source))] String),
}

/// Payment configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Payment {
    /// Currency the payments are charged in.
    #[default("NGN".to_owned())]
    pub currency: String,

    /// Maximum number of attempts to verify a payment, while the gateway is
    /// unavailable.
    #[default(3)]
    pub verification_attempts: u8,

    /// Delay before the second verification attempt.
    #[default(time::Duration::from_millis(500))]
    #[serde(with = "humantime_serde")]
    pub verification_backoff: time::Duration,
}

/// Service tasks configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Tasks {
    /// `ExpirePendingReservations` task configuration.
    pub expire_pending_reservations: Task,
}

/// Service task configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Task {
    /// Task execution interval.
    #[default(time::Duration::from_secs(60))]
    #[serde(with = "humantime_serde")]
    pub interval: time::Duration,

    /// Timeout after which the entities will be considered stale.
    #[default(time::Duration::from_secs(30 * 60))]
    #[serde(with = "humantime_serde")]
    pub timeout: time::Duration,
}

/// [Paystack] configuration.
///
/// [Paystack]: https://paystack.com
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Paystack {
    /// Base URL of the Paystack API.
    #[default("https://api.paystack.co".to_owned())]
    pub base_url: String,

    /// Secret key authorizing the server-side requests.
    #[default(SecretString::from(String::new()))]
    pub secret_key: SecretString,

    /// Public key used by clients for inline payments.
    pub public_key: String,

    /// URL the payer is redirected to after completing a payment.
    pub callback_url: Option<String>,

    /// Timeout of a single request.
    #[default(time::Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub timeout: time::Duration,
}

impl From<Paystack> for service::infra::paystack::Config {
    fn from(value: Paystack) -> Self {
        let Paystack {
            base_url,
            secret_key,
            public_key: _,
            callback_url: _,
            timeout,
        } = value;

        Self {
            base_url,
            secret_key,
            timeout,
        }
    }
}

/// Postgres configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Postgres {
    /// Host to connect to.
    #[default("127.0.0.1".to_owned())]
    pub host: String,

    /// Port to connect to.
    #[default(5432)]
    pub port: u16,

    /// User to connect as.
    #[default("postgres".to_owned())]
    pub user: String,

    /// Password to connect with.
    #[default("postgres".to_owned())]
    pub password: String,

    /// Database name to connect to.
    #[default("postgres".to_owned())]
    pub dbname: String,
}

impl From<Postgres> for service::infra::postgres::Config {
    fn from(value: Postgres) -> Self {
        let Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = value;

        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            dbname: Some(dbname),
            ..Self::default()
        }
    }
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}
