//! Service contains the business logic of the application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
pub mod infra;
pub mod query;
pub mod read;
pub mod task;

use std::{error::Error, time::Duration};

use common::{
    money::Currency,
    operations::{By, Start},
};
use derive_more::Debug;

use crate::domain::reservation;
#[cfg(doc)]
use crate::infra::{Database, Gateway};

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// [JWT] decoding key of the sessions issued by the auth service.
    ///
    /// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
    #[debug(skip)]
    pub jwt_decoding_key: jsonwebtoken::DecodingKey,

    /// [`reservation::Prefix`] of the generated booking references.
    pub booking_reference_prefix: reservation::Prefix,

    /// [`PaymentConfig`] of the [`Service`].
    pub payment: PaymentConfig,

    /// [`task::ExpirePendingReservations`] configuration.
    pub expire_pending_reservations: task::expire_pending_reservations::Config,
}

/// Payment-related [`Config`] of a [`Service`].
#[derive(Clone, Debug)]
pub struct PaymentConfig {
    /// [`Currency`] the payment [`Gateway`] charges in.
    pub currency: Currency,

    /// Maximum number of attempts to verify a payment, while the [`Gateway`]
    /// is unavailable.
    pub verification_attempts: u8,

    /// Delay before the second verification attempt, growing linearly with
    /// each next one.
    pub verification_backoff: Duration,

    /// URL the payer is redirected to after completing a payment.
    pub callback_url: Option<String>,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db, Gw> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// Payment [`Gateway`] of this [`Service`].
    gateway: Gw,
}

impl<Db, Gw> Service<Db, Gw> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(
        config: Config,
        database: Db,
        gateway: Gw,
    ) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<
                        task::ExpirePendingReservations<Self>,
                        task::expire_pending_reservations::Config,
                    >,
                >,
                Ok = (),
                Err: Error,
            > + Clone
            + 'static,
    {
        let this = Service {
            config,
            database,
            gateway,
        };

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn("expire_pending_reservations", async move {
            svc.execute(Start(By::new(
                svc.config().expire_pending_reservations,
            )))
            .await
        });

        (this, bg)
    }

    /// Returns [`Config`] of this [`Service`].
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns payment [`Gateway`] of this [`Service`].
    #[must_use]
    pub fn gateway(&self) -> &Gw {
        &self.gateway
    }
}
