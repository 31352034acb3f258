//! [`Room`]-related definitions.

use common::Money;
use derive_more::{AsRef, Display, From, Into};
use juniper::{graphql_object, GraphQLScalar};
use service::domain;

use crate::{api, api::scalar, Context};

/// A bookable room.
#[derive(Clone, Debug, From, Into)]
pub struct Room(domain::Room);

/// A bookable room (or room category) of the hotel.
#[graphql_object(context = Context)]
impl Room {
    /// Unique key of this `Room`.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Room.key",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub fn key(&self) -> Key {
        self.0.key.clone().into()
    }

    /// Human-readable name of this `Room`.
    pub fn name(&self) -> String {
        self.0.name.to_string()
    }

    /// Price of a single night in this `Room`.
    pub fn nightly_rate(&self) -> Money {
        self.0.nightly_rate
    }

    /// Maximum number of guests this `Room` accommodates.
    pub fn capacity(&self) -> i32 {
        self.0.capacity.into()
    }
}

/// Key of a `Room`: its number or category slug.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "RoomKey", with = scalar::Parsed::<domain::room::Key>)]
pub struct Key(domain::room::Key);
