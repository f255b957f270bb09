use diesel_async::AsyncPgConnection;
use serde::Serialize;
use uuid::Uuid;
use valuable::Valuable;

pub mod error;
pub mod model;
pub mod seed_data;
mod util;

/// The tables a request can touch, used to attribute constraint violations to
/// something the caller recognizes.
#[derive(
    Debug,
    Serialize,
    strum::EnumString,
    Default,
    strum::Display,
    strum::VariantArray,
    Valuable,
    Clone,
    Copy,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
    Person,
    Sample,
    SampleHistory,
    SiteSettings,
    #[default]
    Other,
}

pub trait Write {
    type Returns;

    fn write(
        self,
        actor: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> impl Future<Output = error::Result<Self::Returns>> + Send;
}

pub trait FetchById: Sized {
    type Id;

    fn fetch_by_id(
        id: &Self::Id,
        db_conn: &mut AsyncPgConnection,
    ) -> impl Future<Output = error::Result<Self>> + Send;
}

pub trait FetchByQuery: Sized {
    type QueryParams;

    fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut AsyncPgConnection,
    ) -> impl Future<Output = error::Result<Vec<Self>>> + Send;
}
