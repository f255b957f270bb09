use chrono::{DateTime, Utc};
use diesel::{
    deserialize::{FromSql, FromSqlRow},
    expression::AsExpression,
    pg::Pg,
    prelude::*,
    serialize::ToSql,
    sql_types,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{self, Write, util::DbEnum},
    schema,
    server::auth::ApiKey,
};

#[derive(
    Deserialize,
    Serialize,
    Default,
    FromSqlRow,
    AsExpression,
    Debug,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::VariantArray,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Valuable,
)]
#[diesel(sql_type = sql_types::Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    AppAdmin,
    #[default]
    LabStaff,
}
impl DbEnum for UserRole {}

impl FromSql<sql_types::Text, Pg> for UserRole {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> diesel::deserialize::Result<Self> {
        Self::from_sql_inner(bytes)
    }
}
impl ToSql<sql_types::Text, Pg> for UserRole {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, Pg>,
    ) -> diesel::serialize::Result {
        self.to_sql_inner(out)
    }
}

/// The minimal projection of a user embedded into other responses.
#[derive(Serialize, Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = schema::person, check_for_backend(Pg))]
pub struct PersonHandle {
    pub id: Uuid,
    pub name: String,
}

#[derive(Serialize, Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = schema::person, check_for_backend(Pg))]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<UserRole>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Validate, Valuable, Clone)]
#[garde(allow_unvalidated)]
pub struct NewPerson {
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(length(min = 3))]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<UserRole>,
}

#[derive(Insertable)]
#[diesel(table_name = schema::person, check_for_backend(Pg))]
struct PersonRow<'a> {
    id: Uuid,
    name: &'a str,
    email: &'a str,
    roles: Vec<UserRole>,
    api_key_prefix: String,
    api_key_hash: String,
}

/// Returned exactly once at creation time; the plaintext key is never
/// recoverable afterwards.
#[derive(Serialize)]
pub struct CreatedUser {
    pub person: Person,
    pub api_key: String,
}

impl Write for NewPerson {
    type Returns = CreatedUser;

    async fn write(
        self,
        _actor: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> db::error::Result<Self::Returns> {
        let api_key = ApiKey::new();
        let hashed = api_key.hash();

        let row = PersonRow {
            id: Uuid::now_v7(),
            name: &self.name,
            email: &self.email,
            roles: self.roles.clone(),
            api_key_prefix: hashed.prefix,
            api_key_hash: hashed.hash,
        };

        let person = diesel::insert_into(schema::person::table)
            .values(row)
            .returning(Person::as_returning())
            .get_result(db_conn)
            .await?;

        Ok(CreatedUser {
            person,
            api_key: api_key.to_string(),
        })
    }
}
