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
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{error, model::sample::Sample, util::DbEnum},
    schema::sample_history,
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
    Clone,
    Copy,
    PartialEq,
    Eq,
    Valuable,
)]
#[diesel(sql_type = sql_types::Text)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    #[default]
    Created,
    Updated,
    Deleted,
}
impl DbEnum for ChangeKind {}

impl FromSql<sql_types::Text, Pg> for ChangeKind {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> diesel::deserialize::Result<Self> {
        Self::from_sql_inner(bytes)
    }
}
impl ToSql<sql_types::Text, Pg> for ChangeKind {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, Pg>,
    ) -> diesel::serialize::Result {
        self.to_sql_inner(out)
    }
}

#[derive(Insertable)]
#[diesel(table_name = sample_history, check_for_backend(Pg))]
struct NewHistoryEntry {
    id: Uuid,
    sample_id: Uuid,
    revision: i32,
    change_kind: ChangeKind,
    actor_id: Option<Uuid>,
    snapshot: serde_json::Value,
}

#[derive(Serialize, Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = sample_history, check_for_backend(Pg))]
pub struct HistoryEntry {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub revision: i32,
    pub change_kind: ChangeKind,
    pub actor_id: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
    pub snapshot: serde_json::Value,
}

/// Records the state of a sample after a change. Revisions are numbered from 1
/// per sample and only ever appended, so the trail survives deletion of the
/// sample row itself. Callers append in the same transaction as a statement
/// that writes the sample row; that row lock serializes revision assignment.
pub(crate) async fn append(
    sample: &Sample,
    change_kind: ChangeKind,
    actor_id: Option<Uuid>,
    db_conn: &mut AsyncPgConnection,
) -> error::Result<()> {
    let latest: Option<i32> = sample_history::table
        .filter(sample_history::sample_id.eq(sample.id))
        .select(diesel::dsl::max(sample_history::revision))
        .first(db_conn)
        .await?;

    let entry = NewHistoryEntry {
        id: Uuid::now_v7(),
        sample_id: sample.id,
        revision: latest.unwrap_or_default() + 1,
        change_kind,
        actor_id,
        snapshot: serde_json::to_value(sample)?,
    };

    diesel::insert_into(sample_history::table)
        .values(entry)
        .execute(db_conn)
        .await?;

    Ok(())
}

/// Newest revision first.
pub async fn fetch_for_record(
    record_id: Uuid,
    db_conn: &mut AsyncPgConnection,
) -> error::Result<Vec<HistoryEntry>> {
    Ok(sample_history::table
        .filter(sample_history::sample_id.eq(record_id))
        .select(HistoryEntry::as_select())
        .order(sample_history::revision.desc())
        .load(db_conn)
        .await?)
}
