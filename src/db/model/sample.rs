use chrono::{DateTime, NaiveDate, Utc};
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
    db::{
        self, FetchById, FetchByQuery, Write, error,
        model::{
            history::{self, ChangeKind},
            person::PersonHandle,
        },
        util::{AsDieselExpression, AsIlike, BoxedDieselExpression, DbEnum},
    },
    schema::{
        person,
        sample::{
            self,
            dsl::{
                created_at as created_at_col, description as description_col, id as id_col,
                name as name_col, sample_id as sample_id_col, sample_type as sample_type_col,
                status as status_col, storage_location as storage_location_col,
            },
        },
    },
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleType {
    #[default]
    Ipsc,
    Esc,
    Msc,
    Hsc,
    Nsc,
    Other,
}
impl DbEnum for SampleType {}

impl SampleType {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ipsc => "Induced Pluripotent Stem Cell",
            Self::Esc => "Embryonic Stem Cell",
            Self::Msc => "Mesenchymal Stem Cell",
            Self::Hsc => "Hematopoietic Stem Cell",
            Self::Nsc => "Neural Stem Cell",
            Self::Other => "Other",
        }
    }
}

impl FromSql<sql_types::Text, Pg> for SampleType {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> diesel::deserialize::Result<Self> {
        Self::from_sql_inner(bytes)
    }
}
impl ToSql<sql_types::Text, Pg> for SampleType {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, Pg>,
    ) -> diesel::serialize::Result {
        self.to_sql_inner(out)
    }
}

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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SampleStatus {
    #[default]
    Available,
    InUse,
    Depleted,
    Reserved,
    Quarantine,
}
impl DbEnum for SampleStatus {}

impl SampleStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::InUse => "In Use",
            Self::Depleted => "Depleted",
            Self::Reserved => "Reserved",
            Self::Quarantine => "Quarantine",
        }
    }
}

impl FromSql<sql_types::Text, Pg> for SampleStatus {
    fn from_sql(
        bytes: <Pg as diesel::backend::Backend>::RawValue<'_>,
    ) -> diesel::deserialize::Result<Self> {
        Self::from_sql_inner(bytes)
    }
}
impl ToSql<sql_types::Text, Pg> for SampleStatus {
    fn to_sql<'b>(
        &'b self,
        out: &mut diesel::serialize::Output<'b, '_, Pg>,
    ) -> diesel::serialize::Result {
        self.to_sql_inner(out)
    }
}

fn default_true() -> bool {
    true
}

/// The full client-supplied state of a sample. Used both for inserts and for
/// whole-record updates: an update clears any optional field left out of the
/// payload, while the changeset skips the generated primary key and leaves
/// `created_by` and `storage_date` untouched when absent.
#[derive(Deserialize, Insertable, AsChangeset, Valuable, Clone)]
#[diesel(table_name = sample, check_for_backend(Pg))]
pub struct NewSample {
    #[serde(skip_deserializing, default = "Uuid::now_v7")]
    #[valuable(skip)]
    id: Uuid,
    pub sample_id: String,
    pub name: String,
    #[serde(default)]
    pub sample_type: SampleType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub donor_info: String,
    pub storage_location: String,
    #[serde(default)]
    pub status: SampleStatus,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    #[diesel(treat_none_as_null = true)]
    pub passage_number: Option<i32>,
    #[serde(default)]
    #[diesel(treat_none_as_null = true)]
    #[valuable(skip)]
    pub collection_date: Option<NaiveDate>,
    #[serde(default)]
    #[valuable(skip)]
    pub storage_date: Option<NaiveDate>,
    #[serde(default)]
    #[diesel(treat_none_as_null = true)]
    #[valuable(skip)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    #[diesel(treat_none_as_null = true)]
    pub viability: Option<f64>,
    #[serde(default)]
    pub quality_control_notes: String,
    #[serde(default = "default_true")]
    pub research_use_only: bool,
    #[serde(skip_deserializing)]
    #[valuable(skip)]
    created_by: Option<Uuid>,
}

// The cross-field date rules put this beyond what a derived validator can
// express, so the whole record is validated by hand.
impl garde::Validate for NewSample {
    type Context = ();

    fn validate_into(
        &self,
        _ctx: &Self::Context,
        parent: &mut dyn FnMut() -> garde::Path,
        report: &mut garde::Report,
    ) {
        let Self {
            sample_id,
            name,
            quantity,
            passage_number,
            viability,
            collection_date,
            storage_date,
            expiration_date,
            ..
        } = self;

        if sample_id.trim().is_empty() {
            report.append(
                parent().join("sample_id"),
                garde::Error::new("sample ID cannot be empty"),
            );
        }

        if name.trim().is_empty() {
            report.append(
                parent().join("name"),
                garde::Error::new("name cannot be empty"),
            );
        }

        if *quantity < 0.0 {
            report.append(
                parent().join("quantity"),
                garde::Error::new("quantity cannot be negative"),
            );
        }

        if let Some(passage_number) = passage_number {
            if *passage_number < 0 {
                report.append(
                    parent().join("passage_number"),
                    garde::Error::new("passage number cannot be negative"),
                );
            }
        }

        if let Some(viability) = viability {
            if !(0.0..=100.0).contains(viability) {
                report.append(
                    parent().join("viability"),
                    garde::Error::new("viability must be between 0 and 100"),
                );
            }
        }

        if let (Some(collection_date), Some(expiration_date)) = (collection_date, expiration_date) {
            if expiration_date < collection_date {
                report.append(
                    parent(),
                    garde::Error::new("expiration date cannot be before collection date"),
                );
            }
        }

        if let (Some(collection_date), Some(storage_date)) = (collection_date, storage_date) {
            if storage_date < collection_date {
                report.append(
                    parent(),
                    garde::Error::new("storage date cannot be before collection date"),
                );
            }
        }
    }
}

#[derive(Serialize, Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = sample, check_for_backend(Pg))]
pub struct Sample {
    pub id: Uuid,
    pub sample_id: String,
    pub name: String,
    pub sample_type: SampleType,
    pub description: String,
    pub source: String,
    pub donor_info: String,
    pub storage_location: String,
    pub status: SampleStatus,
    pub quantity: f64,
    pub passage_number: Option<i32>,
    pub collection_date: Option<NaiveDate>,
    pub storage_date: NaiveDate,
    pub expiration_date: Option<NaiveDate>,
    pub viability: Option<f64>,
    pub quality_control_notes: String,
    pub research_use_only: bool,
    pub image_path: Option<String>,
    #[diesel(embed)]
    pub created_by: Option<PersonHandle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sample {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == SampleStatus::Available && self.quantity > 0.0
    }
}

fn default_limit() -> i64 {
    500
}

#[derive(Deserialize, Valuable, Clone)]
pub struct SampleQuery {
    #[serde(default)]
    #[valuable(skip)]
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sample_type: Option<SampleType>,
    #[serde(default)]
    pub status: Option<SampleStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for SampleQuery {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            search: None,
            sample_type: None,
            status: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl<QuerySource> AsDieselExpression<QuerySource> for SampleQuery
where
    id_col: SelectableExpression<QuerySource>,
    sample_id_col: SelectableExpression<QuerySource>,
    name_col: SelectableExpression<QuerySource>,
    description_col: SelectableExpression<QuerySource>,
    storage_location_col: SelectableExpression<QuerySource>,
    sample_type_col: SelectableExpression<QuerySource>,
    status_col: SelectableExpression<QuerySource>,
{
    fn as_diesel_expression<'a>(&'a self) -> Option<BoxedDieselExpression<'a, QuerySource>>
    where
        QuerySource: 'a,
    {
        let Self {
            ids,
            search,
            sample_type,
            status,
            ..
        } = self;

        if matches!(
            (ids.is_empty(), search, sample_type, status),
            (true, None, None, None)
        ) {
            return None;
        }

        let mut query: BoxedDieselExpression<QuerySource> = if ids.is_empty() {
            Box::new(id_col.is_not_null())
        } else {
            Box::new(id_col.eq_any(ids))
        };

        if let Some(search) = search {
            let pattern = search.as_ilike();
            query = Box::new(
                query.and(
                    sample_id_col
                        .ilike(pattern.clone())
                        .or(name_col.ilike(pattern.clone()))
                        .or(description_col.ilike(pattern.clone()))
                        .or(storage_location_col.ilike(pattern.clone()))
                        .or(sample_type_col.ilike(pattern)),
                ),
            );
        }

        if let Some(sample_type) = sample_type {
            query = Box::new(query.and(sample_type_col.eq(sample_type)));
        }

        if let Some(status) = status {
            query = Box::new(query.and(status_col.eq(status)));
        }

        Some(query)
    }
}

impl Write for NewSample {
    type Returns = Sample;

    async fn write(
        mut self,
        actor: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> error::Result<Self::Returns> {
        if self.created_by.is_none() {
            self.created_by = actor;
        }

        let id = diesel::insert_into(sample::table)
            .values(&self)
            .returning(id_col)
            .get_result(db_conn)
            .await?;

        let sample = Sample::fetch_by_id(&id, db_conn).await?;
        history::append(&sample, ChangeKind::Created, actor, db_conn).await?;

        Ok(sample)
    }
}

impl NewSample {
    /// Replaces the whole record, then appends a revision carrying the new
    /// state.
    pub async fn update(
        self,
        id: Uuid,
        actor: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> error::Result<Sample> {
        let n_updated = diesel::update(sample::table.find(id))
            .set(&self)
            .execute(db_conn)
            .await?;
        if n_updated == 0 {
            return Err(db::error::Error::RecordNotFound);
        }

        let sample = Sample::fetch_by_id(&id, db_conn).await?;
        history::append(&sample, ChangeKind::Updated, actor, db_conn).await?;

        Ok(sample)
    }
}

impl Sample {
    /// Removes the row and appends a final revision carrying the deleted
    /// state. The delete runs before the append so the row lock serializes
    /// revision assignment against concurrent writers.
    pub async fn delete(
        id: Uuid,
        actor: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> error::Result<Self> {
        let sample = Self::fetch_by_id(&id, db_conn).await?;

        let n_deleted = diesel::delete(sample::table.find(id)).execute(db_conn).await?;
        if n_deleted == 0 {
            return Err(db::error::Error::RecordNotFound);
        }

        history::append(&sample, ChangeKind::Deleted, actor, db_conn).await?;

        Ok(sample)
    }

    pub async fn set_image_path(
        id: Uuid,
        path: &str,
        actor: Option<Uuid>,
        db_conn: &mut AsyncPgConnection,
    ) -> error::Result<Self> {
        let n_updated = diesel::update(sample::table.find(id))
            .set(sample::image_path.eq(path))
            .execute(db_conn)
            .await?;
        if n_updated == 0 {
            return Err(db::error::Error::RecordNotFound);
        }

        let sample = Self::fetch_by_id(&id, db_conn).await?;
        history::append(&sample, ChangeKind::Updated, actor, db_conn).await?;

        Ok(sample)
    }
}

impl FetchById for Sample {
    type Id = Uuid;

    async fn fetch_by_id(id: &Self::Id, db_conn: &mut AsyncPgConnection) -> error::Result<Self> {
        Ok(sample::table
            .left_join(person::table)
            .filter(id_col.eq(id))
            .select(Self::as_select())
            .first(db_conn)
            .await?)
    }
}

impl FetchByQuery for Sample {
    type QueryParams = SampleQuery;

    async fn fetch_by_query(
        query: &Self::QueryParams,
        db_conn: &mut AsyncPgConnection,
    ) -> error::Result<Vec<Self>> {
        let filter = query.as_diesel_expression();

        let statement = sample::table
            .left_join(person::table)
            .select(Self::as_select())
            .order(created_at_col.desc())
            .limit(query.limit)
            .offset(query.offset)
            .into_boxed();

        let statement = match filter {
            Some(filter) => statement.filter(filter),
            None => statement,
        };

        Ok(statement.load(db_conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use garde::Validate;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn base_sample() -> NewSample {
        serde_json::from_value(json!({
            "sample_id": "IPSC-2024-001",
            "name": "Human iPSC Line - Donor A",
            "sample_type": "IPSC",
            "storage_location": "Freezer A, Rack 1, Box 5",
            "quantity": 10.0
        }))
        .unwrap()
    }

    fn messages(sample: &NewSample) -> Vec<String> {
        match sample.validate() {
            Ok(()) => Vec::new(),
            Err(report) => report.iter().map(|(_, err)| err.to_string()).collect(),
        }
    }

    #[test]
    fn valid_sample_passes() {
        assert_eq!(messages(&base_sample()), Vec::<String>::new());
    }

    #[test]
    fn deserialization_fills_defaults() {
        let sample = base_sample();

        assert_eq!(sample.status, SampleStatus::Available);
        assert!(sample.research_use_only);
        assert!(sample.created_by.is_none());
    }

    #[rstest]
    #[case(-0.5, false)]
    #[case(0.0, true)]
    #[case(12.0, true)]
    fn quantity_must_be_nonnegative(#[case] quantity: f64, #[case] ok: bool) {
        let mut sample = base_sample();
        sample.quantity = quantity;

        let messages = messages(&sample);
        if ok {
            assert_eq!(messages, Vec::<String>::new());
        } else {
            assert_eq!(messages, vec!["quantity cannot be negative".to_string()]);
        }
    }

    #[rstest]
    #[case(Some(-0.1), false)]
    #[case(Some(0.0), true)]
    #[case(Some(100.0), true)]
    #[case(Some(100.1), false)]
    #[case(None, true)]
    fn viability_is_a_percentage(#[case] viability: Option<f64>, #[case] ok: bool) {
        let mut sample = base_sample();
        sample.viability = viability;

        let messages = messages(&sample);
        if ok {
            assert_eq!(messages, Vec::<String>::new());
        } else {
            assert_eq!(
                messages,
                vec!["viability must be between 0 and 100".to_string()]
            );
        }
    }

    #[test]
    fn expiration_before_collection_is_rejected() {
        let mut sample = base_sample();
        sample.collection_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        sample.expiration_date = NaiveDate::from_ymd_opt(2024, 1, 5);

        assert_eq!(
            messages(&sample),
            vec!["expiration date cannot be before collection date".to_string()]
        );
    }

    #[test]
    fn storage_before_collection_is_rejected() {
        let mut sample = base_sample();
        sample.collection_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        sample.storage_date = NaiveDate::from_ymd_opt(2024, 1, 8);

        assert_eq!(
            messages(&sample),
            vec!["storage date cannot be before collection date".to_string()]
        );
    }

    #[test]
    fn collection_day_storage_is_accepted() {
        let mut sample = base_sample();
        sample.collection_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        sample.storage_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        sample.expiration_date = NaiveDate::from_ymd_opt(2025, 1, 10);

        assert_eq!(messages(&sample), Vec::<String>::new());
    }

    #[test]
    fn blank_identifiers_are_rejected() {
        let mut sample = base_sample();
        sample.sample_id = "   ".to_string();
        sample.name = String::new();

        assert_eq!(
            messages(&sample),
            vec![
                "sample ID cannot be empty".to_string(),
                "name cannot be empty".to_string()
            ]
        );
    }

    #[test]
    fn update_clears_optionals_left_out_of_the_payload() {
        let record = base_sample();
        let statement = diesel::update(sample::table.find(Uuid::now_v7())).set(&record);
        let sql = diesel::debug_query::<Pg, _>(&statement).to_string();

        for column in [
            "passage_number",
            "collection_date",
            "expiration_date",
            "viability",
        ] {
            assert!(
                sql.contains(&format!("\"{column}\" = ")),
                "{column} missing from SET list: {sql}"
            );
        }

        // absent storage_date keeps the stored value
        assert!(!sql.contains("storage_date"), "unexpected SET list: {sql}");
    }

    #[test]
    fn search_spans_identifiers_text_and_type() {
        let query = SampleQuery {
            search: Some("ipsc".to_string()),
            ..Default::default()
        };

        let filter = query.as_diesel_expression().unwrap();
        let statement = sample::table
            .left_join(person::table)
            .select(Sample::as_select())
            .into_boxed()
            .filter(filter);
        let sql = diesel::debug_query::<Pg, _>(&statement).to_string();

        for column in [
            "sample_id",
            "name",
            "description",
            "storage_location",
            "sample_type",
        ] {
            assert!(
                sql.contains(&format!("\"{column}\" ILIKE")),
                "{column} missing from search: {sql}"
            );
        }
    }

    #[test]
    fn negative_passage_number_is_rejected() {
        let mut sample = base_sample();
        sample.passage_number = Some(-1);

        assert_eq!(
            messages(&sample),
            vec!["passage number cannot be negative".to_string()]
        );
    }

    #[rstest]
    #[case(SampleType::Ipsc, "Induced Pluripotent Stem Cell")]
    #[case(SampleType::Msc, "Mesenchymal Stem Cell")]
    #[case(SampleType::Other, "Other")]
    fn type_labels_are_human_readable(#[case] sample_type: SampleType, #[case] expected: &str) {
        assert_eq!(sample_type.label(), expected);
    }

    #[rstest]
    #[case(SampleStatus::InUse, "In Use")]
    #[case(SampleStatus::Quarantine, "Quarantine")]
    fn status_labels_are_human_readable(#[case] status: SampleStatus, #[case] expected: &str) {
        assert_eq!(status.label(), expected);
    }

    #[rstest]
    #[case(SampleStatus::Available, 3.0, true)]
    #[case(SampleStatus::Available, 0.0, false)]
    #[case(SampleStatus::Depleted, 3.0, false)]
    fn availability_requires_stock(
        #[case] status: SampleStatus,
        #[case] quantity: f64,
        #[case] expected: bool,
    ) {
        let sample = Sample {
            id: Uuid::now_v7(),
            sample_id: "IPSC-2024-001".to_string(),
            name: "Human iPSC Line - Donor A".to_string(),
            sample_type: SampleType::Ipsc,
            description: String::new(),
            source: String::new(),
            donor_info: String::new(),
            storage_location: "Freezer A".to_string(),
            status,
            quantity,
            passage_number: None,
            collection_date: None,
            storage_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            expiration_date: None,
            viability: None,
            quality_control_notes: String::new(),
            research_use_only: true,
            image_path: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(sample.is_available(), expected);
    }
}
