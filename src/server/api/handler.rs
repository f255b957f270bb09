use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Path, State, rejection::JsonRejection},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use axum_extra::extract::Query;
use diesel_async::{AsyncConnection, scoped_futures::ScopedFutureExt};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;
use valuable::Valuable;

use crate::{
    db::{
        self, FetchByQuery, Write,
        model::{
            history::{self, HistoryEntry},
            person::{CreatedUser, NewPerson},
            sample::{NewSample, Sample, SampleQuery},
            site_settings::{SiteSettings, UpdatedSiteSettings},
        },
    },
    export,
    server::{
        AppState,
        auth::{Admin, Staff},
    },
};

use super::error::{Error, Result};

pub(super) struct ValidJson<T>(T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Validate,
    <T as Validate>::Context: std::default::Default,
{
    type Rejection = Error;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let axum::Json(data) = axum::Json::<T>::from_request(req, state).await?;
        data.validate()?;

        Ok(Self(data))
    }
}

pub(super) async fn write<Data>(
    Staff(user): Staff,
    State(app_state): State<AppState>,
    ValidJson(data): ValidJson<Data>,
) -> Result<Json<Data::Returns>>
where
    Data: db::Write + Send + Valuable,
    Data::Returns: Send,
{
    tracing::info!(deserialized_data = data.as_value());

    let mut db_conn = app_state.db_conn().await?;
    let actor = user.id;

    let item = db_conn
        .transaction(|conn| async move { data.write(Some(actor), conn).await }.scope_boxed())
        .await?;

    Ok(Json(item))
}

pub(super) async fn by_id<Resource>(
    State(app_state): State<AppState>,
    Path(resource_id): Path<Resource::Id>,
) -> Result<Json<Resource>>
where
    Resource: db::FetchById + Send,
    Resource::Id: Send + Sync + std::fmt::Debug,
{
    tracing::info!(?resource_id);

    let mut db_conn = app_state.db_conn().await?;

    let item = Resource::fetch_by_id(&resource_id, &mut db_conn).await?;

    Ok(Json(item))
}

pub(super) async fn by_query<Resource>(
    State(app_state): State<AppState>,
    Query(query): Query<Resource::QueryParams>,
) -> Result<Json<Vec<Resource>>>
where
    Resource: db::FetchByQuery + Send,
    Resource::QueryParams: Send + Valuable,
{
    tracing::info!(deserialized_query = query.as_value());

    let mut db_conn = app_state.db_conn().await?;

    let items = Resource::fetch_by_query(&query, &mut db_conn).await?;

    Ok(Json(items))
}

pub(super) async fn update_sample(
    Staff(user): Staff,
    State(app_state): State<AppState>,
    Path(sample_id): Path<Uuid>,
    ValidJson(data): ValidJson<NewSample>,
) -> Result<Json<Sample>> {
    tracing::info!(%sample_id, deserialized_data = data.as_value());

    let mut db_conn = app_state.db_conn().await?;
    let actor = user.id;

    let sample = db_conn
        .transaction(|conn| {
            async move { data.update(sample_id, Some(actor), conn).await }.scope_boxed()
        })
        .await?;

    Ok(Json(sample))
}

pub(super) async fn delete_sample(
    Staff(user): Staff,
    State(app_state): State<AppState>,
    Path(sample_id): Path<Uuid>,
) -> Result<Json<Sample>> {
    tracing::info!(%sample_id);

    let mut db_conn = app_state.db_conn().await?;
    let actor = user.id;

    let sample = db_conn
        .transaction(|conn| {
            async move { Sample::delete(sample_id, Some(actor), conn).await }.scope_boxed()
        })
        .await?;

    Ok(Json(sample))
}

pub(super) async fn sample_history(
    Staff(_): Staff,
    State(app_state): State<AppState>,
    Path(sample_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEntry>>> {
    let mut db_conn = app_state.db_conn().await?;

    let entries = history::fetch_for_record(sample_id, &mut db_conn).await?;

    Ok(Json(entries))
}

#[derive(Deserialize, Validate, Valuable, Default)]
#[garde(allow_unvalidated)]
pub(super) struct ExportRequest {
    #[serde(default)]
    query: SampleQuery,
    #[serde(default)]
    columns: Vec<String>,
}

pub(super) async fn export_samples(
    Staff(_): Staff,
    State(app_state): State<AppState>,
    ValidJson(request): ValidJson<ExportRequest>,
) -> Result<Response> {
    tracing::info!(deserialized_request = request.as_value());

    let ExportRequest { query, columns } = request;
    let columns = if columns.is_empty() {
        export::DEFAULT_COLUMNS
            .iter()
            .map(ToString::to_string)
            .collect()
    } else {
        columns
    };

    let mut db_conn = app_state.db_conn().await?;
    let samples = Sample::fetch_by_query(&query, &mut db_conn).await?;

    let workbook = export::write_workbook(&samples, &columns)?;
    let filename = export::export_filename(chrono::Utc::now());

    Ok((
        [
            (CONTENT_TYPE, export::XLSX_MIME.to_string()),
            (
                CONTENT_DISPOSITION,
                format!(r#"attachment; filename="{filename}""#),
            ),
        ],
        workbook,
    )
        .into_response())
}

pub(super) async fn upload_sample_image(
    Staff(user): Staff,
    State(app_state): State<AppState>,
    Path(sample_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Sample>> {
    tracing::info!(%sample_id, n_bytes = body.len());

    let resized = tokio::task::spawn_blocking(move || crate::images::downsize(&body))
        .await
        .map_err(|err| Error::Asset {
            message: format!("{err:?}"),
        })?;

    let image_dir = app_state.assets_dir().await.join("sample_images");
    tokio::fs::create_dir_all(&image_dir).await?;

    let relative_path = format!("sample_images/{sample_id}.jpg");
    tokio::fs::write(image_dir.join(format!("{sample_id}.jpg")), resized).await?;

    let mut db_conn = app_state.db_conn().await?;
    let actor = user.id;

    let sample = db_conn
        .transaction(|conn| {
            async move {
                Sample::set_image_path(sample_id, &relative_path, Some(actor), conn).await
            }
            .scope_boxed()
        })
        .await?;

    Ok(Json(sample))
}

pub(super) async fn new_person(
    Admin(_): Admin,
    State(app_state): State<AppState>,
    ValidJson(person): ValidJson<NewPerson>,
) -> Result<Json<CreatedUser>> {
    tracing::info!(deserialized_person = person.as_value());

    let mut db_conn = app_state.db_conn().await?;

    let created_user = person.write(None, &mut db_conn).await?;

    Ok(Json(created_user))
}

#[derive(Deserialize, Default)]
pub(super) struct SettingsQuery {
    #[serde(default)]
    lang: Option<String>,
}

#[derive(serde::Serialize)]
pub(super) struct SettingsResponse {
    site_name: String,
    #[serde(flatten)]
    settings: SiteSettings,
}

pub(super) async fn get_settings(
    State(app_state): State<AppState>,
    Query(query): Query<SettingsQuery>,
) -> Result<Json<SettingsResponse>> {
    let mut db_conn = app_state.db_conn().await?;

    let settings = SiteSettings::fetch_or_init(&mut db_conn).await?;
    let site_name = settings.site_name(query.lang.as_deref().unwrap_or("en")).to_string();

    Ok(Json(SettingsResponse {
        site_name,
        settings,
    }))
}

pub(super) async fn update_settings(
    Admin(_): Admin,
    State(app_state): State<AppState>,
    ValidJson(settings): ValidJson<UpdatedSiteSettings>,
) -> Result<Json<SiteSettings>> {
    tracing::info!(deserialized_settings = settings.as_value());

    let mut db_conn = app_state.db_conn().await?;

    let settings = settings.apply(&mut db_conn).await?;

    Ok(Json(settings))
}
