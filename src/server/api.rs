use axum::{
    Router,
    routing::{get, post, put},
};

use crate::db::model::sample::{NewSample, Sample};
use crate::server::api::handler::{
    by_id, by_query, delete_sample, export_samples, get_settings, new_person, sample_history,
    update_sample, update_settings, upload_sample_image, write,
};

use super::AppState;

mod error;
mod handler;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/samples",
            get(by_query::<Sample>).post(write::<NewSample>),
        )
        .route("/samples/export", post(export_samples))
        .route(
            "/samples/{sample_id}",
            get(by_id::<Sample>)
                .put(update_sample)
                .delete(delete_sample),
        )
        .route("/samples/{sample_id}/history", get(sample_history))
        .route("/samples/{sample_id}/image", put(upload_sample_image))
        .route("/people", post(new_person))
        .route("/settings", get(get_settings).put(update_settings))
}
