use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use color_eyre::eyre::WrapErr;
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    error::Error,
    ingest::{self, surface::RoadIndex},
    net::response::{ResponseError, Result},
    types::model::route::ProcessedRoute,
};

#[instrument(skip_all)]
pub async fn process_gpx(
    State(roads): State<Option<Arc<RoadIndex>>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ProcessedRoute>> {
    let mut name: Option<String> = None;
    let mut gpx_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("name") => name = Some(field.text().await?),
            Some("gpx") => gpx_bytes = Some(field.bytes().await?.to_vec()),
            _ => continue,
        }
    }
    let bytes = gpx_bytes.ok_or(ResponseError::bad_request("No GPX file uploaded"))?;
    info!("processing {} byte gpx upload for {}", bytes.len(), user.sub);

    let route = tokio::task::spawn_blocking(move || {
        ingest::process(name, &bytes, roads.as_deref())
    })
    .await
    .wrap_err("GPX processing task failed")
    .map_err(Error::from)??;
    Ok(Json(route))
}
