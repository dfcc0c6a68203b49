use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    cloudinary::{upload_photo_with_retry, ImageHost, UploadRequest, UploadedImage},
    error::Error,
    net::response::{ResponseError, Result},
    types::model::route::LatLng,
};

fn image_host(images: Option<Arc<dyn ImageHost>>) -> Result<Arc<dyn ImageHost>, Error> {
    images.ok_or_else(|| Error::Upstream("Image hosting is not configured".to_string()))
}

fn coordinate(value: Option<String>, field: &str) -> Result<Option<f64>> {
    value
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| ResponseError::bad_request(format!("{field} must be a number")))
        })
        .transpose()
}

#[instrument(skip_all)]
pub async fn upload_photo(
    State(images): State<Option<Arc<dyn ImageHost>>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadedImage>> {
    let images = image_host(images)?;
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let (mut lat, mut lng) = (None, None);
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("photo").to_string();
                let content_type = field.content_type().map(str::to_string);
                file = Some((file_name, content_type, field.bytes().await?.to_vec()));
            }
            Some("lat") => lat = Some(field.text().await?),
            Some("lng") => lng = Some(field.text().await?),
            _ => continue,
        }
    }
    let (file_name, content_type, bytes) =
        file.ok_or(ResponseError::bad_request("No photo uploaded"))?;
    let location = match (coordinate(lat, "lat")?, coordinate(lng, "lng")?) {
        (Some(lat), Some(lng)) => Some(LatLng { lat, lng }),
        _ => None,
    };

    info!("uploading {file_name} for {}", user.sub);
    let request = UploadRequest {
        file_name,
        content_type,
        bytes,
        location,
    };
    Ok(Json(upload_photo_with_retry(images.as_ref(), request).await?))
}

#[instrument(skip(images, user))]
pub async fn delete_photo(
    State(images): State<Option<Arc<dyn ImageHost>>>,
    user: AuthUser,
    Path(public_id): Path<String>,
) -> Result<Json<Value>> {
    let images = image_host(images)?;
    let public_id = public_id.trim_start_matches('/');
    info!("{} deleting image {public_id}", user.sub);
    let outcome = images.destroy(public_id).await?;
    Ok(Json(json!({ "publicId": public_id, "result": outcome })))
}
