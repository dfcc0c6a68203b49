//! Cloudinary image hosting: unsigned uploads, signed deletes, transform URLs.

use axum::async_trait;
use hex::ToHex;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{info, instrument, warn};

use crate::{
    config::CloudinaryConfig,
    error::{Error, Result},
    retry::{retry, RetryPolicy},
    types::model::route::LatLng,
};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub location: Option<LatLng>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub public_id: String,
    pub url: String,
    pub tiny_url: String,
    pub thumbnail_url: String,
    pub medium_url: String,
    pub large_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DestroyOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadedImage>;
    async fn destroy(&self, public_id: &str) -> Result<DestroyOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Tiny,
    Thumbnail,
    Medium,
    Large,
}

impl Variant {
    fn transformation(&self) -> &'static str {
        match self {
            Variant::Tiny => "c_fill,w_100,h_100,q_60,f_auto",
            Variant::Thumbnail => "c_fill,w_200,h_200,q_70,f_auto",
            Variant::Medium => "c_fill,w_400,h_400,q_75,f_auto",
            Variant::Large => "c_limit,w_1200,h_1200,q_80,f_auto",
        }
    }
}

pub fn variant_url(cloud_name: &str, public_id: &str, variant: Variant) -> String {
    format!(
        "{DELIVERY_BASE}/{cloud_name}/image/upload/{}/{public_id}",
        variant.transformation()
    )
}

/// Recovers the public id from a delivery URL: the path after `upload/`,
/// without the version segment and file extension.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    let upload = segments.iter().position(|s| *s == "upload")?;
    let rest = &segments[upload + 1..];
    let rest = match rest.iter().position(|s| is_version(s)) {
        Some(version) => &rest[version + 1..],
        None => rest,
    };
    let (last, folders) = rest.split_last()?;
    let stem = match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => last,
    };
    let id = folders
        .iter()
        .copied()
        .chain(std::iter::once(stem))
        .collect::<Vec<_>>()
        .join("/");
    (!id.is_empty()).then_some(id)
}

fn is_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

/// Request signature: parameters sorted by name, joined as a query string,
/// with the api secret appended, then sha1 hex encoded.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by_key(|(name, _)| *name);
    let joined = sorted
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hasher.finalize().encode_hex::<String>()
}

#[derive(Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorMessage,
}

#[derive(Deserialize)]
struct ApiErrorMessage {
    message: String,
}

#[derive(Clone)]
pub struct CloudinaryClient {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig, client: reqwest::Client) -> Self {
        CloudinaryClient { config, client }
    }

    fn endpoint(&self, resource: &str, action: &str) -> String {
        format!("{API_BASE}/{}/{resource}/{action}", self.config.cloud_name)
    }

    fn uploaded(&self, response: UploadResponse, location: Option<LatLng>) -> UploadedImage {
        let cloud = &self.config.cloud_name;
        let id = &response.public_id;
        UploadedImage {
            tiny_url: variant_url(cloud, id, Variant::Tiny),
            thumbnail_url: variant_url(cloud, id, Variant::Thumbnail),
            medium_url: variant_url(cloud, id, Variant::Medium),
            large_url: variant_url(cloud, id, Variant::Large),
            url: response.secure_url.replacen("http://", "https://", 1),
            width: response.width,
            height: response.height,
            public_id: response.public_id,
            location,
        }
    }
}

async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status();
    match response.json::<ApiErrorResponse>().await {
        Ok(body) => Error::Upstream(format!("Cloudinary {status}: {}", body.error.message)),
        Err(_) => Error::Upstream(format!("Cloudinary {status}")),
    }
}

#[async_trait]
impl ImageHost for CloudinaryClient {
    #[instrument(skip(self, request), fields(file = %request.file_name, size = request.bytes.len()))]
    async fn upload(&self, request: UploadRequest) -> Result<UploadedImage> {
        let mut part = Part::bytes(request.bytes).file_name(request.file_name);
        if let Some(content_type) = &request.content_type {
            part = part.mime_str(content_type)?;
        }
        let mut form = Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone())
            .text("folder", self.config.folder.clone());
        if let Some(LatLng { lat, lng }) = request.location {
            form = form.text("context", format!("lat={lat}|lng={lng}"));
        }

        let response = self
            .client
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body: UploadResponse = response.json().await?;
        info!("uploaded {}", body.public_id);
        Ok(self.uploaded(body, request.location))
    }

    #[instrument(skip(self))]
    async fn destroy(&self, public_id: &str) -> Result<DestroyOutcome> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign(&signed, &self.config.api_secret);
        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
        ];

        let response = self
            .client
            .post(self.endpoint("image", "destroy"))
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let body: DestroyResponse = response.json().await?;
        match body.result.as_str() {
            "ok" => Ok(DestroyOutcome::Deleted),
            "not found" => {
                warn!("image {public_id} was already gone");
                Ok(DestroyOutcome::NotFound)
            }
            other => Err(Error::Upstream(format!(
                "Unexpected destroy result for {public_id}: {other}"
            ))),
        }
    }
}

pub async fn upload_photo_with_retry(
    host: &dyn ImageHost,
    request: UploadRequest,
) -> Result<UploadedImage> {
    retry(RetryPolicy::upload(), || host.upload(request.clone())).await
}

/// Fetches image bytes, treating any non-2xx status as a failed attempt
#[instrument(skip(client))]
pub async fn load_image_with_retry(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    load_image(client, url, RetryPolicy::image_load()).await
}

async fn load_image(client: &reqwest::Client, url: &str, policy: RetryPolicy) -> Result<Vec<u8>> {
    retry(policy, || async {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("Loading {url} returned {status}")));
        }
        Ok::<_, Error>(response.bytes().await?.to_vec())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[test]
    fn signature_sorts_parameters() {
        let params = [
            ("timestamp", "1700000000".to_string()),
            ("public_id", "uploads/abc".to_string()),
        ];
        assert_eq!(
            sign(&params, "secret"),
            "3ae6bb799d51001cf595bbc7d7abdce66489ab8d"
        );
        let params = [
            ("timestamp", "1700000000".to_string()),
            ("public_id", "uploads/abc".to_string()),
            ("folder", "trips".to_string()),
        ];
        assert_eq!(
            sign(&params, "secret"),
            "bea04a4bb45dbcc62a74a4a28b6751b84942d884"
        );
    }

    #[test]
    fn variant_urls() {
        assert_eq!(
            variant_url("demo", "uploads/abc", Variant::Tiny),
            "https://res.cloudinary.com/demo/image/upload/c_fill,w_100,h_100,q_60,f_auto/uploads/abc"
        );
        assert_eq!(
            variant_url("demo", "abc", Variant::Large),
            "https://res.cloudinary.com/demo/image/upload/c_limit,w_1200,h_1200,q_80,f_auto/abc"
        );
    }

    #[test]
    fn public_id_skips_version_and_extension() {
        assert_eq!(
            public_id_from_url(
                "https://res.cloudinary.com/demo/image/upload/v1712345678/uploads/trip/photo.jpg"
            ),
            Some("uploads/trip/photo".to_string())
        );
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/image/upload/sample.png"),
            Some("sample".to_string())
        );
        assert_eq!(public_id_from_url("https://example.com/photo.jpg"), None);
        assert_eq!(public_id_from_url("not a url"), None);
    }

    /// Local image server answering the first `ok_after` requests with a 500
    fn image_server(ok_after: u32) -> (String, Arc<AtomicU32>) {
        use axum::{extract::State, http::StatusCode, routing::get, Router};

        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/photo.jpg",
                get(|State((hits, ok_after)): State<(Arc<AtomicU32>, u32)>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) + 1 > ok_after {
                        (StatusCode::OK, vec![0xff, 0xd8])
                    } else {
                        (StatusCode::INTERNAL_SERVER_ERROR, vec![])
                    }
                }),
            )
            .with_state((hits.clone(), ok_after));
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);
        (format!("http://{addr}/photo.jpg"), hits)
    }

    fn quick_image_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..RetryPolicy::image_load()
        }
    }

    #[tokio::test]
    async fn image_load_gives_up_after_five_attempts() {
        let (url, hits) = image_server(u32::MAX);
        let result = load_image(&reqwest::Client::new(), &url, quick_image_policy()).await;
        assert!(matches!(result, Err(Error::Upstream(ref m)) if m.contains("500")));
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn image_load_recovers_from_server_errors() {
        let (url, hits) = image_server(2);
        let bytes = load_image(&reqwest::Client::new(), &url, quick_image_policy())
            .await
            .unwrap();
        assert_eq!(bytes, vec![0xff, 0xd8]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    struct FlakyHost {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ImageHost for FlakyHost {
        async fn upload(&self, request: UploadRequest) -> Result<UploadedImage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(Error::Upstream("timeout".into()));
            }
            Ok(UploadedImage {
                public_id: request.file_name.clone(),
                url: format!("https://res.cloudinary.com/demo/image/upload/{}", request.file_name),
                tiny_url: String::new(),
                thumbnail_url: String::new(),
                medium_url: String::new(),
                large_url: String::new(),
                width: None,
                height: None,
                location: request.location,
            })
        }

        async fn destroy(&self, _public_id: &str) -> Result<DestroyOutcome> {
            Ok(DestroyOutcome::Deleted)
        }
    }

    fn request() -> UploadRequest {
        UploadRequest {
            file_name: "photo.jpg".into(),
            content_type: Some("image/jpeg".into()),
            bytes: vec![1, 2, 3],
            location: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upload_retries_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let host = FlakyHost {
            failures: 2,
            calls: calls.clone(),
        };
        let image = upload_photo_with_retry(&host, request()).await.unwrap();
        assert_eq!(image.public_id, "photo.jpg");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_gives_up_after_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let host = FlakyHost {
            failures: 10,
            calls: calls.clone(),
        };
        let result = upload_photo_with_retry(&host, request()).await;
        assert!(matches!(result, Err(Error::Upstream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
