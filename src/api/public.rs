use axum::{
    extract::{Path, Query, State},
    http::{header::CACHE_CONTROL, HeaderName, HeaderValue},
    Json,
};
use geojson::FeatureCollection;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    cluster::{self, Device},
    net::response::{ResponseError, Result},
    route_service::RouteService,
    types::dto::route::{EmbedPayload, ListRoutesQuery, ListRoutesResponse, LoadRouteResponse},
};

pub async fn list_public_routes(
    State(service): State<RouteService>,
    Query(filter): Query<ListRoutesQuery>,
) -> Result<Json<ListRoutesResponse>> {
    let routes = service.list_public_routes(&filter).await?;
    Ok(Json(ListRoutesResponse { routes }))
}

pub async fn load_public_route(
    State(service): State<RouteService>,
    Path(persistent_id): Path<Uuid>,
) -> Result<Json<LoadRouteResponse>> {
    let route = service.load_public_route(persistent_id).await?;
    Ok(Json(LoadRouteResponse {
        route,
        message: "Route loaded successfully".to_string(),
    }))
}

#[derive(Deserialize, Debug)]
pub struct ClusterQuery {
    pub zoom: f64,
    #[serde(default)]
    pub device: Device,
}

/// POIs and located photos of a public route, clustered for the given zoom
pub async fn route_clusters(
    State(service): State<RouteService>,
    Path(persistent_id): Path<Uuid>,
    Query(query): Query<ClusterQuery>,
) -> Result<Json<FeatureCollection>> {
    let zoom = cluster::normalize_zoom(query.zoom)
        .ok_or_else(|| ResponseError::bad_request("zoom must be a finite number"))?;
    let route = service.peek_public_route(persistent_id).await?;
    let items = cluster::items_from_route(&route);
    let clustered = cluster::cluster(&items, zoom, query.device);
    Ok(Json(cluster::to_feature_collection(
        &clustered,
        zoom,
        query.device,
    )))
}

/// Embed viewers may cache the payload for five minutes
const EMBED_CACHE_CONTROL: &str = "public, max-age=300";

/// Payload for the embeddable map; `id` is a persistent id or a track's `routeId`
pub async fn embed_route(
    State(service): State<RouteService>,
    Path(id): Path<String>,
) -> Result<([(HeaderName, HeaderValue); 1], Json<EmbedPayload>)> {
    let payload = service.load_embed(&id).await?;
    Ok((
        [(CACHE_CONTROL, HeaderValue::from_static(EMBED_CACHE_CONTROL))],
        Json(payload),
    ))
}
