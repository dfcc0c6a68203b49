use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    net::response::Result,
    route_service::RouteService,
    types::dto::route::{
        DeletionReport, ListRoutesQuery, ListRoutesResponse, LoadRouteResponse, SaveRouteRequest,
        SaveRouteResponse,
    },
};

#[instrument(skip(service, request))]
pub async fn save_route(
    State(service): State<RouteService>,
    user: AuthUser,
    Json(request): Json<SaveRouteRequest>,
) -> Result<(StatusCode, Json<SaveRouteResponse>)> {
    let saved = service.save_route(&user.sub, request).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Same as save, with the persistent id taken from the path
#[instrument(skip(service, request))]
pub async fn update_route(
    State(service): State<RouteService>,
    user: AuthUser,
    Path(persistent_id): Path<Uuid>,
    Json(mut request): Json<SaveRouteRequest>,
) -> Result<Json<SaveRouteResponse>> {
    request.persistent_id = Some(persistent_id);
    Ok(Json(service.save_route(&user.sub, request).await?))
}

pub async fn list_routes(
    State(service): State<RouteService>,
    user: AuthUser,
    Query(filter): Query<ListRoutesQuery>,
) -> Result<Json<ListRoutesResponse>> {
    let routes = service.list_routes(&user.sub, &filter).await?;
    Ok(Json(ListRoutesResponse { routes }))
}

pub async fn load_route(
    State(service): State<RouteService>,
    user: AuthUser,
    Path(persistent_id): Path<Uuid>,
) -> Result<Json<LoadRouteResponse>> {
    let route = service.load_route(&user.sub, persistent_id).await?;
    Ok(Json(LoadRouteResponse {
        route,
        message: "Route loaded successfully".to_string(),
    }))
}

#[instrument(skip(service))]
pub async fn delete_route(
    State(service): State<RouteService>,
    user: AuthUser,
    Path(persistent_id): Path<Uuid>,
) -> Result<Json<DeletionReport>> {
    Ok(Json(service.delete_route(&user.sub, persistent_id).await?))
}
