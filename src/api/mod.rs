//! HTTP surface: router, shared state and handlers.

pub mod gpx;
pub mod photos;
pub mod public;
pub mod routes;
pub mod user;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::Authenticator,
    cloudinary::ImageHost,
    ingest::surface::RoadIndex,
    rate_limit::{limit_requests, RateLimits},
    route_service::RouteService,
    user_service::UserService,
};

/// GPX files and photos both arrive as multipart uploads
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub routes: RouteService,
    pub users: UserService,
    pub authenticator: Arc<Authenticator>,
    pub images: Option<Arc<dyn ImageHost>>,
    pub roads: Option<Arc<RoadIndex>>,
    pub limits: RateLimits,
}

pub fn app(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/routes/public", get(public::list_public_routes))
        .route("/api/routes/public/:id", get(public::load_public_route))
        .route(
            "/api/routes/public/:id/clusters",
            get(public::route_clusters),
        )
        .route("/api/routes/embed/:id", get(public::embed_route))
        .route_layer(middleware::from_fn_with_state(
            state.limits.public.clone(),
            limit_requests,
        ));

    let authenticated = Router::new()
        .route("/api/routes", get(routes::list_routes))
        .route("/api/routes/save", post(routes::save_route))
        .route(
            "/api/routes/:id",
            get(routes::load_route)
                .put(routes::update_route)
                .delete(routes::delete_route),
        )
        .route("/api/gpx/process", post(gpx::process_gpx))
        .route("/api/photos", post(photos::upload_photo))
        .route("/api/photos/*public_id", delete(photos::delete_photo))
        .route("/api/user", get(user::get_profile).post(user::update_profile))
        .route(
            "/api/user/saved-routes",
            get(user::list_saved_routes).post(user::add_saved_route),
        )
        .route(
            "/api/user/saved-routes/:id",
            delete(user::remove_saved_route),
        )
        .route_layer(middleware::from_fn_with_state(
            state.limits.authenticated.clone(),
            limit_requests,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(public)
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
