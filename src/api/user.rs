use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    net::response::Result,
    route_service::RouteService,
    types::{
        dto::{
            route::ListRoutesResponse,
            user::{BookmarksResponse, ProfileUpdate, SaveBookmarkRequest},
        },
        model::user::UserProfile,
    },
    user_service::UserService,
};

pub async fn get_profile(
    State(users): State<UserService>,
    user: AuthUser,
) -> Result<Json<UserProfile>> {
    Ok(Json(users.profile(&user.sub, user.email).await?))
}

#[instrument(skip(users, update))]
pub async fn update_profile(
    State(users): State<UserService>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    Ok(Json(
        users.update_profile(&user.sub, user.email, update).await?,
    ))
}

pub async fn list_saved_routes(
    State(service): State<RouteService>,
    user: AuthUser,
) -> Result<Json<ListRoutesResponse>> {
    let routes = service.saved_routes(&user.sub).await?;
    Ok(Json(ListRoutesResponse { routes }))
}

pub async fn add_saved_route(
    State(service): State<RouteService>,
    user: AuthUser,
    Json(request): Json<SaveBookmarkRequest>,
) -> Result<Json<BookmarksResponse>> {
    let saved_routes = service.add_saved_route(&user.sub, request.route_id).await?;
    Ok(Json(BookmarksResponse {
        success: true,
        message: "Route saved successfully".to_string(),
        saved_routes,
    }))
}

pub async fn remove_saved_route(
    State(service): State<RouteService>,
    user: AuthUser,
    Path(persistent_id): Path<Uuid>,
) -> Result<Json<BookmarksResponse>> {
    let saved_routes = service
        .remove_saved_route(&user.sub, persistent_id)
        .await?;
    Ok(Json(BookmarksResponse {
        success: true,
        message: "Route removed successfully".to_string(),
        saved_routes,
    }))
}
