use std::sync::Arc;

use chrono::Utc;
use futures::{stream, StreamExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    cloudinary::ImageHost,
    error::{Error, Result},
    store::{Replaced, RouteQuery, RouteSort, RouteStore},
    types::{
        dto::route::{
            DeletionReport, EmbedPayload, ListRoutesQuery, RouteSummary, SaveRouteRequest,
            SaveRouteResponse,
        },
        model::route::{RouteDocument, RouteType},
    },
};

/// Concurrent image deletions while removing a route
const PHOTO_DELETE_CONCURRENCY: usize = 4;

#[derive(Clone)]
pub struct RouteService {
    store: Arc<dyn RouteStore>,
    images: Option<Arc<dyn ImageHost>>,
}

fn validate(request: &SaveRouteRequest) -> Result<(RouteType, bool)> {
    let is_public = match request.is_public {
        Some(is_public) if !request.name.trim().is_empty() && !request.route_type.is_empty() => {
            is_public
        }
        _ => {
            return Err(Error::Validation(
                "name, type, and isPublic are required".to_string(),
            ))
        }
    };
    let route_type: RouteType = request.route_type.parse()?;

    if let Some(map_state) = &request.content.map_state {
        let numbers = [
            map_state.zoom,
            map_state.bearing,
            map_state.pitch,
            map_state.center[0],
            map_state.center[1],
        ];
        if !numbers.iter().all(|n| n.is_finite()) {
            return Err(Error::Validation(
                "mapState must contain finite numbers".to_string(),
            ));
        }
    }
    for line in &request.content.lines {
        line.validate()?;
    }
    Ok((route_type, is_public))
}

fn parse_route_type(value: Option<&str>) -> Result<Option<RouteType>> {
    value
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .transpose()
}

impl RouteService {
    pub fn new(store: Arc<dyn RouteStore>, images: Option<Arc<dyn ImageHost>>) -> Self {
        RouteService { store, images }
    }

    /// Creates or replaces the document for the request's persistent id
    #[instrument(skip(self, request), fields(persistent_id = ?request.persistent_id))]
    pub async fn save_route(
        &self,
        user_id: &str,
        request: SaveRouteRequest,
    ) -> Result<SaveRouteResponse> {
        let (route_type, is_public) = validate(&request)?;
        let now = Utc::now();
        let doc = RouteDocument {
            persistent_id: request.persistent_id.unwrap_or_else(Uuid::new_v4),
            user_id: user_id.to_string(),
            name: request.name.trim().to_string(),
            route_type,
            is_public,
            content: request.content,
            view_count: 0,
            last_viewed: None,
            created_at: now,
            updated_at: now,
        };
        let persistent_id = doc.persistent_id;

        // a client-supplied id may already exist; the store resolves that under its lock
        let replaced = match request.persistent_id {
            Some(_) => self.store.replace(&doc).await?.1,
            None => {
                self.store.insert(&doc).await?;
                Replaced::Inserted
            }
        };
        let message = match replaced {
            Replaced::Updated => {
                info!("updated route {persistent_id}");
                "Route updated successfully"
            }
            Replaced::Inserted => {
                info!("created route {persistent_id}");
                "Route saved successfully"
            }
        };
        Ok(SaveRouteResponse {
            persistent_id,
            message: message.to_string(),
        })
    }

    async fn find_existing(&self, persistent_id: Uuid) -> Result<RouteDocument> {
        self.store
            .find(persistent_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Route {persistent_id} not found")))
    }

    pub async fn load_route(&self, user_id: &str, persistent_id: Uuid) -> Result<RouteDocument> {
        let doc = self.find_existing(persistent_id).await?;
        if !doc.is_visible_to(user_id) {
            return Err(Error::Forbidden(
                "You do not have permission to view this route".to_string(),
            ));
        }
        Ok(doc)
    }

    /// Loads a public route for an anonymous viewer, counting the view
    pub async fn load_public_route(&self, persistent_id: Uuid) -> Result<RouteDocument> {
        self.store
            .record_view(persistent_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Public route {persistent_id} not found")))
    }

    /// Public route without touching its view statistics
    pub async fn peek_public_route(&self, persistent_id: Uuid) -> Result<RouteDocument> {
        match self.store.find(persistent_id).await? {
            Some(doc) if doc.is_public => Ok(doc),
            _ => Err(Error::NotFound(format!(
                "Public route {persistent_id} not found"
            ))),
        }
    }

    /// Public route for the embeddable map, looked up by persistent id or by
    /// the `routeId` of one of its tracks. Counts a view.
    #[instrument(skip(self))]
    pub async fn load_embed(&self, id: &str) -> Result<EmbedPayload> {
        let persistent_id = match Uuid::parse_str(id) {
            Ok(persistent_id) => Some(persistent_id),
            Err(_) => self
                .store
                .find_by_track_id(id)
                .await?
                .map(|doc| doc.persistent_id),
        };
        let doc = match persistent_id {
            Some(persistent_id) => self.store.record_view(persistent_id).await?,
            None => None,
        };
        doc.map(|doc| EmbedPayload::from(&doc))
            .ok_or_else(|| Error::NotFound(format!("Public route {id} not found")))
    }

    /// Bookmarked routes the user can still see, in the order they were saved
    pub async fn saved_routes(&self, user_id: &str) -> Result<Vec<RouteSummary>> {
        let ids = self.store.saved_route_ids(user_id).await?;
        let mut routes = Vec::with_capacity(ids.len());
        for persistent_id in ids {
            match self.store.find(persistent_id).await? {
                Some(doc) if doc.is_visible_to(user_id) => routes.push(RouteSummary::from(&doc)),
                Some(_) => debug!("saved route {persistent_id} is no longer public"),
                None => warn!("saved route {persistent_id} no longer exists"),
            }
        }
        Ok(routes)
    }

    /// Bookmarks a route the user can see and returns all their bookmarks
    #[instrument(skip(self))]
    pub async fn add_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<Vec<Uuid>> {
        self.load_route(user_id, persistent_id).await?;
        self.store.add_saved_route(user_id, persistent_id).await?;
        self.store.saved_route_ids(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_saved_route(
        &self,
        user_id: &str,
        persistent_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        if !self.store.remove_saved_route(user_id, persistent_id).await? {
            debug!("route {persistent_id} was not bookmarked");
        }
        self.store.saved_route_ids(user_id).await
    }

    pub async fn list_routes(
        &self,
        user_id: &str,
        filter: &ListRoutesQuery,
    ) -> Result<Vec<RouteSummary>> {
        let query = RouteQuery {
            visible_to: Some(user_id.to_string()),
            route_type: parse_route_type(filter.route_type.as_deref())?,
            is_public: filter.is_public,
            sort: RouteSort::Created,
            ..Default::default()
        };
        let docs = self.store.list(&query).await?;
        Ok(docs.iter().map(RouteSummary::from).collect())
    }

    pub async fn list_public_routes(&self, filter: &ListRoutesQuery) -> Result<Vec<RouteSummary>> {
        let query = RouteQuery {
            public_only: true,
            route_type: parse_route_type(filter.route_type.as_deref())?,
            sort: RouteSort::Views,
            ..Default::default()
        };
        let docs = self.store.list(&query).await?;
        Ok(docs.iter().map(RouteSummary::from).collect())
    }

    /// Removes the route after attempting to delete every image it references.
    /// Image failures are counted, not fatal.
    #[instrument(skip(self))]
    pub async fn delete_route(&self, user_id: &str, persistent_id: Uuid) -> Result<DeletionReport> {
        let doc = self.find_existing(persistent_id).await?;
        if !doc.is_owned_by(user_id) {
            return Err(Error::Forbidden(
                "You do not have permission to delete this route".to_string(),
            ));
        }

        let public_ids = doc.image_public_ids();
        let report = match &self.images {
            Some(images) => delete_images(images.clone(), public_ids).await,
            None if public_ids.is_empty() => DeletionReport::default(),
            None => {
                warn!(
                    "no image host configured, leaving {} images in place",
                    public_ids.len()
                );
                DeletionReport {
                    photos_deleted: 0,
                    photos_failed: public_ids.len(),
                }
            }
        };

        if !self.store.delete(persistent_id).await? {
            return Err(Error::NotFound(format!("Route {persistent_id} not found")));
        }
        info!(
            "deleted route {persistent_id} ({} images deleted, {} failed)",
            report.photos_deleted, report.photos_failed
        );
        Ok(report)
    }
}

async fn delete_images(images: Arc<dyn ImageHost>, public_ids: Vec<String>) -> DeletionReport {
    let outcomes: Vec<bool> = stream::iter(public_ids)
        .map(|public_id| {
            let images = images.clone();
            async move {
                match images.destroy(&public_id).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("failed to delete image {public_id}: {e}");
                        false
                    }
                }
            }
        })
        .buffer_unordered(PHOTO_DELETE_CONCURRENCY)
        .collect()
        .await;
    let photos_deleted = outcomes.iter().filter(|ok| **ok).count();
    DeletionReport {
        photos_deleted,
        photos_failed: outcomes.len() - photos_deleted,
    }
}
