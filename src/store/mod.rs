pub mod memory;
pub mod postgres;
pub mod profile;

use axum::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    types::model::route::{RouteDocument, RouteType},
};

pub use self::{
    memory::MemoryRouteStore,
    postgres::PgRouteStore,
    profile::{MemoryProfileStore, PgProfileStore, ProfileStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteSort {
    /// Newest first
    #[default]
    Created,
    /// Most viewed first, newest breaking ties
    Views,
}

/// Filter for listing routes. `visible_to` selects a user's own routes plus
/// all public ones; `public_only` restricts to public routes.
#[derive(Debug, Clone, Default)]
pub struct RouteQuery {
    pub visible_to: Option<String>,
    pub public_only: bool,
    pub route_type: Option<RouteType>,
    pub is_public: Option<bool>,
    pub sort: RouteSort,
}

impl RouteQuery {
    pub fn matches(&self, doc: &RouteDocument) -> bool {
        if self.public_only && !doc.is_public {
            return false;
        }
        if let Some(user) = &self.visible_to {
            if !doc.is_visible_to(user) {
                return false;
            }
        }
        self.route_type.map_or(true, |t| doc.route_type == t)
            && self.is_public.map_or(true, |p| doc.is_public == p)
    }
}

/// What `RouteStore::replace` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    Inserted,
    Updated,
}

/// Fields of the stored version that a replacement keeps
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PreviousVersion {
    pub user_id: String,
    pub view_count: i64,
    pub last_viewed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PreviousVersion {
    /// Checks ownership and carries creation time and view stats over to `doc`
    pub fn apply_to(&self, doc: &mut RouteDocument) -> Result<()> {
        if self.user_id != doc.user_id {
            return Err(Error::Forbidden(
                "You do not have permission to modify this route".to_string(),
            ));
        }
        doc.created_at = self.created_at;
        doc.view_count = self.view_count.max(0) as u64;
        doc.last_viewed = self.last_viewed;
        Ok(())
    }
}

impl From<&RouteDocument> for PreviousVersion {
    fn from(doc: &RouteDocument) -> Self {
        PreviousVersion {
            user_id: doc.user_id.clone(),
            view_count: doc.view_count as i64,
            last_viewed: doc.last_viewed,
            created_at: doc.created_at,
        }
    }
}

/// Persistence of route documents, keyed by persistent id
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn find(&self, persistent_id: Uuid) -> Result<Option<RouteDocument>>;

    /// Fails with a validation error if the persistent id is taken
    async fn insert(&self, doc: &RouteDocument) -> Result<()>;

    /// Swaps the stored document for `doc` atomically; inserts when absent.
    /// The previous version is read under the same lock: its owner must match
    /// and its creation time and view stats are kept.
    async fn replace(&self, doc: &RouteDocument) -> Result<(RouteDocument, Replaced)>;

    async fn list(&self, query: &RouteQuery) -> Result<Vec<RouteDocument>>;

    /// Whether a document was removed
    async fn delete(&self, persistent_id: Uuid) -> Result<bool>;

    /// Bumps the view counter of a public document and returns it updated
    async fn record_view(&self, persistent_id: Uuid) -> Result<Option<RouteDocument>>;

    /// Document containing a track with the given `routeId`
    async fn find_by_track_id(&self, route_id: &str) -> Result<Option<RouteDocument>>;

    /// Routes a user bookmarked, oldest first
    async fn saved_route_ids(&self, user_id: &str) -> Result<Vec<Uuid>>;

    /// Bookmarks a route; saving it again is a no-op
    async fn add_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<()>;

    /// Whether a bookmark was removed
    async fn remove_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<bool>;
}
