use std::collections::HashMap;

use axum::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    store::{PreviousVersion, Replaced, RouteQuery, RouteSort, RouteStore},
    types::model::route::RouteDocument,
};

/// Process-local store, used when no database is configured and in tests
#[derive(Default)]
pub struct MemoryRouteStore {
    routes: Mutex<HashMap<Uuid, RouteDocument>>,
    saved: Mutex<HashMap<String, Vec<Uuid>>>,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.routes.lock().await.len()
    }
}

pub(crate) fn sort_documents(docs: &mut [RouteDocument], sort: RouteSort) {
    match sort {
        RouteSort::Created => docs.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        RouteSort::Views => docs.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then_with(|| b.created_at.cmp(&a.created_at))
        }),
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn find(&self, persistent_id: Uuid) -> Result<Option<RouteDocument>> {
        Ok(self.routes.lock().await.get(&persistent_id).cloned())
    }

    async fn insert(&self, doc: &RouteDocument) -> Result<()> {
        let mut routes = self.routes.lock().await;
        if routes.contains_key(&doc.persistent_id) {
            return Err(Error::Validation(format!(
                "Route {} already exists",
                doc.persistent_id
            )));
        }
        routes.insert(doc.persistent_id, doc.clone());
        Ok(())
    }

    async fn replace(&self, doc: &RouteDocument) -> Result<(RouteDocument, Replaced)> {
        let mut routes = self.routes.lock().await;
        let mut stored = doc.clone();
        let replaced = match routes.get(&doc.persistent_id) {
            Some(previous) => {
                PreviousVersion::from(previous).apply_to(&mut stored)?;
                Replaced::Updated
            }
            None => Replaced::Inserted,
        };
        routes.insert(stored.persistent_id, stored.clone());
        Ok((stored, replaced))
    }

    async fn list(&self, query: &RouteQuery) -> Result<Vec<RouteDocument>> {
        let mut docs: Vec<RouteDocument> = self
            .routes
            .lock()
            .await
            .values()
            .filter(|doc| query.matches(doc))
            .cloned()
            .collect();
        sort_documents(&mut docs, query.sort);
        Ok(docs)
    }

    async fn delete(&self, persistent_id: Uuid) -> Result<bool> {
        let removed = self.routes.lock().await.remove(&persistent_id).is_some();
        for ids in self.saved.lock().await.values_mut() {
            ids.retain(|id| *id != persistent_id);
        }
        Ok(removed)
    }

    async fn record_view(&self, persistent_id: Uuid) -> Result<Option<RouteDocument>> {
        let mut routes = self.routes.lock().await;
        Ok(routes
            .get_mut(&persistent_id)
            .filter(|doc| doc.is_public)
            .map(|doc| {
                doc.view_count += 1;
                doc.last_viewed = Some(Utc::now());
                doc.clone()
            }))
    }

    async fn find_by_track_id(&self, route_id: &str) -> Result<Option<RouteDocument>> {
        Ok(self
            .routes
            .lock()
            .await
            .values()
            .find(|doc| {
                doc.content
                    .routes
                    .iter()
                    .any(|r| r.route_id.as_deref() == Some(route_id))
            })
            .cloned())
    }

    async fn saved_route_ids(&self, user_id: &str) -> Result<Vec<Uuid>> {
        Ok(self
            .saved
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<()> {
        let mut saved = self.saved.lock().await;
        let ids = saved.entry(user_id.to_string()).or_default();
        if !ids.contains(&persistent_id) {
            ids.push(persistent_id);
        }
        Ok(())
    }

    async fn remove_saved_route(&self, user_id: &str, persistent_id: Uuid) -> Result<bool> {
        let mut saved = self.saved.lock().await;
        let Some(ids) = saved.get_mut(user_id) else {
            return Ok(false);
        };
        let before = ids.len();
        ids.retain(|id| *id != persistent_id);
        Ok(ids.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::model::route::{RouteContent, RouteType};
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn doc(user: &str, public: bool, age_minutes: i64) -> RouteDocument {
        let created = Utc::now() - Duration::minutes(age_minutes);
        RouteDocument {
            persistent_id: Uuid::new_v4(),
            user_id: user.to_string(),
            name: format!("{user} route"),
            route_type: RouteType::Tourism,
            is_public: public,
            content: RouteContent::default(),
            view_count: 0,
            last_viewed: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryRouteStore::new();
        let d = doc("alice", false, 0);
        store.insert(&d).await.unwrap();
        assert_matches!(store.insert(&d).await, Err(Error::Validation(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn replace_keeps_stats_and_owner() {
        let store = MemoryRouteStore::new();
        let mut original = doc("alice", true, 60);
        original.view_count = 7;
        store.insert(&original).await.unwrap();

        let mut update = doc("alice", false, 0);
        update.persistent_id = original.persistent_id;
        let (stored, replaced) = store.replace(&update).await.unwrap();
        assert_eq!(replaced, Replaced::Updated);
        assert_eq!(stored.view_count, 7);
        assert_eq!(stored.created_at, original.created_at);
        assert!(!stored.is_public);

        let mut stolen = doc("mallory", true, 0);
        stolen.persistent_id = original.persistent_id;
        assert_matches!(store.replace(&stolen).await, Err(Error::Forbidden(_)));

        let fresh = doc("bob", true, 0);
        assert_matches!(store.replace(&fresh).await, Ok((_, Replaced::Inserted)));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn views_only_count_on_public_routes() {
        let store = MemoryRouteStore::new();
        let public = doc("alice", true, 0);
        let private = doc("alice", false, 0);
        store.insert(&public).await.unwrap();
        store.insert(&private).await.unwrap();

        let viewed = store.record_view(public.persistent_id).await.unwrap().unwrap();
        assert_eq!(viewed.view_count, 1);
        assert!(viewed.last_viewed.is_some());
        assert!(store.record_view(private.persistent_id).await.unwrap().is_none());
        assert!(store.record_view(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bookmarks_are_per_user_and_cleared_on_delete() {
        let store = MemoryRouteStore::new();
        let first = doc("bob", true, 0);
        let second = doc("bob", true, 0);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        store.add_saved_route("alice", first.persistent_id).await.unwrap();
        store.add_saved_route("alice", second.persistent_id).await.unwrap();
        store.add_saved_route("alice", first.persistent_id).await.unwrap();
        assert_eq!(
            store.saved_route_ids("alice").await.unwrap(),
            vec![first.persistent_id, second.persistent_id]
        );
        assert!(store.saved_route_ids("carol").await.unwrap().is_empty());

        store.delete(first.persistent_id).await.unwrap();
        assert_eq!(
            store.saved_route_ids("alice").await.unwrap(),
            vec![second.persistent_id]
        );
        assert!(store.remove_saved_route("alice", second.persistent_id).await.unwrap());
        assert!(!store.remove_saved_route("alice", second.persistent_id).await.unwrap());
    }

    #[tokio::test]
    async fn listing_filters_and_sorts() {
        let store = MemoryRouteStore::new();
        let old_public = doc("bob", true, 30);
        let mut popular = doc("bob", true, 60);
        popular.view_count = 10;
        let own_private = doc("alice", false, 5);
        let other_private = doc("bob", false, 1);
        for d in [&old_public, &popular, &own_private, &other_private] {
            store.insert(d).await.unwrap();
        }

        let visible = store
            .list(&RouteQuery {
                visible_to: Some("alice".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<Uuid> = visible.iter().map(|d| d.persistent_id).collect();
        assert_eq!(
            ids,
            vec![
                own_private.persistent_id,
                old_public.persistent_id,
                popular.persistent_id
            ]
        );

        let by_views = store
            .list(&RouteQuery {
                public_only: true,
                sort: RouteSort::Views,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_views[0].persistent_id, popular.persistent_id);
        assert_eq!(by_views.len(), 2);
    }
}
