use std::collections::HashMap;

use axum::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::{
    error::Result,
    types::{dto::user::ProfileUpdate, model::user::UserProfile},
};

const PROFILE_COLUMNS: &str = "user_id, name, email, website, picture, login_count, \
                               last_login, created_at, updated_at";

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Stores `first_seen` if the user has no profile yet, otherwise counts a login
    async fn record_login(&self, first_seen: &UserProfile) -> Result<UserProfile>;

    /// Applies the present fields, creating the profile from `first_seen` when absent
    async fn update(&self, first_seen: &UserProfile, update: &ProfileUpdate)
        -> Result<UserProfile>;
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply(profile: &mut UserProfile, update: &ProfileUpdate) {
    if let Some(name) = &update.name {
        profile.name = name.clone();
    }
    if let Some(email) = &update.email {
        profile.email = Some(email.clone());
    }
    if let Some(website) = &update.website {
        profile.website = Some(website.clone());
    }
    if let Some(picture) = &update.picture {
        profile.picture = Some(picture.clone());
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn record_login(&self, first_seen: &UserProfile) -> Result<UserProfile> {
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .entry(first_seen.user_id.clone())
            .and_modify(|p| {
                p.login_count += 1;
                p.last_login = Utc::now();
            })
            .or_insert_with(|| first_seen.clone());
        Ok(profile.clone())
    }

    async fn update(
        &self,
        first_seen: &UserProfile,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        let mut profiles = self.profiles.lock().await;
        let profile = profiles
            .entry(first_seen.user_id.clone())
            .or_insert_with(|| first_seen.clone());
        apply(profile, update);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        PgProfileStore { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn record_login(&self, first_seen: &UserProfile) -> Result<UserProfile> {
        Ok(sqlx::query_as::<_, UserProfile>(&format!(
            r#"insert into user_profiles (user_id, name, email) values ($1, $2, $3)
            on conflict (user_id) do update
              set login_count = user_profiles.login_count + 1, last_login = now()
            returning {PROFILE_COLUMNS}"#
        ))
        .bind(&first_seen.user_id)
        .bind(&first_seen.name)
        .bind(&first_seen.email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update(
        &self,
        first_seen: &UserProfile,
        update: &ProfileUpdate,
    ) -> Result<UserProfile> {
        Ok(sqlx::query_as::<_, UserProfile>(&format!(
            r#"insert into user_profiles (user_id, name, email, website, picture)
            values ($1, coalesce($2, $6), coalesce($3, $7), $4, $5)
            on conflict (user_id) do update set
              name = coalesce($2, user_profiles.name),
              email = coalesce($3, user_profiles.email),
              website = coalesce($4, user_profiles.website),
              picture = coalesce($5, user_profiles.picture),
              updated_at = now()
            returning {PROFILE_COLUMNS}"#
        ))
        .bind(&first_seen.user_id)
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.website)
        .bind(&update.picture)
        .bind(&first_seen.name)
        .bind(&first_seen.email)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logins_are_counted_after_creation() {
        let store = MemoryProfileStore::new();
        let first = UserProfile::new("auth0|abcdef123", Some("a@example.org".into()));
        let created = store.record_login(&first).await.unwrap();
        assert_eq!(created.login_count, 1);
        assert_eq!(created.name, "User abcdef12");

        let again = store
            .record_login(&UserProfile::new("auth0|abcdef123", None))
            .await
            .unwrap();
        assert_eq!(again.login_count, 2);
        assert_eq!(again.email.as_deref(), Some("a@example.org"));
    }

    #[tokio::test]
    async fn update_keeps_absent_fields() {
        let store = MemoryProfileStore::new();
        let first = UserProfile::new("auth0|x", None);
        store
            .update(
                &first,
                &ProfileUpdate {
                    name: Some("Ada".into()),
                    website: Some("https://ada.example".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = store
            .update(
                &first,
                &ProfileUpdate {
                    email: Some("ada@example.org".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.website.as_deref(), Some("https://ada.example"));
        assert_eq!(updated.email.as_deref(), Some("ada@example.org"));
    }
}
