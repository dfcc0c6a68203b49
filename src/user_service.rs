use std::sync::Arc;

use reqwest::Url;
use tracing::{info, instrument};

use crate::{
    error::{Error, Result},
    store::ProfileStore,
    types::{dto::user::ProfileUpdate, model::user::UserProfile},
};

#[derive(Clone)]
pub struct UserService {
    profiles: Arc<dyn ProfileStore>,
}

fn validate(update: ProfileUpdate) -> Result<ProfileUpdate> {
    let name = match update.name {
        Some(name) if name.trim().is_empty() => {
            return Err(Error::Validation("name cannot be blank".to_string()))
        }
        name => name.map(|n| n.trim().to_string()),
    };
    if let Some(email) = update.email.as_deref().filter(|e| !e.is_empty()) {
        if !email.contains('@') {
            return Err(Error::Validation(format!("{email} is not an email address")));
        }
    }
    for url in [&update.website, &update.picture].into_iter().flatten() {
        if url.is_empty() {
            continue;
        }
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(Error::Validation(format!("{url} is not an http(s) URL"))),
        }
    }
    Ok(ProfileUpdate { name, ..update })
}

impl UserService {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        UserService { profiles }
    }

    /// Profile of the signed-in user, created with a default name on first visit
    #[instrument(skip(self, email))]
    pub async fn profile(&self, user_id: &str, email: Option<String>) -> Result<UserProfile> {
        let profile = self
            .profiles
            .record_login(&UserProfile::new(user_id, email))
            .await?;
        if profile.login_count == 1 {
            info!("created profile for {user_id}");
        }
        Ok(profile)
    }

    #[instrument(skip(self, email, update))]
    pub async fn update_profile(
        &self,
        user_id: &str,
        email: Option<String>,
        update: ProfileUpdate,
    ) -> Result<UserProfile> {
        let update = validate(update)?;
        self.profiles
            .update(&UserProfile::new(user_id, email), &update)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;
    use assert_matches::assert_matches;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryProfileStore::new()))
    }

    #[tokio::test]
    async fn first_visit_uses_token_email() {
        let users = service();
        let profile = users
            .profile("auth0|42", Some("rider@example.org".into()))
            .await
            .unwrap();
        assert_eq!(profile.name, "User 42");
        assert_eq!(profile.email.as_deref(), Some("rider@example.org"));
    }

    #[tokio::test]
    async fn names_are_trimmed_and_required() {
        let users = service();
        let updated = users
            .update_profile(
                "auth0|42",
                None,
                ProfileUpdate {
                    name: Some("  Derwent Valley Riders ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Derwent Valley Riders");

        assert_matches!(
            users
                .update_profile(
                    "auth0|42",
                    None,
                    ProfileUpdate {
                        name: Some("   ".into()),
                        ..Default::default()
                    },
                )
                .await,
            Err(Error::Validation(_))
        );
    }

    #[tokio::test]
    async fn malformed_contact_details_are_rejected() {
        let users = service();
        for update in [
            ProfileUpdate {
                email: Some("not-an-email".into()),
                ..Default::default()
            },
            ProfileUpdate {
                website: Some("ftp://files.example".into()),
                ..Default::default()
            },
            ProfileUpdate {
                picture: Some("just text".into()),
                ..Default::default()
            },
        ] {
            assert_matches!(
                users.update_profile("auth0|42", None, update).await,
                Err(Error::Validation(_))
            );
        }
        let cleared = users
            .update_profile(
                "auth0|42",
                None,
                ProfileUpdate {
                    website: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.website.as_deref(), Some(""));
    }
}
