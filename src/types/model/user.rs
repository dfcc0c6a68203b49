use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display data kept per Auth0 subject
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub login_count: i64,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: &str, email: Option<String>) -> Self {
        let now = Utc::now();
        UserProfile {
            user_id: user_id.to_string(),
            name: default_display_name(user_id),
            email,
            website: None,
            picture: None,
            login_count: 1,
            last_login: now,
            created_at: now,
            updated_at: now,
        }
    }
}

/// "User " plus the first 8 characters of the id after the provider prefix
pub fn default_display_name(user_id: &str) -> String {
    let local = user_id.rsplit('|').next().unwrap_or(user_id);
    format!("User {}", local.chars().take(8).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_drops_provider() {
        assert_eq!(
            default_display_name("google-oauth2|1234567890123"),
            "User 12345678"
        );
        assert_eq!(default_display_name("auth0|ab"), "User ab");
        assert_eq!(default_display_name("local"), "User local");
    }
}
