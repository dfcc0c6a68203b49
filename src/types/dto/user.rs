use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields to change; absent fields keep their stored value
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SaveBookmarkRequest {
    pub route_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BookmarksResponse {
    pub success: bool,
    pub message: String,
    pub saved_routes: Vec<Uuid>,
}
