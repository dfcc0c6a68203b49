use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    annotation::LineMarker,
    types::model::route::{
        ElevationSample, MapState, Photo, Pois, ProcessedRoute, RouteContent, RouteDocument,
        RouteType, SurfaceSummary, UnpavedSection,
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveRouteRequest {
    /// Present when the client is re-saving a route it loaded earlier
    #[serde(default)]
    pub persistent_id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub route_type: String,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(flatten)]
    pub content: RouteContent,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SaveRouteResponse {
    pub persistent_id: Uuid,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoadRouteResponse {
    pub route: RouteDocument,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStatistics {
    pub total_distance: f64,
    pub elevation_gain: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub persistent_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub is_public: bool,
    pub view_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_viewed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub statistics: SummaryStatistics,
}

impl From<&RouteDocument> for RouteSummary {
    fn from(doc: &RouteDocument) -> Self {
        let statistics = doc
            .content
            .routes
            .iter()
            .fold(SummaryStatistics::default(), |acc, r| SummaryStatistics {
                total_distance: acc.total_distance + r.statistics.total_distance,
                elevation_gain: acc.elevation_gain + r.statistics.elevation_gain,
            });
        RouteSummary {
            persistent_id: doc.persistent_id,
            name: doc.name.clone(),
            route_type: doc.route_type,
            is_public: doc.is_public,
            view_count: doc.view_count,
            last_viewed: doc.last_viewed,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            statistics,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListRoutesResponse {
    pub routes: Vec<RouteSummary>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListRoutesQuery {
    #[serde(rename = "type", default)]
    pub route_type: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub photos_deleted: usize,
    pub photos_failed: usize,
}

/// A track as the embeddable map needs it: geometry and surface data, no GPX
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTrack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    pub name: String,
    pub color: String,
    pub geojson: FeatureCollection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceSummary>,
    pub unpaved_sections: Vec<UnpavedSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
}

impl From<&ProcessedRoute> for EmbedTrack {
    fn from(route: &ProcessedRoute) -> Self {
        EmbedTrack {
            route_id: route.route_id.clone(),
            name: route.name.clone(),
            color: route.color.clone(),
            geojson: route.geojson.clone(),
            surface: route.surface.clone(),
            unpaved_sections: route.unpaved_sections.clone(),
            description: route.extra.get("description").cloned(),
        }
    }
}

/// Read-only payload for the embedded public map
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EmbedPayload {
    pub persistent_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub routes: Vec<EmbedTrack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_state: Option<MapState>,
    pub pois: Pois,
    pub photos: Vec<Photo>,
    pub lines: Vec<LineMarker>,
    /// Elevation profile per track, index aligned with `routes`
    pub elevation: Vec<Vec<ElevationSample>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_settings: Option<Value>,
    pub view_count: u64,
}

impl From<&RouteDocument> for EmbedPayload {
    fn from(doc: &RouteDocument) -> Self {
        let content = &doc.content;
        EmbedPayload {
            persistent_id: doc.persistent_id,
            name: doc.name.clone(),
            route_type: doc.route_type,
            routes: content.routes.iter().map(EmbedTrack::from).collect(),
            map_state: content.map_state.clone(),
            pois: content.pois.clone(),
            photos: content.photos.clone(),
            lines: content.lines.clone(),
            elevation: content
                .routes
                .iter()
                .map(|r| {
                    r.surface
                        .as_ref()
                        .map(|s| s.elevation_profile.clone())
                        .unwrap_or_default()
                })
                .collect(),
            header_settings: content.header_settings.clone(),
            view_count: doc.view_count,
        }
    }
}
