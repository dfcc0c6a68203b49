use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{annotation::LineMarker, cloudinary::public_id_from_url, error::Error};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    Tourism,
    Event,
    Bikepacking,
    Single,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Tourism => "tourism",
            RouteType::Event => "event",
            RouteType::Bikepacking => "bikepacking",
            RouteType::Single => "single",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tourism" => Ok(RouteType::Tourism),
            "event" => Ok(RouteType::Event),
            "bikepacking" => Ok(RouteType::Bikepacking),
            "single" => Ok(RouteType::Single),
            other => Err(Error::Validation(format!(
                "Invalid route type '{other}': type must be one of: tourism, event, bikepacking, single"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MapState {
    pub zoom: f64,
    pub center: [f64; 2],
    pub bearing: f64,
    pub pitch: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Everything the client edits; stored as one JSON body
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_state: Option<MapState>,
    #[serde(default)]
    pub routes: Vec<ProcessedRoute>,
    #[serde(default)]
    pub pois: Pois,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub places: Vec<Place>,
    #[serde(default)]
    pub lines: Vec<LineMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_settings: Option<Value>,
}

//Whats actually stored, one per persistent id
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDocument {
    pub persistent_id: Uuid,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub is_public: bool,
    #[serde(flatten)]
    pub content: RouteContent,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub last_viewed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RouteDocument {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.is_public || self.is_owned_by(user_id)
    }

    /// Cloudinary ids of every image referenced anywhere in the document
    pub fn image_public_ids(&self) -> Vec<String> {
        let content = &self.content;
        let photos = content
            .photos
            .iter()
            .map(|p| (p.public_id.as_deref(), p.url.as_str()));
        let attached = content
            .pois
            .iter()
            .flat_map(|poi| poi.photos.iter())
            .chain(content.places.iter().flat_map(|place| place.photos.iter()))
            .chain(content.lines.iter().flat_map(|line| line.photos.iter()))
            .map(|p| (p.public_id.as_deref(), p.url.as_str()));

        let mut ids: Vec<String> = Vec::new();
        for (public_id, url) in photos.chain(attached) {
            let id = match public_id {
                Some(id) => Some(id.to_string()),
                None => public_id_from_url(url),
            };
            if let Some(id) = id {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRoute {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    pub name: String,
    #[serde(default = "default_route_color")]
    pub color: String,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpx_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_gpx: Option<String>,
    pub geojson: FeatureCollection,
    #[serde(default)]
    pub statistics: RouteStatistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceSummary>,
    #[serde(default)]
    pub unpaved_sections: Vec<UnpavedSection>,
    #[serde(default)]
    pub status: ProcessingStatus,
    /// Client-only fields that are stored and returned untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_route_color() -> String {
    "#ff4d4d".to_string()
}

fn default_visible() -> bool {
    true
}

/// Distances in metres, times in seconds, speed in m/s
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatistics {
    pub total_distance: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub max_elevation: f64,
    pub min_elevation: f64,
    pub average_speed: f64,
    pub moving_time: f64,
    pub total_time: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Paved,
    Unpaved,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSummary {
    #[serde(default)]
    pub surface_types: Vec<SurfaceShare>,
    #[serde(default)]
    pub elevation_profile: Vec<ElevationSample>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SurfaceShare {
    #[serde(rename = "type")]
    pub surface: Surface,
    pub percentage: f64,
    pub distance: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ElevationSample {
    pub distance: f64,
    pub elevation: f64,
    pub grade: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnpavedSection {
    pub start_index: usize,
    pub end_index: usize,
    pub coordinates: Vec<[f64; 2]>,
    pub surface_type: Surface,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub processing_state: ProcessingState,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessingError>,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        ProcessingStatus {
            processing_state: ProcessingState::Pending,
            progress: 0,
            error: None,
        }
    }
}

impl ProcessingStatus {
    pub fn completed() -> Self {
        ProcessingStatus {
            processing_state: ProcessingState::Completed,
            progress: 100,
            error: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessingError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Pois {
    #[serde(default)]
    pub draggable: Vec<Poi>,
    #[serde(default)]
    pub places: Vec<Poi>,
}

impl Pois {
    pub fn iter(&self) -> impl Iterator<Item = &Poi> {
        self.draggable.iter().chain(self.places.iter())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum PoiCategory {
    RoadInformation,
    Accommodation,
    FoodDrink,
    NaturalFeatures,
    EventInformation,
    TownServices,
    Transportation,
}

impl PoiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiCategory::RoadInformation => "road-information",
            PoiCategory::Accommodation => "accommodation",
            PoiCategory::FoodDrink => "food-drink",
            PoiCategory::NaturalFeatures => "natural-features",
            PoiCategory::EventInformation => "event-information",
            PoiCategory::TownServices => "town-services",
            PoiCategory::Transportation => "transportation",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Poi {
    pub id: String,
    pub position: LatLng,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: PoiCategory,
    pub icon: String,
    #[serde(default)]
    pub photos: Vec<AttachedPhoto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<PoiStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PoiStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

/// Photo hanging off a POI, place or line
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttachedPhoto {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,
    pub name: String,
    pub url: String,
    pub thumbnail_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<LatLng>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Place {
    pub id: String,
    pub name: String,
    /// [lon, lat]
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub photos: Vec<AttachedPhoto>,
}
