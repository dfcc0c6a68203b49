//! GPX upload processing: parse, measure, tag surfaces, emit GeoJSON.

pub mod stats;
pub mod surface;
pub mod track;

use geo_types::LineString;
use geojson::{Feature, FeatureCollection, Geometry};
use serde_json::Map;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    error::Result,
    geo_ext::BoundingBox,
    types::{
        feature::{CoordinateProperties, FeatureProperties},
        model::route::{ProcessedRoute, ProcessingStatus, SurfaceSummary},
    },
};

use self::{surface::RoadIndex, track::TrackPoint};

const DEFAULT_ROUTE_NAME: &str = "Unnamed Route";

/// Builds a processed route from raw GPX bytes. Surface detection only runs
/// when a road network has been loaded.
#[instrument(skip(bytes, roads), fields(size = bytes.len()))]
pub fn process(
    name: Option<String>,
    bytes: &[u8],
    roads: Option<&RoadIndex>,
) -> Result<ProcessedRoute> {
    let track = track::parse(bytes)?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| track.name.clone())
        .unwrap_or_else(|| DEFAULT_ROUTE_NAME.to_string());

    let statistics = stats::compute(&track.points);
    let feature = track_feature(
        &name,
        track.description.clone(),
        &track.points,
        statistics.total_distance,
    )?;

    let (surface_types, unpaved_sections) = match roads {
        Some(index) => {
            let surfaces = surface::detect(&track.points, index);
            (
                surface::composition(&track.points, &surfaces),
                surface::unpaved_sections(&track.points, &surfaces),
            )
        }
        None => {
            debug!("no road network loaded, skipping surface detection");
            (vec![], vec![])
        }
    };
    info!(
        "processed {} points, {:.0} m, {} unpaved sections",
        track.points.len(),
        statistics.total_distance,
        unpaved_sections.len()
    );

    let id = Uuid::new_v4().to_string();
    Ok(ProcessedRoute {
        route_id: Some(format!("route-{id}")),
        id,
        name,
        color: "#ff4d4d".to_string(),
        is_visible: true,
        gpx_data: None,
        raw_gpx: Some(String::from_utf8_lossy(bytes).into_owned()),
        geojson: FeatureCollection {
            bbox: feature.bbox.clone(),
            features: vec![feature],
            foreign_members: None,
        },
        statistics,
        surface: Some(SurfaceSummary {
            surface_types,
            elevation_profile: stats::elevation_profile(&track.points),
        }),
        unpaved_sections,
        status: ProcessingStatus::completed(),
        extra: Map::new(),
    })
}

fn track_feature(
    name: &str,
    description: Option<String>,
    points: &[TrackPoint],
    distance: f64,
) -> Result<Feature> {
    let bounding_box = points
        .iter()
        .map(|p| (p.lon, p.lat))
        .collect::<LineString<f64>>()
        .bounding_box();
    let coordinates: Vec<Vec<f64>> = points
        .iter()
        .map(|p| match p.ele {
            Some(ele) => vec![p.lon, p.lat, ele],
            None => vec![p.lon, p.lat],
        })
        .collect();
    let properties = FeatureProperties {
        name: name.to_string(),
        description,
        distance,
        coordinate_properties: CoordinateProperties {
            elevation: points.iter().map(|p| p.ele.unwrap_or(0.0)).collect(),
        },
    };
    Ok(Feature {
        bbox: bounding_box.to_owned(),
        geometry: Some(Geometry {
            bbox: bounding_box,
            value: geojson::Value::LineString(coordinates),
            foreign_members: None,
        }),
        properties: Some(properties.try_into()?),
        ..Default::default()
    })
}
