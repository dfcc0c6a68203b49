//! Screen-space clustering of POIs and photos for the public map view.

use geo::HaversineDistance;
use geo_types::Point;
use geojson::{Feature, FeatureCollection, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::model::route::{PoiCategory, RouteDocument};

/// Web mercator ground resolution at zoom 0 on the equator
const EQUATOR_METRES_PER_PIXEL: f64 = 156_543.033_92;
pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 20.0;

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Poi,
    Photo,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClusterItem {
    pub id: String,
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<PoiCategory>,
    pub lon: f64,
    pub lat: f64,
}

impl ClusterItem {
    fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Cluster {
    pub id: String,
    /// Mean [lon, lat] of the members
    pub center: [f64; 2],
    pub items: Vec<ClusterItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClusterOrItem {
    Cluster(Cluster),
    Item(ClusterItem),
}

pub fn cluster_radius_px(zoom: f64, device: Device) -> f64 {
    let desktop = if zoom < 8.0 {
        80.0
    } else if zoom < 10.0 {
        60.0
    } else if zoom < 12.0 {
        50.0
    } else {
        40.0
    };
    match device {
        Device::Desktop => desktop,
        Device::Mobile => desktop * 2.0,
    }
}

/// Map zoom bounded to the tile pyramid; `None` for NaN or infinities
pub fn normalize_zoom(zoom: f64) -> Option<f64> {
    zoom.is_finite().then(|| zoom.clamp(MIN_ZOOM, MAX_ZOOM))
}

pub fn metres_per_pixel(zoom: f64, lat: f64) -> f64 {
    EQUATOR_METRES_PER_PIXEL * lat.to_radians().cos() / 2f64.powf(zoom)
}

/// All POIs plus the photos that carry a location
pub fn items_from_route(route: &RouteDocument) -> Vec<ClusterItem> {
    let pois = route.content.pois.iter().map(|poi| ClusterItem {
        id: poi.id.clone(),
        kind: ItemKind::Poi,
        category: Some(poi.category),
        lon: poi.position.lng,
        lat: poi.position.lat,
    });
    let photos = route.content.photos.iter().filter_map(|photo| {
        photo.coordinates.map(|c| ClusterItem {
            id: photo.id.clone(),
            kind: ItemKind::Photo,
            category: None,
            lon: c.lng,
            lat: c.lat,
        })
    });
    pois.chain(photos).collect()
}

pub fn cluster(items: &[ClusterItem], zoom: f64, device: Device) -> Vec<ClusterOrItem> {
    cluster_with_radius(items, zoom, cluster_radius_px(zoom, device))
}

/// Greedy bucketing: each unassigned seed takes every unassigned item within
/// `radius_px` screen pixels of it. Seeds are taken in category name order,
/// uncategorised items first. A radius of 0 leaves everything unclustered.
pub fn cluster_with_radius(items: &[ClusterItem], zoom: f64, radius_px: f64) -> Vec<ClusterOrItem> {
    let mut sorted: Vec<&ClusterItem> = items.iter().collect();
    sorted.sort_by_key(|item| item.category.map(|c| c.as_str()));

    if radius_px <= 0.0 {
        return sorted
            .into_iter()
            .cloned()
            .map(ClusterOrItem::Item)
            .collect();
    }

    let mut assigned = vec![false; sorted.len()];
    let mut output = Vec::new();
    for i in 0..sorted.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let seed = sorted[i];
        let threshold = radius_px * metres_per_pixel(zoom, seed.lat);
        let mut members = vec![seed.clone()];
        for j in (i + 1)..sorted.len() {
            if !assigned[j] && seed.point().haversine_distance(&sorted[j].point()) <= threshold {
                assigned[j] = true;
                members.push(sorted[j].clone());
            }
        }
        if members.len() == 1 {
            output.push(ClusterOrItem::Item(members.remove(0)));
        } else {
            let n = members.len() as f64;
            let lon = members.iter().map(|m| m.lon).sum::<f64>() / n;
            let lat = members.iter().map(|m| m.lat).sum::<f64>() / n;
            output.push(ClusterOrItem::Cluster(Cluster {
                id: format!("cluster-{}", seed.id),
                center: [lon, lat],
                items: members,
            }));
        }
    }
    output
}

/// Smallest zoom above `zoom` at which the members stop forming a single group
pub fn expansion_zoom(cluster: &Cluster, zoom: f64, device: Device) -> f64 {
    let Some(zoom) = normalize_zoom(zoom) else {
        return MAX_ZOOM;
    };
    let first = zoom.floor() as u8 + 1;
    (first..MAX_ZOOM as u8)
        .map(f64::from)
        .find(|&next| self::cluster(&cluster.items, next, device).len() > 1)
        .unwrap_or(MAX_ZOOM)
}

pub fn to_feature_collection(
    clustered: &[ClusterOrItem],
    zoom: f64,
    device: Device,
) -> FeatureCollection {
    let features = clustered
        .iter()
        .map(|entry| {
            let (position, properties) = match entry {
                ClusterOrItem::Cluster(c) => (
                    c.center,
                    json!({
                        "id": c.id,
                        "cluster": true,
                        "point_count": c.items.len(),
                        "expansion_zoom": expansion_zoom(c, zoom, device),
                        "items": c.items,
                    }),
                ),
                ClusterOrItem::Item(item) => (
                    [item.lon, item.lat],
                    json!({
                        "id": item.id,
                        "cluster": false,
                        "kind": item.kind,
                        "category": item.category,
                    }),
                ),
            };
            Feature {
                geometry: Some(Geometry::new(geojson::Value::Point(position.to_vec()))),
                properties: properties.as_object().cloned(),
                ..Default::default()
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
