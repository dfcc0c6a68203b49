//! Paved/unpaved tagging of track points against an indexed road network.

use std::{collections::HashMap, path::Path};

use color_eyre::eyre::{Result, WrapErr};
use geojson::{FeatureCollection, GeoJson};
use rstar::{
    primitives::{GeomWithData, Line},
    PointDistance, RTree,
};
use tracing::{debug, info, instrument};

use crate::{
    ingest::{stats::leg_distance, track::TrackPoint},
    types::model::route::{Surface, SurfaceShare, UnpavedSection},
};

const PAVED_SURFACES: &[&str] = &[
    "paved",
    "asphalt",
    "concrete",
    "sealed",
    "bitumen",
    "tar",
    "chipseal",
    "paving_stones",
];

const UNPAVED_SURFACES: &[&str] = &[
    "unpaved",
    "gravel",
    "fine",
    "fine_gravel",
    "dirt",
    "earth",
    "ground",
    "sand",
    "grass",
    "compacted",
    "crushed_stone",
    "woodchips",
    "pebblestone",
    "mud",
    "rock",
    "stones",
    "gravel;grass",
];

const UNPAVED_HIGHWAYS: &[&str] = &["track", "trail", "path"];

/// Roughly five metres, in degrees
pub const SEARCH_RADIUS_DEG: f64 = 0.00005;

const SMOOTHING_WINDOW: usize = 5;
const SMOOTHING_THRESHOLD: f64 = 0.4;
const INVERSE_SMOOTHING_THRESHOLD: f64 = 0.4;
pub const MIN_SEGMENT_LENGTH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoadProperties {
    pub surface: Option<String>,
    pub highway: Option<String>,
}

type RoadSegment = GeomWithData<Line<[f64; 2]>, usize>;

pub struct RoadIndex {
    tree: RTree<RoadSegment>,
    roads: Vec<RoadProperties>,
}

impl RoadIndex {
    /// Indexes every segment of the LineString/MultiLineString features
    pub fn from_feature_collection(collection: &FeatureCollection) -> Self {
        let mut roads = Vec::new();
        let mut segments = Vec::new();
        for feature in &collection.features {
            let lines: Vec<&Vec<Vec<f64>>> = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(geojson::Value::LineString(line)) => vec![line],
                Some(geojson::Value::MultiLineString(lines)) => lines.iter().collect(),
                _ => continue,
            };
            let road_id = roads.len();
            roads.push(RoadProperties {
                surface: string_property(feature, "surface"),
                highway: string_property(feature, "highway"),
            });
            for line in lines {
                segments.extend(
                    line.windows(2)
                        .filter(|w| w[0].len() >= 2 && w[1].len() >= 2)
                        .map(|w| {
                            GeomWithData::new(
                                Line::new([w[0][0], w[0][1]], [w[1][0], w[1][1]]),
                                road_id,
                            )
                        }),
                );
            }
        }
        RoadIndex {
            tree: RTree::bulk_load(segments),
            roads,
        }
    }

    pub fn from_geojson_str(data: &str) -> Result<Self> {
        let geojson: GeoJson = data.parse().wrap_err("Road network is not valid GeoJSON")?;
        let collection = FeatureCollection::try_from(geojson)
            .wrap_err("Road network must be a FeatureCollection")?;
        Ok(Self::from_feature_collection(&collection))
    }

    #[instrument]
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read road network {}", path.display()))?;
        let index = Self::from_geojson_str(&data)?;
        info!(
            "indexed {} road segments from {} roads",
            index.tree.size(),
            index.roads.len()
        );
        Ok(index)
    }

    pub fn segment_count(&self) -> usize {
        self.tree.size()
    }

    pub fn nearest_road(&self, lon: f64, lat: f64, radius: f64) -> Option<&RoadProperties> {
        let query = [lon, lat];
        self.tree
            .nearest_neighbor(&query)
            .filter(|segment| segment.distance_2(&query) <= radius * radius)
            .and_then(|segment| self.roads.get(segment.data))
    }
}

fn string_property(feature: &geojson::Feature, name: &str) -> Option<String> {
    feature
        .property(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase())
}

pub fn classify(road: Option<&RoadProperties>) -> Surface {
    let Some(road) = road else {
        return Surface::Unpaved;
    };
    let surface = road.surface.as_deref().unwrap_or_default();
    let highway = road.highway.as_deref().unwrap_or_default();
    if PAVED_SURFACES.contains(&surface) {
        Surface::Paved
    } else if UNPAVED_SURFACES.contains(&surface) || UNPAVED_HIGHWAYS.contains(&highway) {
        Surface::Unpaved
    } else {
        Surface::Paved
    }
}

/// Classified and cleaned surface per point, index aligned with `points`
#[instrument(skip_all, fields(points = points.len()))]
pub fn detect(points: &[TrackPoint], index: &RoadIndex) -> Vec<Surface> {
    let mut surfaces: Vec<Surface> = points
        .iter()
        .map(|p| classify(index.nearest_road(p.lon, p.lat, SEARCH_RADIUS_DEG)))
        .collect();
    smooth(&mut surfaces);
    inverse_smooth(&mut surfaces);
    remove_chatter(&mut surfaces, MIN_SEGMENT_LENGTH);
    surfaces
}

fn unpaved_ratio(surfaces: &[Surface], i: usize) -> f64 {
    let half = SMOOTHING_WINDOW / 2;
    let from = i.saturating_sub(half);
    let to = (i + half).min(surfaces.len() - 1);
    let window = &surfaces[from..=to];
    let unpaved = window.iter().filter(|s| **s == Surface::Unpaved).count();
    unpaved as f64 / window.len() as f64
}

/// Isolated unpaved points become paved. Updates in place, so earlier
/// decisions feed later windows.
pub fn smooth(surfaces: &mut [Surface]) {
    if surfaces.len() < SMOOTHING_WINDOW {
        return;
    }
    for i in 0..surfaces.len() {
        if surfaces[i] == Surface::Unpaved && unpaved_ratio(surfaces, i) < SMOOTHING_THRESHOLD {
            surfaces[i] = Surface::Paved;
        }
    }
}

/// Paved points surrounded by mostly unpaved ones become unpaved
pub fn inverse_smooth(surfaces: &mut [Surface]) {
    if surfaces.len() < SMOOTHING_WINDOW {
        return;
    }
    for i in 0..surfaces.len() {
        if surfaces[i] == Surface::Paved
            && unpaved_ratio(surfaces, i) > INVERSE_SMOOTHING_THRESHOLD
        {
            surfaces[i] = Surface::Unpaved;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Run {
    surface: Surface,
    start: usize,
    len: usize,
}

fn runs(surfaces: &[Surface]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for (i, surface) in surfaces.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.surface == *surface => run.len += 1,
            _ => runs.push(Run {
                surface: *surface,
                start: i,
                len: 1,
            }),
        }
    }
    runs
}

/// Folds runs shorter than `min_len` points into their neighbours. Runs are
/// measured once up front; replacements do not cascade.
pub fn remove_chatter(surfaces: &mut [Surface], min_len: usize) {
    if surfaces.len() < min_len {
        return;
    }
    let runs = runs(surfaces);
    let before = runs.len();
    for (i, run) in runs.iter().enumerate() {
        if run.len >= min_len {
            continue;
        }
        let replacement = if i == 0 && runs.len() > 1 {
            Some(runs[1].surface)
        } else if i == runs.len() - 1 && runs.len() > 1 {
            Some(runs[i - 1].surface)
        } else if runs.len() > 2 {
            let (prev, next) = (runs[i - 1], runs[i + 1]);
            if prev.surface == next.surface || prev.len >= next.len {
                Some(prev.surface)
            } else {
                Some(next.surface)
            }
        } else {
            None
        };
        if let Some(surface) = replacement {
            surfaces[run.start..run.start + run.len].fill(surface);
        }
    }
    debug!(
        "surface runs reduced from {} to {}",
        before,
        self::runs(surfaces).len()
    );
}

pub fn unpaved_sections(points: &[TrackPoint], surfaces: &[Surface]) -> Vec<UnpavedSection> {
    runs(surfaces)
        .into_iter()
        .filter(|run| run.surface == Surface::Unpaved)
        .map(|run| UnpavedSection {
            start_index: run.start,
            end_index: run.start + run.len - 1,
            coordinates: points[run.start..run.start + run.len]
                .iter()
                .map(|p| [p.lon, p.lat])
                .collect(),
            surface_type: Surface::Unpaved,
        })
        .collect()
}

/// Distance share per surface; each leg counts toward its starting point's surface
pub fn composition(points: &[TrackPoint], surfaces: &[Surface]) -> Vec<SurfaceShare> {
    let mut distances: HashMap<Surface, f64> = HashMap::new();
    for (i, leg) in points.windows(2).enumerate() {
        if let Some(surface) = surfaces.get(i) {
            *distances.entry(*surface).or_insert(0.0) += leg_distance(&leg[0], &leg[1]);
        }
    }
    let total: f64 = distances.values().sum();
    if total <= 0.0 {
        return vec![];
    }
    [Surface::Paved, Surface::Unpaved]
        .into_iter()
        .filter_map(|surface| {
            distances.get(&surface).map(|&distance| SurfaceShare {
                surface,
                percentage: distance / total * 100.0,
                distance,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use Surface::{Paved as P, Unpaved as U};

    fn network() -> RoadIndex {
        let fc: FeatureCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "surface": "asphalt", "highway": "primary" },
                    "geometry": { "type": "LineString", "coordinates": [[147.0, -42.0], [147.01, -42.0]] }
                },
                {
                    "type": "Feature",
                    "properties": { "highway": "track" },
                    "geometry": { "type": "LineString", "coordinates": [[147.01, -42.0], [147.02, -42.0]] }
                },
                {
                    "type": "Feature",
                    "properties": { "surface": "Gravel" },
                    "geometry": { "type": "MultiLineString", "coordinates": [[[147.0, -41.0], [147.0, -41.01]]] }
                }
            ]
        }))
        .unwrap();
        RoadIndex::from_feature_collection(&fc)
    }

    #[test]
    fn indexes_all_segments() {
        assert_eq!(network().segment_count(), 3);
    }

    #[test]
    fn nearest_road_respects_radius() {
        let index = network();
        let road = index.nearest_road(147.005, -42.00002, SEARCH_RADIUS_DEG).unwrap();
        assert_eq!(road.surface.as_deref(), Some("asphalt"));
        assert!(index.nearest_road(147.005, -42.001, SEARCH_RADIUS_DEG).is_none());
    }

    #[test]
    fn classification_rules() {
        let index = network();
        assert_eq!(classify(index.nearest_road(147.005, -42.0, SEARCH_RADIUS_DEG)), P);
        assert_eq!(classify(index.nearest_road(147.015, -42.0, SEARCH_RADIUS_DEG)), U);
        // property values are lower-cased on load
        assert_eq!(classify(index.nearest_road(147.0, -41.005, SEARCH_RADIUS_DEG)), U);
        assert_eq!(classify(None), U);
        assert_eq!(classify(Some(&RoadProperties::default())), P);
    }

    #[test]
    fn smoothing_drops_isolated_unpaved_point() {
        let mut s = vec![P, P, P, U, P, P, P];
        smooth(&mut s);
        assert_eq!(s, vec![P; 7]);
    }

    #[test]
    fn inverse_smoothing_fills_paved_hole() {
        let mut s = vec![U, U, U, P, U, U, U];
        inverse_smooth(&mut s);
        assert_eq!(s, vec![U; 7]);
    }

    #[test]
    fn short_series_are_left_alone() {
        let mut s = vec![P, U, P];
        smooth(&mut s);
        remove_chatter(&mut s, MIN_SEGMENT_LENGTH);
        assert_eq!(s, vec![P, U, P]);
    }

    #[test]
    fn chatter_takes_surrounding_type() {
        let mut s: Vec<Surface> = [vec![P; 12], vec![U; 3], vec![P; 12]].concat();
        remove_chatter(&mut s, MIN_SEGMENT_LENGTH);
        assert!(s.iter().all(|x| *x == P));
    }

    #[test]
    fn chatter_between_different_neighbours_takes_longer_one() {
        let mut s: Vec<Surface> = [vec![P; 15], vec![U; 2], vec![P; 1], vec![U; 11]].concat();
        remove_chatter(&mut s, MIN_SEGMENT_LENGTH);
        // the 2-point U run sits between P(15) and P(1): same type either side
        // the 1-point P run sits between U(2) and U(11)
        assert_eq!(s, [vec![P; 17], vec![U; 12]].concat());
    }

    #[test]
    fn leading_short_run_takes_next_type() {
        let mut s: Vec<Surface> = [vec![U; 2], vec![P; 12]].concat();
        remove_chatter(&mut s, MIN_SEGMENT_LENGTH);
        assert_eq!(s, vec![P; 14]);
    }

    #[test]
    fn sections_cover_maximal_unpaved_runs() {
        let points: Vec<TrackPoint> = (0..6)
            .map(|i| TrackPoint::new(147.0 + i as f64 * 0.001, -42.0, None))
            .collect();
        let surfaces = vec![P, U, U, P, U, U];
        let sections = unpaved_sections(&points, &surfaces);
        assert_eq!(sections.len(), 2);
        assert_eq!((sections[0].start_index, sections[0].end_index), (1, 2));
        assert_eq!((sections[1].start_index, sections[1].end_index), (4, 5));
        assert_eq!(sections[1].coordinates.len(), 2);
    }

    #[test]
    fn composition_splits_distance() {
        let points: Vec<TrackPoint> = (0..5)
            .map(|i| TrackPoint::new(147.0 + i as f64 * 0.001, -42.0, None))
            .collect();
        let surfaces = vec![P, P, U, U, U];
        let shares = composition(&points, &surfaces);
        assert_eq!(shares.len(), 2);
        assert!((shares[0].percentage - 50.0).abs() < 1e-6);
        assert!((shares[0].percentage + shares[1].percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn detect_tags_track_section() {
        let index = network();
        let points: Vec<TrackPoint> = (0..40)
            .map(|i| TrackPoint::new(147.0 + i as f64 * 0.0005, -42.0, None))
            .collect();
        let surfaces = detect(&points, &index);
        assert_eq!(surfaces[0], P);
        assert_eq!(surfaces[35], U);
        assert_eq!(unpaved_sections(&points, &surfaces).len(), 1);
    }
}
