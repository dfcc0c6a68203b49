use chrono::{DateTime, Utc};
use gpx::{Gpx, Waypoint};
use tracing::{info, instrument};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lon: f64,
    pub lat: f64,
    pub ele: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl TrackPoint {
    pub fn new(lon: f64, lat: f64, ele: Option<f64>) -> Self {
        TrackPoint {
            lon,
            lat,
            ele,
            time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub description: Option<String>,
    pub points: Vec<TrackPoint>,
}

impl Track {
    /// Elevations of the points that carry one, in track order
    pub fn elevations(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.ele).collect()
    }
}

#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn parse(bytes: &[u8]) -> Result<Track> {
    let gpx_data = gpx::read(bytes)?;
    info!("number of tracks in gpx: {}", gpx_data.tracks.len());
    track_from_gpx(gpx_data)
}

fn track_from_gpx(gpx_data: Gpx) -> Result<Track> {
    let track_points: Vec<TrackPoint> = gpx_data
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .filter_map(to_track_point)
        .collect();

    // Planned routes exported without a recorded track only carry <rtept>s
    let points = if track_points.is_empty() {
        gpx_data
            .routes
            .iter()
            .flat_map(|route| route.points.iter())
            .filter_map(to_track_point)
            .collect()
    } else {
        track_points
    };

    if points.is_empty() {
        return Err(Error::Gpx(
            "No valid track points found in GPX file".to_string(),
        ));
    }

    let metadata = gpx_data.metadata.as_ref();
    let name = gpx_data
        .tracks
        .iter()
        .find_map(|t| t.name.clone())
        .or_else(|| gpx_data.routes.iter().find_map(|r| r.name.clone()))
        .or_else(|| metadata.and_then(|m| m.name.clone()));
    let description = gpx_data
        .tracks
        .iter()
        .find_map(|t| t.description.clone())
        .or_else(|| metadata.and_then(|m| m.description.clone()));

    Ok(Track {
        name,
        description,
        points,
    })
}

fn to_track_point(waypoint: &Waypoint) -> Option<TrackPoint> {
    let point = waypoint.point();
    if !point.x().is_finite() || !point.y().is_finite() {
        return None;
    }
    let time = waypoint
        .time
        .as_ref()
        .and_then(|t| t.format().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc));
    Some(TrackPoint {
        lon: point.x(),
        lat: point.y(),
        ele: waypoint.elevation.filter(|e| e.is_finite()),
        time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>Metadata name</name></metadata>
  <trk>
    <name>Mount Wellington loop</name>
    <trkseg>
      <trkpt lat="-42.8821" lon="147.3272"><ele>10</ele><time>2024-03-01T08:00:00Z</time></trkpt>
      <trkpt lat="-42.8830" lon="147.3200"><ele>25</ele><time>2024-03-01T08:05:00Z</time></trkpt>
      <trkpt lat="-42.8850" lon="147.3100"><ele>60</ele><time>2024-03-01T08:10:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn parses_points_elevation_and_name() {
        let track = parse(TRACK.as_bytes()).unwrap();
        assert_eq!(track.name.as_deref(), Some("Mount Wellington loop"));
        assert_eq!(track.points.len(), 3);
        assert_eq!(track.elevations(), vec![10.0, 25.0, 60.0]);
        assert!((track.points[0].lon - 147.3272).abs() < 1e-9);
        assert!((track.points[0].lat + 42.8821).abs() < 1e-9);
        assert!(track.points[0].time.is_some());
    }

    #[test]
    fn falls_back_to_route_points() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <rte>
    <name>Planned</name>
    <rtept lat="-41.0" lon="146.0"></rtept>
    <rtept lat="-41.1" lon="146.1"></rtept>
  </rte>
</gpx>"#;
        let track = parse(gpx.as_bytes()).unwrap();
        assert_eq!(track.name.as_deref(), Some("Planned"));
        assert_eq!(track.points.len(), 2);
        assert!(track.elevations().is_empty());
    }

    #[test]
    fn empty_file_is_rejected() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Nothing</name><trkseg></trkseg></trk>
</gpx>"#;
        assert_matches!(parse(gpx.as_bytes()), Err(Error::Gpx(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_matches!(parse(b"not a gpx file"), Err(Error::Gpx(_)));
    }
}
