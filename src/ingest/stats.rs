use geo::HaversineDistance;
use geo_types::{LineString, Point};

use crate::{
    geo_ext::Distance,
    ingest::track::TrackPoint,
    types::model::route::{ElevationSample, RouteStatistics},
};

/// Points averaged around each elevation sample (centred, clipped at the ends)
pub const SMOOTHING_WINDOW: usize = 5;

/// Legs slower than this count as stopped
pub const MOVING_SPEED_THRESHOLD: f64 = 0.5;

pub fn leg_distance(a: &TrackPoint, b: &TrackPoint) -> f64 {
    Point::new(a.lon, a.lat).haversine_distance(&Point::new(b.lon, b.lat))
}

pub fn total_distance(points: &[TrackPoint]) -> f64 {
    points
        .iter()
        .map(|p| (p.lon, p.lat))
        .collect::<LineString<f64>>()
        .distance()
}

pub fn smooth_elevations(elevations: &[f64], window: usize) -> Vec<f64> {
    if elevations.len() <= window {
        return elevations.to_vec();
    }
    let half = window / 2;
    (0..elevations.len())
        .map(|i| {
            let from = i.saturating_sub(half);
            let to = (i + half + 1).min(elevations.len());
            let slice = &elevations[from..to];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Total (gain, loss) in metres over an already smoothed series
pub fn elevation_change(elevations: &[f64]) -> (f64, f64) {
    elevations
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(gain, loss), diff| {
            if diff > 0.0 {
                (gain + diff, loss)
            } else {
                (gain, loss - diff)
            }
        })
}

/// Distance/elevation/grade samples for the points that carry elevation
pub fn elevation_profile(points: &[TrackPoint]) -> Vec<ElevationSample> {
    let mut samples: Vec<ElevationSample> = Vec::with_capacity(points.len());
    let mut distance = 0.0;
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            distance += leg_distance(&points[i - 1], point);
        }
        let Some(elevation) = point.ele else {
            continue;
        };
        let grade = match samples.last() {
            Some(prev) if distance > prev.distance => {
                (elevation - prev.elevation) / (distance - prev.distance) * 100.0
            }
            _ => 0.0,
        };
        samples.push(ElevationSample {
            distance,
            elevation,
            grade,
        });
    }
    samples
}

pub fn compute(points: &[TrackPoint]) -> RouteStatistics {
    let total_distance = total_distance(points);

    let elevations: Vec<f64> = points.iter().filter_map(|p| p.ele).collect();
    let (max_elevation, min_elevation) = if elevations.is_empty() {
        (0.0, 0.0)
    } else {
        elevations
            .iter()
            .fold((f64::MIN, f64::MAX), |(max, min), &e| (max.max(e), min.min(e)))
    };
    let smoothed = smooth_elevations(&elevations, SMOOTHING_WINDOW);
    let (elevation_gain, elevation_loss) = elevation_change(&smoothed);

    let (moving_time, total_time) = timing(points);
    let average_speed = if moving_time > 0.0 {
        total_distance / moving_time
    } else {
        0.0
    };

    RouteStatistics {
        total_distance,
        elevation_gain,
        elevation_loss,
        max_elevation,
        min_elevation,
        average_speed,
        moving_time,
        total_time,
    }
}

/// (moving, total) seconds; zero when the track carries no timestamps
fn timing(points: &[TrackPoint]) -> (f64, f64) {
    let timed: Vec<&TrackPoint> = points.iter().filter(|p| p.time.is_some()).collect();
    let (Some(first), Some(last)) = (timed.first(), timed.last()) else {
        return (0.0, 0.0);
    };
    let seconds = |a: &TrackPoint, b: &TrackPoint| match (a.time, b.time) {
        (Some(ta), Some(tb)) => (tb - ta).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };
    let total = seconds(first, last).max(0.0);
    let moving = timed
        .windows(2)
        .map(|w| {
            let elapsed = seconds(w[0], w[1]);
            if elapsed > 0.0 && leg_distance(w[0], w[1]) / elapsed >= MOVING_SPEED_THRESHOLD {
                elapsed
            } else {
                0.0
            }
        })
        .sum();
    (moving, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn track(coords: &[(f64, f64)]) -> Vec<TrackPoint> {
        coords
            .iter()
            .map(|&(lon, lat)| TrackPoint::new(lon, lat, None))
            .collect()
    }

    #[test]
    fn single_point_has_zero_distance() {
        assert_eq!(total_distance(&track(&[(147.3, -42.9)])), 0.0);
        assert_eq!(total_distance(&[]), 0.0);
    }

    #[test]
    fn distance_is_symmetric_under_reversal() {
        let points = track(&[
            (147.32, -42.88),
            (147.30, -42.89),
            (147.25, -42.91),
            (147.20, -42.87),
        ]);
        let mut reversed = points.clone();
        reversed.reverse();
        let forward = total_distance(&points);
        assert!(forward > 0.0);
        assert!((forward - total_distance(&reversed)).abs() < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111km() {
        let d = total_distance(&track(&[(0.0, 0.0), (0.0, 1.0)]));
        assert!((d - 111_195.0).abs() < 50.0, "{d}");
    }

    #[test]
    fn short_series_is_not_smoothed() {
        let e = vec![1.0, 5.0, 2.0];
        assert_eq!(smooth_elevations(&e, SMOOTHING_WINDOW), e);
    }

    #[test]
    fn smoothing_clips_window_at_ends() {
        let e = vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        let s = smooth_elevations(&e, 5);
        assert_eq!(s[0], 10.0); // mean of 0,10,20
        assert_eq!(s[2], 20.0); // mean of 0..40
        assert_eq!(s[5], 40.0); // mean of 30,40,50
    }

    #[test]
    fn monotonic_climb_has_no_loss() {
        let elevations: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 7.5).collect();
        let smoothed = smooth_elevations(&elevations, SMOOTHING_WINDOW);
        let (gain, loss) = elevation_change(&smoothed);
        assert_eq!(loss, 0.0);
        let expected = smoothed[smoothed.len() - 1] - smoothed[0];
        assert!((gain - expected).abs() < 1e-9);
        // smoothing only trims the ends of the climb
        assert!(gain <= elevations[19] - elevations[0]);
        assert!(gain > 0.8 * (elevations[19] - elevations[0]));
    }

    #[test]
    fn noise_is_damped_by_smoothing() {
        let noisy: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 104.0 })
            .collect();
        let (raw_gain, _) = elevation_change(&noisy);
        let (smoothed_gain, _) = elevation_change(&smooth_elevations(&noisy, SMOOTHING_WINDOW));
        assert!(smoothed_gain < raw_gain / 2.0);
    }

    #[test]
    fn compute_reports_extremes_and_change() {
        let points: Vec<TrackPoint> = (0..10)
            .map(|i| TrackPoint::new(147.0 + i as f64 * 0.001, -42.0, Some(50.0 + i as f64 * 10.0)))
            .collect();
        let stats = compute(&points);
        assert_eq!(stats.max_elevation, 140.0);
        assert_eq!(stats.min_elevation, 50.0);
        assert_eq!(stats.elevation_loss, 0.0);
        assert!(stats.elevation_gain > 0.0);
        assert!(stats.total_distance > 0.0);
        assert_eq!(stats.total_time, 0.0);
        assert_eq!(stats.average_speed, 0.0);
    }

    #[test]
    fn timing_excludes_stopped_legs() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut points = track(&[(147.0, -42.0), (147.001, -42.0), (147.001, -42.0)]);
        points[0].time = Some(t0);
        points[1].time = Some(t0 + chrono::Duration::seconds(60));
        points[2].time = Some(t0 + chrono::Duration::seconds(360));
        let stats = compute(&points);
        assert_eq!(stats.total_time, 360.0);
        assert_eq!(stats.moving_time, 60.0);
        assert!((stats.average_speed - stats.total_distance / 60.0).abs() < 1e-9);
    }

    #[test]
    fn profile_tracks_cumulative_distance_and_grade() {
        let points = vec![
            TrackPoint::new(0.0, 0.0, Some(0.0)),
            TrackPoint::new(0.0, 0.001, Some(11.1195)),
        ];
        let profile = elevation_profile(&points);
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[0].grade, 0.0);
        assert!((profile[1].distance - 111.195).abs() < 0.1);
        assert!((profile[1].grade - 10.0).abs() < 0.05);
    }
}
