use geo::{BoundingRect, HaversineDistance};
use geo_types::{CoordFloat, CoordNum, LineString, MultiLineString, Point};
use geojson::{Feature, FeatureCollection, Geometry};

//Get the bounding box for a geometry as a vector
pub trait BoundingBox<N> {
    fn bounding_box(&self) -> Option<Vec<N>>;
}

impl<T, N> BoundingBox<N> for T
where
    T: BoundingRect<N>,
    N: CoordNum,
{
    fn bounding_box(&self) -> Option<Vec<N>> {
        self.bounding_rect()
            .into()
            .map(|r| vec![r.min().x, r.min().y, r.max().x, r.max().y])
    }
}

/// Great-circle length in metres along consecutive points
pub trait Distance<N> {
    fn distance(&self) -> N;
}

impl<N> Distance<N> for LineString<N>
where
    N: std::iter::Sum + CoordFloat,
    Point<N>: HaversineDistance<N>,
{
    fn distance(&self) -> N {
        self.points()
            .collect::<Vec<Point<N>>>()
            .windows(2)
            .map(|p| p[0].haversine_distance(&p[1]))
            .sum()
    }
}

impl<N> Distance<N> for MultiLineString<N>
where
    N: std::iter::Sum + CoordFloat,
    Point<N>: HaversineDistance<N>,
{
    fn distance(&self) -> N {
        self.iter().map(|line| line.distance()).sum()
    }
}

impl Distance<f64> for geojson::Value {
    fn distance(&self) -> f64 {
        match self {
            geojson::Value::LineString(_) => LineString::<f64>::try_from(self)
                .map(|ls| ls.distance())
                .unwrap_or(0.0),
            geojson::Value::MultiLineString(_) => MultiLineString::<f64>::try_from(self)
                .map(|mls| mls.distance())
                .unwrap_or(0.0),
            geojson::Value::GeometryCollection(geoms) => {
                geoms.iter().map(|geom| geom.value.distance()).sum()
            }
            _ => 0.0,
        }
    }
}

impl Distance<f64> for Geometry {
    fn distance(&self) -> f64 {
        self.value.distance()
    }
}

impl Distance<f64> for Feature {
    fn distance(&self) -> f64 {
        self.geometry.as_ref().map_or(0.0, |geom| geom.distance())
    }
}

impl Distance<f64> for FeatureCollection {
    fn distance(&self) -> f64 {
        self.features.iter().map(|feat| feat.distance()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::line_string;

    #[test]
    fn bounding_box_orders_min_then_max() {
        let ls: LineString<f64> = line_string![(x: 147.0, y: -42.0), (x: 146.5, y: -41.0)];
        assert_eq!(ls.bounding_box(), Some(vec![146.5, -42.0, 147.0, -41.0]));
    }

    #[test]
    fn empty_line_has_no_bounding_box() {
        let ls: LineString<f64> = LineString::new(vec![]);
        assert_eq!(ls.bounding_box(), None);
    }

    #[test]
    fn feature_collection_distance_matches_line_length() {
        let ls: LineString<f64> = line_string![(x: 0.0, y: 0.0), (x: 0.0, y: 1.0)];
        let feature = Feature {
            geometry: Some(Geometry::new((&ls).into())),
            ..Default::default()
        };
        let fc = FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        };
        // one degree of latitude
        assert!((fc.distance() - 111_195.0).abs() < 50.0);
        assert!((fc.distance() - ls.distance()).abs() < 1e-9);
    }
}
