//! Vector geometries in the projected grid frame
//!
//! Coordinates are meters in the same projected frame as the grid origin
//! (see [`crate::grid::GridDefinition`]). Vertical extent is optional; a
//! geometry without one is treated as lying at the grid reference altitude.

use crate::core_types::wkt;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Projected XY coordinate (m)
pub type Coord = Point2<f64>;

/// Errors raised when a geometry cannot be used for allocation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// A multi-geometry or ring list had no members
    #[error("geometry is empty")]
    Empty,
    /// A coordinate was NaN or infinite
    #[error("geometry contains a non-finite coordinate")]
    NonFinite,
    /// A line had fewer than two points, or a ring fewer than three
    #[error("{0}")]
    TooFewPoints(&'static str),
    /// Zero total length or area, so no fraction can be formed
    #[error("geometry has zero {0}")]
    Degenerate(&'static str),
    /// `z_min` above `z_max` or non-finite vertical bounds
    #[error("invalid vertical extent [{z_min}, {z_max}]")]
    InvalidVerticalExtent { z_min: f64, z_max: f64 },
    /// WKT text could not be parsed
    #[error("WKT parse error at byte {position}: {message}")]
    Wkt { position: usize, message: String },
}

/// Vertical extent of a geometry (m, same datum as the grid reference altitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerticalExtent {
    pub z_min: f64,
    pub z_max: f64,
}

impl VerticalExtent {
    /// Extent spanning `[z_min, z_max]`
    pub fn new(z_min: f64, z_max: f64) -> Self {
        Self { z_min, z_max }
    }

    /// Zero-thickness extent at a single altitude
    pub fn at(z: f64) -> Self {
        Self { z_min: z, z_max: z }
    }

    /// Thickness (m)
    pub fn height(&self) -> f64 {
        self.z_max - self.z_min
    }

    fn validate(&self) -> Result<(), GeometryError> {
        if !self.z_min.is_finite() || !self.z_max.is_finite() || self.z_min > self.z_max {
            return Err(GeometryError::InvalidVerticalExtent {
                z_min: self.z_min,
                z_max: self.z_max,
            });
        }
        Ok(())
    }
}

/// Polygon with an exterior ring and optional holes
///
/// Rings may be given open or closed; the closing vertex is implied.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    /// Polygon without holes
    pub fn new(exterior: Vec<Coord>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    /// Iterate the exterior followed by every hole
    pub fn rings(&self) -> impl Iterator<Item = &[Coord]> {
        std::iter::once(self.exterior.as_slice())
            .chain(self.interiors.iter().map(Vec::as_slice))
    }
}

/// Planar shape
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Coord),
    LineString(Vec<Coord>),
    Polygon(Polygon),
    MultiLineString(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Polygon>),
}

/// Shape plus optional vertical extent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeometryRecord", into = "GeometryRecord")]
pub struct Geometry {
    pub shape: Shape,
    pub vertical: Option<VerticalExtent>,
}

impl Geometry {
    /// Wrap a shape with no vertical extent
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            vertical: None,
        }
    }

    /// Point at `(x, y)`
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Shape::Point(Coord::new(x, y)))
    }

    /// Polyline through the given vertices
    pub fn line_string<I>(coords: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        Self::new(Shape::LineString(to_coords(coords)))
    }

    /// Polygon without holes
    pub fn polygon<I>(exterior: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        Self::new(Shape::Polygon(Polygon::new(to_coords(exterior))))
    }

    /// Axis-aligned rectangle, handy for area sources such as aprons
    pub fn rectangle(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self::polygon([
            (x_min, y_min),
            (x_max, y_min),
            (x_max, y_max),
            (x_min, y_max),
        ])
    }

    /// Attach a vertical extent
    pub fn with_vertical_extent(mut self, z_min: f64, z_max: f64) -> Self {
        self.vertical = Some(VerticalExtent::new(z_min, z_max));
        self
    }

    /// Parse WKT text (`POINT`, `LINESTRING`, `POLYGON`, `MULTILINESTRING`, `MULTIPOLYGON`)
    pub fn from_wkt(text: &str) -> Result<Self, GeometryError> {
        wkt::parse(text).map(Self::new)
    }

    /// WKT rendering of the planar shape
    pub fn wkt(&self) -> String {
        wkt::format(&self.shape)
    }

    /// Text key identifying this geometry for memoization
    ///
    /// Two geometries with the same key allocate identically.
    pub fn cache_key(&self) -> String {
        match self.vertical {
            Some(v) => format!("{}|{}|{}", self.wkt(), v.z_min, v.z_max),
            None => format!("{}|-|-", self.wkt()),
        }
    }

    /// Check the geometry is usable for allocation
    pub fn validate(&self) -> Result<(), GeometryError> {
        if let Some(v) = &self.vertical {
            v.validate()?;
        }
        match &self.shape {
            Shape::Point(c) => check_finite(std::slice::from_ref(c)),
            Shape::LineString(line) => check_line(line),
            Shape::Polygon(polygon) => check_polygon(polygon),
            Shape::MultiLineString(lines) => {
                if lines.is_empty() {
                    return Err(GeometryError::Empty);
                }
                lines.iter().try_for_each(|l| check_line(l))
            }
            Shape::MultiPolygon(polygons) => {
                if polygons.is_empty() {
                    return Err(GeometryError::Empty);
                }
                polygons.iter().try_for_each(check_polygon)
            }
        }
    }

    /// XY bounding box as `(min, max)` corners
    pub fn bounds_xy(&self) -> (Coord, Coord) {
        let mut min = Coord::new(f64::INFINITY, f64::INFINITY);
        let mut max = Coord::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        self.for_each_coord(|c| {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        });
        (min, max)
    }

    fn for_each_coord(&self, mut f: impl FnMut(&Coord)) {
        match &self.shape {
            Shape::Point(c) => f(c),
            Shape::LineString(line) => line.iter().for_each(f),
            Shape::Polygon(p) => p.exterior.iter().for_each(f),
            Shape::MultiLineString(lines) => lines.iter().flatten().for_each(f),
            Shape::MultiPolygon(polygons) => {
                polygons.iter().flat_map(|p| p.exterior.iter()).for_each(f);
            }
        }
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wkt())
    }
}

fn to_coords<I>(coords: I) -> Vec<Coord>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    coords.into_iter().map(|(x, y)| Coord::new(x, y)).collect()
}

fn check_finite(coords: &[Coord]) -> Result<(), GeometryError> {
    if coords.iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        Ok(())
    } else {
        Err(GeometryError::NonFinite)
    }
}

fn check_line(line: &[Coord]) -> Result<(), GeometryError> {
    check_finite(line)?;
    if line.len() < 2 {
        return Err(GeometryError::TooFewPoints("a line needs at least two points"));
    }
    Ok(())
}

fn check_polygon(polygon: &Polygon) -> Result<(), GeometryError> {
    for ring in polygon.rings() {
        check_finite(ring)?;
        let open_len = if ring.len() > 1 && ring.first() == ring.last() {
            ring.len() - 1
        } else {
            ring.len()
        };
        if open_len < 3 {
            return Err(GeometryError::TooFewPoints("a ring needs at least three points"));
        }
    }
    Ok(())
}

/// Serialized form: WKT text plus optional vertical bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeometryRecord {
    wkt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    z_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    z_max: Option<f64>,
}

impl TryFrom<GeometryRecord> for Geometry {
    type Error = GeometryError;

    fn try_from(record: GeometryRecord) -> Result<Self, Self::Error> {
        let mut geometry = Geometry::from_wkt(&record.wkt)?;
        geometry.vertical = match (record.z_min, record.z_max) {
            (None, None) => None,
            (Some(z), None) | (None, Some(z)) => Some(VerticalExtent::at(z)),
            (Some(z_min), Some(z_max)) => Some(VerticalExtent::new(z_min, z_max)),
        };
        Ok(geometry)
    }
}

impl From<Geometry> for GeometryRecord {
    fn from(geometry: Geometry) -> Self {
        GeometryRecord {
            wkt: geometry.wkt(),
            z_min: geometry.vertical.map(|v| v.z_min),
            z_max: geometry.vertical.map(|v| v.z_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_line() {
        let g = Geometry::line_string([(0.0, 0.0)]);
        assert!(matches!(g.validate(), Err(GeometryError::TooFewPoints(_))));
    }

    #[test]
    fn test_validate_rejects_closed_two_point_ring() {
        let g = Geometry::polygon([(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let g = Geometry::point(f64::NAN, 0.0);
        assert_eq!(g.validate(), Err(GeometryError::NonFinite));
    }

    #[test]
    fn test_validate_rejects_inverted_extent() {
        let g = Geometry::point(0.0, 0.0).with_vertical_extent(10.0, 5.0);
        assert!(matches!(
            g.validate(),
            Err(GeometryError::InvalidVerticalExtent { .. })
        ));
    }

    #[test]
    fn test_bounds() {
        let g = Geometry::polygon([(1.0, 5.0), (4.0, 2.0), (3.0, 9.0)]);
        let (min, max) = g.bounds_xy();
        assert_eq!((min.x, min.y), (1.0, 2.0));
        assert_eq!((max.x, max.y), (4.0, 9.0));
    }

    #[test]
    fn test_cache_key_includes_extent() {
        let a = Geometry::point(1.0, 1.0);
        let b = Geometry::point(1.0, 1.0).with_vertical_extent(0.0, 10.0);
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), Geometry::point(1.0, 1.0).cache_key());
    }

    #[test]
    fn test_serde_through_wkt() {
        let g = Geometry::line_string([(0.0, 0.0), (10.0, 0.5)]).with_vertical_extent(0.0, 3.0);
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.contains("LINESTRING"));
        let back: Geometry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_serde_rejects_bad_wkt() {
        let result: Result<Geometry, _> = serde_json::from_str(r#"{"wkt": "CIRCLE (1 2)"}"#);
        assert!(result.is_err());
    }
}
