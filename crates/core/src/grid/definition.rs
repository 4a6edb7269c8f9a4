//! Grid definition and geographic reference
//!
//! A [`GridDefinition`] is immutable once built. Every "setter" returns a new,
//! validated definition with its projected origin recomputed, so the origin can
//! never drift out of step with the scalar fields it is derived from.

use crate::grid::cell_hash::MAX_AXIS_CELLS;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Spherical Web Mercator earth radius (m)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Errors for invalid grid definitions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("{axis} cell count must be in 1..={max}, got {value}")]
    InvalidCellCount { axis: char, value: u32, max: u32 },
    #[error("{axis} resolution must be finite and positive, got {value}")]
    InvalidResolution { axis: char, value: f64 },
    #[error("reference latitude {0} outside Web Mercator range")]
    InvalidLatitude(f64),
    #[error("reference longitude {0} outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("reference altitude must be finite, got {0}")]
    InvalidAltitude(f64),
}

/// Where the vertical axis starts relative to the reference altitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalOrigin {
    /// Grid centered on the reference altitude, like the horizontal axes
    #[default]
    Centered,
    /// Lowest layer starts at the reference altitude
    Ground,
}

/// Scalar fields of a grid definition, as persisted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDefinitionRecord {
    pub x_cells: u32,
    pub y_cells: u32,
    pub z_cells: u32,
    pub x_resolution_m: f64,
    pub y_resolution_m: f64,
    pub z_resolution_m: f64,
    pub reference_latitude: f64,
    pub reference_longitude: f64,
    #[serde(default)]
    pub reference_altitude_m: f64,
    #[serde(default)]
    pub vertical_origin: VerticalOrigin,
}

/// Validated grid definition with derived projected origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridDefinitionRecord", into = "GridDefinitionRecord")]
pub struct GridDefinition {
    record: GridDefinitionRecord,
    reference_projected: Point3<f64>,
    origin: Point3<f64>,
}

impl GridDefinition {
    /// Validate a record and derive its projected origin
    pub fn new(record: GridDefinitionRecord) -> Result<Self, GridError> {
        for (axis, value) in [
            ('x', record.x_cells),
            ('y', record.y_cells),
            ('z', record.z_cells),
        ] {
            if value == 0 || value > MAX_AXIS_CELLS {
                return Err(GridError::InvalidCellCount {
                    axis,
                    value,
                    max: MAX_AXIS_CELLS,
                });
            }
        }
        for (axis, value) in [
            ('x', record.x_resolution_m),
            ('y', record.y_resolution_m),
            ('z', record.z_resolution_m),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GridError::InvalidResolution { axis, value });
            }
        }
        if !(MIN_LAT..=MAX_LAT).contains(&record.reference_latitude) {
            return Err(GridError::InvalidLatitude(record.reference_latitude));
        }
        if !(-180.0..=180.0).contains(&record.reference_longitude) {
            return Err(GridError::InvalidLongitude(record.reference_longitude));
        }
        if !record.reference_altitude_m.is_finite() {
            return Err(GridError::InvalidAltitude(record.reference_altitude_m));
        }

        let (ref_x, ref_y) = project(record.reference_latitude, record.reference_longitude);
        let reference_projected = Point3::new(ref_x, ref_y, record.reference_altitude_m);

        let origin_z = match record.vertical_origin {
            VerticalOrigin::Centered => centered_origin(
                record.reference_altitude_m,
                record.z_cells,
                record.z_resolution_m,
            ),
            VerticalOrigin::Ground => record.reference_altitude_m,
        };
        let origin = Point3::new(
            centered_origin(ref_x, record.x_cells, record.x_resolution_m),
            centered_origin(ref_y, record.y_cells, record.y_resolution_m),
            origin_z,
        );

        Ok(Self {
            record,
            reference_projected,
            origin,
        })
    }

    /// Same definition with new cell counts
    pub fn with_cells(&self, x: u32, y: u32, z: u32) -> Result<Self, GridError> {
        Self::new(GridDefinitionRecord {
            x_cells: x,
            y_cells: y,
            z_cells: z,
            ..self.record
        })
    }

    /// Same definition with new resolutions (m)
    pub fn with_resolution(&self, x: f64, y: f64, z: f64) -> Result<Self, GridError> {
        Self::new(GridDefinitionRecord {
            x_resolution_m: x,
            y_resolution_m: y,
            z_resolution_m: z,
            ..self.record
        })
    }

    /// Same definition around a new reference point
    pub fn with_reference(
        &self,
        latitude: f64,
        longitude: f64,
        altitude_m: f64,
    ) -> Result<Self, GridError> {
        Self::new(GridDefinitionRecord {
            reference_latitude: latitude,
            reference_longitude: longitude,
            reference_altitude_m: altitude_m,
            ..self.record
        })
    }

    /// Scalar fields as persisted
    pub fn record(&self) -> &GridDefinitionRecord {
        &self.record
    }

    /// Cell counts `[x, y, z]`
    pub fn cells(&self) -> [u32; 3] {
        [self.record.x_cells, self.record.y_cells, self.record.z_cells]
    }

    /// Total number of cells
    pub fn cell_count(&self) -> u64 {
        self.cells().iter().map(|&c| u64::from(c)).product()
    }

    /// Resolution `[x, y, z]` (m)
    pub fn resolution(&self) -> [f64; 3] {
        [
            self.record.x_resolution_m,
            self.record.y_resolution_m,
            self.record.z_resolution_m,
        ]
    }

    /// Projected minimum corner of the grid
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Projected maximum corner of the grid
    pub fn max_corner(&self) -> Point3<f64> {
        let [nx, ny, nz] = self.cells();
        let [rx, ry, rz] = self.resolution();
        Point3::new(
            self.origin.x + f64::from(nx) * rx,
            self.origin.y + f64::from(ny) * ry,
            self.origin.z + f64::from(nz) * rz,
        )
    }

    /// Reference point projected to meters
    pub fn reference_projected(&self) -> Point3<f64> {
        self.reference_projected
    }

    pub fn reference_altitude_m(&self) -> f64 {
        self.record.reference_altitude_m
    }

    pub fn vertical_origin(&self) -> VerticalOrigin {
        self.record.vertical_origin
    }
}

impl TryFrom<GridDefinitionRecord> for GridDefinition {
    type Error = GridError;

    fn try_from(record: GridDefinitionRecord) -> Result<Self, Self::Error> {
        Self::new(record)
    }
}

impl From<GridDefinition> for GridDefinitionRecord {
    fn from(definition: GridDefinition) -> Self {
        definition.record
    }
}

fn centered_origin(reference: f64, cells: u32, resolution: f64) -> f64 {
    reference - (f64::from(cells) / 2.0) * resolution
}

/// Project latitude/longitude (degrees) to spherical Web Mercator meters
pub fn project(latitude: f64, longitude: f64) -> (f64, f64) {
    let lon_rad = longitude.to_radians();
    let lat_rad = latitude.to_radians();
    let x = EARTH_RADIUS_M * lon_rad;
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat_rad / 2.0).tan().ln();
    (x, y)
}

/// Inverse of [`project`]
pub fn unproject(x: f64, y: f64) -> (f64, f64) {
    let longitude = (x / EARTH_RADIUS_M).to_degrees();
    let latitude = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (latitude, longitude)
}
