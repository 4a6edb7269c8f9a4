//! Core value types shared by every stage of the pipeline

pub mod ambient;
pub mod emission;
pub mod geometry;
pub mod time;
mod wkt;

pub use ambient::{nearest_by_time, AmbientCondition};
pub use emission::{Emission, Pollutant, Quantities, UnknownPollutant};
pub use geometry::{Coord, Geometry, GeometryError, Polygon, Shape, VerticalExtent};
pub use time::{is_strictly_increasing, regular_series, InventoryTime, DEFAULT_MIXING_HEIGHT_M};
