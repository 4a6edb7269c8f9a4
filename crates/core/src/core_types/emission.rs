//! Emission quantities and the geometry they are attached to
//!
//! An [`Emission`] is a plain value: a fixed, typed set of pollutant
//! quantities plus an optional [`Geometry`]. Arithmetic is exposed through
//! named combinators (`add`, `scale`, `merge`) instead of operator overloads
//! so that every combination is explicit about what happens to the geometry.

use crate::core_types::geometry::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pollutant selector for a single [`Quantities`] field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pollutant {
    /// Fuel burned (kg)
    FuelKg,
    /// Carbon dioxide (kg)
    Co2Kg,
    /// Carbon monoxide (g)
    CoG,
    /// Unburned hydrocarbons (g)
    HcG,
    /// Nitrogen oxides (g)
    NoxG,
    /// Sulphur oxides (g)
    SoxG,
    /// Total PM10 (g)
    Pm10G,
    /// PM1 fraction (g)
    P1G,
    /// PM2.5 fraction (g)
    P2G,
    /// PM10 computed with the pre-FOA3 method (g)
    Pm10Prefoa3G,
    /// Non-volatile PM10 (g)
    Pm10NonvolG,
    /// Volatile sulphate PM10 (g)
    Pm10SulG,
    /// Volatile organic PM10 (g)
    Pm10OrganicG,
    /// Non-volatile particulate mass (g)
    NvpmG,
    /// Non-volatile particle number (count)
    NvpmNumber,
}

impl Pollutant {
    /// Every pollutant in declaration order
    pub const ALL: [Pollutant; 15] = [
        Pollutant::FuelKg,
        Pollutant::Co2Kg,
        Pollutant::CoG,
        Pollutant::HcG,
        Pollutant::NoxG,
        Pollutant::SoxG,
        Pollutant::Pm10G,
        Pollutant::P1G,
        Pollutant::P2G,
        Pollutant::Pm10Prefoa3G,
        Pollutant::Pm10NonvolG,
        Pollutant::Pm10SulG,
        Pollutant::Pm10OrganicG,
        Pollutant::NvpmG,
        Pollutant::NvpmNumber,
    ];

    /// Stable snake_case key, identical to the serde representation
    pub fn key(self) -> &'static str {
        match self {
            Pollutant::FuelKg => "fuel_kg",
            Pollutant::Co2Kg => "co2_kg",
            Pollutant::CoG => "co_g",
            Pollutant::HcG => "hc_g",
            Pollutant::NoxG => "nox_g",
            Pollutant::SoxG => "sox_g",
            Pollutant::Pm10G => "pm10_g",
            Pollutant::P1G => "p1_g",
            Pollutant::P2G => "p2_g",
            Pollutant::Pm10Prefoa3G => "pm10_prefoa3_g",
            Pollutant::Pm10NonvolG => "pm10_nonvol_g",
            Pollutant::Pm10SulG => "pm10_sul_g",
            Pollutant::Pm10OrganicG => "pm10_organic_g",
            Pollutant::NvpmG => "nvpm_g",
            Pollutant::NvpmNumber => "nvpm_number",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Pollutant {
    type Err = UnknownPollutant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Pollutant::ALL
            .into_iter()
            .find(|p| p.key() == wanted)
            .ok_or_else(|| UnknownPollutant(s.to_string()))
    }
}

/// Returned when a pollutant key does not name a known field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pollutant '{0}'")]
pub struct UnknownPollutant(pub String);

/// Fixed set of pollutant quantities
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Quantities {
    pub fuel_kg: f64,
    pub co2_kg: f64,
    pub co_g: f64,
    pub hc_g: f64,
    pub nox_g: f64,
    pub sox_g: f64,
    pub pm10_g: f64,
    pub p1_g: f64,
    pub p2_g: f64,
    pub pm10_prefoa3_g: f64,
    pub pm10_nonvol_g: f64,
    pub pm10_sul_g: f64,
    pub pm10_organic_g: f64,
    pub nvpm_g: f64,
    pub nvpm_number: f64,
}

impl Quantities {
    /// All quantities zero
    pub const ZERO: Quantities = Quantities {
        fuel_kg: 0.0,
        co2_kg: 0.0,
        co_g: 0.0,
        hc_g: 0.0,
        nox_g: 0.0,
        sox_g: 0.0,
        pm10_g: 0.0,
        p1_g: 0.0,
        p2_g: 0.0,
        pm10_prefoa3_g: 0.0,
        pm10_nonvol_g: 0.0,
        pm10_sul_g: 0.0,
        pm10_organic_g: 0.0,
        nvpm_g: 0.0,
        nvpm_number: 0.0,
    };

    /// Read one pollutant
    pub fn get(&self, pollutant: Pollutant) -> f64 {
        match pollutant {
            Pollutant::FuelKg => self.fuel_kg,
            Pollutant::Co2Kg => self.co2_kg,
            Pollutant::CoG => self.co_g,
            Pollutant::HcG => self.hc_g,
            Pollutant::NoxG => self.nox_g,
            Pollutant::SoxG => self.sox_g,
            Pollutant::Pm10G => self.pm10_g,
            Pollutant::P1G => self.p1_g,
            Pollutant::P2G => self.p2_g,
            Pollutant::Pm10Prefoa3G => self.pm10_prefoa3_g,
            Pollutant::Pm10NonvolG => self.pm10_nonvol_g,
            Pollutant::Pm10SulG => self.pm10_sul_g,
            Pollutant::Pm10OrganicG => self.pm10_organic_g,
            Pollutant::NvpmG => self.nvpm_g,
            Pollutant::NvpmNumber => self.nvpm_number,
        }
    }

    /// Mutable access to one pollutant
    pub fn get_mut(&mut self, pollutant: Pollutant) -> &mut f64 {
        match pollutant {
            Pollutant::FuelKg => &mut self.fuel_kg,
            Pollutant::Co2Kg => &mut self.co2_kg,
            Pollutant::CoG => &mut self.co_g,
            Pollutant::HcG => &mut self.hc_g,
            Pollutant::NoxG => &mut self.nox_g,
            Pollutant::SoxG => &mut self.sox_g,
            Pollutant::Pm10G => &mut self.pm10_g,
            Pollutant::P1G => &mut self.p1_g,
            Pollutant::P2G => &mut self.p2_g,
            Pollutant::Pm10Prefoa3G => &mut self.pm10_prefoa3_g,
            Pollutant::Pm10NonvolG => &mut self.pm10_nonvol_g,
            Pollutant::Pm10SulG => &mut self.pm10_sul_g,
            Pollutant::Pm10OrganicG => &mut self.pm10_organic_g,
            Pollutant::NvpmG => &mut self.nvpm_g,
            Pollutant::NvpmNumber => &mut self.nvpm_number,
        }
    }

    /// Builder-style setter
    pub fn with(mut self, pollutant: Pollutant, value: f64) -> Self {
        *self.get_mut(pollutant) = value;
        self
    }

    /// Field-wise sum
    pub fn add(&self, other: &Quantities) -> Quantities {
        self.zip_with(other, |a, b| a + b)
    }

    /// Multiply every field by `factor`
    pub fn scale(&self, factor: f64) -> Quantities {
        let mut out = *self;
        for p in Pollutant::ALL {
            *out.get_mut(p) *= factor;
        }
        out
    }

    /// Iterate `(pollutant, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (Pollutant, f64)> + '_ {
        Pollutant::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    /// True when every field is exactly zero
    pub fn is_zero(&self) -> bool {
        self.iter().all(|(_, v)| v == 0.0)
    }

    fn zip_with(&self, other: &Quantities, op: impl Fn(f64, f64) -> f64) -> Quantities {
        let mut out = Quantities::ZERO;
        for p in Pollutant::ALL {
            *out.get_mut(p) = op(self.get(p), other.get(p));
        }
        out
    }
}

/// Pollutant quantities attached to an optional geometry
///
/// The geometry carries the vertical extent. An emission without geometry is
/// still a valid inventory entry; it simply cannot be rasterized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Emission {
    /// Pollutant amounts
    pub quantities: Quantities,
    /// Where the emission happens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl Emission {
    /// Create an emission with a geometry
    pub fn new(quantities: Quantities, geometry: Geometry) -> Self {
        Self {
            quantities,
            geometry: Some(geometry),
        }
    }

    /// Zero-valued emission with no geometry
    ///
    /// Substituted by the pipeline when a source module yields no emission for
    /// a processed source.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Sum quantities, keeping `self`'s geometry (or `other`'s if `self` has none)
    pub fn add(&self, other: &Emission) -> Emission {
        Emission {
            quantities: self.quantities.add(&other.quantities),
            geometry: self.geometry.clone().or_else(|| other.geometry.clone()),
        }
    }

    /// Scale every quantity by `factor`; the geometry is unchanged
    pub fn scale(&self, factor: f64) -> Emission {
        Emission {
            quantities: self.quantities.scale(factor),
            geometry: self.geometry.clone(),
        }
    }

    /// Total of many emissions
    ///
    /// The result has no geometry: once emissions from different places are
    /// summed there is no single shape to attach.
    pub fn merge<'a, I>(emissions: I) -> Emission
    where
        I: IntoIterator<Item = &'a Emission>,
    {
        let quantities = emissions
            .into_iter()
            .fold(Quantities::ZERO, |acc, e| acc.add(&e.quantities));
        Emission {
            quantities,
            geometry: None,
        }
    }

    /// Shortcut for one pollutant value
    pub fn value(&self, pollutant: Pollutant) -> f64 {
        self.quantities.get(pollutant)
    }
}
