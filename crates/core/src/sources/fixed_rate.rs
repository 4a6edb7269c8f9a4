//! Fixed-rate sources
//!
//! Each named source emits a constant hourly rate over a fixed geometry, as
//! used for stationary sources such as heating plants or fuel farms.

use crate::core_types::{AmbientCondition, Emission, Geometry, InventoryTime, Quantities};
use crate::modules::{ModuleContext, ModuleError, SourceEmission, SourceModule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One fixed-rate source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticSource {
    /// Emitted amount per hour
    pub hourly: Quantities,
    pub geometry: Geometry,
}

/// Options accepted under the module's `options` key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSourceOptions {
    pub sources: BTreeMap<String, StaticSource>,
}

#[derive(Debug, Default)]
pub struct StaticSourceModule {
    sources: BTreeMap<String, StaticSource>,
}

impl StaticSourceModule {
    /// Declared registry name
    pub const NAME: &'static str = "StaticSource";

    pub fn new() -> Self {
        Self::default()
    }

    /// Module with sources preset, e.g. for hosts that skip `begin_job` options
    pub fn with_sources(sources: BTreeMap<String, StaticSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &BTreeMap<String, StaticSource> {
        &self.sources
    }
}

impl SourceModule for StaticSourceModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn begin_job(&mut self, context: &ModuleContext) -> Result<(), ModuleError> {
        let options: StaticSourceOptions = context.parse_options(Self::NAME)?;
        for (name, source) in &options.sources {
            if let Err(e) = source.geometry.validate() {
                warn!(
                    source = %name,
                    geometry = %source.geometry,
                    error = %e,
                    "Static source has an invalid geometry"
                );
            }
        }
        // Options extend sources preset at construction
        self.sources.extend(options.sources);
        debug!(sources = self.sources.len(), "Static sources loaded");
        Ok(())
    }

    fn process(
        &mut self,
        start: &InventoryTime,
        end: &InventoryTime,
        sources: &[String],
        _ambient: &AmbientCondition,
    ) -> Result<Vec<SourceEmission>, ModuleError> {
        let hours = start.hours_until(end);
        Ok(sources
            .iter()
            .map(|name| {
                let emission = self.sources.get(name).map(|source| Emission {
                    quantities: source.hourly.scale(hours),
                    geometry: Some(source.geometry.clone()),
                });
                SourceEmission::new(start.time, name.clone(), emission)
            })
            .collect())
    }
}
