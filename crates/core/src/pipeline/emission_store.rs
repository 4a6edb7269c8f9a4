//! Per-run store of interval emissions
//!
//! Built once per pipeline run, appended to once per processed interval and
//! ordered by interval start. Every processed interval has an entry, even
//! when no source emitted anything.

use crate::core_types::{InventoryTime, Quantities};
use crate::modules::SourceEmissions;
use crate::store::StoreError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Everything emitted during one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalEmissions {
    pub start: InventoryTime,
    pub end: InventoryTime,
    pub sources: Vec<SourceEmissions>,
}

impl IntervalEmissions {
    /// Pollutant totals over every source
    pub fn total(&self) -> Quantities {
        self.sources
            .iter()
            .flat_map(|s| s.emissions.iter())
            .fold(Quantities::ZERO, |acc, e| acc.add(&e.quantities))
    }

    /// Emissions of one source, if it reported any
    pub fn source(&self, name: &str) -> Option<&SourceEmissions> {
        self.sources.iter().find(|s| s.source == name)
    }
}

/// Interval-start keyed emissions of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<IntervalEmissions>", into = "Vec<IntervalEmissions>")]
pub struct EmissionStore {
    intervals: BTreeMap<NaiveDateTime, IntervalEmissions>,
}

impl EmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interval's emissions and return the stored entry
    pub fn record(
        &mut self,
        start: InventoryTime,
        end: InventoryTime,
        sources: Vec<SourceEmissions>,
    ) -> &IntervalEmissions {
        let entry = IntervalEmissions { start, end, sources };
        match self.intervals.entry(start.time) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(entry);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(entry),
        }
    }

    /// Entry for the interval starting at `start`
    pub fn get(&self, start: &NaiveDateTime) -> Option<&IntervalEmissions> {
        self.intervals.get(start)
    }

    /// Entries in ascending start order
    pub fn intervals(&self) -> impl Iterator<Item = &IntervalEmissions> {
        self.intervals.values()
    }

    /// Interval start timestamps in ascending order
    pub fn timestamps(&self) -> impl Iterator<Item = &NaiveDateTime> {
        self.intervals.keys()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    /// Totals for one interval
    pub fn interval_total(&self, start: &NaiveDateTime) -> Option<Quantities> {
        self.get(start).map(IntervalEmissions::total)
    }

    /// Totals over the whole run
    pub fn total(&self) -> Quantities {
        self.intervals()
            .fold(Quantities::ZERO, |acc, interval| acc.add(&interval.total()))
    }

    /// Totals per source name over the whole run
    pub fn source_totals(&self) -> BTreeMap<String, Quantities> {
        let mut totals: BTreeMap<String, Quantities> = BTreeMap::new();
        for source in self.intervals().flat_map(|i| i.sources.iter()) {
            let entry = totals.entry(source.source.clone()).or_default();
            *entry = entry.add(&source.total().quantities);
        }
        totals
    }

    /// Load a store previously written with [`Self::save`]
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the store as pretty JSON
    ///
    /// # Errors
    /// Returns error if the store cannot be serialized or the file written
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl From<Vec<IntervalEmissions>> for EmissionStore {
    fn from(intervals: Vec<IntervalEmissions>) -> Self {
        Self {
            intervals: intervals
                .into_iter()
                .map(|i| (i.start.time, i))
                .collect(),
        }
    }
}

impl From<EmissionStore> for Vec<IntervalEmissions> {
    fn from(store: EmissionStore) -> Self {
        store.intervals.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{Emission, Geometry, Pollutant};
    use chrono::NaiveDate;

    fn at(hour: u32) -> InventoryTime {
        InventoryTime::new(
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        )
    }

    fn sources(name: &str, co: f64) -> Vec<SourceEmissions> {
        vec![SourceEmissions {
            source: name.to_string(),
            emissions: vec![Emission::new(
                Quantities::ZERO.with(Pollutant::CoG, co),
                Geometry::point(0.0, 0.0),
            )],
        }]
    }

    #[test]
    fn test_ordered_by_start() {
        let mut store = EmissionStore::new();
        store.record(at(2), at(3), sources("b", 1.0));
        store.record(at(0), at(1), sources("a", 1.0));
        store.record(at(1), at(2), Vec::new());
        let starts: Vec<u32> = store.intervals().map(|i| i.start.hour()).collect();
        assert_eq!(starts, vec![0, 1, 2]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_totals() {
        let mut store = EmissionStore::new();
        store.record(at(0), at(1), sources("gate", 2.0));
        store.record(at(1), at(2), sources("gate", 3.0));
        store.record(at(2), at(3), sources("apu", 5.0));
        assert_eq!(store.total().co_g, 10.0);
        assert_eq!(store.interval_total(&at(1).time).unwrap().co_g, 3.0);
        let per_source = store.source_totals();
        assert_eq!(per_source["gate"].co_g, 5.0);
        assert_eq!(per_source["apu"].co_g, 5.0);
    }

    #[test]
    fn test_empty_interval_has_entry() {
        let mut store = EmissionStore::new();
        let entry = store.record(at(0), at(1), Vec::new());
        assert!(entry.sources.is_empty());
        assert!(entry.total().is_zero());
        assert!(store.get(&at(0).time).is_some());
    }

    #[test]
    fn test_json_keeps_order() {
        let mut store = EmissionStore::new();
        store.record(at(1), at(2), sources("a", 1.0));
        store.record(at(0), at(1), sources("b", 2.0));
        let json = serde_json::to_string(&store).unwrap();
        let back: EmissionStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }
}
