//! Signed axis sequences
//!
//! External dispersion models lay out gridded input in their own `(i, j, k)`
//! order. An [`AxisSequence`] such as `k+,j-,i+` states that order: the first
//! entry is the outermost loop, `i`/`j`/`k` name the grid's x/y/z axes and the
//! sign gives the direction along that axis.

use crate::grid::CellIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors parsing an axis sequence
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AxisSequenceError {
    #[error("axis sequence '{0}' must have three comma-separated entries like 'k+,j-,i+'")]
    Malformed(String),
    #[error("axis '{0}' appears more than once")]
    DuplicateAxis(char),
}

/// Grid axis in external-model naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Grid x
    I,
    /// Grid y
    J,
    /// Grid z
    K,
}

impl Axis {
    fn letter(self) -> char {
        match self {
            Axis::I => 'i',
            Axis::J => 'j',
            Axis::K => 'k',
        }
    }

    fn slot(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
            Axis::K => 2,
        }
    }
}

/// One signed entry of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisStep {
    pub axis: Axis,
    pub ascending: bool,
}

/// Loop order and direction for writing a gridded array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxisSequence {
    steps: [AxisStep; 3],
}

impl AxisSequence {
    /// Entries, outermost first
    pub fn steps(&self) -> &[AxisStep; 3] {
        &self.steps
    }

    /// Array extent along each entry, outermost first
    pub fn shape(&self, cells: [u32; 3]) -> [u32; 3] {
        self.steps.map(|s| cells[s.axis.slot()])
    }

    /// Offset of `index` in a write-ordered array of a grid with `cells` counts
    ///
    /// `None` when the index lies outside the grid.
    pub fn position(&self, index: CellIndex, cells: [u32; 3]) -> Option<usize> {
        let xyz = [index.x, index.y, index.z];
        let mut offset = 0usize;
        for step in self.steps {
            let n = cells[step.axis.slot()];
            let v = xyz[step.axis.slot()];
            if v >= n {
                return None;
            }
            let along = if step.ascending { v } else { n - 1 - v };
            offset = offset * n as usize + along as usize;
        }
        Some(offset)
    }

    /// Every cell index of a grid with `cells` counts, in write order
    pub fn ordered_indices(&self, cells: [u32; 3]) -> Vec<CellIndex> {
        let [outer, middle, inner] = self.steps;
        let coords = |step: AxisStep, n: u32| -> Vec<u32> {
            if step.ascending {
                (0..n).collect()
            } else {
                (0..n).rev().collect()
            }
        };
        let outer_values = coords(outer, cells[outer.axis.slot()]);
        let middle_values = coords(middle, cells[middle.axis.slot()]);
        let inner_values = coords(inner, cells[inner.axis.slot()]);

        let capacity = cells.iter().map(|&c| c as usize).product();
        let mut out = Vec::with_capacity(capacity);
        for &a in &outer_values {
            for &b in &middle_values {
                for &c in &inner_values {
                    let mut xyz = [0u32; 3];
                    xyz[outer.axis.slot()] = a;
                    xyz[middle.axis.slot()] = b;
                    xyz[inner.axis.slot()] = c;
                    out.push(CellIndex::new(xyz[0], xyz[1], xyz[2]));
                }
            }
        }
        out
    }
}

impl Default for AxisSequence {
    /// `i+,j+,k+`: same order as ascending cell hashes
    fn default() -> Self {
        let step = |axis| AxisStep {
            axis,
            ascending: true,
        };
        Self {
            steps: [step(Axis::I), step(Axis::J), step(Axis::K)],
        }
    }
}

impl FromStr for AxisSequence {
    type Err = AxisSequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AxisSequenceError::Malformed(s.to_string());
        let mut steps = Vec::with_capacity(3);
        for entry in s.split(',') {
            let entry = entry.trim().to_ascii_lowercase();
            let mut chars = entry.chars();
            let axis = match chars.next() {
                Some('i') => Axis::I,
                Some('j') => Axis::J,
                Some('k') => Axis::K,
                _ => return Err(malformed()),
            };
            let ascending = match (chars.next(), chars.next()) {
                (Some('+'), None) => true,
                (Some('-'), None) => false,
                _ => return Err(malformed()),
            };
            if steps.iter().any(|s: &AxisStep| s.axis == axis) {
                return Err(AxisSequenceError::DuplicateAxis(axis.letter()));
            }
            steps.push(AxisStep { axis, ascending });
        }
        let steps: [AxisStep; 3] = steps.try_into().map_err(|_| malformed())?;
        Ok(Self { steps })
    }
}

impl TryFrom<String> for AxisSequence {
    type Error = AxisSequenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AxisSequence> for String {
    fn from(sequence: AxisSequence) -> Self {
        sequence.to_string()
    }
}

impl fmt::Display for AxisSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}{}", step.axis.letter(), if step.ascending { '+' } else { '-' })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let seq: AxisSequence = "k+, j-, I+".parse().unwrap();
        assert_eq!(seq.to_string(), "k+,j-,i+");
        assert_eq!(seq.steps()[0].axis, Axis::K);
        assert!(!seq.steps()[1].ascending);
    }

    #[test]
    fn test_rejects_bad_sequences() {
        for bad in ["", "i+,j+", "i+,j+,k+,i+", "x+,j+,k+", "i,j+,k+", "i+-,j+,k+"] {
            assert!(bad.parse::<AxisSequence>().is_err(), "{bad}");
        }
        assert_eq!(
            "i+,i-,k+".parse::<AxisSequence>(),
            Err(AxisSequenceError::DuplicateAxis('i'))
        );
    }

    #[test]
    fn test_shape_follows_sequence() {
        let seq: AxisSequence = "k+,j-,i+".parse().unwrap();
        assert_eq!(seq.shape([4, 3, 2]), [2, 3, 4]);
    }

    #[test]
    fn test_default_matches_hash_order() {
        let order = AxisSequence::default().ordered_indices([2, 2, 2]);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_ordered_indices_with_reversal() {
        let seq: AxisSequence = "k+,j-,i+".parse().unwrap();
        let order = seq.ordered_indices([2, 2, 1]);
        assert_eq!(
            order,
            vec![
                CellIndex::new(0, 1, 0),
                CellIndex::new(1, 1, 0),
                CellIndex::new(0, 0, 0),
                CellIndex::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_position_agrees_with_write_order() {
        let cells = [3, 4, 2];
        for text in ["i+,j+,k+", "k+,j-,i+", "j-,i+,k-"] {
            let seq: AxisSequence = text.parse().unwrap();
            for (offset, index) in seq.ordered_indices(cells).into_iter().enumerate() {
                assert_eq!(seq.position(index, cells), Some(offset), "{text}");
            }
        }
    }

    #[test]
    fn test_position_outside_grid() {
        let seq = AxisSequence::default();
        assert_eq!(seq.position(CellIndex::new(2, 0, 0), [2, 2, 2]), None);
    }

    #[test]
    fn test_serde_as_string() {
        let seq: AxisSequence = serde_json::from_str("\"j-,i+,k-\"").unwrap();
        assert_eq!(serde_json::to_string(&seq).unwrap(), "\"j-,i+,k-\"");
    }
}
