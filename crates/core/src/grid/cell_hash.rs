//! Fixed-width cell keys
//!
//! A [`CellHash`] encodes an `(x, y, z)` index triple as three zero-padded
//! five-digit groups separated by `|`, e.g. `00005|00012|00000`. The encoding
//! is bijective for indices in `[0, 99999)` and, because every group has the
//! same width, lexicographic order equals `(x, y, z)` tuple order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digits per axis group
pub const HASH_GROUP_WIDTH: usize = 5;
/// Total length of a hash string
pub const HASH_LEN: usize = HASH_GROUP_WIDTH * 3 + 2;
/// Exclusive upper bound for any encoded index
pub const INDEX_LIMIT: u32 = 99_999;
/// Largest cell count an axis may have
pub const MAX_AXIS_CELLS: u32 = INDEX_LIMIT;

const SEPARATOR: char = '|';

/// Errors decoding or encoding a cell hash
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellHashError {
    #[error("cell hash '{0}' is malformed")]
    Malformed(String),
    #[error("index {value} on axis {axis} is outside [0, {limit})", limit = INDEX_LIMIT)]
    IndexOutOfRange { axis: char, value: u32 },
}

/// Discrete `(x, y, z)` cell address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl CellIndex {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// String key of one grid cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellHash(String);

impl CellHash {
    /// Encode an index triple
    pub fn encode(index: CellIndex) -> Result<Self, CellHashError> {
        for (axis, value) in [('x', index.x), ('y', index.y), ('z', index.z)] {
            if value >= INDEX_LIMIT {
                return Err(CellHashError::IndexOutOfRange { axis, value });
            }
        }
        Ok(Self(format!(
            "{:05}{SEPARATOR}{:05}{SEPARATOR}{:05}",
            index.x, index.y, index.z
        )))
    }

    /// Decode back to the index triple
    pub fn decode(&self) -> CellIndex {
        // Construction guarantees the layout, so the slices always parse
        let group = |i: usize| {
            let start = i * (HASH_GROUP_WIDTH + 1);
            self.0[start..start + HASH_GROUP_WIDTH]
                .parse::<u32>()
                .unwrap_or_default()
        };
        CellIndex::new(group(0), group(1), group(2))
    }

    /// The hash text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CellHash {
    type Err = CellHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CellHashError::Malformed(s.to_string());
        if s.len() != HASH_LEN {
            return Err(malformed());
        }
        let mut groups = [0u32; 3];
        let mut parts = s.split(SEPARATOR);
        for slot in &mut groups {
            let part = parts.next().ok_or_else(malformed)?;
            if part.len() != HASH_GROUP_WIDTH || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            *slot = part.parse().map_err(|_| malformed())?;
        }
        if parts.next().is_some() {
            return Err(malformed());
        }
        Self::encode(CellIndex::new(groups[0], groups[1], groups[2]))
    }
}

impl TryFrom<String> for CellHash {
    type Error = CellHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellHash> for String {
    fn from(hash: CellHash) -> Self {
        hash.0
    }
}

impl fmt::Display for CellHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let hash = CellHash::encode(CellIndex::new(5, 12, 0)).unwrap();
        assert_eq!(hash.as_str(), "00005|00012|00000");
        assert_eq!(hash.as_str().len(), HASH_LEN);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let samples = [
            CellIndex::new(0, 0, 0),
            CellIndex::new(1, 2, 3),
            CellIndex::new(99_998, 0, 42),
            CellIndex::new(12_345, 54_321, 99_998),
        ];
        for index in samples {
            assert_eq!(CellHash::encode(index).unwrap().decode(), index);
        }
    }

    #[test]
    fn test_order_preserving() {
        let mut indices = vec![
            CellIndex::new(2, 0, 0),
            CellIndex::new(0, 10, 3),
            CellIndex::new(0, 9, 7),
            CellIndex::new(10, 0, 0),
            CellIndex::new(0, 9, 6),
        ];
        let mut hashes: Vec<CellHash> = indices
            .iter()
            .map(|&i| CellHash::encode(i).unwrap())
            .collect();
        indices.sort();
        hashes.sort();
        let decoded: Vec<CellIndex> = hashes.iter().map(CellHash::decode).collect();
        assert_eq!(decoded, indices);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            CellHash::encode(CellIndex::new(0, INDEX_LIMIT, 0)),
            Err(CellHashError::IndexOutOfRange {
                axis: 'y',
                value: INDEX_LIMIT
            })
        );
    }

    #[test]
    fn test_parse() {
        let hash: CellHash = "00001|00002|00003".parse().unwrap();
        assert_eq!(hash.decode(), CellIndex::new(1, 2, 3));
        for bad in [
            "",
            "1|2|3",
            "00001|00002",
            "00001|00002|0000x",
            "00001-00002-00003",
            "99999|00000|00000",
        ] {
            assert!(bad.parse::<CellHash>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let hash = CellHash::encode(CellIndex::new(7, 8, 9)).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"00007|00008|00009\"");
        let back: CellHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
