//! Plaintext vector store and linear-scan nearest-neighbor search.

use crate::{Error, Result};
use fednn_util::sample_vector;
use rand::Rng;
use std::fmt;

/// A vector owned by a silo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorRecord {
    /// Identifier, unique within its silo.
    pub id: i64,
    /// Coordinates.
    pub values: Vec<i64>,
}

impl VectorRecord {
    /// Creates a record.
    pub fn new(id: i64, values: Vec<i64>) -> Self {
        Self { id, values }
    }

    /// Number of coordinates.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Display for VectorRecord {
    /// Prints `#id: (v0, v1, ...)`, eliding the middle of long vectors.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const EDGE: usize = 4;
        let join = |values: &[i64]| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let dim = self.values.len();
        if dim <= 2 * EDGE {
            write!(f, "#{}: ({})", self.id, join(&self.values))
        } else {
            write!(
                f,
                "#{}: ({}, ..., {})",
                self.id,
                join(&self.values[..EDGE]),
                join(&self.values[dim - EDGE..])
            )
        }
    }
}

/// Squared Euclidean distance between two vectors of the same dimension.
pub fn squared_distance(a: &[i64], b: &[i64]) -> Result<i64> {
    if a.len() != b.len() {
        return Err(Error::dimension_mismatch(a.len(), b.len()));
    }
    Ok(a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum())
}

/// The record of a dataset closest to a query, and its squared distance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    /// The closest record.
    pub record: VectorRecord,
    /// Its squared distance to the query.
    pub distance: i64,
}

/// In-memory collection of records sharing one dimension.
#[derive(Debug, Clone)]
pub struct Dataset {
    dimension: usize,
    records: Vec<VectorRecord>,
}

impl Dataset {
    /// Creates a dataset; every record must have `dimension` coordinates.
    pub fn new(dimension: usize, records: Vec<VectorRecord>) -> Result<Self> {
        if let Some(r) = records.iter().find(|r| r.dimension() != dimension) {
            return Err(Error::dimension_mismatch(dimension, r.dimension()));
        }
        Ok(Self { dimension, records })
    }

    /// Creates `n` records with ids `0..n` and coordinates drawn uniformly in
    /// `[1, max_coordinate]`.
    pub fn random<R: Rng + ?Sized>(
        n: usize,
        dimension: usize,
        max_coordinate: i64,
        rng: &mut R,
    ) -> Result<Self> {
        if n == 0 {
            return Err(Error::empty_dataset());
        }
        if dimension < 2 {
            return Err(Error::Configuration(format!(
                "Dimension {dimension} is too small"
            )));
        }
        let records = (0..n)
            .map(|id| VectorRecord::new(id as i64, sample_vector(dimension, max_coordinate, rng)))
            .collect();
        Self::new(dimension, records)
    }

    /// Dimension shared by every record.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset holds no record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The records, in insertion order.
    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    /// Returns the record minimizing the squared distance to `query`.
    ///
    /// Only a strictly smaller distance replaces the current best, so among
    /// equally close records the earliest inserted one is returned.
    pub fn nearest(&self, query: &[i64]) -> Result<Neighbor> {
        if query.len() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, query.len()));
        }
        let mut best: Option<(usize, i64)> = None;
        for (i, record) in self.records.iter().enumerate() {
            let d = squared_distance(&record.values, query)?;
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }
        let (i, distance) = best.ok_or_else(Error::empty_dataset)?;
        Ok(Neighbor {
            record: self.records[i].clone(),
            distance,
        })
    }
}
