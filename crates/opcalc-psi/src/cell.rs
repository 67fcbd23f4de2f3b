//! A single Psi-matrix entry: the bag of paths between one ordered vertex pair.

use crate::record::PathRecord;
use std::fmt;

/// Every distinct path of the current hop length between one `(row, col)` pair.
///
/// The cell owns its records; clearing (or dropping) it releases them.
#[derive(Debug, Default, PartialEq)]
pub struct MatrixCell {
    records: Vec<PathRecord>,
}

impl MatrixCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_records(records: Vec<PathRecord>) -> Self {
        Self { records }
    }

    pub fn add(&mut self, record: PathRecord) {
        self.records.push(record);
    }

    /// Release every record back to its pool.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn is_zero(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PathRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for record in self.records.iter().filter(|r| !r.is_zero()) {
            if !first {
                f.write_str(" + ")?;
            }
            first = false;
            write!(f, "{record}")?;
        }
        if first {
            f.write_str(" -- zero -- ")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PoolGeometry, RecordPool};
    use opcalc_graph::VertexId;

    #[test]
    fn clear_releases_records() {
        let pool = RecordPool::new(PoolGeometry::new(2, 1, 4).unwrap());
        let mut cell = MatrixCell::new();
        assert!(cell.is_zero());
        assert_eq!(cell.to_string(), " -- zero -- ");

        for (a, b) in [("A", "B"), ("A", "C")] {
            let mut r = pool.acquire().unwrap();
            r.set_path(&[VertexId::new(a), VertexId::new(b)], &[1.0])
                .unwrap();
            cell.add(r);
        }
        assert_eq!(cell.len(), 2);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(
            cell.to_string(),
            "(1.000000)[A->B] + (1.000000)[A->C]"
        );

        cell.clear();
        assert!(cell.is_zero());
        assert_eq!(pool.in_use(), 0);
    }
}
