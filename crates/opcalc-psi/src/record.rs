//! Path records: the entries of a Psi matrix cell.
//!
//! A record is either **zero** (no path) or an ordered, non-empty list of
//! vertices plus the cumulative multi-dimensional weight of that path. Records
//! live in pool slots; see `pool` for the ownership model.

use crate::error::{PsiError, Result};
use crate::pool::{PoolGeometry, PoolShared};
use opcalc_graph::VertexId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A pooled path record.
///
/// Invariant: `is_zero() ⇔ nodes().is_empty() ⇔ weight().is_none()`.
///
/// Not `Clone`: copies go through
/// [`RecordPool::clone_record`](crate::RecordPool::clone_record) and take a slot.
pub struct PathRecord {
    home: Arc<PoolShared>,
    slot: u32,
    generation: u64,
    max_nodes: usize,
    weight_dim: usize,
    nodes: Vec<VertexId>,
    weight: Vec<f64>,
}

impl PathRecord {
    pub(crate) fn issued(
        home: Arc<PoolShared>,
        slot: u32,
        generation: u64,
        geometry: PoolGeometry,
        nodes: Vec<VertexId>,
        weight: Vec<f64>,
    ) -> Self {
        Self {
            home,
            slot,
            generation,
            max_nodes: geometry.max_nodes,
            weight_dim: geometry.weight_dim,
            nodes,
            weight,
        }
    }

    pub(crate) fn home(&self) -> &Arc<PoolShared> {
        &self.home
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Pool slot backing this record.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn is_zero(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[VertexId] {
        &self.nodes
    }

    /// Cumulative weight, `None` for a zero record.
    pub fn weight(&self) -> Option<&[f64]> {
        if self.is_zero() {
            None
        } else {
            Some(&self.weight)
        }
    }

    /// First vertex of the path.
    pub fn origin(&self) -> Option<&VertexId> {
        self.nodes.first()
    }

    /// Last vertex of the path.
    pub fn terminus(&self) -> Option<&VertexId> {
        self.nodes.last()
    }

    /// Number of edges in the path (0 for a zero record).
    pub fn hop_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.nodes.contains(vertex)
    }

    /// Set both the vertex list and the weight.
    ///
    /// Fails with `InvalidDimension` if `nodes` is empty or longer than the
    /// pool's `max_nodes`, or if `weight` does not have the pool's dimension.
    /// On failure the record is left unchanged.
    pub fn set_path(&mut self, nodes: &[VertexId], weight: &[f64]) -> Result<()> {
        self.check_geometry(nodes.len(), weight.len())?;
        self.nodes.clear();
        self.nodes.extend_from_slice(nodes);
        self.weight.clear();
        self.weight.extend_from_slice(weight);
        Ok(())
    }

    /// Write `left ++ right[1..]` with the given (already summed) weight.
    pub(crate) fn set_concatenation(
        &mut self,
        left: &PathRecord,
        right: &PathRecord,
        weight: &[f64],
    ) -> Result<()> {
        let len = left.nodes.len() + right.nodes.len().saturating_sub(1);
        self.check_geometry(len, weight.len())?;
        self.nodes.clear();
        self.nodes.extend_from_slice(&left.nodes);
        self.nodes.extend_from_slice(right.nodes.get(1..).unwrap_or_default());
        self.weight.clear();
        self.weight.extend_from_slice(weight);
        Ok(())
    }

    fn check_geometry(&self, len: usize, dim: usize) -> Result<()> {
        if len == 0 {
            return Err(PsiError::dimension(
                "a path record needs at least one vertex",
            ));
        }
        if len > self.max_nodes {
            return Err(PsiError::dimension(format!(
                "too many vertices for a path record (is {len}, at most {})",
                self.max_nodes
            )));
        }
        if dim != self.weight_dim {
            return Err(PsiError::dimension(format!(
                "bad weight dimension (is {dim}, should be {})",
                self.weight_dim
            )));
        }
        Ok(())
    }

    pub fn set_zero(&mut self) {
        self.nodes.clear();
        self.weight.clear();
    }

    /// Make this record a copy of `source` (possibly from another pool).
    pub fn copy_from(&mut self, source: &PathRecord) -> Result<()> {
        if source.is_zero() {
            self.set_zero();
            return Ok(());
        }
        self.set_path(&source.nodes, &source.weight)
    }

    /// Owned snapshot of this path, `None` for a zero record.
    pub fn to_found_path(&self) -> Option<FoundPath> {
        if self.is_zero() {
            return None;
        }
        Some(FoundPath {
            nodes: self.nodes.clone(),
            weight: self.weight.clone(),
        })
    }
}

impl Drop for PathRecord {
    fn drop(&mut self) {
        let nodes = std::mem::take(&mut self.nodes);
        let weight = std::mem::take(&mut self.weight);
        self.home.recycle(self.slot, self.generation, nodes, weight);
    }
}

impl PartialEq for PathRecord {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.weight() == other.weight()
    }
}

impl fmt::Debug for PathRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRecord")
            .field("slot", &self.slot)
            .field("nodes", &self.nodes)
            .field("weight", &self.weight())
            .finish()
    }
}

/// `(w1;w2;…)[A->B->C]`; a zero record renders as the empty string.
impl fmt::Display for PathRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, w) in self.weight.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{w:.6}")?;
        }
        f.write_str(")[")?;
        for (i, n) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str("->")?;
            }
            write!(f, "{n}")?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// Found Paths
// ============================================================================

/// A feasible simple path that reached the demand's destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundPath {
    pub nodes: Vec<VertexId>,
    pub weight: Vec<f64>,
}

impl FoundPath {
    pub fn hop_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

impl fmt::Display for FoundPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{n}")?;
        }
        f.write_str(" [")?;
        for (i, w) in self.weight.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{w}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use crate::{PoolGeometry, RecordPool};
    use opcalc_graph::VertexId;

    fn ids(names: &[&str]) -> Vec<VertexId> {
        names.iter().map(|n| VertexId::new(n)).collect()
    }

    fn pool() -> RecordPool {
        RecordPool::new(PoolGeometry::new(3, 2, 8).unwrap())
    }

    #[test]
    fn zero_invariant_holds() {
        let pool = pool();
        let mut r = pool.acquire().unwrap();
        assert!(r.is_zero());
        assert_eq!(r.origin(), None);
        assert_eq!(r.hop_count(), 0);
        assert_eq!(r.to_string(), "");

        r.set_path(&ids(&["A", "B"]), &[1.0, 0.5]).unwrap();
        assert!(!r.is_zero());
        assert_eq!(r.weight(), Some(&[1.0, 0.5][..]));
        assert_eq!(r.origin(), Some(&VertexId::new("A")));
        assert_eq!(r.terminus(), Some(&VertexId::new("B")));
        assert_eq!(r.hop_count(), 1);

        r.set_zero();
        assert!(r.is_zero());
        assert!(r.weight().is_none());
    }

    #[test]
    fn set_path_validates_geometry() {
        let pool = pool();
        let mut r = pool.acquire().unwrap();
        assert!(r.set_path(&[], &[1.0, 1.0]).is_err());
        assert!(r.set_path(&ids(&["A", "B", "C", "D"]), &[1.0, 1.0]).is_err());
        assert!(r.set_path(&ids(&["A", "B"]), &[1.0]).is_err());
        // failures leave the record untouched
        assert!(r.is_zero());
    }

    #[test]
    fn display_matches_matrix_print_format() {
        let pool = pool();
        let mut r = pool.acquire().unwrap();
        r.set_path(&ids(&["A", "B", "C"]), &[2.0, 0.25]).unwrap();
        assert_eq!(r.to_string(), "(2.000000;0.250000)[A->B->C]");

        let found = r.to_found_path().unwrap();
        assert_eq!(found.hop_count(), 2);
        assert_eq!(found.to_string(), "A -> B -> C [2, 0.25]");
    }

    #[test]
    fn copy_from_is_deep() {
        let pool = pool();
        let mut a = pool.acquire().unwrap();
        a.set_path(&ids(&["A", "B"]), &[1.0, 1.0]).unwrap();
        let mut b = pool.clone_record(&a).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.slot(), b.slot());

        b.set_path(&ids(&["B", "C"]), &[3.0, 3.0]).unwrap();
        assert_eq!(a.nodes(), &ids(&["A", "B"])[..]);
    }
}
