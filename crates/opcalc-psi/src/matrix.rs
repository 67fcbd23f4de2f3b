//! Psi matrices: `N×N` grids of path cells.
//!
//! Row `i`, column `j` holds every path currently known from vertex `i` to
//! vertex `j`. The matrix built straight from the graph's edges is the *base*
//! (adjacency) matrix, hop length 1; the growth engine multiplies a working
//! copy of it by the base to reach longer hop lengths.

use crate::cell::MatrixCell;
use crate::error::{PsiError, Result};
use crate::pool::RecordPool;
use opcalc_graph::GraphStore;
use std::fmt;

/// Square matrix of path cells with a fixed size and weight dimension.
#[derive(Debug, PartialEq)]
pub struct PathMatrix {
    size: usize,
    weight_dim: usize,
    /// Row-major.
    cells: Vec<MatrixCell>,
}

impl PathMatrix {
    /// All-zero matrix.
    pub fn new(size: usize, weight_dim: usize) -> Result<Self> {
        if size < 1 {
            return Err(PsiError::dimension("matrix size must be at least 1"));
        }
        if weight_dim < 1 {
            return Err(PsiError::dimension("weight dimension must be at least 1"));
        }
        let cells = (0..size * size).map(|_| MatrixCell::new()).collect();
        Ok(Self {
            size,
            weight_dim,
            cells,
        })
    }

    pub(crate) fn from_cells(size: usize, weight_dim: usize, cells: Vec<MatrixCell>) -> Self {
        debug_assert_eq!(cells.len(), size * size);
        Self {
            size,
            weight_dim,
            cells,
        }
    }

    /// Base (adjacency) matrix of a graph: `cell(i, j)` holds the single
    /// record `[v_i, v_j]` with the edge weight when `v_i -> v_j` exists.
    ///
    /// Records come from `pool`, whose weight dimension must be the graph's.
    pub fn from_graph<G>(graph: &G, pool: &RecordPool) -> Result<Self>
    where
        G: GraphStore + ?Sized,
    {
        let n = graph.vertex_count();
        let dim = graph.weight_dimension();
        let geometry = pool.geometry();
        if geometry.weight_dim != dim {
            return Err(PsiError::dimension(format!(
                "pool weight dimension {} does not match graph weight dimension {dim}",
                geometry.weight_dim
            )));
        }
        if geometry.max_nodes < 2 {
            return Err(PsiError::dimension(
                "pool records must hold at least 2 vertices to store edges",
            ));
        }

        let mut matrix = Self::new(n, dim)?;
        for row in 0..n {
            let Some(src) = graph.vertex_at(row) else {
                continue;
            };
            for col in 0..n {
                let Some(dst) = graph.vertex_at(col) else {
                    continue;
                };
                if let Some(weight) = graph.edge_weight(src, dst) {
                    let mut record = pool.acquire()?;
                    record.set_path(&[src.clone(), dst.clone()], weight.as_slice())?;
                    matrix.cell_mut(row, col).add(record);
                }
            }
        }

        tracing::debug!(
            size = n,
            weight_dim = dim,
            records = matrix.record_count(),
            "built base psi matrix"
        );
        Ok(matrix)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn weight_dim(&self) -> usize {
        self.weight_dim
    }

    /// Cell at `(row, col)`.
    ///
    /// # Panics
    /// If `row` or `col` is out of range.
    pub fn cell(&self, row: usize, col: usize) -> &MatrixCell {
        assert!(row < self.size && col < self.size, "cell index out of range");
        &self.cells[row * self.size + col]
    }

    /// Mutable cell at `(row, col)`.
    ///
    /// # Panics
    /// If `row` or `col` is out of range.
    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut MatrixCell {
        assert!(row < self.size && col < self.size, "cell index out of range");
        &mut self.cells[row * self.size + col]
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&MatrixCell> {
        if row < self.size && col < self.size {
            self.cells.get(row * self.size + col)
        } else {
            None
        }
    }

    /// True iff every cell is zero.
    pub fn is_zero(&self) -> bool {
        self.cells.iter().all(MatrixCell::is_zero)
    }

    /// Release every record of every cell.
    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(MatrixCell::clear);
    }

    pub fn record_count(&self) -> usize {
        self.cells.iter().map(MatrixCell::len).sum()
    }

    pub fn nonzero_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_zero()).count()
    }

    /// Independent copy whose records are cloned from `pool`.
    pub fn deep_clone(&self, pool: &RecordPool) -> Result<Self> {
        let mut other = Self::new(self.size, self.weight_dim)?;
        self.clone_into(&mut other, pool)?;
        Ok(other)
    }

    /// Replace `target`'s content with pool-cloned copies of this matrix's records.
    ///
    /// Fails with `InvalidDimension` (leaving `target` untouched) if the two
    /// matrices differ in size or weight dimension.
    pub fn clone_into(&self, target: &mut PathMatrix, pool: &RecordPool) -> Result<()> {
        if target.weight_dim != self.weight_dim {
            return Err(PsiError::dimension(format!(
                "cannot clone between psi matrices with different weight dimensions (src={}, dst={})",
                self.weight_dim, target.weight_dim
            )));
        }
        if target.size != self.size {
            return Err(PsiError::dimension(format!(
                "cannot clone between psi matrices with different sizes (src={}, dst={})",
                self.size, target.size
            )));
        }

        target.clear();
        for (src, dst) in self.cells.iter().zip(target.cells.iter_mut()) {
            for record in src.records().iter().filter(|r| !r.is_zero()) {
                dst.add(pool.clone_record(record)?);
            }
        }
        Ok(())
    }
}

impl fmt::Display for PathMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Psi-matrix {}x{} (weight dimension = {}):",
            self.size, self.size, self.weight_dim
        )?;
        writeln!(f, "====================")?;
        writeln!(f)?;
        for row in self.cells.chunks(self.size) {
            for cell in row {
                write!(f, "{cell}\t")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
