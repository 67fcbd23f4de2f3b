//! Psi matrices: operator-calculus enumeration of multi-constrained paths
//!
//! Based on the operator calculus approach to multi-constrained routing
//! (Nefzi, Schott, Song, Staples, Tsiontsiou): every simple path from a source
//! to a destination whose cumulative weight vector stays within a constraint
//! vector is found by repeatedly "multiplying" a matrix of path sets by the
//! graph's adjacency matrix.
//!
//! Key pieces:
//! 1. **Record pool** (`pool`): bounded slab of reusable path records
//! 2. **Path records** (`record`): vertex list + cumulative weight, or zero
//! 3. **Cells / matrices** (`cell`, `matrix`): `N×N` grids of path bags
//! 4. **Growth engine** (`engine`): `work ⊗ base` iterated to saturation
//!
//! ## Ownership
//!
//! Each record is owned by exactly one cell (or by the caller that acquired
//! it) and goes back to its pool when dropped. A run that fails or is
//! cancelled releases everything it held.

pub mod cell;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod pool;
pub mod record;

pub use cell::MatrixCell;
pub use engine::{
    CancelToken, Concatenator, GrowthOptions, GrowthRun, GrowthSummary, IterationReport, Joined,
    PathGrowthEngine, Rejection, RejectionCounts, Termination,
};
pub use error::{PsiError, Result};
pub use matrix::PathMatrix;
pub use pool::{PoolGeometry, RecordPool, MIN_DEFAULT_CAPACITY};
pub use record::{FoundPath, PathRecord};
