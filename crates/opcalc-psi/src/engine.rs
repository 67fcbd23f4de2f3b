//! Offline path growth by Psi-matrix multiplication.
//!
//! Starting from `work = base` (all 1-hop paths), each iteration computes
//!
//! ```text
//! dest[row][col] = ⋃_m  { L ⊕ R  |  L ∈ work[row][m], R ∈ base[m][col], L ⊕ R admissible }
//! ```
//!
//! where `⊕` concatenates vertex lists (sharing the junction `m`) and adds
//! weights. A concatenation is admissible when:
//!
//! 1. neither side is zero,
//! 2. `L` starts at the demand source (branches rooted elsewhere are pruned),
//! 3. `L` ends where `R` starts,
//! 4. the joined path is still simple (`L` is not a self-loop and no vertex
//!    of `R` past the junction appears anywhere in `L`),
//! 5. the summed weight is within the demand's constraints in every dimension
//!    (inclusive).
//!
//! Every admissible path ending at the demand destination is reported as a
//! [`FoundPath`]. Growth stops when `dest` is entirely zero (saturation) or once
//! paths reach the configured `max_hops`. A simple path has at most `size - 1`
//! hops, so an unbounded run saturates after at most `size - 1` iterations.
//!
//! Within one iteration the `N×N` cell products are independent: they only read
//! `work` and `base`. With `GrowthOptions::parallel` they are computed on the
//! rayon pool; results are collected in row-major order, so the reported paths
//! are identical to a serial run.

use crate::cell::MatrixCell;
use crate::error::{PsiError, Result};
use crate::matrix::PathMatrix;
use crate::pool::RecordPool;
use crate::record::{FoundPath, PathRecord};
use opcalc_graph::{Demand, VertexId, WeightVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Options & Cancellation
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthOptions {
    /// Compute the cells of each iteration on the rayon thread pool.
    pub parallel: bool,
    /// Stop once paths have this many hops (never beyond `size - 1`).
    pub max_hops: Option<usize>,
    /// Abort the run with `DeadlineExceeded` after this long.
    pub deadline: Option<Duration>,
    /// Also report a direct `source -> destination` edge as a 1-hop path.
    pub report_direct_edges: bool,
}

/// Cooperative cancellation flag, checked before every iteration and every cell.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Concatenation
// ============================================================================

/// Why a `(left, right)` pair did not produce a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    ZeroOperand,
    ForeignOrigin,
    Discontinuous,
    Cycle,
    ConstraintViolated { dimension: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub zero_operand: usize,
    pub foreign_origin: usize,
    pub discontinuous: usize,
    pub cycle: usize,
    pub constraint: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::ZeroOperand => self.zero_operand += 1,
            Rejection::ForeignOrigin => self.foreign_origin += 1,
            Rejection::Discontinuous => self.discontinuous += 1,
            Rejection::Cycle => self.cycle += 1,
            Rejection::ConstraintViolated { .. } => self.constraint += 1,
        }
    }

    pub fn merge(&mut self, other: &RejectionCounts) {
        self.zero_operand += other.zero_operand;
        self.foreign_origin += other.foreign_origin;
        self.discontinuous += other.discontinuous;
        self.cycle += other.cycle;
        self.constraint += other.constraint;
    }

    pub fn total(&self) -> usize {
        self.zero_operand + self.foreign_origin + self.discontinuous + self.cycle + self.constraint
    }
}

/// Outcome of [`Concatenator::join`].
#[derive(Debug)]
pub enum Joined {
    Path(PathRecord),
    Rejected(Rejection),
}

/// Applies the admissibility rules for one demand.
///
/// Holds a scratch buffer for the summed weight, so checking a pair does not
/// allocate.
#[derive(Debug)]
pub struct Concatenator<'a> {
    source: &'a VertexId,
    constraints: &'a WeightVector,
    scratch: Vec<f64>,
}

impl<'a> Concatenator<'a> {
    pub fn new(source: &'a VertexId, constraints: &'a WeightVector) -> Self {
        Self {
            source,
            constraints,
            scratch: Vec::with_capacity(constraints.dim()),
        }
    }

    /// Check `left ⊕ right`; on success returns the summed weight.
    pub fn check(&mut self, left: &PathRecord, right: &PathRecord) -> Result<&[f64], Rejection> {
        let (Some(left_weight), Some(right_weight)) = (left.weight(), right.weight()) else {
            return Err(Rejection::ZeroOperand);
        };
        if left.origin() != Some(self.source) {
            return Err(Rejection::ForeignOrigin);
        }
        if left.terminus() != right.origin() {
            return Err(Rejection::Discontinuous);
        }

        // A base self-loop is never a simple prefix.
        if left.origin() == left.terminus() {
            return Err(Rejection::Cycle);
        }
        let left_nodes = left.nodes();
        if right.nodes()[1..].iter().any(|v| left_nodes.contains(v)) {
            return Err(Rejection::Cycle);
        }

        self.scratch.clear();
        self.scratch.extend(
            left_weight
                .iter()
                .zip(right_weight)
                .map(|(l, r)| l + r),
        );
        if let Some(dimension) = self.constraints.first_violation(&self.scratch) {
            return Err(Rejection::ConstraintViolated { dimension });
        }
        Ok(&self.scratch)
    }

    /// Check `left ⊕ right` and, if admissible, materialize it from `pool`.
    ///
    /// A pool slot is only taken once every rule has passed.
    pub fn join(
        &mut self,
        left: &PathRecord,
        right: &PathRecord,
        pool: &RecordPool,
    ) -> Result<Joined> {
        let weight = match self.check(left, right) {
            Ok(weight) => weight,
            Err(rejection) => return Ok(Joined::Rejected(rejection)),
        };
        let mut record = pool.acquire()?;
        record.set_concatenation(left, right, weight)?;
        Ok(Joined::Path(record))
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Statistics for one multiplication step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// Iteration number, starting at 1.
    pub iteration: usize,
    /// Hop length of the paths this iteration produced.
    pub hop_length: usize,
    pub nonzero_cells: usize,
    pub records: usize,
    pub candidates_tested: usize,
    pub rejections: RejectionCounts,
    pub found: usize,
    pub elapsed_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The last multiplication produced an all-zero matrix.
    Saturated { hop_length: usize },
    /// Paths reached the hop-length bound.
    HopBound { hop_length: usize },
}

/// Everything a completed run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthSummary {
    pub found: Vec<FoundPath>,
    pub iterations: Vec<IterationReport>,
    pub termination: Termination,
    /// Most records this run held at once (working plus destination matrix).
    pub peak_records: usize,
}

// ============================================================================
// Engine
// ============================================================================

/// Path enumeration for one demand over a fixed base matrix.
#[derive(Debug)]
pub struct PathGrowthEngine<'a> {
    base: &'a PathMatrix,
    demand: Demand,
    pool: RecordPool,
    options: GrowthOptions,
    cancel: CancelToken,
}

impl<'a> PathGrowthEngine<'a> {
    /// Validate the demand and pool against `base`.
    ///
    /// `pool` supplies the records of the working and destination matrices;
    /// `base` may live in a different pool.
    pub fn new(
        base: &'a PathMatrix,
        demand: Demand,
        pool: RecordPool,
        options: GrowthOptions,
    ) -> Result<Self> {
        if demand.constraints.dim() != base.weight_dim() {
            return Err(PsiError::dimension(format!(
                "constraint dimension {} does not match matrix weight dimension {}",
                demand.constraints.dim(),
                base.weight_dim()
            )));
        }
        let geometry = pool.geometry();
        if geometry.weight_dim != base.weight_dim() {
            return Err(PsiError::dimension(format!(
                "pool weight dimension {} does not match matrix weight dimension {}",
                geometry.weight_dim,
                base.weight_dim()
            )));
        }
        // A simple path visits each vertex at most once.
        let required = (hop_bound(base.size(), options.max_hops) + 1)
            .min(base.size())
            .max(2);
        if geometry.max_nodes < required {
            return Err(PsiError::dimension(format!(
                "pool records hold at most {} vertices, paths may need {required}",
                geometry.max_nodes
            )));
        }

        Ok(Self {
            base,
            demand,
            pool,
            options,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn demand(&self) -> &Demand {
        &self.demand
    }

    /// Start a lazy run; nothing is computed until it is polled.
    pub fn run(self) -> GrowthRun<'a> {
        GrowthRun {
            base: self.base,
            demand: self.demand,
            pool: self.pool,
            options: self.options,
            cancel: self.cancel,
            started: Instant::now(),
            state: RunState::Fresh,
            work: None,
            hop_length: 0,
            peak_records: 0,
            pending: VecDeque::new(),
            reports: Vec::new(),
        }
    }

    /// Run to exhaustion and collect everything.
    pub fn run_to_completion(self) -> Result<GrowthSummary> {
        self.run().into_summary()
    }
}

fn hop_bound(size: usize, max_hops: Option<usize>) -> usize {
    max_hops.map_or(size, |h| h.min(size))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunState {
    Fresh,
    Running,
    Finished(Termination),
    Failed(PsiError),
}

/// An in-flight run: a finite, non-restartable stream of found paths.
///
/// Iteration yields paths in hop-length order, and within one hop length in
/// row-major cell order then discovery order. An error is yielded once, after
/// which the run is over and its records have been released; the error is
/// kept and returned again by [`GrowthRun::into_summary`].
#[derive(Debug)]
pub struct GrowthRun<'a> {
    base: &'a PathMatrix,
    demand: Demand,
    pool: RecordPool,
    options: GrowthOptions,
    cancel: CancelToken,
    started: Instant,
    state: RunState,
    /// Paths of length `hop_length`.
    work: Option<PathMatrix>,
    hop_length: usize,
    peak_records: usize,
    pending: VecDeque<FoundPath>,
    reports: Vec<IterationReport>,
}

impl<'a> GrowthRun<'a> {
    pub fn reports(&self) -> &[IterationReport] {
        &self.reports
    }

    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            RunState::Finished(termination) => Some(termination),
            _ => None,
        }
    }

    /// The error that ended the run, if it failed.
    pub fn failure(&self) -> Option<&PsiError> {
        match &self.state {
            RunState::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Finished(_) | RunState::Failed(_))
    }

    /// Paths of the current hop length, `None` before the first step and once
    /// the run is over.
    pub fn current_matrix(&self) -> Option<&PathMatrix> {
        self.work.as_ref()
    }

    /// Most records this run has held at once so far.
    pub fn peak_records(&self) -> usize {
        self.peak_records
    }

    /// Perform the next multiplication.
    ///
    /// Returns `Ok(None)` once the run is over. Found paths of the step are
    /// queued for the iterator.
    pub fn step(&mut self) -> Result<Option<IterationReport>> {
        if self.is_finished() {
            return Ok(None);
        }
        let outcome = self.advance();
        if let Err(err) = &outcome {
            self.state = RunState::Failed(err.clone());
            self.work = None;
            self.pending.clear();
        }
        outcome
    }

    /// Drive the run to its end.
    ///
    /// A run that already failed (through `step` or the iterator) returns
    /// its error again.
    pub fn into_summary(mut self) -> Result<GrowthSummary> {
        let mut found = Vec::new();
        while let Some(path) = self.next() {
            found.push(path?);
        }
        match self.state {
            RunState::Finished(termination) => Ok(GrowthSummary {
                found,
                iterations: self.reports,
                termination,
                peak_records: self.peak_records,
            }),
            RunState::Failed(err) => Err(err),
            RunState::Fresh | RunState::Running => {
                unreachable!("a drained run is either finished or failed")
            }
        }
    }

    fn advance(&mut self) -> Result<Option<IterationReport>> {
        if self.state == RunState::Fresh {
            self.start()?;
        }

        let bound = hop_bound(self.base.size(), self.options.max_hops);
        if self.hop_length >= bound {
            self.finish(Termination::HopBound {
                hop_length: self.hop_length,
            });
            return Ok(None);
        }
        self.check_interrupt()?;

        let Some(work) = self.work.as_ref() else {
            self.finish(Termination::Saturated {
                hop_length: self.hop_length,
            });
            return Ok(None);
        };
        let live = work.record_count();
        let iteration = self.reports.len() + 1;
        let step = Multiplication {
            base: self.base,
            work,
            source: &self.demand.source,
            destination: &self.demand.destination,
            constraints: &self.demand.constraints,
            pool: &self.pool,
            cancel: &self.cancel,
            deadline: self.options.deadline.map(|d| (self.started, d)),
            completed: self.reports.len(),
        };
        let started = Instant::now();
        let (dest, mut report, found) = step.run(self.options.parallel)?;
        report.iteration = iteration;
        report.hop_length = self.hop_length + 1;
        report.elapsed_us = started.elapsed().as_micros().try_into().unwrap_or(u64::MAX);
        self.peak_records = self.peak_records.max(live + report.records);

        tracing::info!(
            iteration,
            hop_length = report.hop_length,
            records = report.records,
            found = report.found,
            elapsed_us = report.elapsed_us,
            "psi iteration complete"
        );
        for path in &found {
            tracing::debug!(path = %path, "path found");
        }

        self.reports.push(report.clone());
        if dest.is_zero() {
            self.finish(Termination::Saturated {
                hop_length: self.hop_length,
            });
            return Ok(Some(report));
        }

        self.pending.extend(found);
        // Dropping the previous working matrix releases its records.
        self.work = Some(dest);
        self.hop_length += 1;
        Ok(Some(report))
    }

    fn start(&mut self) -> Result<()> {
        let work = self.base.deep_clone(&self.pool)?;
        self.peak_records = work.record_count();
        self.work = Some(work);
        self.hop_length = 1;
        self.state = RunState::Running;
        tracing::info!(
            source = %self.demand.source,
            destination = %self.demand.destination,
            constraints = %self.demand.constraints,
            size = self.base.size(),
            "starting path growth"
        );

        if self.options.report_direct_edges && self.demand.source != self.demand.destination {
            let direct = (0..self.base.size())
                .flat_map(|row| (0..self.base.size()).map(move |col| (row, col)))
                .flat_map(|(row, col)| self.base.cell(row, col).records())
                .find(|r| {
                    r.origin() == Some(&self.demand.source)
                        && r.terminus() == Some(&self.demand.destination)
                })
                .filter(|r| {
                    r.weight()
                        .is_some_and(|w| self.demand.constraints.admits(w))
                })
                .and_then(PathRecord::to_found_path);
            self.pending.extend(direct);
        }
        Ok(())
    }

    fn check_interrupt(&self) -> Result<()> {
        let iterations = self.reports.len();
        if self.cancel.is_cancelled() {
            tracing::warn!(iterations, "path growth cancelled");
            return Err(PsiError::Cancelled { iterations });
        }
        if let Some(deadline) = self.options.deadline {
            if self.started.elapsed() >= deadline {
                tracing::warn!(iterations, "path growth deadline exceeded");
                return Err(PsiError::DeadlineExceeded { iterations });
            }
        }
        Ok(())
    }

    fn finish(&mut self, termination: Termination) {
        match termination {
            Termination::Saturated { hop_length } => {
                tracing::info!(hop_length, "obtained a zero matrix, stopping");
            }
            Termination::HopBound { hop_length } => {
                tracing::info!(hop_length, "hop-length bound reached, stopping");
            }
        }
        self.state = RunState::Finished(termination);
        self.work = None;
    }
}

impl Iterator for GrowthRun<'_> {
    type Item = Result<FoundPath>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.pending.pop_front() {
                return Some(Ok(path));
            }
            match self.step() {
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

// ============================================================================
// One Multiplication Step
// ============================================================================

/// Borrowed inputs of `dest = work ⊗ base`.
struct Multiplication<'r> {
    base: &'r PathMatrix,
    work: &'r PathMatrix,
    source: &'r VertexId,
    destination: &'r VertexId,
    constraints: &'r WeightVector,
    pool: &'r RecordPool,
    cancel: &'r CancelToken,
    deadline: Option<(Instant, Duration)>,
    completed: usize,
}

#[derive(Default)]
struct CellProduct {
    records: Vec<PathRecord>,
    found: Vec<FoundPath>,
    tested: usize,
    rejections: RejectionCounts,
}

impl Multiplication<'_> {
    fn run(&self, parallel: bool) -> Result<(PathMatrix, IterationReport, Vec<FoundPath>)> {
        let n = self.base.size();
        let products: Vec<CellProduct> = if parallel {
            (0..n * n)
                .into_par_iter()
                .map(|idx| self.cell(idx / n, idx % n))
                .collect::<Result<_>>()?
        } else {
            (0..n * n)
                .map(|idx| self.cell(idx / n, idx % n))
                .collect::<Result<_>>()?
        };

        let mut report = IterationReport {
            iteration: 0,
            hop_length: 0,
            nonzero_cells: 0,
            records: 0,
            candidates_tested: 0,
            rejections: RejectionCounts::default(),
            found: 0,
            elapsed_us: 0,
        };
        let mut found = Vec::new();
        let mut cells = Vec::with_capacity(n * n);
        for product in products {
            report.candidates_tested += product.tested;
            report.rejections.merge(&product.rejections);
            report.records += product.records.len();
            if !product.records.is_empty() {
                report.nonzero_cells += 1;
            }
            found.extend(product.found);
            cells.push(MatrixCell::from_records(product.records));
        }
        report.found = found.len();

        let dest = PathMatrix::from_cells(n, self.base.weight_dim(), cells);
        Ok((dest, report, found))
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PsiError::Cancelled {
                iterations: self.completed,
            });
        }
        if let Some((started, limit)) = self.deadline {
            if started.elapsed() >= limit {
                return Err(PsiError::DeadlineExceeded {
                    iterations: self.completed,
                });
            }
        }
        Ok(())
    }

    /// `dest[row][col] = Σ_m work[row][m] ⊗ base[m][col]`.
    fn cell(&self, row: usize, col: usize) -> Result<CellProduct> {
        self.check_interrupt()?;

        let mut product = CellProduct::default();
        let mut concat = Concatenator::new(self.source, self.constraints);
        for m in 0..self.base.size() {
            let left_cell = self.work.cell(row, m);
            let right_cell = self.base.cell(m, col);
            if left_cell.is_zero() || right_cell.is_zero() {
                continue;
            }
            for left in left_cell.records() {
                for right in right_cell.records() {
                    product.tested += 1;
                    match concat.join(left, right, self.pool)? {
                        Joined::Path(record) => {
                            if record.terminus() == Some(self.destination) {
                                product.found.extend(record.to_found_path());
                            }
                            product.records.push(record);
                        }
                        Joined::Rejected(rejection) => product.rejections.record(rejection),
                    }
                }
            }
        }
        Ok(product)
    }
}
