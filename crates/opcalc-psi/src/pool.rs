//! Fixed-capacity pool of reusable path-record slots.
//!
//! The growth step creates one candidate record per accepted `(left, right)`
//! pair in every cell of every iteration. Instead of allocating each one, the
//! pool hands out slots from a bounded slab:
//!
//! - **bump + free list**: fresh slots are taken in order until `capacity` is
//!   reached; released slots go on a free list and are reused first (O(1) both ways)
//! - **buffer reuse**: a slot keeps its `nodes` / `weight` buffers between uses
//! - **scoped release**: a `PathRecord` returns its slot when dropped, so a cell
//!   being cleared or a run being aborted releases everything it owned
//! - **generations**: `configure` invalidates every outstanding record; stale
//!   records no longer count against capacity and cannot be released explicitly
//!
//! Pools are explicit values (cheap `Arc` handles). Independent computations
//! hold independent pools; there is no process-wide instance.

use crate::error::{PsiError, Result};
use crate::record::PathRecord;
use opcalc_graph::VertexId;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Geometry
// ============================================================================

/// Smallest default slab: ten-node records, cubed.
pub const MIN_DEFAULT_CAPACITY: usize = 1000;

/// Record geometry and slab size of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolGeometry {
    /// Maximum number of vertices a record can hold.
    pub max_nodes: usize,
    /// Length of every record's weight vector.
    pub weight_dim: usize,
    /// Maximum number of simultaneously live records.
    pub capacity: usize,
}

impl PoolGeometry {
    pub fn new(max_nodes: usize, weight_dim: usize, capacity: usize) -> Result<Self> {
        if max_nodes < 1 {
            return Err(PsiError::dimension("max nodes per record must be at least 1"));
        }
        if weight_dim < 1 {
            return Err(PsiError::dimension("weight dimension must be at least 1"));
        }
        if capacity < 1 {
            return Err(PsiError::dimension("pool capacity must be at least 1"));
        }
        Ok(Self {
            max_nodes,
            weight_dim,
            capacity,
        })
    }

    /// Geometry sized for a graph: records as long as the vertex count (at
    /// least one edge), and `max(n³, MIN_DEFAULT_CAPACITY)` slots.
    pub fn for_graph(vertex_count: usize, weight_dim: usize) -> Result<Self> {
        let capacity = vertex_count.saturating_pow(3).max(MIN_DEFAULT_CAPACITY);
        Self::new(vertex_count.max(2), weight_dim, capacity)
    }

    pub fn with_capacity(self, capacity: usize) -> Result<Self> {
        Self::new(self.max_nodes, self.weight_dim, capacity)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGeometry {
    max_nodes: usize,
    weight_dim: usize,
    capacity: usize,
}

impl<'de> Deserialize<'de> for PoolGeometry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawGeometry::deserialize(deserializer)?;
        PoolGeometry::new(raw.max_nodes, raw.weight_dim, raw.capacity)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Pool
// ============================================================================

#[derive(Debug, Default)]
struct Slot {
    in_use: bool,
    nodes: Vec<VertexId>,
    weight: Vec<f64>,
}

#[derive(Debug)]
struct PoolState {
    generation: u64,
    geometry: PoolGeometry,
    /// Grows lazily up to `geometry.capacity`.
    slots: Vec<Slot>,
    free: Vec<u32>,
    in_use: usize,
    high_water: usize,
}

impl PoolState {
    fn new(geometry: PoolGeometry, generation: u64) -> Self {
        Self {
            generation,
            geometry,
            slots: Vec::new(),
            free: Vec::new(),
            in_use: 0,
            high_water: 0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PoolShared {
    id: u64,
    state: Mutex<PoolState>,
}

impl PoolShared {
    /// Take a slot's buffers back. Stale generations and already-free slots
    /// are ignored.
    pub(crate) fn recycle(
        &self,
        slot: u32,
        generation: u64,
        mut nodes: Vec<VertexId>,
        mut weight: Vec<f64>,
    ) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        let Some(entry) = state.slots.get_mut(slot as usize) else {
            return;
        };
        if !entry.in_use {
            return;
        }
        nodes.clear();
        weight.clear();
        entry.in_use = false;
        entry.nodes = nodes;
        entry.weight = weight;
        state.free.push(slot);
        state.in_use -= 1;
    }
}

/// Handle to a record pool. Clones share the same slab.
#[derive(Debug, Clone)]
pub struct RecordPool {
    shared: Arc<PoolShared>,
}

impl RecordPool {
    pub fn new(geometry: PoolGeometry) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(PoolState::new(geometry, 0)),
            }),
        }
    }

    /// Process-local identity of this pool.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Re-initialize the slab with a new geometry.
    ///
    /// Every record issued before this call becomes stale: it keeps its data,
    /// but it no longer occupies a slot and `release` rejects it.
    pub fn configure(&self, geometry: PoolGeometry) {
        let mut state = self.shared.state.lock();
        let generation = state.generation + 1;
        *state = PoolState::new(geometry, generation);
        tracing::debug!(
            pool = self.shared.id,
            generation,
            max_nodes = geometry.max_nodes,
            weight_dim = geometry.weight_dim,
            capacity = geometry.capacity,
            "record pool configured"
        );
    }

    pub fn geometry(&self) -> PoolGeometry {
        self.shared.state.lock().geometry
    }

    pub fn capacity(&self) -> usize {
        self.geometry().capacity
    }

    pub fn in_use(&self) -> usize {
        self.shared.state.lock().in_use
    }

    pub fn available(&self) -> usize {
        let state = self.shared.state.lock();
        state.geometry.capacity - state.in_use
    }

    /// Largest number of simultaneously live records since the last `configure`.
    pub fn high_water(&self) -> usize {
        self.shared.state.lock().high_water
    }

    /// Take a zeroed, exclusively owned record.
    pub fn acquire(&self) -> Result<PathRecord> {
        let mut state = self.shared.state.lock();
        let geometry = state.geometry;
        let generation = state.generation;

        let slot = match state.free.pop() {
            Some(slot) => slot,
            None if state.slots.len() < geometry.capacity => {
                state.slots.push(Slot::default());
                (state.slots.len() - 1) as u32
            }
            None => {
                tracing::warn!(
                    pool = self.shared.id,
                    capacity = geometry.capacity,
                    "record pool exhausted"
                );
                return Err(PsiError::ResourceExhausted {
                    capacity: geometry.capacity,
                });
            }
        };

        let entry = &mut state.slots[slot as usize];
        entry.in_use = true;
        let mut nodes = std::mem::take(&mut entry.nodes);
        let mut weight = std::mem::take(&mut entry.weight);

        state.in_use += 1;
        state.high_water = state.high_water.max(state.in_use);
        drop(state);

        nodes.reserve(geometry.max_nodes);
        weight.reserve(geometry.weight_dim);
        Ok(PathRecord::issued(
            Arc::clone(&self.shared),
            slot,
            generation,
            geometry,
            nodes,
            weight,
        ))
    }

    /// Return a record to the pool.
    ///
    /// Releasing a slot that is already free is a no-op. A record from another
    /// pool, or from before the last `configure`, is `UnknownHandle`.
    pub fn release(&self, record: PathRecord) -> Result<()> {
        let slot = record.slot();
        if !self.owns(&record) {
            return Err(PsiError::UnknownHandle { slot });
        }
        drop(record);
        Ok(())
    }

    /// True when `record` was issued by this pool under its current configuration.
    pub fn owns(&self, record: &PathRecord) -> bool {
        if !Arc::ptr_eq(record.home(), &self.shared) {
            return false;
        }
        let state = self.shared.state.lock();
        state.generation == record.generation()
            && (record.slot() as usize) < state.slots.len()
    }

    /// Acquire a record and deep-copy `source` into it.
    pub fn clone_record(&self, source: &PathRecord) -> Result<PathRecord> {
        let mut record = self.acquire()?;
        record.copy_from(source)?;
        Ok(record)
    }
}
