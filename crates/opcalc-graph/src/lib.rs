//! Oriented multi-weighted graphs for the operator-calculus path engine.
//!
//! This crate holds everything the Psi-matrix engine consumes but does not own:
//!
//! - **Vertex identity**: `VertexId`, a cheaply cloneable interned string
//! - **Weights**: `WeightVector`, a fixed-dimension vector of non-negative reals
//! - **Graph storage**: the `GraphStore` trait and its in-memory `OrientedGraph`
//! - **Demands**: `(source, destination, constraints)` triples, one engine run each
//! - **Text format**: `src dst w1 … wD` line records (see `text_format`)
//!
//! A graph is loaded once and is read-only afterwards; nothing here is
//! incremental or persistent.

pub mod text_format;

use ahash::AHashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use text_format::{load_demands, load_graph, parse_demands, parse_graph, LoadError};

// ============================================================================
// Errors
// ============================================================================

/// Structural errors raised while building a graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("weight dimension must be at least 1")]
    ZeroWeightDimension,
    #[error("vertex id `{0}` is already used by another vertex")]
    DuplicateVertex(String),
    #[error("unknown vertex `{0}`")]
    UnknownVertex(String),
    #[error("weight dimension mismatch (is {actual}, should be {expected})")]
    WeightDimension { expected: usize, actual: usize },
    #[error("edge {src} -> {dst} is already defined")]
    DuplicateEdge { src: String, dst: String },
    #[error("invalid weight: {0}")]
    InvalidWeight(String),
}

// ============================================================================
// Vertex Identity
// ============================================================================

/// Graph-unique vertex identifier.
///
/// Cloning shares the underlying string; equality and hashing are by value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(Arc<str>);

impl VertexId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for VertexId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VertexId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VertexId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl Serialize for VertexId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VertexId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Err(serde::de::Error::custom("vertex id must not be empty"));
        }
        Ok(Self::from(raw))
    }
}

// ============================================================================
// Weights
// ============================================================================

/// Multi-dimensional, non-negative weight (or constraint) vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// Build a weight vector; every component must be finite and `>= 0`.
    pub fn new(values: Vec<f64>) -> Result<Self, GraphError> {
        if values.is_empty() {
            return Err(GraphError::ZeroWeightDimension);
        }
        if let Some((d, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(GraphError::InvalidWeight(format!(
                "component {d} is {v} (must be finite and non-negative)"
            )));
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// First dimension `d` where `candidate[d]` exceeds this bound.
    ///
    /// Bounds are inclusive: `self[d] == candidate[d]` is admitted. A candidate
    /// of a different length is rejected at the first missing dimension.
    pub fn first_violation(&self, candidate: &[f64]) -> Option<usize> {
        if candidate.len() != self.0.len() {
            return Some(self.0.len().min(candidate.len()));
        }
        self.0
            .iter()
            .zip(candidate)
            .position(|(bound, value)| bound < value)
    }

    /// True when every component of `candidate` is within this bound.
    pub fn admits(&self, candidate: &[f64]) -> bool {
        self.first_violation(candidate).is_none()
    }
}

impl TryFrom<Vec<f64>> for WeightVector {
    type Error = GraphError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WeightVector> for Vec<f64> {
    fn from(value: WeightVector) -> Self {
        value.0
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// Demands
// ============================================================================

/// A path request: all simple paths from `source` to `destination` whose
/// cumulative weight stays within `constraints` in every dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    pub source: VertexId,
    pub destination: VertexId,
    pub constraints: WeightVector,
}

impl Demand {
    pub fn new(
        source: impl Into<VertexId>,
        destination: impl Into<VertexId>,
        constraints: WeightVector,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            constraints,
        }
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} within {}",
            self.source, self.destination, self.constraints
        )
    }
}

// ============================================================================
// Graph Store
// ============================================================================

/// Read-only view of a directed graph, as consumed by the Psi-matrix builder.
pub trait GraphStore {
    fn vertex_count(&self) -> usize;

    fn weight_dimension(&self) -> usize;

    /// Vertex at a dense index in `0..vertex_count()`.
    fn vertex_at(&self, index: usize) -> Option<&VertexId>;

    /// Weight of the edge `src -> dst`, if there is one.
    fn edge_weight(&self, src: &VertexId, dst: &VertexId) -> Option<&WeightVector>;

    /// Dense index of a vertex.
    fn index_of(&self, id: &VertexId) -> Option<usize>;
}

/// In-memory oriented, multi-weighted graph (at most one edge per ordered pair).
#[derive(Debug, Clone)]
pub struct OrientedGraph {
    weight_dim: usize,
    vertices: Vec<VertexId>,
    index: AHashMap<VertexId, usize>,
    edges: AHashMap<(usize, usize), WeightVector>,
    /// Insertion order of `edges`, for deterministic iteration.
    edge_order: Vec<(usize, usize)>,
}

impl OrientedGraph {
    pub fn new(weight_dim: usize) -> Result<Self, GraphError> {
        if weight_dim < 1 {
            return Err(GraphError::ZeroWeightDimension);
        }
        Ok(Self {
            weight_dim,
            vertices: Vec::new(),
            index: AHashMap::new(),
            edges: AHashMap::new(),
            edge_order: Vec::new(),
        })
    }

    /// Add a new vertex; fails if the id is already used.
    pub fn add_vertex(&mut self, id: impl Into<VertexId>) -> Result<VertexId, GraphError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateVertex(id.to_string()));
        }
        self.index.insert(id.clone(), self.vertices.len());
        self.vertices.push(id.clone());
        Ok(id)
    }

    /// Return the existing vertex with this id, adding it if needed.
    pub fn ensure_vertex(&mut self, id: &str) -> VertexId {
        if let Some(existing) = self.find_vertex(id) {
            return existing.clone();
        }
        let id = VertexId::new(id);
        self.index.insert(id.clone(), self.vertices.len());
        self.vertices.push(id.clone());
        id
    }

    pub fn find_vertex(&self, id: &str) -> Option<&VertexId> {
        self.vertices.get(*self.index.get(id)?)
    }

    pub fn add_edge(
        &mut self,
        src: &VertexId,
        dst: &VertexId,
        weight: WeightVector,
    ) -> Result<(), GraphError> {
        let s = self
            .index_of(src)
            .ok_or_else(|| GraphError::UnknownVertex(src.to_string()))?;
        let d = self
            .index_of(dst)
            .ok_or_else(|| GraphError::UnknownVertex(dst.to_string()))?;
        if weight.dim() != self.weight_dim {
            return Err(GraphError::WeightDimension {
                expected: self.weight_dim,
                actual: weight.dim(),
            });
        }
        if self.edges.contains_key(&(s, d)) {
            return Err(GraphError::DuplicateEdge {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        self.edges.insert((s, d), weight);
        self.edge_order.push((s, d));
        Ok(())
    }

    pub fn edge_count(&self) -> usize {
        self.edge_order.len()
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&VertexId, &VertexId, &WeightVector)> + '_ {
        self.edge_order.iter().filter_map(move |key| {
            let weight = self.edges.get(key)?;
            Some((&self.vertices[key.0], &self.vertices[key.1], weight))
        })
    }
}

impl GraphStore for OrientedGraph {
    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn weight_dimension(&self) -> usize {
        self.weight_dim
    }

    fn vertex_at(&self, index: usize) -> Option<&VertexId> {
        self.vertices.get(index)
    }

    fn edge_weight(&self, src: &VertexId, dst: &VertexId) -> Option<&WeightVector> {
        let s = self.index_of(src)?;
        let d = self.index_of(dst)?;
        self.edges.get(&(s, d))
    }

    fn index_of(&self, id: &VertexId) -> Option<usize> {
        self.index.get(id).copied()
    }
}

impl fmt::Display for OrientedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Graph ({} vertices, {} edges, weight dimension = {}):",
            self.vertices.len(),
            self.edge_count(),
            self.weight_dim
        )?;
        for (src, dst, weight) in self.edges() {
            writeln!(f, "  {src} -> {dst} {weight}")?;
        }
        Ok(())
    }
}
