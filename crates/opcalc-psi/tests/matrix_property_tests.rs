//! Property tests for Psi matrices and the growth engine.
//!
//! Found paths are checked against a depth-first enumeration of simple paths.

use opcalc_graph::{Demand, GraphStore, OrientedGraph, VertexId, WeightVector};
use opcalc_psi::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

const NAMES: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

// ============================================================================
// Strategies
// ============================================================================

/// Small random graph: 2..=6 vertices, integer weights in 0..=3, 1..=2 dimensions.
fn arb_graph() -> impl Strategy<Value = OrientedGraph> {
    (2usize..=6, 1usize..=2).prop_flat_map(|(n, dim)| {
        prop::collection::vec(
            (0..n, 0..n, prop::collection::vec(0u8..=3, dim)),
            0..=n * 2,
        )
        .prop_map(move |edges| {
            let mut graph = OrientedGraph::new(dim).unwrap();
            for name in &NAMES[..n] {
                graph.ensure_vertex(name);
            }
            for (src, dst, weight) in edges {
                let weight = WeightVector::new(weight.into_iter().map(f64::from).collect()).unwrap();
                // Duplicate edges are simply skipped.
                let _ = graph.add_edge(
                    &VertexId::new(NAMES[src]),
                    &VertexId::new(NAMES[dst]),
                    weight,
                );
            }
            graph
        })
    })
}

fn arb_case() -> impl Strategy<Value = (OrientedGraph, usize, usize, f64)> {
    arb_graph().prop_flat_map(|graph| {
        let n = graph.vertex_count();
        (Just(graph), 0..n, 0..n, 0u8..=9).prop_map(|(g, s, d, b)| (g, s, d, f64::from(b)))
    })
}

// ============================================================================
// Reference Enumeration
// ============================================================================

fn brute_force(
    graph: &OrientedGraph,
    source: &VertexId,
    destination: &VertexId,
    bound: &WeightVector,
) -> BTreeSet<Vec<VertexId>> {
    fn visit(
        graph: &OrientedGraph,
        destination: &VertexId,
        bound: &WeightVector,
        path: &mut Vec<VertexId>,
        weight: &mut Vec<f64>,
        out: &mut BTreeSet<Vec<VertexId>>,
    ) {
        let Some(last) = path.last().cloned() else {
            return;
        };
        if path.len() >= 3 && &last == destination {
            out.insert(path.clone());
        }
        for i in 0..graph.vertex_count() {
            let Some(next) = graph.vertex_at(i) else {
                continue;
            };
            let Some(edge) = graph.edge_weight(&last, next) else {
                continue;
            };
            if path.contains(next) {
                continue;
            }
            let sum: Vec<f64> = weight
                .iter()
                .zip(edge.as_slice())
                .map(|(a, b)| a + b)
                .collect();
            if !bound.admits(&sum) {
                continue;
            }
            let saved = std::mem::replace(weight, sum);
            path.push(next.clone());
            visit(graph, destination, bound, path, weight, out);
            path.pop();
            *weight = saved;
        }
    }

    let mut out = BTreeSet::new();
    let mut path = vec![source.clone()];
    let mut weight = vec![0.0; graph.weight_dimension()];
    visit(graph, destination, bound, &mut path, &mut weight, &mut out);
    out
}

fn grow(graph: &OrientedGraph, demand: Demand, parallel: bool) -> (GrowthSummary, usize) {
    let geometry =
        PoolGeometry::for_graph(graph.vertex_count(), graph.weight_dimension()).unwrap();
    let base_pool = RecordPool::new(geometry);
    let base = PathMatrix::from_graph(graph, &base_pool).unwrap();
    // Generous slab: the property under test is enumeration, not exhaustion.
    let pool = RecordPool::new(geometry.with_capacity(1 << 16).unwrap());
    let options = GrowthOptions {
        parallel,
        ..Default::default()
    };
    let summary = PathGrowthEngine::new(&base, demand, pool.clone(), options)
        .unwrap()
        .run_to_completion()
        .unwrap();
    (summary, pool.in_use())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_growth_matches_brute_force((graph, s, d, b) in arb_case()) {
        let source = graph.vertex_at(s).unwrap().clone();
        let destination = graph.vertex_at(d).unwrap().clone();
        let bound = WeightVector::new(vec![b; graph.weight_dimension()]).unwrap();
        let demand = Demand::new(source.clone(), destination.clone(), bound.clone());

        let (summary, leaked) = grow(&graph, demand, false);
        prop_assert_eq!(leaked, 0);

        let found: Vec<Vec<VertexId>> = summary.found.iter().map(|p| p.nodes.clone()).collect();
        let unique: BTreeSet<Vec<VertexId>> = found.iter().cloned().collect();
        prop_assert_eq!(unique.len(), found.len(), "duplicate paths reported");
        prop_assert_eq!(unique, brute_force(&graph, &source, &destination, &bound));

        for path in &summary.found {
            prop_assert!(bound.admits(&path.weight));
            prop_assert_eq!(path.nodes.first(), Some(&source));
            prop_assert_eq!(path.nodes.last(), Some(&destination));
        }
        // Hop-length order.
        prop_assert!(summary.found.windows(2).all(|w| w[0].hop_count() <= w[1].hop_count()));
        prop_assert!(summary.iterations.len() < graph.vertex_count().max(2));
    }

    #[test]
    fn prop_parallel_matches_serial((graph, s, d, b) in arb_case()) {
        let source = graph.vertex_at(s).unwrap().clone();
        let destination = graph.vertex_at(d).unwrap().clone();
        let bound = WeightVector::new(vec![b; graph.weight_dimension()]).unwrap();
        let demand = Demand::new(source, destination, bound);

        let (serial, _) = grow(&graph, demand.clone(), false);
        let (parallel, leaked) = grow(&graph, demand, true);
        prop_assert_eq!(leaked, 0);
        prop_assert_eq!(&serial.found, &parallel.found);
        prop_assert_eq!(serial.termination, parallel.termination);
        prop_assert_eq!(serial.iterations.len(), parallel.iterations.len());
    }

    #[test]
    fn prop_zero_iff_every_cell_empty(graph in arb_graph()) {
        let geometry =
            PoolGeometry::for_graph(graph.vertex_count(), graph.weight_dimension()).unwrap();
        let pool = RecordPool::new(geometry);
        let base = PathMatrix::from_graph(&graph, &pool).unwrap();

        let n = base.size();
        let all_empty = (0..n).all(|i| (0..n).all(|j| base.cell(i, j).is_zero()));
        prop_assert_eq!(base.is_zero(), all_empty);
        prop_assert_eq!(base.is_zero(), graph.edge_count() == 0);
        prop_assert_eq!(base.record_count(), graph.edge_count());
        prop_assert_eq!(pool.in_use(), graph.edge_count());
    }

    #[test]
    fn prop_deep_clone_is_independent(graph in arb_graph()) {
        let geometry =
            PoolGeometry::for_graph(graph.vertex_count(), graph.weight_dimension()).unwrap();
        let pool = RecordPool::new(geometry);
        let base = PathMatrix::from_graph(&graph, &pool).unwrap();

        let mut copy = base.deep_clone(&pool).unwrap();
        prop_assert_eq!(&copy, &base);
        prop_assert_eq!(pool.in_use(), 2 * base.record_count());

        let n = base.size();
        for i in 0..n {
            for j in 0..n {
                for (a, b) in base.cell(i, j).records().iter().zip(copy.cell(i, j).records()) {
                    prop_assert_ne!(a.slot(), b.slot());
                }
            }
        }

        copy.clear();
        prop_assert!(copy.is_zero());
        prop_assert_eq!(base.record_count(), graph.edge_count());
        prop_assert_eq!(pool.in_use(), base.record_count());
    }
}

// ============================================================================
// Deterministic Matrix Cases
// ============================================================================

#[test]
fn clone_into_rejects_mismatched_shapes() {
    let geometry = PoolGeometry::new(3, 1, 16).unwrap();
    let pool = RecordPool::new(geometry);
    let source = PathMatrix::new(3, 1).unwrap();

    let mut wrong_size = PathMatrix::new(2, 1).unwrap();
    assert!(matches!(
        source.clone_into(&mut wrong_size, &pool),
        Err(PsiError::InvalidDimension(_))
    ));

    let mut wrong_dim = PathMatrix::new(3, 2).unwrap();
    assert!(matches!(
        source.clone_into(&mut wrong_dim, &pool),
        Err(PsiError::InvalidDimension(_))
    ));
}

#[test]
fn clone_into_replaces_previous_content() {
    let mut graph = OrientedGraph::new(1).unwrap();
    let a = graph.ensure_vertex("A");
    let b = graph.ensure_vertex("B");
    graph
        .add_edge(&a, &b, WeightVector::new(vec![0.5]).unwrap())
        .unwrap();
    graph
        .add_edge(&b, &a, WeightVector::new(vec![0.25]).unwrap())
        .unwrap();

    let pool = RecordPool::new(PoolGeometry::for_graph(2, 1).unwrap());
    let base = PathMatrix::from_graph(&graph, &pool).unwrap();
    let mut target = base.deep_clone(&pool).unwrap();
    target.cell_mut(0, 1).clear();
    assert_ne!(target, base);

    base.clone_into(&mut target, &pool).unwrap();
    assert_eq!(target, base);
    assert_eq!(pool.in_use(), 4);

    let record = &target.cell(1, 0).records()[0];
    approx::assert_relative_eq!(record.weight().unwrap()[0], 0.25);
    assert_eq!(record.nodes(), &[b, a][..]);
}
