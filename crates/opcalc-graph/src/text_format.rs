//! Line-oriented text format for graphs and demands.
//!
//! Both files share one record shape, one record per line:
//!
//! ```text
//! # comment
//! src dst w1 w2 ... wD
//! ```
//!
//! In a graph file the weights are the edge weight; in a demand file they are
//! the per-dimension constraint vector. Tokens are separated by any run of
//! whitespace. The first record fixes `D` for the whole file.

use crate::{Demand, GraphError, OrientedGraph, WeightVector};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed input on line {line}: {message}")]
    MalformedInput { line: usize, message: String },
    #[error("graph input contains no edges")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LoadError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            line,
            message: message.into(),
        }
    }

    fn graph(line: usize, err: GraphError) -> Self {
        Self::at(line, err.to_string())
    }
}

/// One parsed `src dst w1 ... wD` line.
#[derive(Debug)]
struct Record<'a> {
    line: usize,
    src: &'a str,
    dst: &'a str,
    weights: Vec<f64>,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parse every non-blank record, enforcing a constant weight arity.
fn records(text: &str) -> Result<Vec<Record<'_>>, LoadError> {
    let mut out = Vec::new();
    let mut dim: Option<usize> = None;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(LoadError::at(
                line_no,
                format!("expected `src dst w1 ... wD`, found {} token(s)", tokens.len()),
            ));
        }

        let arity = tokens.len() - 2;
        match dim {
            None => dim = Some(arity),
            Some(expected) if expected != arity => {
                return Err(LoadError::at(
                    line_no,
                    format!("weight dimension changed (is {arity}, should be {expected})"),
                ));
            }
            Some(_) => {}
        }

        let mut weights = Vec::with_capacity(arity);
        for token in &tokens[2..] {
            let value: f64 = token.parse().map_err(|_| {
                LoadError::at(line_no, format!("illegal value `{token}` (not a number)"))
            })?;
            weights.push(value);
        }

        out.push(Record {
            line: line_no,
            src: tokens[0],
            dst: tokens[1],
            weights,
        });
    }

    Ok(out)
}

/// Parse a graph description. Vertices are created in order of first mention.
pub fn parse_graph(text: &str) -> Result<OrientedGraph, LoadError> {
    let records = records(text)?;
    let first = records.first().ok_or(LoadError::Empty)?;
    let mut graph =
        OrientedGraph::new(first.weights.len()).map_err(|e| LoadError::graph(first.line, e))?;

    for rec in records {
        let src = graph.ensure_vertex(rec.src);
        let dst = graph.ensure_vertex(rec.dst);
        let weight = WeightVector::new(rec.weights).map_err(|e| LoadError::graph(rec.line, e))?;
        graph
            .add_edge(&src, &dst, weight)
            .map_err(|e| LoadError::graph(rec.line, e))?;
    }

    tracing::debug!(
        vertices = graph.vertices().len(),
        edges = graph.edge_count(),
        "parsed graph"
    );
    Ok(graph)
}

/// Parse demands against `graph`.
///
/// Demand endpoints that the graph does not know yet are registered as
/// (isolated) vertices, so the resulting graph must be used to build the base
/// matrix.
pub fn parse_demands(text: &str, graph: &mut OrientedGraph) -> Result<Vec<Demand>, LoadError> {
    use crate::GraphStore;

    let expected = graph.weight_dimension();
    let mut demands = Vec::new();
    for rec in records(text)? {
        if rec.weights.len() != expected {
            return Err(LoadError::graph(
                rec.line,
                GraphError::WeightDimension {
                    expected,
                    actual: rec.weights.len(),
                },
            ));
        }
        let constraints =
            WeightVector::new(rec.weights).map_err(|e| LoadError::graph(rec.line, e))?;
        let source = graph.ensure_vertex(rec.src);
        let destination = graph.ensure_vertex(rec.dst);
        demands.push(Demand {
            source,
            destination,
            constraints,
        });
    }

    tracing::debug!(demands = demands.len(), "parsed demands");
    Ok(demands)
}

pub fn load_graph(path: &Path) -> Result<OrientedGraph, LoadError> {
    let text = std::fs::read_to_string(path)?;
    parse_graph(&text)
}

pub fn load_demands(path: &Path, graph: &mut OrientedGraph) -> Result<Vec<Demand>, LoadError> {
    let text = std::fs::read_to_string(path)?;
    parse_demands(&text, graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_comment_keeps_prefix() {
        assert_eq!(strip_comment("A B 1 # edge"), "A B 1 ");
        assert_eq!(strip_comment("# only"), "");
        assert_eq!(strip_comment("A B 1"), "A B 1");
    }

    #[test]
    fn records_fix_arity_from_first_line() {
        let err = records("A B 1 2\nB C 1\n").unwrap_err();
        match err {
            LoadError::MalformedInput { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("dimension changed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
