//! Run configuration: an optional JSON file, overridden by command-line flags.

use anyhow::{Context, Result};
use opcalc_psi::{GrowthOptions, PoolGeometry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Settings shared by every demand of one `opcalc run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Records per demand pool (default: `max(n³, 1000)`).
    pub pool_capacity: Option<usize>,
    pub max_hops: Option<usize>,
    pub parallel: bool,
    pub timeout_ms: Option<u64>,
    pub report_direct_edges: bool,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid run config {}", path.display()))
    }

    /// Layer command-line values on top; unset flags keep the file's value.
    pub fn with_overrides(mut self, overrides: &RunConfig) -> Self {
        if overrides.pool_capacity.is_some() {
            self.pool_capacity = overrides.pool_capacity;
        }
        if overrides.max_hops.is_some() {
            self.max_hops = overrides.max_hops;
        }
        if overrides.timeout_ms.is_some() {
            self.timeout_ms = overrides.timeout_ms;
        }
        self.parallel |= overrides.parallel;
        self.report_direct_edges |= overrides.report_direct_edges;
        self
    }

    pub fn growth_options(&self) -> GrowthOptions {
        GrowthOptions {
            parallel: self.parallel,
            max_hops: self.max_hops,
            deadline: self.timeout_ms.map(Duration::from_millis),
            report_direct_edges: self.report_direct_edges,
        }
    }

    /// Geometry of the per-demand pools for a graph of `vertex_count` vertices.
    pub fn pool_geometry(&self, vertex_count: usize, weight_dim: usize) -> Result<PoolGeometry> {
        let geometry = PoolGeometry::for_graph(vertex_count, weight_dim)?;
        Ok(match self.pool_capacity {
            Some(capacity) => geometry.with_capacity(capacity)?,
            None => geometry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file_values() {
        let file = RunConfig {
            pool_capacity: Some(100),
            max_hops: Some(4),
            parallel: true,
            timeout_ms: None,
            report_direct_edges: false,
        };
        let flags = RunConfig {
            max_hops: Some(2),
            timeout_ms: Some(250),
            ..Default::default()
        };
        let merged = file.with_overrides(&flags);
        assert_eq!(merged.pool_capacity, Some(100));
        assert_eq!(merged.max_hops, Some(2));
        assert!(merged.parallel);

        let options = merged.growth_options();
        assert_eq!(options.deadline, Some(Duration::from_millis(250)));
        assert!(!options.report_direct_edges);
    }

    #[test]
    fn loads_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "parallel": true, "pool_capacity": 64 }}"#).unwrap();
        let config = RunConfig::load(file.path()).unwrap();
        assert!(config.parallel);
        assert_eq!(config.pool_capacity, Some(64));
        assert_eq!(config.max_hops, None);

        let geometry = config.pool_geometry(3, 2).unwrap();
        assert_eq!((geometry.max_nodes, geometry.capacity), (3, 64));
    }

    #[test]
    fn rejects_unknown_keys_and_zero_capacity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "paralel": true }}"#).unwrap();
        assert!(RunConfig::load(file.path()).is_err());

        let config = RunConfig {
            pool_capacity: Some(0),
            ..Default::default()
        };
        assert!(config.pool_geometry(3, 1).is_err());
    }
}
