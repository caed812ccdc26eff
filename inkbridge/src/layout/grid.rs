//! Reference layout engine: deterministic grid placement.
//!
//! Stands in for a real asynchronous layout algorithm so the external
//! hand-off path is exercisable by the CLI and tests. Nodes are placed on a
//! fixed grid in declaration order; everything else in the graph is passed
//! through untouched.

use super::{LayoutEngine, LayoutError, LayoutFuture};
use serde_json::Value;

/// Default number of grid columns.
const DEFAULT_COLUMNS: usize = 4;
/// Default distance between grid cells.
const DEFAULT_SPACING: f64 = 200.0;

/// Grid-placement layout engine.
#[derive(Debug, Clone)]
pub struct GridLayoutEngine {
    columns: usize,
    spacing: f64,
}

impl GridLayoutEngine {
    /// Creates an engine with the default grid shape.
    pub fn new() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            spacing: DEFAULT_SPACING,
        }
    }

    /// Creates an engine with a custom grid shape.
    ///
    /// `columns` must be at least 1.
    pub fn with_grid(columns: usize, spacing: f64) -> Self {
        Self {
            columns: columns.max(1),
            spacing,
        }
    }
}

impl Default for GridLayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine for GridLayoutEngine {
    fn name(&self) -> &str {
        "grid"
    }

    fn layout(&self, mut graph: Value) -> LayoutFuture<'_> {
        let columns = self.columns;
        let spacing = self.spacing;
        Box::pin(async move {
            // Yield once so the engine genuinely runs as an async step,
            // the way a real out-of-module algorithm would.
            tokio::task::yield_now().await;

            let nodes = graph
                .get_mut("nodes")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| LayoutError::new("graph has no nodes array"))?;
            for (index, node) in nodes.iter_mut().enumerate() {
                let object = node
                    .as_object_mut()
                    .ok_or_else(|| LayoutError::new("graph node is not an object"))?;
                let col = index % columns;
                let row = index / columns;
                object.insert("x".to_string(), Value::from(col as f64 * spacing));
                object.insert("y".to_string(), Value::from(row as f64 * spacing));
            }
            Ok(graph)
        })
    }
}
