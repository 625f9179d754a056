//! Graph resolver interface.
//!
//! Turning DSL text into components and dependencies is the resolver's job;
//! the plan builder only consumes its output.

use crate::core::REQUEST_INPUT_INDEX;
use crate::errors::{PlanError, ResolveError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;

/// Resolves inference DSL text into an ordered component graph.
///
/// Implementations must emit components in a valid topological order; the
/// plan builder never re-sorts.
pub trait GraphResolver: Send + Sync + Debug {
    /// Resolves the DSL.
    ///
    /// # Errors
    ///
    /// Returns a `ResolveError` if the DSL cannot be interpreted.
    fn resolve(&self, dsl: &str) -> Result<ResolvedGraph, ResolveError>;
}

/// Output of a [`GraphResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGraph {
    /// Component names in execution order.
    pub components: Vec<String>,
    /// Implementation id by component name.
    #[serde(default)]
    pub implementations: HashMap<String, String>,
    /// Upstream indices by component index; `-1` is the request input.
    #[serde(default)]
    pub upstream: HashMap<usize, BTreeSet<i64>>,
}

impl ResolvedGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a component with its implementation and upstream indices.
    #[must_use]
    pub fn component(
        mut self,
        name: impl Into<String>,
        implementation: impl Into<String>,
        upstream: impl IntoIterator<Item = i64>,
    ) -> Self {
        let name = name.into();
        let index = self.components.len();
        let upstream: BTreeSet<i64> = upstream.into_iter().collect();

        self.implementations.insert(name.clone(), implementation.into());
        if !upstream.is_empty() {
            self.upstream.insert(index, upstream);
        }
        self.components.push(name);
        self
    }

    /// Returns the number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the graph has no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns the implementation id declared for a component.
    #[must_use]
    pub fn implementation_of(&self, component: &str) -> Option<&str> {
        self.implementations.get(component).map(String::as_str)
    }

    /// Returns the upstream set of a component index; empty if none declared.
    #[must_use]
    pub fn upstream_of(&self, index: usize) -> BTreeSet<i64> {
        self.upstream.get(&index).cloned().unwrap_or_default()
    }

    /// Checks that every upstream index is the request sentinel or an
    /// earlier component.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::InvalidUpstream` for the first offending index.
    pub fn validate(&self) -> Result<(), PlanError> {
        for (index, component) in self.components.iter().enumerate() {
            let Some(upstream) = self.upstream.get(&index) else {
                continue;
            };

            let invalid = upstream.iter().find(|&&up| {
                up != REQUEST_INPUT_INDEX && usize::try_from(up).map_or(true, |up| up >= index)
            });

            if let Some(&up) = invalid {
                return Err(PlanError::InvalidUpstream {
                    component: component.clone(),
                    index,
                    upstream: up,
                });
            }
        }
        Ok(())
    }
}

/// Resolver whose DSL text is a JSON-encoded [`ResolvedGraph`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonGraphResolver;

impl GraphResolver for JsonGraphResolver {
    fn resolve(&self, dsl: &str) -> Result<ResolvedGraph, ResolveError> {
        serde_json::from_str(dsl).map_err(|e| ResolveError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ResolvedGraph {
        ResolvedGraph::new()
            .component("dataio_0", "DataIO", [-1])
            .component("intersect_0", "Intersection", [0])
            .component("lr_0", "HeteroLR", [0, 1])
    }

    #[test]
    fn test_component_builder() {
        let graph = chain();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.implementation_of("lr_0"), Some("HeteroLR"));
        assert_eq!(graph.upstream_of(2), BTreeSet::from([0, 1]));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_upstream_absent_is_empty() {
        let graph = ResolvedGraph::new().component("only", "Echo", []);
        assert!(graph.upstream_of(0).is_empty());
        assert!(graph.upstream.is_empty());
    }

    #[test]
    fn test_validate_rejects_forward_reference() {
        let mut graph = chain();
        graph.upstream.insert(1, BTreeSet::from([2]));

        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            PlanError::InvalidUpstream { index: 1, upstream: 2, .. }
        ));
    }

    #[test]
    fn test_validate_rejects_self_reference() {
        let graph = ResolvedGraph::new().component("a", "Echo", [0]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_index() {
        let graph = ResolvedGraph::new().component("a", "Echo", [-2]);
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_graph_deserializes() {
        let json = r#"{
            "components": ["a", "b"],
            "implementations": {"a": "Echo", "b": "Echo"},
            "upstream": {"1": [0]}
        }"#;
        let graph: ResolvedGraph = serde_json::from_str(json).unwrap();

        assert_eq!(graph.upstream_of(1), BTreeSet::from([0]));
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_json_resolver() {
        let dsl = serde_json::to_string(&chain()).unwrap();
        let graph = JsonGraphResolver.resolve(&dsl).unwrap();
        assert_eq!(graph, chain());

        let err = JsonGraphResolver.resolve("not a graph").unwrap_err();
        assert!(err.to_string().starts_with("Failed to resolve pipeline graph"));
    }
}
