//! Dependency chain parsing and wiring

use crate::build::{
    definition::BuiltStep,
    error::{BuildError, BuildResult},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Separator between step names in a chain expression
pub const CHAIN_SEPARATOR: &str = " >> ";

/// `destination` runs after `source`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub destination: String,
}

impl DependencyEdge {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.source, CHAIN_SEPARATOR, self.destination)
    }
}

/// Edges of one chain expression: `"A >> B >> C"` yields A→B and B→C
pub fn parse_chain(expression: &str) -> Vec<DependencyEdge> {
    let names: Vec<&str> = expression
        .split(CHAIN_SEPARATOR)
        .map(str::trim)
        .collect();

    names
        .windows(2)
        .map(|pair| DependencyEdge::new(pair[0], pair[1]))
        .collect()
}

/// Attaches the dependency graph declared by chain expressions to built steps
pub struct DependencyResolver;

impl DependencyResolver {
    /// Edges of all expressions, in declaration order, without repeats
    pub fn parse(expressions: &[String]) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = Vec::new();
        for edge in expressions.iter().flat_map(|expression| parse_chain(expression)) {
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }
        edges
    }

    /// Parse `expressions` and attach every edge to `steps`
    ///
    /// Names are matched exactly against the full list of steps from all
    /// models. An edge whose destination is a composite step attaches to the
    /// composite's first inner sub-step.
    pub fn resolve(expressions: &[String], steps: &mut [BuiltStep]) -> BuildResult<Vec<DependencyEdge>> {
        let edges = Self::parse(expressions);
        for edge in &edges {
            Self::apply(edge, steps)?;
        }
        Ok(edges)
    }

    /// Attach a single edge
    pub fn apply(edge: &DependencyEdge, steps: &mut [BuiltStep]) -> BuildResult<()> {
        let failure = |reason: String| BuildError::DependencyWiringFailure {
            source_step: edge.source.clone(),
            destination_step: edge.destination.clone(),
            reason,
        };

        if edge.source.is_empty() || edge.destination.is_empty() {
            return Err(failure("empty step name in chain expression".to_string()));
        }
        if edge.source == edge.destination {
            return Err(failure(format!("step '{}' cannot depend on itself", edge.source)));
        }

        let source_name = steps
            .iter()
            .find(|step| step.name == edge.source)
            .map(|step| step.step.dependency_source_name().to_string())
            .ok_or_else(|| failure(format!("step '{}' not found", edge.source)))?;

        let destination = steps
            .iter_mut()
            .find(|step| step.name == edge.destination)
            .ok_or_else(|| failure(format!("step '{}' not found", edge.destination)))?;

        destination.step.dependency_target_mut().add_depends_on(&source_name);
        debug!("Added dependency {}", edge);
        Ok(())
    }
}
