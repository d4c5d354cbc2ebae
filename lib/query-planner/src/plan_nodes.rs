use std::fmt::{Display, Formatter, Result as FmtResult};

use lattice_composer::selection::FieldSelection;
use serde::{Deserialize, Serialize};

use crate::ast::operation::OperationKind;

pub type NodeId = usize;

/// One step in a response path. `List` marks a position where the parent
/// field yields a list and every element is visited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    Field(String),
    List,
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::List => write!(f, "@"),
        }
    }
}

/// A single subgraph fetch. Nodes live in the plan's arena and reference each
/// other by id, so the dependency graph is cheap to walk in both directions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchNode {
    pub id: NodeId,
    pub subgraph_name: String,
    /// The rendered operation document sent to the subgraph.
    pub operation: String,
    pub operation_kind: OperationKind,
    /// Type condition for entity fetches, `None` for root fetches.
    pub parent_type: Option<String>,
    /// Fields projected out of parent results to build entity
    /// representations: the entity key plus any `@requires` selections.
    pub requires: Option<Vec<FieldSelection>>,
    /// Where fetched data merges back into the response. Empty for root
    /// fetches.
    pub response_path: Vec<PathSegment>,
    /// Top-level response keys this fetch fills in. When the fetch fails the
    /// error is reported once per key, under `response_path`.
    pub output_keys: Vec<String>,
    pub variable_usages: Vec<String>,
    pub depends_on: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

impl FetchNode {
    pub fn is_entity_fetch(&self) -> bool {
        self.parent_type.is_some()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryPlan {
    pub nodes: Vec<FetchNode>,
    /// Nodes with no predecessors. They may all start at once.
    pub root_ids: Vec<NodeId>,
}

impl QueryPlan {
    /// Groups nodes into waves: a node sits one wave after its deepest
    /// predecessor. Purely informational; the executor schedules on
    /// dependency counts, not on waves.
    pub fn execution_waves(&self) -> Vec<Vec<NodeId>> {
        let mut depth = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for &dep in &node.depends_on {
                depth[node.id] = depth[node.id].max(depth[dep] + 1);
            }
        }

        let mut waves: Vec<Vec<NodeId>> = Vec::new();
        for node in &self.nodes {
            let wave = depth[node.id];
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(node.id);
        }
        waves
    }
}

fn display_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| segment.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

impl Display for QueryPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let waves = self.execution_waves();

        writeln!(f, "QueryPlan {{")?;
        let mut depth = 1;
        if waves.len() > 1 {
            writeln!(f, "{}Sequence {{", "  ".repeat(depth))?;
            depth += 1;
        }
        for wave in &waves {
            let parallel = wave.len() > 1;
            if parallel {
                writeln!(f, "{}Parallel {{", "  ".repeat(depth))?;
                depth += 1;
            }
            for &id in wave {
                fmt_node(f, &self.nodes[id], depth)?;
            }
            if parallel {
                depth -= 1;
                writeln!(f, "{}}}", "  ".repeat(depth))?;
            }
        }
        if waves.len() > 1 {
            depth -= 1;
            writeln!(f, "{}}}", "  ".repeat(depth))?;
        }
        write!(f, "}}")
    }
}

fn fmt_node(f: &mut Formatter<'_>, node: &FetchNode, mut depth: usize) -> FmtResult {
    if !node.response_path.is_empty() {
        writeln!(
            f,
            "{}Flatten(path: \"{}\") {{",
            "  ".repeat(depth),
            display_path(&node.response_path)
        )?;
        depth += 1;
    }
    writeln!(
        f,
        "{}Fetch(service: \"{}\") {{",
        "  ".repeat(depth),
        node.subgraph_name
    )?;
    writeln!(f, "{}{}", "  ".repeat(depth + 1), node.operation)?;
    writeln!(f, "{}}}", "  ".repeat(depth))?;
    if !node.response_path.is_empty() {
        depth -= 1;
        writeln!(f, "{}}}", "  ".repeat(depth))?;
    }
    Ok(())
}
