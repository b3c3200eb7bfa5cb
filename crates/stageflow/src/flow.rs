//! Flow tree - stages composed sequentially or in parallel

use crate::stage::{SharedStage, Stage};
use std::fmt::Write as _;
use std::sync::Arc;

/// A node of an execution tree
///
/// Leaves are stages; interior nodes run their children either one after
/// another or concurrently. Trees are built once per request and executed
/// once.
#[derive(Debug, Clone)]
pub enum FlowNode {
    /// Nothing to do
    Noop { id: String },
    /// A single side-effecting action
    Stage(SharedStage),
    /// Children run in order; the first failure stops the chain
    Sequential { id: String, children: Vec<FlowNode> },
    /// Children run concurrently and independently
    Parallel { id: String, children: Vec<FlowNode> },
}

impl FlowNode {
    /// Wrap a stage
    pub fn stage<S: Stage + 'static>(stage: S) -> Self {
        Self::Stage(Arc::new(stage))
    }

    /// Empty node
    pub fn noop(id: impl Into<String>) -> Self {
        Self::Noop { id: id.into() }
    }

    /// Sequential node; no-op children are dropped
    ///
    /// Returns a no-op when nothing is left.
    pub fn sequential(id: impl Into<String>, children: Vec<FlowNode>) -> Self {
        let id = id.into();
        let children: Vec<FlowNode> = children.into_iter().filter(|c| !c.is_noop()).collect();
        if children.is_empty() {
            return Self::Noop { id };
        }
        Self::Sequential { id, children }
    }

    /// Parallel node holding exactly the given children
    pub fn parallel(id: impl Into<String>, children: Vec<FlowNode>) -> Self {
        Self::Parallel {
            id: id.into(),
            children,
        }
    }

    /// Combine optional stages into the smallest equivalent node
    ///
    /// Absent and no-op candidates are dropped. Nothing left gives a no-op,
    /// a single survivor is returned as is, several become a parallel node.
    pub fn combine(id: impl Into<String>, candidates: Vec<Option<FlowNode>>) -> Self {
        let mut survivors: Vec<FlowNode> = candidates
            .into_iter()
            .flatten()
            .filter(|c| !c.is_noop())
            .collect();

        match survivors.len() {
            0 => Self::noop(id),
            1 => survivors.remove(0),
            _ => Self::parallel(id, survivors),
        }
    }

    /// Node id (stage id for leaves)
    pub fn id(&self) -> String {
        match self {
            Self::Noop { id } | Self::Sequential { id, .. } | Self::Parallel { id, .. } => {
                id.clone()
            }
            Self::Stage(stage) => stage.id(),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop { .. })
    }

    /// Children of an interior node
    pub fn children(&self) -> &[FlowNode] {
        match self {
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => children,
            Self::Noop { .. } | Self::Stage(_) => &[],
        }
    }

    /// All stages in depth-first order
    pub fn stages(&self) -> Vec<&SharedStage> {
        let mut out = Vec::new();
        self.collect_stages(&mut out);
        out
    }

    fn collect_stages<'a>(&'a self, out: &mut Vec<&'a SharedStage>) {
        match self {
            Self::Stage(stage) => out.push(stage),
            Self::Noop { .. } => {}
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => {
                for child in children {
                    child.collect_stages(out);
                }
            }
        }
    }

    /// Ids of all stages in depth-first order
    pub fn stage_ids(&self) -> Vec<String> {
        self.stages().iter().map(|s| s.id()).collect()
    }

    /// Total number of stages in the tree
    pub fn stage_count(&self) -> usize {
        self.stages().len()
    }

    /// Find a node by id
    pub fn find(&self, id: &str) -> Option<&FlowNode> {
        if self.id() == id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(id))
    }

    /// Render the tree as indented text
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = match self {
            Self::Noop { id } => writeln!(out, "{indent}∅ {id}"),
            Self::Stage(stage) => writeln!(out, "{indent}• {}", stage.description()),
            Self::Sequential { id, .. } => writeln!(out, "{indent}→ {id}"),
            Self::Parallel { id, .. } => writeln!(out, "{indent}⇉ {id}"),
        };
        for child in self.children() {
            child.render_into(out, depth + 1);
        }
    }
}
