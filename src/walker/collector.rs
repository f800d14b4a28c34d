//! Statistics accumulation shared by both walkers
//!
//! Walkers translate their input into open/text/close calls; everything that
//! ends up in a [`StructureSummary`] is decided here, which is what keeps the
//! in-memory and streaming paths equivalent.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{IntrospectError, Result};
use crate::model::{
    ElementNode, Recovery, StructureSummary, TagStats, WalkMode, is_namespace_declaration,
    local_name,
};

/// How much of each example subtree to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub examples_per_tag: usize,
    /// Upper bound on the elements kept in one captured example
    pub max_example_nodes: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            examples_per_tag: 5,
            max_example_nodes: 512,
        }
    }
}

struct Frame {
    local: String,
    capture: Option<ElementNode>,
    example_root: bool,
    /// Whether the finished node joins its parent's captured subtree
    attach: bool,
    /// Stack index of the frame whose node budget this capture draws from
    budget_root: usize,
    remaining_nodes: usize,
}

/// Event-driven builder for a [`StructureSummary`]
pub struct StatsCollector {
    limits: CaptureLimits,
    mode: WalkMode,
    stack: Vec<Frame>,
    tag_stats: IndexMap<String, TagStats>,
    namespace_decls: IndexMap<String, String>,
    root: Option<(String, String)>,
    max_depth: usize,
    total_element_count: usize,
    recoveries: Vec<Recovery>,
}

impl StatsCollector {
    pub fn new(mode: WalkMode, limits: CaptureLimits) -> Self {
        Self {
            limits,
            mode,
            stack: Vec::new(),
            tag_stats: IndexMap::new(),
            namespace_decls: IndexMap::new(),
            root: None,
            max_depth: 0,
            total_element_count: 0,
            recoveries: Vec::new(),
        }
    }

    pub fn total_element_count(&self) -> usize {
        self.total_element_count
    }

    /// Current nesting depth, i.e. the depth the next opened element gets
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    /// True once the root element has been closed
    pub fn root_closed(&self) -> bool {
        self.root.is_some() && self.stack.is_empty()
    }

    pub fn record_recovery(&mut self, recovery: Recovery) {
        debug!(%recovery, "walker recovered");
        self.recoveries.push(recovery);
    }

    pub fn open<'a>(&mut self, name: &str, attributes: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let depth = self.stack.len();
        let local = local_name(name).to_string();
        let is_root = self.root.is_none();
        if is_root {
            self.root = Some((local.clone(), name.to_string()));
        }

        self.total_element_count += 1;
        self.max_depth = self.max_depth.max(depth);

        if let Some(parent) = self.stack.last() {
            let parent_local = parent.local.clone();
            self.tag_stats
                .entry(parent_local)
                .or_default()
                .child_tag_names
                .insert(local.clone());
        }

        let mut node = ElementNode::new(name, depth);
        let stats = self.tag_stats.entry(local.clone()).or_default();
        stats.count += 1;
        stats.max_depth = stats.max_depth.max(depth);
        for (key, value) in attributes {
            if is_namespace_declaration(key) {
                if is_root {
                    self.namespace_decls.insert(key.to_string(), value.to_string());
                }
            } else {
                stats.attribute_names.insert(key.to_string());
            }
            node.attributes.insert(key.to_string(), value.to_string());
        }
        let wants_example = stats.examples.len() < self.limits.examples_per_tag;

        let parent_budget = self
            .stack
            .last()
            .filter(|parent| parent.capture.is_some())
            .map(|parent| parent.budget_root);
        let attach = match parent_budget {
            Some(index) if self.stack[index].remaining_nodes > 0 => {
                self.stack[index].remaining_nodes -= 1;
                true
            }
            _ => false,
        };

        let frame = if wants_example {
            Frame {
                local,
                capture: Some(node),
                example_root: true,
                attach,
                budget_root: depth,
                remaining_nodes: self.limits.max_example_nodes.saturating_sub(1),
            }
        } else {
            Frame {
                local,
                capture: attach.then_some(node),
                example_root: false,
                attach,
                budget_root: parent_budget.filter(|_| attach).unwrap_or(depth),
                remaining_nodes: 0,
            }
        };
        self.stack.push(frame);
    }

    pub fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        if let Some(stats) = self.tag_stats.get_mut(&frame.local) {
            stats.has_text = true;
        }
        if let Some(node) = frame.capture.as_mut() {
            node.append_text(text);
        }
    }

    pub fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let Some(node) = frame.capture else {
            return;
        };
        let parent_capture = if frame.attach {
            self.stack
                .last_mut()
                .and_then(|parent| parent.capture.as_mut())
        } else {
            None
        };

        let examples_per_tag = self.limits.examples_per_tag;
        let stats = self
            .tag_stats
            .get_mut(&frame.local)
            .filter(|stats| frame.example_root && stats.examples.len() < examples_per_tag);

        match (stats, parent_capture) {
            (Some(stats), Some(parent)) => {
                stats.examples.push(node.clone());
                parent.children.push(node);
            }
            (Some(stats), None) => stats.examples.push(node),
            (None, Some(parent)) => parent.children.push(node),
            (None, None) => {}
        }
    }

    /// Close anything still open and produce the summary
    pub fn finish(mut self) -> Result<StructureSummary> {
        while !self.stack.is_empty() {
            self.close();
        }
        let (root_tag_name, root_element_name) =
            self.root.ok_or_else(|| IntrospectError::ParseFailure {
                details: "no root element found".to_string(),
            })?;

        Ok(StructureSummary {
            root_tag_name,
            root_element_name,
            tag_stats: self.tag_stats,
            namespace_decls: self.namespace_decls,
            max_depth: self.max_depth,
            total_element_count: self.total_element_count,
            mode: self.mode,
            recoveries: self.recoveries,
        })
    }
}
