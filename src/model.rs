//! Structure table data model
//!
//! The statistics table built by a walker and consumed by the schema
//! synthesizer, the downsampler and the upsampler. Every map and set is
//! insertion-ordered so that repeated synthesis from one summary is
//! byte-identical.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// Prefix that marks a namespace declaration attribute
pub const XMLNS_PREFIX: &str = "xmlns";

/// Strip a namespace prefix from a qualified name
pub fn local_name(qualified: &str) -> &str {
    match qualified.rsplit_once(':') {
        Some((_, local)) => local,
        None => qualified,
    }
}

/// Return the prefix of a qualified name, if any
pub fn name_prefix(qualified: &str) -> Option<&str> {
    qualified.split_once(':').map(|(prefix, _)| prefix)
}

/// `xmlns` or `xmlns:foo`
pub fn is_namespace_declaration(attribute: &str) -> bool {
    attribute == XMLNS_PREFIX
        || attribute
            .strip_prefix(XMLNS_PREFIX)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// One element instance, owned together with its subtree.
///
/// There is no parent pointer: a captured example is a standalone tree from
/// the moment it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementNode {
    /// Qualified name as written in the source
    pub tag_name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<ElementNode>,
    pub depth: usize,
    pub text_content: Option<String>,
}

impl ElementNode {
    pub fn new(tag_name: impl Into<String>, depth: usize) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            depth,
            text_content: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder-style text setter
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Append a child, fixing its depth to one below this node
    pub fn push_child(&mut self, mut child: ElementNode) {
        child.reassign_depth(self.depth + 1);
        self.children.push(child);
    }

    /// Local tag name used as the statistics key
    pub fn local_name(&self) -> &str {
        local_name(&self.tag_name)
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_text(&self) -> bool {
        self.text_content.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Append a text segment; segments are joined by a single space
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.text_content {
            Some(existing) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(text);
            }
            _ => self.text_content = Some(text.to_string()),
        }
    }

    /// Richness score used to pick the most representative example
    pub fn richness(&self) -> usize {
        self.child_count() + self.attributes.len() + usize::from(self.has_text())
    }

    /// Move this subtree to a new depth; descendants follow
    pub fn reassign_depth(&mut self, depth: usize) {
        self.depth = depth;
        for child in &mut self.children {
            child.reassign_depth(depth + 1);
        }
    }

    /// Number of elements in this subtree, including itself
    pub fn element_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ElementNode::element_count)
            .sum::<usize>()
    }

    /// Pre-order iterator over this node and all of its descendants
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Pre-order traversal of an element subtree
pub struct Descendants<'a> {
    stack: Vec<&'a ElementNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a ElementNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Aggregate statistics for every occurrence of one tag
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagStats {
    pub count: usize,
    /// Monotonic union of attribute names seen on this tag
    pub attribute_names: IndexSet<String>,
    /// Monotonic union of direct child tag names
    pub child_tag_names: IndexSet<String>,
    pub max_depth: usize,
    /// Whether any occurrence carried non-whitespace text
    pub has_text: bool,
    #[serde(skip)]
    pub examples: Vec<ElementNode>,
}

/// Which walker produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalkMode {
    InMemory,
    Streaming,
}

impl std::fmt::Display for WalkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkMode::InMemory => write!(f, "in-memory"),
            WalkMode::Streaming => write!(f, "streaming"),
        }
    }
}

impl std::str::FromStr for WalkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in-memory" | "memory" | "inmemory" => Ok(WalkMode::InMemory),
            "streaming" | "stream" => Ok(WalkMode::Streaming),
            other => Err(format!(
                "invalid mode '{}', expected 'in-memory' or 'streaming'",
                other
            )),
        }
    }
}

/// A recoverable problem the walker hit and worked around
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recovery {
    /// The document stopped being well-formed; statistics cover what came before
    Malformed { position: u64, details: String },
    /// The in-memory walk stopped at a safety bound
    Truncated { reason: String },
}

impl std::fmt::Display for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recovery::Malformed { position, details } => {
                write!(f, "malformed document at byte {}: {}", position, details)
            }
            Recovery::Truncated { reason } => write!(f, "analysis truncated: {}", reason),
        }
    }
}

/// Per-document statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureSummary {
    /// Local name of the root element
    pub root_tag_name: String,
    /// Root element name as written, prefix included
    pub root_element_name: String,
    pub tag_stats: IndexMap<String, TagStats>,
    /// Declarations found on the root element only
    pub namespace_decls: IndexMap<String, String>,
    pub max_depth: usize,
    pub total_element_count: usize,
    pub mode: WalkMode,
    pub recoveries: Vec<Recovery>,
}

impl StructureSummary {
    pub fn tag_count(&self) -> usize {
        self.tag_stats.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.recoveries.is_empty()
    }

    /// Iterate over every captured example and every element nested in one
    pub fn all_captured_elements(&self) -> impl Iterator<Item = &ElementNode> {
        self.tag_stats
            .values()
            .flat_map(|stats| stats.examples.iter())
            .flat_map(ElementNode::descendants)
    }

    /// Namespace URI bound to `prefix` on the root element
    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespace_decls
            .get(&format!("{}:{}", XMLNS_PREFIX, prefix))
            .map(String::as_str)
    }

    /// Default namespace declared on the root element
    pub fn default_namespace(&self) -> Option<&str> {
        self.namespace_decls.get(XMLNS_PREFIX).map(String::as_str)
    }

    /// Name of `tag` as written in the document, prefix included, taken
    /// from a captured example; the local name when none was captured
    pub fn element_name<'a>(&'a self, tag: &'a str) -> &'a str {
        if tag == self.root_tag_name {
            return &self.root_element_name;
        }
        self.tag_stats
            .get(tag)
            .and_then(|stats| stats.examples.first())
            .or_else(|| {
                self.all_captured_elements()
                    .find(|element| element.local_name() == tag)
            })
            .map_or(tag, |element| element.tag_name.as_str())
    }
}

/// Generative rule for one tag. Cardinality is deliberately not tracked:
/// every child is zero-or-more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternRule {
    pub tag_name: String,
    pub attribute_names: Vec<String>,
    pub child_tag_names: Vec<String>,
    pub min_occurs: usize,
    /// `None` means unbounded
    pub max_occurs: Option<usize>,
}

impl PatternRule {
    pub fn from_stats(tag_name: &str, stats: &TagStats) -> Self {
        Self {
            tag_name: tag_name.to_string(),
            attribute_names: stats.attribute_names.iter().cloned().collect(),
            child_tag_names: stats.child_tag_names.iter().cloned().collect(),
            min_occurs: 0,
            max_occurs: None,
        }
    }

    /// One rule per tag, in first-occurrence order
    pub fn from_summary(summary: &StructureSummary) -> Vec<Self> {
        summary
            .tag_stats
            .iter()
            .map(|(tag, stats)| Self::from_stats(tag, stats))
            .collect()
    }
}
