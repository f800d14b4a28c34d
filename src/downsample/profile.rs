//! Domain policy for the downsampler
//!
//! Everything vocabulary-specific lives here: which attributes hold
//! references, which tags must keep which children, and the order in which
//! known tags are emitted. The engine itself only consults a [`DomainProfile`].

use indexmap::{IndexMap, IndexSet};

use crate::model::ElementNode;

/// A child that must be present under some tag, with the attributes a
/// placeholder for it gets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildTemplate {
    pub tag_name: String,
    pub attributes: Vec<String>,
    pub with_text: bool,
}

impl ChildTemplate {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: Vec::new(),
            with_text: false,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    pub fn text(mut self) -> Self {
        self.with_text = true;
        self
    }
}

/// Supplies values for synthesized placeholder children.
///
/// `index` is a per-output counter, so a stateless source is deterministic.
pub trait PlaceholderSource {
    fn text(&self, tag: &str, index: usize) -> String;
    fn attribute(&self, tag: &str, attribute: &str, index: usize) -> String;
}

/// `placeholder {tag} {n}` style values; ids stay unique within one output
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPlaceholders;

impl PlaceholderSource for SequentialPlaceholders {
    fn text(&self, tag: &str, index: usize) -> String {
        format!("placeholder {} {}", tag.to_lowercase(), index)
    }

    fn attribute(&self, tag: &str, attribute: &str, index: usize) -> String {
        if attribute == "id" {
            format!("{}-placeholder-{}", tag.to_lowercase(), index)
        } else {
            format!("placeholder-{}-{}", attribute, index)
        }
    }
}

/// Tag → required children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairTable {
    rules: IndexMap<String, Vec<ChildTemplate>>,
}

impl RepairTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, tag: impl Into<String>, child: ChildTemplate) -> Self {
        self.rules.entry(tag.into()).or_default().push(child);
        self
    }

    pub fn required_children(&self, tag: &str) -> &[ChildTemplate] {
        self.rules.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Templates whose tag is not among `node`'s children
    pub fn missing_children<'a>(
        &'a self,
        node: &'a ElementNode,
    ) -> impl Iterator<Item = &'a ChildTemplate> + 'a {
        self.required_children(node.local_name())
            .iter()
            .filter(move |template| {
                !node
                    .children
                    .iter()
                    .any(|child| child.local_name() == template.tag_name)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainProfile {
    pub name: String,
    /// Attributes whose values are whitespace-separated lists of ids
    pub reference_attributes: IndexSet<String>,
    /// Emission order of known tags; others follow in encounter order
    pub preferred_order: Vec<String>,
    pub repairs: RepairTable,
}

impl DomainProfile {
    /// No references, no repairs, encounter order only
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            reference_attributes: IndexSet::new(),
            preferred_order: Vec::new(),
            repairs: RepairTable::new(),
        }
    }

    /// Global WordNet LMF lexicons
    pub fn wordnet() -> Self {
        let reference_attributes = ["synset", "target", "members"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let preferred_order = [
            "Lexicon",
            "LexicalEntry",
            "Lemma",
            "Form",
            "Sense",
            "SenseRelation",
            "Synset",
            "Definition",
            "ILIDefinition",
            "Example",
            "SynsetRelation",
            "SyntacticBehaviour",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        let repairs = RepairTable::new()
            .require("Synset", ChildTemplate::new("Definition").text())
            .require(
                "LexicalEntry",
                ChildTemplate::new("Lemma")
                    .attribute("writtenForm")
                    .attribute("partOfSpeech"),
            )
            .require("LexicalEntry", ChildTemplate::new("Sense").attribute("id"));

        Self {
            name: "wordnet".to_string(),
            reference_attributes,
            preferred_order,
            repairs,
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "generic" => Some(Self::generic()),
            "wordnet" => Some(Self::wordnet()),
            _ => None,
        }
    }

    pub fn is_reference_attribute(&self, attribute: &str) -> bool {
        self.reference_attributes.contains(attribute)
    }

    /// Position in the preferred order; unknown tags sort last
    pub fn rank(&self, tag: &str) -> usize {
        self.preferred_order
            .iter()
            .position(|known| known == tag)
            .unwrap_or(usize::MAX)
    }

    /// Ids referenced from `node`'s own attributes
    pub fn references<'a>(&'a self, node: &'a ElementNode) -> impl Iterator<Item = &'a str> + 'a {
        node.attributes
            .iter()
            .filter(|(name, _)| self.is_reference_attribute(name))
            .flat_map(|(_, value)| value.split_whitespace())
    }
}

impl Default for DomainProfile {
    fn default() -> Self {
        Self::wordnet()
    }
}
