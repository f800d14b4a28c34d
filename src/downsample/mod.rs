//! Downsampling: a small, well-formed document built from captured examples
//!
//! Selection picks whole example elements under an element budget. Elements
//! whose ids are referenced from the selection are then pinned. Pinned
//! copies are charged against a separate allowance of
//! `min(max_elements * 10, 10_000)` elements; references the allowance
//! cannot cover are reported as unresolved.

mod profile;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use profile::{ChildTemplate, DomainProfile, PlaceholderSource, RepairTable, SequentialPlaceholders};

use crate::document::XmlWriter;
use crate::error::{IntrospectError, Result};
use crate::model::{ElementNode, StructureSummary};

/// Upper bound on the selection work, whatever the strategy
const WORK_CEILING: usize = 10_000;
const WORK_PER_ELEMENT: usize = 10;

/// Elements pinned reference targets may add on top of `max_elements`
pub fn pin_allowance(max_elements: usize) -> usize {
    max_elements.saturating_mul(WORK_PER_ELEMENT).min(WORK_CEILING)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// An equal share of the budget per tag
    #[default]
    Balanced,
    /// Shuffle every captured example and take from the front
    Random,
    /// Tag by tag, in first-occurrence order
    First,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Balanced => write!(f, "balanced"),
            Strategy::Random => write!(f, "random"),
            Strategy::First => write!(f, "first"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(Strategy::Balanced),
            "random" => Ok(Strategy::Random),
            "first" => Ok(Strategy::First),
            other => Err(format!(
                "invalid strategy '{}', expected 'balanced', 'random' or 'first'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownsampleOptions {
    /// Budget for emitted elements, root and pinned elements excluded
    pub max_elements: usize,
    pub strategy: Strategy,
    pub preserve_all_types: bool,
    /// Deepest output depth emitted (root is 0)
    pub max_depth: Option<usize>,
    /// Fail instead of leaving a reference dangling
    pub strict_references: bool,
    /// Seed for [`Strategy::Random`]; entropy when absent
    pub seed: Option<u64>,
}

impl Default for DownsampleOptions {
    fn default() -> Self {
        Self {
            max_elements: 100,
            strategy: Strategy::Balanced,
            preserve_all_types: true,
            max_depth: None,
            strict_references: false,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownsampleOutcome {
    #[serde(skip)]
    pub xml: String,
    /// Elements in the output, root excluded
    pub emitted_elements: usize,
    /// Examples chosen by the selection phase
    pub selected: usize,
    /// Reference targets added outside the budget
    pub pinned: usize,
    /// Elements emitted for pinned targets, charged to the pin allowance
    pub pinned_elements: usize,
    /// Referenced ids left dangling in the output: no captured element
    /// carries them, or the pin allowance ran out first
    pub unresolved_references: Vec<String>,
}

/// One candidate: index of the tag among candidate tags, index of the example
type Slot = (usize, usize);

struct Selection<'a> {
    candidates: Vec<(&'a str, &'a [ElementNode])>,
    chosen: Vec<Slot>,
    taken: HashSet<Slot>,
    chosen_ids: HashSet<(&'a str, &'a str)>,
    budget: usize,
    work: usize,
    work_ceiling: usize,
}

impl<'a> Selection<'a> {
    fn new(summary: &'a StructureSummary, budget: usize) -> Self {
        let candidates = summary
            .tag_stats
            .iter()
            .filter(|(tag, stats)| **tag != summary.root_tag_name && !stats.examples.is_empty())
            .map(|(tag, stats)| (tag.as_str(), stats.examples.as_slice()))
            .collect();
        Self {
            candidates,
            chosen: Vec::new(),
            taken: HashSet::new(),
            chosen_ids: HashSet::new(),
            budget,
            work: 0,
            work_ceiling: budget.saturating_mul(WORK_PER_ELEMENT).min(WORK_CEILING),
        }
    }

    fn full(&self) -> bool {
        self.chosen.len() >= self.budget
    }

    /// Count one unit of work; false once the ceiling is reached
    fn spend(&mut self) -> bool {
        if self.work >= self.work_ceiling {
            return false;
        }
        self.work += 1;
        true
    }

    fn example(&self, slot: Slot) -> &'a ElementNode {
        &self.candidates[slot.0].1[slot.1]
    }

    /// Same tag and same id as something already chosen
    fn is_duplicate(&self, slot: Slot) -> bool {
        let tag = self.candidates[slot.0].0;
        self.example(slot)
            .id()
            .is_some_and(|id| self.chosen_ids.contains(&(tag, id)))
    }

    fn available(&self, slot: Slot) -> bool {
        !self.taken.contains(&slot) && !self.is_duplicate(slot)
    }

    fn take(&mut self, slot: Slot) {
        let tag = self.candidates[slot.0].0;
        if let Some(id) = self.example(slot).id() {
            self.chosen_ids.insert((tag, id));
        }
        self.taken.insert(slot);
        self.chosen.push(slot);
    }

    /// Take up to `limit` available examples of one tag, in order
    fn take_from_tag(&mut self, tag_index: usize, limit: usize) -> usize {
        let mut taken = 0;
        for example_index in 0..self.candidates[tag_index].1.len() {
            if taken >= limit || self.full() || !self.spend() {
                break;
            }
            let slot = (tag_index, example_index);
            if self.available(slot) {
                self.take(slot);
                taken += 1;
            }
        }
        taken
    }

    /// The richest non-duplicate example of every tag
    fn preserve_all_types(&mut self) {
        for tag_index in 0..self.candidates.len() {
            if self.full() {
                break;
            }
            let mut best: Option<(Slot, usize)> = None;
            for example_index in 0..self.candidates[tag_index].1.len() {
                if !self.spend() {
                    return;
                }
                let slot = (tag_index, example_index);
                if !self.available(slot) {
                    continue;
                }
                let richness = self.example(slot).richness();
                if best.is_none_or(|(_, top)| richness > top) {
                    best = Some((slot, richness));
                }
            }
            if let Some((slot, _)) = best {
                self.take(slot);
            }
        }
    }

    fn fill_first(&mut self) {
        for tag_index in 0..self.candidates.len() {
            if self.full() {
                break;
            }
            self.take_from_tag(tag_index, usize::MAX);
        }
    }

    fn fill_balanced(&mut self) {
        let tag_count = self.candidates.len();
        if tag_count == 0 {
            return;
        }
        let per_tag = self.budget.saturating_sub(self.chosen.len()) / tag_count;
        if per_tag == 0 {
            return;
        }
        for tag_index in 0..tag_count {
            self.take_from_tag(tag_index, per_tag);
        }
    }

    fn fill_random(&mut self, seed: Option<u64>) {
        let mut pool: Vec<Slot> = self
            .candidates
            .iter()
            .enumerate()
            .flat_map(|(tag_index, (_, examples))| {
                (0..examples.len()).map(move |example_index| (tag_index, example_index))
            })
            .filter(|slot| !self.taken.contains(slot))
            .collect();
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        pool.shuffle(&mut rng);

        for slot in pool {
            if self.full() || !self.spend() {
                break;
            }
            if self.available(slot) {
                self.take(slot);
            }
        }
    }

    fn run(mut self, options: &DownsampleOptions) -> Vec<&'a ElementNode> {
        if options.preserve_all_types {
            self.preserve_all_types();
        }
        match options.strategy {
            Strategy::First => self.fill_first(),
            Strategy::Balanced => self.fill_balanced(),
            Strategy::Random => self.fill_random(options.seed),
        }
        if self.work >= self.work_ceiling && !self.full() {
            warn!(
                ceiling = self.work_ceiling,
                selected = self.chosen.len(),
                "selection stopped at the work ceiling"
            );
        }
        self.chosen.iter().map(|slot| self.example(*slot)).collect()
    }
}

/// Copies selected subtrees into the output tree under the budget
struct Assembler<'p> {
    profile: &'p DomainProfile,
    placeholders: &'p dyn PlaceholderSource,
    max_depth: Option<usize>,
    remaining: usize,
    pin_remaining: usize,
    emitted_ids: HashSet<String>,
    placeholder_count: usize,
}

impl Assembler<'_> {
    fn depth_allowed(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth <= max)
    }

    /// Claim one element from the budget, or from the pin allowance
    fn claim(&mut self, budgeted: bool) -> bool {
        let counter = if budgeted {
            &mut self.remaining
        } else {
            &mut self.pin_remaining
        };
        if *counter == 0 {
            return false;
        }
        *counter -= 1;
        true
    }

    fn copy(&mut self, node: &ElementNode, depth: usize, budgeted: bool) -> Option<ElementNode> {
        if !self.depth_allowed(depth) {
            return None;
        }
        if node.id().is_some_and(|id| self.emitted_ids.contains(id)) {
            return None;
        }
        if !self.claim(budgeted) {
            return None;
        }
        if let Some(id) = node.id() {
            self.emitted_ids.insert(id.to_string());
        }

        let mut copy = ElementNode::new(node.tag_name.clone(), depth);
        copy.attributes = node.attributes.clone();
        copy.text_content = node.text_content.clone();
        for child in &node.children {
            if let Some(child) = self.copy(child, depth + 1, budgeted) {
                copy.children.push(child);
            }
        }
        self.repair(&mut copy, budgeted);
        Some(copy)
    }

    /// Add placeholder children the profile requires but the copy lacks
    fn repair(&mut self, node: &mut ElementNode, budgeted: bool) {
        let missing: Vec<ChildTemplate> = self.profile.repairs.missing_children(node).cloned().collect();
        for template in missing {
            if !self.depth_allowed(node.depth + 1) || !self.claim(budgeted) {
                return;
            }
            self.placeholder_count += 1;
            let index = self.placeholder_count;
            let mut child = ElementNode::new(template.tag_name.clone(), node.depth + 1);
            for attribute in &template.attributes {
                let value = self.placeholders.attribute(&template.tag_name, attribute, index);
                if attribute == "id" {
                    self.emitted_ids.insert(value.clone());
                }
                child.attributes.insert(attribute.clone(), value);
            }
            if template.with_text {
                child.text_content = Some(self.placeholders.text(&template.tag_name, index));
            }
            debug!(parent = node.tag_name.as_str(), child = template.tag_name.as_str(), "placeholder added");
            node.children.push(child);
        }
    }
}

/// Group top-level elements by tag, known tags first in preferred order
fn arrange(mut nodes: Vec<(usize, ElementNode)>, profile: &DomainProfile) -> Vec<ElementNode> {
    nodes.sort_by_key(|(source_depth, _)| *source_depth);

    let mut groups: Vec<(String, Vec<ElementNode>)> = Vec::new();
    for (_, node) in nodes {
        let tag = node.local_name().to_string();
        match groups.iter_mut().find(|(name, _)| *name == tag) {
            Some((_, members)) => members.push(node),
            None => groups.push((tag, vec![node])),
        }
    }
    groups.sort_by_key(|(tag, _)| profile.rank(tag));
    groups.into_iter().flat_map(|(_, members)| members).collect()
}

fn output_root(summary: &StructureSummary) -> ElementNode {
    let mut root = ElementNode::new(summary.root_element_name.clone(), 0);
    match summary
        .tag_stats
        .get(&summary.root_tag_name)
        .and_then(|stats| stats.examples.first())
    {
        Some(example) => root.attributes = example.attributes.clone(),
        None => root.attributes = summary.namespace_decls.clone(),
    }
    root
}

struct Assembled {
    root: ElementNode,
    budgeted_elements: usize,
    pinned: usize,
    pinned_elements: usize,
}

/// Reference-attribute values of `nodes` that are not emitted yet
fn queue_references<'n>(
    nodes: impl IntoIterator<Item = &'n ElementNode>,
    profile: &DomainProfile,
    queued: &mut HashSet<String>,
    pending: &mut VecDeque<String>,
) {
    for node in nodes {
        for id in profile.references(node) {
            if queued.insert(id.to_string()) {
                pending.push_back(id.to_string());
            }
        }
    }
}

/// Copy the selection under the budget, then pin reference targets.
///
/// Targets referenced anywhere in a selected example's subtree come first,
/// so a reference cut by the budget still keeps its target. Targets of
/// pinned copies follow, breadth first, until the allowance is spent.
fn assemble(
    summary: &StructureSummary,
    selected: &[&ElementNode],
    index: &HashMap<&str, &ElementNode>,
    options: &DownsampleOptions,
    profile: &DomainProfile,
    placeholders: &dyn PlaceholderSource,
) -> Assembled {
    let allowance = pin_allowance(options.max_elements);
    let mut assembler = Assembler {
        profile,
        placeholders,
        max_depth: options.max_depth,
        remaining: options.max_elements,
        pin_remaining: allowance,
        emitted_ids: HashSet::new(),
        placeholder_count: 0,
    };

    let mut top_level = Vec::new();
    let mut selected_order: Vec<&ElementNode> = selected.to_vec();
    selected_order.sort_by_key(|node| node.depth);
    for node in selected_order {
        if assembler.remaining == 0 {
            break;
        }
        if let Some(copy) = assembler.copy(node, 1, true) {
            top_level.push((node.depth, copy));
        }
    }

    let mut queued = HashSet::new();
    let mut pending = VecDeque::new();
    queue_references(
        selected.iter().flat_map(|example| example.descendants()),
        profile,
        &mut queued,
        &mut pending,
    );

    let mut pinned = 0;
    while let Some(id) = pending.pop_front() {
        if assembler.pin_remaining == 0 {
            debug!(left = pending.len() + 1, "pin allowance spent");
            break;
        }
        if assembler.emitted_ids.contains(&id) {
            continue;
        }
        let Some(target) = index.get(id.as_str()) else {
            continue;
        };
        if let Some(copy) = assembler.copy(target, 1, false) {
            pinned += 1;
            queue_references(copy.descendants(), profile, &mut queued, &mut pending);
            top_level.push((target.depth, copy));
        }
    }

    let mut root = output_root(summary);
    root.children = arrange(top_level, profile);
    Assembled {
        root,
        budgeted_elements: options.max_elements - assembler.remaining,
        pinned,
        pinned_elements: allowance - assembler.pin_remaining,
    }
}

/// Referenced ids that no element of `output` carries, in document order
fn dangling_references(output: &ElementNode, profile: &DomainProfile) -> Vec<String> {
    let present: HashSet<&str> = output.descendants().filter_map(ElementNode::id).collect();
    let mut dangling = IndexSet::new();
    for node in output.descendants() {
        for id in profile.references(node) {
            if !present.contains(id) {
                dangling.insert(id.to_string());
            }
        }
    }
    dangling.into_iter().collect()
}

/// Downsample with the default WordNet profile and sequential placeholders
pub fn downsample(summary: &StructureSummary, options: &DownsampleOptions) -> Result<DownsampleOutcome> {
    downsample_with(summary, options, &DomainProfile::default(), &SequentialPlaceholders)
}

pub fn downsample_with(
    summary: &StructureSummary,
    options: &DownsampleOptions,
    profile: &DomainProfile,
    placeholders: &dyn PlaceholderSource,
) -> Result<DownsampleOutcome> {
    let selected = Selection::new(summary, options.max_elements).run(options);
    debug!(
        selected = selected.len(),
        strategy = %options.strategy,
        "selection finished"
    );

    let mut index: HashMap<&str, &ElementNode> = HashMap::new();
    for element in summary.all_captured_elements() {
        if let Some(id) = element.id() {
            index.entry(id).or_insert(element);
        }
    }

    let assembled = assemble(summary, &selected, &index, options, profile, placeholders);
    let unresolved_references = dangling_references(&assembled.root, profile);
    if !unresolved_references.is_empty() {
        if options.strict_references {
            return Err(IntrospectError::ReferenceUnresolved {
                ids: unresolved_references,
            });
        }
        warn!(
            count = unresolved_references.len(),
            "references left dangling: target not captured or pin allowance spent"
        );
    }

    let emitted_elements = assembled.root.element_count() - 1;
    info!(
        emitted = emitted_elements,
        budgeted = assembled.budgeted_elements,
        pinned = assembled.pinned,
        pinned_elements = assembled.pinned_elements,
        "downsample assembled"
    );

    let mut writer = XmlWriter::new();
    writer.element(&assembled.root, 0);
    Ok(DownsampleOutcome {
        xml: writer.finish(),
        emitted_elements,
        selected: selected.len(),
        pinned: assembled.pinned,
        pinned_elements: assembled.pinned_elements,
        unresolved_references,
    })
}
