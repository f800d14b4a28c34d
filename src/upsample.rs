//! Upsampling: a larger document replayed from per-tag rules
//!
//! The expansion is flat. Every synthetic instance is a direct child of the
//! root whatever its original depth, and cardinality is not modelled.

use serde::Serialize;
use tracing::info;

use crate::document::XmlWriter;
use crate::model::{PatternRule, StructureSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsampleOutcome {
    #[serde(skip)]
    pub xml: String,
    pub rules: Vec<PatternRule>,
    pub per_rule_count: usize,
    /// Elements written, root excluded
    pub emitted_elements: usize,
}

/// `ceil(target / rules)`; zero when there is nothing to replay
pub fn per_rule_count(target_element_count: usize, rule_count: usize) -> usize {
    if rule_count == 0 {
        0
    } else {
        target_element_count.div_ceil(rule_count)
    }
}

pub fn upsample(summary: &StructureSummary, target_element_count: usize) -> UpsampleOutcome {
    let rules = PatternRule::from_summary(summary);
    let per_rule = per_rule_count(target_element_count, rules.len());

    let mut writer = XmlWriter::new();
    let root_attrs = summary
        .namespace_decls
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()));
    if per_rule == 0 {
        writer.leaf(&summary.root_element_name, root_attrs, None, 0);
        return UpsampleOutcome {
            xml: writer.finish(),
            rules,
            per_rule_count: 0,
            emitted_elements: 0,
        };
    }

    writer.open(&summary.root_element_name, root_attrs, 0);
    let mut emitted = 0usize;
    for rule in &rules {
        for index in 0..per_rule {
            let value = format!("value{}", index);
            let attrs = rule
                .attribute_names
                .iter()
                .map(|name| (name.as_str(), value.as_str()));
            let name = summary.element_name(&rule.tag_name);
            emitted += 1;
            if rule.child_tag_names.is_empty() {
                writer.leaf(name, attrs, None, 1);
                continue;
            }
            writer.open(name, attrs, 1);
            let text = format!("child{}", index);
            for child in &rule.child_tag_names {
                let child = summary.element_name(child);
                writer.leaf(child, std::iter::empty(), Some(text.as_str()), 2);
                emitted += 1;
            }
            writer.close(name, 1);
        }
    }
    writer.close(&summary.root_element_name, 0);

    info!(
        rules = rules.len(),
        per_rule,
        emitted,
        "upsample written"
    );
    UpsampleOutcome {
        xml: writer.finish(),
        rules,
        per_rule_count: per_rule,
        emitted_elements: emitted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::XmlDocument;
    use crate::model::WalkMode;
    use crate::walker::{WalkerLimits, analyze_str};

    fn summary(input: &str) -> StructureSummary {
        analyze_str(input, WalkMode::Streaming, WalkerLimits::default()).unwrap()
    }

    #[test]
    fn test_per_rule_count_rounds_up() {
        assert_eq!(per_rule_count(10, 3), 4);
        assert_eq!(per_rule_count(9, 3), 3);
        assert_eq!(per_rule_count(1, 3), 1);
        assert_eq!(per_rule_count(0, 3), 0);
        assert_eq!(per_rule_count(10, 0), 0);
    }

    #[test]
    fn test_flat_expansion() {
        let seed = summary(r#"<Catalog><Book id="b1" lang="en"><Title>T</Title></Book></Catalog>"#);
        let outcome = upsample(&seed, 5);
        assert_eq!(outcome.rules.len(), 3);
        assert_eq!(outcome.per_rule_count, 2);

        let tree = XmlDocument::parse(&outcome.xml).unwrap().document.root;
        assert_eq!(tree.tag_name, "Catalog");
        assert_eq!(tree.children.len(), 6);
        assert!(tree.children.iter().all(|c| c.depth == 1));

        let books: Vec<_> = tree.children.iter().filter(|c| c.tag_name == "Book").collect();
        assert_eq!(books.len(), 2);
        assert_eq!(books[1].attributes.get("id").map(String::as_str), Some("value1"));
        assert_eq!(books[1].attributes.get("lang").map(String::as_str), Some("value1"));
        assert_eq!(books[0].children[0].tag_name, "Title");
        assert_eq!(books[0].children[0].text_content.as_deref(), Some("child0"));

        assert_eq!(outcome.emitted_elements, tree.element_count() - 1);
    }

    #[test]
    fn test_root_keeps_namespace_declarations() {
        let seed = summary(r#"<dc:Root xmlns:dc="urn:dc"><Item dc:note="n"/></dc:Root>"#);
        let outcome = upsample(&seed, 4);
        assert!(outcome.xml.contains("<dc:Root xmlns:dc=\"urn:dc\">"));
        assert!(outcome.xml.contains("<Item dc:note=\"value0\"/>"));
        assert!(XmlDocument::parse(&outcome.xml).unwrap().recovery.is_none());
    }

    #[test]
    fn test_prefixed_tags_keep_their_prefix() {
        let seed = summary(
            r#"<wn:Root xmlns:wn="urn:wn"><wn:Item><wn:Label>x</wn:Label></wn:Item></wn:Root>"#,
        );
        let outcome = upsample(&seed, 3);
        let tree = XmlDocument::parse(&outcome.xml).unwrap().document.root;
        assert_eq!(tree.tag_name, "wn:Root");
        assert!(tree.children.iter().all(|c| c.tag_name.starts_with("wn:")));
        let item = tree.children.iter().find(|c| c.tag_name == "wn:Item").unwrap();
        assert_eq!(item.children[0].tag_name, "wn:Label");
        assert!(!outcome.xml.contains("<Item"));
    }

    #[test]
    fn test_zero_target_yields_bare_root() {
        let seed = summary("<r><a/></r>");
        let outcome = upsample(&seed, 0);
        assert!(outcome.xml.ends_with("<r/>\n"));
        assert_eq!(outcome.emitted_elements, 0);
    }
}
