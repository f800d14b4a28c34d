mod common;

use common::{CATALOG, MALFORMED, SENSE_AND_SYNSET, WORDNET, count_open_tags, ids};
use xml_introspect::downsample::{SequentialPlaceholders, pin_allowance};
use xml_introspect::{
    DomainProfile, DownsampleOptions, SchemaOptions, Strategy, StructureSummary, WalkMode,
    WalkerLimits, XmlDocument, analyze_str, downsample, downsample_with, synthesize,
};

fn analyze(input: &str, mode: WalkMode) -> StructureSummary {
    analyze_str(input, mode, WalkerLimits::default()).unwrap()
}

fn generated_document(items: usize) -> String {
    let mut xml = String::from(r#"<inventory xmlns:x="urn:extra" region="eu">"#);
    for i in 0..items {
        xml.push_str(&format!(
            r#"<item id="i{i}" x:sku="s{i}"><name>item {i}</name><price currency="EUR">{i}.50</price>"#
        ));
        if i % 3 == 0 {
            xml.push_str(r#"<tags><tag>sale</tag><tag>new</tag></tags>"#);
        }
        xml.push_str("</item>");
    }
    xml.push_str("<note>end</note></inventory>");
    xml
}

#[test]
fn test_tag_counts_sum_to_total() {
    for input in [CATALOG, WORDNET, SENSE_AND_SYNSET, &generated_document(40)] {
        for mode in [WalkMode::InMemory, WalkMode::Streaming] {
            let summary = analyze(input, mode);
            let sum: usize = summary.tag_stats.values().map(|stats| stats.count).sum();
            assert_eq!(sum, summary.total_element_count, "{} walk", mode);
        }
    }
}

#[test]
fn test_walk_modes_agree() {
    for input in [CATALOG, WORDNET, SENSE_AND_SYNSET, &generated_document(25)] {
        let memory = analyze(input, WalkMode::InMemory);
        let streaming = analyze(input, WalkMode::Streaming);

        assert_eq!(memory.root_tag_name, streaming.root_tag_name);
        assert_eq!(memory.max_depth, streaming.max_depth);
        assert_eq!(memory.total_element_count, streaming.total_element_count);
        assert_eq!(memory.namespace_decls, streaming.namespace_decls);

        let memory_tags: Vec<&String> = memory.tag_stats.keys().collect();
        let streaming_tags: Vec<&String> = streaming.tag_stats.keys().collect();
        assert_eq!(memory_tags, streaming_tags);
        for (tag, stats) in &memory.tag_stats {
            let other = &streaming.tag_stats[tag];
            assert_eq!(stats.attribute_names, other.attribute_names, "attributes of {}", tag);
            assert_eq!(stats.child_tag_names, other.child_tag_names, "children of {}", tag);
            assert_eq!(stats.examples, other.examples, "examples of {}", tag);
        }
    }
}

#[test]
fn test_walk_modes_agree_on_malformed_tail() {
    let memory = analyze(MALFORMED, WalkMode::InMemory);
    let streaming = analyze(MALFORMED, WalkMode::Streaming);
    assert!(memory.is_partial());
    assert!(streaming.is_partial());
    assert_eq!(memory.root_tag_name, "root");
    assert_eq!(memory.root_tag_name, streaming.root_tag_name);
    assert!(memory.tag_stats.contains_key("b"));
    assert!(streaming.tag_stats.contains_key("b"));
}

#[test]
fn test_budget_without_reference_targets() {
    let summary = analyze(&generated_document(60), WalkMode::Streaming);
    let profile = DomainProfile::generic();

    for strategy in [Strategy::First, Strategy::Balanced, Strategy::Random] {
        for budget in [0, 1, 3, 10, 50] {
            let options = DownsampleOptions {
                max_elements: budget,
                strategy,
                seed: Some(11),
                ..DownsampleOptions::default()
            };
            let outcome =
                downsample_with(&summary, &options, &profile, &SequentialPlaceholders).unwrap();
            assert_eq!(outcome.pinned, 0);

            let root = XmlDocument::parse(&outcome.xml).unwrap().document.root;
            let opening_tags = root.element_count() - 1;
            assert!(
                opening_tags <= budget,
                "{} elements for budget {} ({})",
                opening_tags,
                budget,
                strategy
            );
            assert_eq!(opening_tags, outcome.emitted_elements);
        }
    }
}

fn synset_chain(length: usize) -> String {
    let mut xml = String::from(r#"<LexicalResource><Lexicon id="lx">"#);
    for i in 0..length {
        xml.push_str(&format!(
            r#"<Synset id="s{i}" members="e{i}"><Definition>sense {i}</Definition><SynsetRelation relType="hypernym" target="s{next}"/></Synset><LexicalEntry id="e{i}"><Lemma writtenForm="w{i}" partOfSpeech="n"/><Sense id="e{i}-1" synset="s{i}"/></LexicalEntry>"#,
            next = i + 1
        ));
    }
    xml.push_str("</Lexicon></LexicalResource>");
    xml
}

#[test]
fn test_budget_with_reference_targets() {
    let profile = DomainProfile::wordnet();
    for input in [WORDNET, SENSE_AND_SYNSET, &synset_chain(150)] {
        let summary = analyze(input, WalkMode::Streaming);
        for strategy in [Strategy::First, Strategy::Balanced, Strategy::Random] {
            for budget in [0, 1, 3, 10, 50] {
                let options = DownsampleOptions {
                    max_elements: budget,
                    strategy,
                    seed: Some(5),
                    ..DownsampleOptions::default()
                };
                let outcome = downsample(&summary, &options).unwrap();
                let root = XmlDocument::parse(&outcome.xml).unwrap().document.root;
                let opening_tags = root.element_count() - 1;

                assert_eq!(opening_tags, outcome.emitted_elements);
                assert!(
                    outcome.emitted_elements - outcome.pinned_elements <= budget,
                    "budgeted part over {} ({})",
                    budget,
                    strategy
                );
                assert!(
                    outcome.pinned_elements <= pin_allowance(budget),
                    "{} pinned elements for budget {} ({})",
                    outcome.pinned_elements,
                    budget,
                    strategy
                );
                assert!(opening_tags <= budget + pin_allowance(budget));

                let present = ids(&root);
                for node in root.descendants() {
                    for reference in profile.references(node) {
                        assert!(
                            present.iter().any(|id| id == reference)
                                || outcome.unresolved_references.iter().any(|id| id == reference)
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_referential_closure() {
    let summary = analyze(WORDNET, WalkMode::InMemory);
    let profile = DomainProfile::wordnet();

    for budget in [1, 2, 4, 8, 100] {
        for strategy in [Strategy::First, Strategy::Balanced, Strategy::Random] {
            let options = DownsampleOptions {
                max_elements: budget,
                strategy,
                seed: Some(3),
                ..DownsampleOptions::default()
            };
            let outcome = downsample(&summary, &options).unwrap();
            let root = XmlDocument::parse(&outcome.xml).unwrap().document.root;
            let present = ids(&root);

            for node in root.descendants() {
                for reference in profile.references(node) {
                    assert!(
                        present.iter().any(|id| id == reference)
                            || outcome.unresolved_references.iter().any(|id| id == reference),
                        "{} dangles in budget {} ({})",
                        reference,
                        budget,
                        strategy
                    );
                }
            }
        }
    }
}

#[test]
fn test_missing_target_reported_as_unresolved() {
    let summary = analyze(WORDNET, WalkMode::Streaming);
    let outcome = downsample(&summary, &DownsampleOptions::default()).unwrap();
    assert_eq!(outcome.unresolved_references, vec!["ewn-02083346-n"]);

    let strict = DownsampleOptions {
        strict_references: true,
        ..DownsampleOptions::default()
    };
    assert!(downsample(&summary, &strict).is_err());
}

#[test]
fn test_schema_consistency_with_downsample() {
    for input in [WORDNET, &generated_document(30)] {
        let full = analyze(input, WalkMode::InMemory);
        let full_schema = synthesize(&full, &SchemaOptions::default());

        for budget in [1, 5, 20] {
            let options = DownsampleOptions {
                max_elements: budget,
                ..DownsampleOptions::default()
            };
            let sample = downsample(&full, &options).unwrap();
            let reduced = analyze(&sample.xml, WalkMode::InMemory);
            let reduced_schema = synthesize(&reduced, &SchemaOptions::default());

            assert_eq!(full_schema.root_element, reduced_schema.root_element);
            assert_eq!(full.namespace_decls, reduced.namespace_decls);
            assert_eq!(full_schema.namespace_decls, reduced_schema.namespace_decls);
        }
    }
}

#[test]
fn test_roundtrip_idempotence() {
    for input in [
        CATALOG,
        WORDNET,
        SENSE_AND_SYNSET,
        "<p>Hello <b>bold</b> world &amp; more</p>",
        r#"<doc a="&quot;quoted&quot;"><![CDATA[<kept>]]></doc>"#,
        &generated_document(10),
    ] {
        let once = xml_introspect::roundtrip(input)
            .unwrap()
            .document
            .to_xml_string();
        let twice = xml_introspect::roundtrip(&once)
            .unwrap()
            .document
            .to_xml_string();
        assert_eq!(once, twice);
    }
}

#[test]
fn test_downsample_of_downsample_is_well_formed() {
    let summary = analyze(&generated_document(50), WalkMode::Streaming);
    let first = downsample(
        &summary,
        &DownsampleOptions {
            max_elements: 20,
            ..DownsampleOptions::default()
        },
    )
    .unwrap();
    let again = downsample(
        &analyze(&first.xml, WalkMode::InMemory),
        &DownsampleOptions {
            max_elements: 5,
            ..DownsampleOptions::default()
        },
    )
    .unwrap();
    assert!(XmlDocument::parse(&again.xml).unwrap().recovery.is_none());
    assert_eq!(count_open_tags(&again.xml, "inventory"), 1);
}
