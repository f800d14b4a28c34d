//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use xml_introspect::ElementNode;

pub const CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Catalog>
  <Book id="b1" title="Dune"/>
  <Book id="b2" title="Emma"/>
  <Book id="b3" title="Ulysses"/>
</Catalog>"#;

/// A small lexicon in the Global WordNet LMF layout
pub const WORDNET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<LexicalResource xmlns:dc="https://globalwordnet.github.io/schemas/dc/">
  <Lexicon id="ewn" label="English WordNet" language="en" version="2024">
    <LexicalEntry id="ewn-dog-n">
      <Lemma writtenForm="dog" partOfSpeech="n"/>
      <Sense id="ewn-dog-n-01" synset="ewn-02084071-n"/>
    </LexicalEntry>
    <LexicalEntry id="ewn-cat-n">
      <Lemma writtenForm="cat" partOfSpeech="n"/>
      <Sense id="ewn-cat-n-01" synset="ewn-02121620-n">
        <SenseRelation relType="derivation" target="ewn-dog-n-01"/>
      </Sense>
    </LexicalEntry>
    <Synset id="ewn-02084071-n" ili="i46360" partOfSpeech="n" members="ewn-dog-n-01" dc:subject="noun.animal">
      <Definition>a member of the genus Canis</Definition>
      <SynsetRelation relType="hypernym" target="ewn-02083346-n"/>
    </Synset>
    <Synset id="ewn-02121620-n" ili="i46593" partOfSpeech="n" members="ewn-cat-n-01">
      <Definition>feline mammal usually having thick soft fur</Definition>
    </Synset>
  </Lexicon>
</LexicalResource>"#;

/// `<Sense synset="X">` early, `<Synset id="X">` much later
pub const SENSE_AND_SYNSET: &str = r#"<LexicalResource>
  <Lexicon id="lx">
    <LexicalEntry id="e1">
      <Lemma writtenForm="run" partOfSpeech="v"/>
      <Sense id="s1" synset="X"/>
    </LexicalEntry>
    <Synset id="Y" partOfSpeech="v"><Definition>walk fast</Definition></Synset>
    <Synset id="X" partOfSpeech="v"><Definition>move quickly</Definition></Synset>
  </Lexicon>
</LexicalResource>"#;

pub const MALFORMED: &str = r#"<root><a x="1"><b/></a><a y="2"><c></a></root>"#;

pub fn write_fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("failed to write fixture");
    path
}

/// Number of opening tags named `tag`, self-closing included
pub fn count_open_tags(xml: &str, tag: &str) -> usize {
    let open = format!("<{}", tag);
    xml.match_indices(&open)
        .filter(|(index, _)| {
            matches!(
                xml[index + open.len()..].chars().next(),
                Some(' ' | '>' | '/')
            )
        })
        .count()
}

/// Every id carried by an element of the tree
pub fn ids(root: &ElementNode) -> Vec<String> {
    root.descendants()
        .filter_map(|node| node.id().map(str::to_string))
        .collect()
}
