//! In-memory document model and serializer
//!
//! Parses a whole document into an owned [`ElementNode`] tree and writes trees
//! back out as indented XML. The same writer is used by every component that
//! produces XML so that output formatting stays uniform.

use quick_xml::events::{BytesCData, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;

use crate::cancel::CancellationFlag;
use crate::error::{IntrospectError, Result};
use crate::model::{ElementNode, Recovery};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const INDENT: &str = "  ";

/// Decoded open tag: qualified name plus attributes in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

pub(crate) fn decode_start(start: &BytesStart<'_>) -> std::result::Result<StartTag, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        attributes.push((key, value.into_owned()));
    }
    Ok(StartTag { name, attributes })
}

pub(crate) fn decode_text(text: &BytesText<'_>) -> std::result::Result<String, String> {
    text.unescape()
        .map(|t| t.into_owned())
        .map_err(|e| e.to_string())
}

pub(crate) fn decode_cdata(cdata: BytesCData<'_>) -> String {
    String::from_utf8_lossy(&cdata.into_inner()).into_owned()
}

/// A parsed document, possibly recovered from a malformed tail
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub document: XmlDocument,
    pub recovery: Option<Recovery>,
}

/// Owned element tree rooted at the document element
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: ElementNode,
}

struct TreeBuilder {
    stack: Vec<ElementNode>,
    root: Option<ElementNode>,
}

impl TreeBuilder {
    fn open(&mut self, tag: StartTag) {
        let mut node = ElementNode::new(tag.name, self.stack.len());
        node.attributes.extend(tag.attributes);
        self.stack.push(node);
    }

    fn close(&mut self) {
        if let Some(node) = self.stack.pop() {
            match self.stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => self.root = Some(node),
            }
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(node) = self.stack.last_mut() {
            node.append_text(text);
        }
    }

    fn started(&self) -> bool {
        self.root.is_some() || !self.stack.is_empty()
    }

    /// Close every open element and hand back whatever was built
    fn finish(mut self) -> Option<ElementNode> {
        while !self.stack.is_empty() {
            self.close();
        }
        self.root
    }
}

/// Bounds applied while building a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    /// Deepest element depth that is still built (root is depth 0)
    pub max_depth: usize,
    pub max_elements: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 10_000,
            max_elements: usize::MAX,
        }
    }
}

impl XmlDocument {
    /// Parse a complete document.
    ///
    /// Fails with `ParseFailure` only when no element could be read at all;
    /// a later well-formedness error yields the partial tree plus a recovery note.
    pub fn parse(input: &str) -> Result<ParsedDocument> {
        Self::parse_bounded(input, TreeLimits::default(), &CancellationFlag::new())
    }

    /// Parse, stopping early (as a truncation, not an error) at `limits`
    pub fn parse_bounded(
        input: &str,
        limits: TreeLimits,
        cancel: &CancellationFlag,
    ) -> Result<ParsedDocument> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut builder = TreeBuilder {
            stack: Vec::new(),
            root: None,
        };
        let mut elements = 0usize;
        let mut recovery = None;

        loop {
            cancel.check()?;
            let position = reader.buffer_position() as u64;
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    if !builder.started() {
                        return Err(IntrospectError::ParseFailure {
                            details: e.to_string(),
                        });
                    }
                    recovery = Some(Recovery::Malformed {
                        position,
                        details: e.to_string(),
                    });
                    break;
                }
            };

            if let Event::Start(_) | Event::Empty(_) = event {
                if builder.root.is_some() {
                    recovery = Some(Recovery::Malformed {
                        position,
                        details: "content after the root element".to_string(),
                    });
                    break;
                }
                if builder.stack.len() > limits.max_depth || elements >= limits.max_elements {
                    recovery = Some(Recovery::Truncated {
                        reason: format!(
                            "stopped at depth {} after {} elements (limits: depth {}, elements {})",
                            builder.stack.len(),
                            elements,
                            limits.max_depth,
                            limits.max_elements
                        ),
                    });
                    break;
                }
                elements += 1;
            }

            let outcome = match event {
                Event::Start(e) => decode_start(&e).map(|tag| builder.open(tag)),
                Event::Empty(e) => decode_start(&e).map(|tag| {
                    builder.open(tag);
                    builder.close();
                }),
                Event::End(_) => {
                    builder.close();
                    Ok(())
                }
                Event::Text(e) => decode_text(&e).map(|text| builder.text(&text)),
                Event::CData(e) => {
                    builder.text(&decode_cdata(e));
                    Ok(())
                }
                Event::Eof => {
                    if !builder.stack.is_empty() {
                        recovery = Some(Recovery::Malformed {
                            position,
                            details: format!(
                                "unexpected end of input with {} unclosed element(s)",
                                builder.stack.len()
                            ),
                        });
                    }
                    break;
                }
                _ => Ok(()),
            };

            if let Err(details) = outcome {
                if !builder.started() {
                    return Err(IntrospectError::ParseFailure { details });
                }
                recovery = Some(Recovery::Malformed { position, details });
                break;
            }
        }

        let root = builder.finish().ok_or_else(|| IntrospectError::ParseFailure {
            details: "no root element found".to_string(),
        })?;

        Ok(ParsedDocument {
            document: XmlDocument { root },
            recovery,
        })
    }

    /// Serialize with an XML declaration and two-space indentation
    pub fn to_xml_string(&self) -> String {
        let mut writer = XmlWriter::new();
        writer.element(&self.root, 0);
        writer.finish()
    }
}

/// Indented XML text writer
#[derive(Debug, Clone)]
pub struct XmlWriter {
    out: String,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        let mut out = String::with_capacity(4096);
        out.push_str(XML_DECLARATION);
        out.push('\n');
        Self { out }
    }

    fn indent(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str(INDENT);
        }
    }

    fn start_tag<'a>(&mut self, name: &str, attributes: impl IntoIterator<Item = (&'a str, &'a str)>) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attributes {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&quick_xml::escape::escape(value));
            self.out.push('"');
        }
    }

    /// `<name attrs>` on its own line
    pub fn open<'a>(
        &mut self,
        name: &str,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
        level: usize,
    ) {
        self.indent(level);
        self.start_tag(name, attributes);
        self.out.push_str(">\n");
    }

    /// `</name>` on its own line
    pub fn close(&mut self, name: &str, level: usize) {
        self.indent(level);
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    /// Element without children: `<name/>` or `<name>text</name>`
    pub fn leaf<'a>(
        &mut self,
        name: &str,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
        text: Option<&str>,
        level: usize,
    ) {
        self.indent(level);
        self.start_tag(name, attributes);
        match text.filter(|t| !t.is_empty()) {
            Some(text) => {
                self.out.push('>');
                self.out.push_str(&quick_xml::escape::escape(text));
                self.out.push_str("</");
                self.out.push_str(name);
                self.out.push_str(">\n");
            }
            None => self.out.push_str("/>\n"),
        }
    }

    /// Text on its own line inside an element that also has children
    pub fn text_line(&mut self, text: &str, level: usize) {
        self.indent(level);
        self.out.push_str(&quick_xml::escape::escape(text));
        self.out.push('\n');
    }

    /// Open tag of a node that will get children, including its text line
    pub fn open_node(&mut self, node: &ElementNode, level: usize) {
        self.open(&node.tag_name, attribute_pairs(node), level);
        if let Some(text) = node.text_content.as_deref().filter(|t| !t.is_empty()) {
            self.text_line(text, level + 1);
        }
    }

    /// Write a whole subtree
    pub fn element(&mut self, node: &ElementNode, level: usize) {
        if node.children.is_empty() {
            self.leaf(
                &node.tag_name,
                attribute_pairs(node),
                node.text_content.as_deref(),
                level,
            );
            return;
        }
        self.open_node(node, level);
        for child in &node.children {
            self.element(child, level + 1);
        }
        self.close(&node.tag_name, level);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

pub(crate) fn attribute_pairs(node: &ElementNode) -> impl Iterator<Item = (&str, &str)> {
    node.attributes
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
}

/// Parse and re-serialize without semantic change
pub fn roundtrip(input: &str) -> Result<ParsedDocument> {
    XmlDocument::parse(input)
}
