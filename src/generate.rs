//! Document generation straight from schema text
//!
//! A lightweight reverse of schema synthesis. Declarations are pattern-matched
//! out of the XSD text rather than resolved by a schema processor, which is
//! enough for schemas shaped like the ones this crate writes: named complex
//! types, top-level element declarations, element references and attributes.

use std::collections::HashSet;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::document::XmlDocument;
use crate::error::{IntrospectError, Result};
use crate::model::{ElementNode, local_name};

static COMPLEX_TYPE_REGEX: OnceLock<Regex> = OnceLock::new();
static ELEMENT_REGEX: OnceLock<Regex> = OnceLock::new();
static ATTRIBUTE_REGEX: OnceLock<Regex> = OnceLock::new();
static SCHEMA_REGEX: OnceLock<Regex> = OnceLock::new();
static PAIR_REGEX: OnceLock<Regex> = OnceLock::new();

fn complex_type_regex() -> &'static Regex {
    COMPLEX_TYPE_REGEX.get_or_init(|| {
        Regex::new(r"(?s)<(?:[\w.-]+:)?complexType\b([^>]*?)(?:/>|>(.*?)</(?:[\w.-]+:)?complexType\s*>)")
            .expect("Failed to compile complexType regex")
    })
}

fn element_regex() -> &'static Regex {
    ELEMENT_REGEX.get_or_init(|| {
        Regex::new(r"<(?:[\w.-]+:)?element\b([^>]*?)/?>").expect("Failed to compile element regex")
    })
}

fn attribute_regex() -> &'static Regex {
    ATTRIBUTE_REGEX.get_or_init(|| {
        Regex::new(r"<(?:[\w.-]+:)?attribute\b([^>]*?)/?>")
            .expect("Failed to compile attribute regex")
    })
}

fn schema_regex() -> &'static Regex {
    SCHEMA_REGEX.get_or_init(|| {
        Regex::new(r"<(?:[\w.-]+:)?schema\b([^>]*)>").expect("Failed to compile schema regex")
    })
}

fn pair_regex() -> &'static Regex {
    PAIR_REGEX.get_or_init(|| {
        Regex::new(r#"([\w:.-]+)\s*=\s*"([^"]*)""#).expect("Failed to compile attribute pair regex")
    })
}

fn pairs(text: &str) -> IndexMap<String, String> {
    pair_regex()
        .captures_iter(text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// An element declaration: `name`/`ref` plus an optional type
#[derive(Debug, Clone, PartialEq, Eq)]
struct ElementDecl {
    name: String,
    type_name: Option<String>,
    is_ref: bool,
}

impl ElementDecl {
    fn from_pairs(pairs: &IndexMap<String, String>) -> Option<Self> {
        if let Some(reference) = pairs.get("ref") {
            return Some(Self {
                name: local_name(reference).to_string(),
                type_name: None,
                is_ref: true,
            });
        }
        pairs.get("name").map(|name| Self {
            name: name.clone(),
            type_name: pairs.get("type").cloned(),
            is_ref: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeDecl {
    /// Qualified when declared by `ref`
    name: String,
    type_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct TypeDef {
    children: Vec<ElementDecl>,
    attributes: Vec<AttributeDecl>,
    mixed: bool,
}

/// Declarations extracted from one schema text
#[derive(Debug, Clone, Default)]
struct SchemaIndex {
    target_namespace: Option<String>,
    /// Prefixes the schema binds besides `xs` and `tns`, for `ref` attributes
    namespace_decls: Vec<(String, String)>,
    types: IndexMap<String, TypeDef>,
    elements: IndexMap<String, ElementDecl>,
}

impl SchemaIndex {
    fn extract(xsd: &str) -> Self {
        let header = schema_regex()
            .captures(xsd)
            .map(|caps| pairs(&caps[1]))
            .unwrap_or_default();
        let target_namespace = header.get("targetNamespace").cloned();
        let namespace_decls = header
            .iter()
            .filter(|(key, _)| {
                key.starts_with("xmlns:") && !matches!(key.as_str(), "xmlns:xs" | "xmlns:tns")
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut types = IndexMap::new();
        for caps in complex_type_regex().captures_iter(xsd) {
            let header = pairs(&caps[1]);
            let Some(name) = header.get("name") else {
                continue;
            };
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let children = element_regex()
                .captures_iter(body)
                .filter_map(|c| ElementDecl::from_pairs(&pairs(&c[1])))
                .collect();
            let attributes = attribute_regex()
                .captures_iter(body)
                .filter_map(|c| {
                    let attrs = pairs(&c[1]);
                    let name = attrs.get("ref").or_else(|| attrs.get("name"))?.clone();
                    Some(AttributeDecl {
                        name,
                        type_name: attrs.get("type").cloned(),
                    })
                })
                .collect();
            let mixed = header.get("mixed").is_some_and(|m| m == "true");
            types.insert(
                name.clone(),
                TypeDef {
                    children,
                    attributes,
                    mixed,
                },
            );
        }

        // What remains outside complex types are the top-level declarations
        let outside = complex_type_regex().replace_all(xsd, "");
        let elements = element_regex()
            .captures_iter(&outside)
            .filter_map(|c| ElementDecl::from_pairs(&pairs(&c[1])))
            .filter(|decl| !decl.is_ref)
            .map(|decl| (decl.name.clone(), decl))
            .collect();

        Self {
            target_namespace,
            namespace_decls,
            types,
            elements,
        }
    }

    /// First top-level element no type refers to
    fn root(&self) -> Option<&ElementDecl> {
        let referenced: HashSet<&str> = self
            .types
            .values()
            .flat_map(|t| t.children.iter().map(|c| c.name.as_str()))
            .collect();
        self.elements
            .values()
            .find(|decl| !referenced.contains(decl.name.as_str()))
            .or_else(|| self.elements.values().next())
    }

    fn type_of(&self, decl: &ElementDecl) -> Option<String> {
        if decl.is_ref {
            self.elements.get(&decl.name)?.type_name.clone()
        } else {
            decl.type_name.clone()
        }
    }
}

/// Sample value for a built-in type name
fn sample_value(type_name: Option<&str>) -> &'static str {
    match type_name.map(local_name) {
        Some("int" | "integer" | "long" | "short" | "nonNegativeInteger" | "positiveInteger") => "1",
        Some("decimal" | "float" | "double") => "1.0",
        Some("boolean") => "true",
        Some("date") => "2024-01-01",
        Some("dateTime") => "2024-01-01T00:00:00",
        Some("ID" | "NCName" | "Name") => "id1",
        _ => "sample",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateOutcome {
    #[serde(skip)]
    pub xml: String,
    pub root_element: String,
    pub emitted_elements: usize,
}

struct Generator<'s> {
    schema: &'s SchemaIndex,
    remaining: usize,
    id_counter: usize,
}

impl Generator<'_> {
    fn instance(&mut self, decl: &ElementDecl, depth: usize, path: &mut Vec<String>) -> ElementNode {
        self.remaining = self.remaining.saturating_sub(1);
        let mut node = ElementNode::new(decl.name.clone(), depth);
        let type_name = self.schema.type_of(decl);
        let complex = type_name
            .as_deref()
            .and_then(|t| self.schema.types.get(local_name(t)));

        let Some(complex) = complex else {
            node.text_content = Some(sample_value(type_name.as_deref()).to_string());
            return node;
        };

        for attribute in &complex.attributes {
            let value = match attribute.type_name.as_deref().map(local_name) {
                Some("ID") => {
                    self.id_counter += 1;
                    format!("id{}", self.id_counter)
                }
                other => sample_value(other).to_string(),
            };
            node.attributes.insert(attribute.name.clone(), value);
        }
        if complex.mixed {
            node.text_content = Some("sample".to_string());
        }

        let type_key = type_name.unwrap_or_default();
        if path.contains(&type_key) {
            debug!(type_name = type_key.as_str(), "recursive type; not expanded further");
            return node;
        }
        path.push(type_key);
        for child in &complex.children {
            if self.remaining == 0 {
                break;
            }
            let child = self.instance(child, depth + 1, path);
            node.children.push(child);
        }
        path.pop();
        node
    }
}

/// Generate one instance document from XSD text, bounded by `max_elements`
pub fn generate_from_schema(xsd: &str, max_elements: usize) -> Result<GenerateOutcome> {
    if max_elements == 0 {
        return Err(IntrospectError::SchemaGeneration {
            details: "max_elements must be at least 1".to_string(),
        });
    }
    let schema = SchemaIndex::extract(xsd);
    let root = schema
        .root()
        .cloned()
        .ok_or_else(|| IntrospectError::SchemaGeneration {
            details: "no top-level element declaration found".to_string(),
        })?;
    if schema.type_of(&root).is_none() {
        warn!(root = root.name.as_str(), "root element has no declared type");
    }

    let mut generator = Generator {
        schema: &schema,
        remaining: max_elements,
        id_counter: 0,
    };
    let mut root_node = generator.instance(&root, 0, &mut Vec::new());
    for (key, value) in schema.namespace_decls.iter().rev() {
        root_node.attributes.shift_insert(0, key.clone(), value.clone());
    }
    if let Some(namespace) = &schema.target_namespace {
        root_node.attributes.shift_insert(0, "xmlns".to_string(), namespace.clone());
    }

    let emitted_elements = root_node.element_count();
    debug!(
        root = root.name.as_str(),
        types = schema.types.len(),
        emitted = emitted_elements,
        "document generated from schema"
    );
    Ok(GenerateOutcome {
        xml: XmlDocument { root: root_node }.to_xml_string(),
        root_element: root.name,
        emitted_elements,
    })
}
