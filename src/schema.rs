//! Schema synthesis from a structure summary
//!
//! Produces a deliberately loose XML Schema: one element declaration and one
//! complex type per observed tag, every child optional and repeatable, every
//! attribute a plain string. Output is a function of the summary alone, so
//! synthesizing twice from one summary yields identical text.
//!
//! Prefixed attributes are referenced, never declared inline. Their
//! declarations live in a companion schema per foreign namespace, imported
//! through `schemaLocation`; attributes in the target namespace are
//! declared at the top level of the main schema.

use std::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::XmlWriter;
use crate::model::{StructureSummary, TagStats, XMLNS_PREFIX, local_name, name_prefix};

pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
const XML_SCHEMA_LOCATION: &str = "http://www.w3.org/2001/xml.xsd";
const TARGET_PREFIX: &str = "tns";

/// `elementFormDefault` / `attributeFormDefault` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormDefault {
    Qualified,
    Unqualified,
}

impl fmt::Display for FormDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormDefault::Qualified => write!(f, "qualified"),
            FormDefault::Unqualified => write!(f, "unqualified"),
        }
    }
}

impl FromStr for FormDefault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qualified" => Ok(FormDefault::Qualified),
            "unqualified" => Ok(FormDefault::Unqualified),
            other => Err(format!(
                "invalid form '{}', expected 'qualified' or 'unqualified'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOptions {
    /// Overrides the namespace inferred from the root element
    pub target_namespace: Option<String>,
    pub element_form_default: FormDefault,
    pub attribute_form_default: FormDefault,
    /// Companion schemas are named `{stem}.{prefix}.xsd`, or `{prefix}.xsd`
    #[serde(default)]
    pub companion_stem: Option<String>,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            target_namespace: None,
            element_form_default: FormDefault::Qualified,
            attribute_form_default: FormDefault::Unqualified,
            companion_stem: None,
        }
    }
}

impl SchemaOptions {
    fn companion_location(&self, prefix: &str) -> String {
        match &self.companion_stem {
            Some(stem) => format!("{}.{}.xsd", stem, prefix),
            None => format!("{}.xsd", prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaImport {
    pub namespace: String,
    pub schema_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementDecl {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeDecl {
    /// `<xs:attribute name=".." type="xs:string"/>`
    Local { name: String },
    /// `<xs:attribute ref="prefix:name"/>`, declared at the top level of
    /// this schema or of a companion
    Reference { qualified_name: String },
}

/// Top-level attribute declarations for one foreign namespace, written next
/// to the main schema at `location`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanionSchema {
    pub prefix: String,
    pub namespace: String,
    pub location: String,
    pub attributes: Vec<String>,
}

impl CompanionSchema {
    pub fn to_xml(&self) -> String {
        let mut writer = XmlWriter::new();
        writer.open(
            "xs:schema",
            [
                ("xmlns:xs", XS_NAMESPACE),
                ("targetNamespace", self.namespace.as_str()),
                ("elementFormDefault", "qualified"),
                ("attributeFormDefault", "qualified"),
            ],
            0,
        );
        for name in &self.attributes {
            write_attribute_decl(&mut writer, name, 1);
        }
        writer.close("xs:schema", 0);
        writer.finish()
    }
}

fn write_attribute_decl(writer: &mut XmlWriter, name: &str, depth: usize) {
    writer.leaf(
        "xs:attribute",
        [("name", name), ("type", "xs:string")],
        None,
        depth,
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexType {
    pub name: String,
    pub mixed: bool,
    /// Element references, each `minOccurs="0" maxOccurs="unbounded"`
    pub children: Vec<String>,
    pub attributes: Vec<AttributeDecl>,
}

/// Typed schema model; [`SchemaDocument::to_xml`] renders it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDocument {
    pub root_element: String,
    pub target_namespace: Option<String>,
    pub element_form_default: FormDefault,
    pub attribute_form_default: FormDefault,
    /// Prefixed namespace declarations carried over from the document root
    pub namespace_decls: IndexMap<String, String>,
    pub imports: Vec<SchemaImport>,
    /// Top-level attributes in the target namespace, by local name
    pub attributes: Vec<String>,
    pub elements: Vec<ElementDecl>,
    pub complex_types: Vec<ComplexType>,
    pub companions: Vec<CompanionSchema>,
}

/// Namespace the document's elements live in, if any
fn infer_target_namespace(summary: &StructureSummary) -> Option<String> {
    let namespace = match name_prefix(&summary.root_element_name) {
        Some(prefix) => summary.namespace_for_prefix(prefix),
        None => summary.default_namespace(),
    };
    namespace.map(str::to_string)
}

fn namespace_for(summary: &StructureSummary, prefix: &str) -> Option<String> {
    if prefix == "xml" {
        return Some(XML_NAMESPACE.to_string());
    }
    summary.namespace_for_prefix(prefix).map(str::to_string)
}

/// Namespace-qualified attributes seen so far: namespace → (prefix, local names)
type QualifiedAttributes = IndexMap<String, (String, IndexSet<String>)>;

fn complex_type(
    tag: &str,
    stats: &TagStats,
    summary: &StructureSummary,
    qualified: &mut QualifiedAttributes,
) -> ComplexType {
    let mut attributes = Vec::with_capacity(stats.attribute_names.len());
    for attribute in &stats.attribute_names {
        let Some(prefix) = name_prefix(attribute) else {
            attributes.push(AttributeDecl::Local {
                name: attribute.clone(),
            });
            continue;
        };
        match namespace_for(summary, prefix) {
            Some(namespace) => {
                qualified
                    .entry(namespace)
                    .or_insert_with(|| (prefix.to_string(), IndexSet::new()))
                    .1
                    .insert(local_name(attribute).to_string());
                attributes.push(AttributeDecl::Reference {
                    qualified_name: attribute.clone(),
                });
            }
            None => {
                warn!(
                    tag,
                    attribute = attribute.as_str(),
                    "prefix not declared on the root element; declaring attribute locally"
                );
                attributes.push(AttributeDecl::Local {
                    name: local_name(attribute).to_string(),
                });
            }
        }
    }

    ComplexType {
        name: format!("{}Type", tag),
        mixed: stats.has_text,
        children: stats.child_tag_names.iter().cloned().collect(),
        attributes,
    }
}

/// Build a schema from a structure summary
pub fn synthesize(summary: &StructureSummary, options: &SchemaOptions) -> SchemaDocument {
    let target_namespace = options
        .target_namespace
        .clone()
        .or_else(|| infer_target_namespace(summary));

    let namespace_decls: IndexMap<String, String> = summary
        .namespace_decls
        .iter()
        .filter(|(key, _)| key.as_str() != XMLNS_PREFIX)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut qualified = QualifiedAttributes::new();
    let mut elements = Vec::with_capacity(summary.tag_count());
    let mut complex_types = Vec::with_capacity(summary.tag_count());
    for (tag, stats) in &summary.tag_stats {
        elements.push(ElementDecl {
            name: tag.clone(),
            type_name: format!("{}Type", tag),
        });
        complex_types.push(complex_type(tag, stats, summary, &mut qualified));
    }

    let mut imports = Vec::new();
    let mut attributes = Vec::new();
    let mut companions = Vec::new();
    for (namespace, (prefix, names)) in qualified {
        if Some(&namespace) == target_namespace.as_ref() {
            attributes.extend(names);
        } else if namespace == XML_NAMESPACE {
            imports.push(SchemaImport {
                namespace,
                schema_location: Some(XML_SCHEMA_LOCATION.to_string()),
            });
        } else {
            let location = options.companion_location(&prefix);
            imports.push(SchemaImport {
                namespace: namespace.clone(),
                schema_location: Some(location.clone()),
            });
            companions.push(CompanionSchema {
                prefix,
                namespace,
                location,
                attributes: names.into_iter().collect(),
            });
        }
    }

    debug!(
        types = complex_types.len(),
        imports = imports.len(),
        companions = companions.len(),
        "schema synthesized"
    );

    SchemaDocument {
        root_element: summary.root_tag_name.clone(),
        target_namespace,
        element_form_default: options.element_form_default,
        attribute_form_default: options.attribute_form_default,
        namespace_decls,
        imports,
        attributes,
        elements,
        complex_types,
        companions,
    }
}

impl SchemaDocument {
    /// Reference to a schema component in the target namespace
    fn component(&self, name: &str) -> String {
        match self.target_namespace {
            Some(_) => format!("{}:{}", TARGET_PREFIX, name),
            None => name.to_string(),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut writer = XmlWriter::new();

        let tns_decl = format!("{}:{}", XMLNS_PREFIX, TARGET_PREFIX);
        let element_form = self.element_form_default.to_string();
        let attribute_form = self.attribute_form_default.to_string();
        let mut root_attrs: Vec<(&str, &str)> = vec![("xmlns:xs", XS_NAMESPACE)];
        if let Some(namespace) = &self.target_namespace {
            root_attrs.push(("targetNamespace", namespace.as_str()));
            root_attrs.push((tns_decl.as_str(), namespace.as_str()));
        }
        for (key, value) in &self.namespace_decls {
            if key.as_str() != tns_decl && key.as_str() != "xmlns:xs" {
                root_attrs.push((key.as_str(), value.as_str()));
            }
        }
        root_attrs.push(("elementFormDefault", element_form.as_str()));
        root_attrs.push(("attributeFormDefault", attribute_form.as_str()));
        writer.open("xs:schema", root_attrs, 0);

        for import in &self.imports {
            let mut attrs = vec![("namespace", import.namespace.as_str())];
            if let Some(location) = &import.schema_location {
                attrs.push(("schemaLocation", location.as_str()));
            }
            writer.leaf("xs:import", attrs, None, 1);
        }

        for name in &self.attributes {
            write_attribute_decl(&mut writer, name, 1);
        }

        for (element, complex) in self.elements.iter().zip(&self.complex_types) {
            let type_ref = self.component(&element.type_name);
            writer.leaf(
                "xs:element",
                [("name", element.name.as_str()), ("type", type_ref.as_str())],
                None,
                1,
            );
            self.write_complex_type(&mut writer, complex);
        }

        writer.close("xs:schema", 0);
        writer.finish()
    }

    fn write_complex_type(&self, writer: &mut XmlWriter, complex: &ComplexType) {
        let mut attrs = vec![("name", complex.name.as_str())];
        if complex.mixed {
            attrs.push(("mixed", "true"));
        }
        if complex.children.is_empty() && complex.attributes.is_empty() {
            writer.leaf("xs:complexType", attrs, None, 1);
            return;
        }
        writer.open("xs:complexType", attrs, 1);

        if !complex.children.is_empty() {
            writer.open("xs:sequence", std::iter::empty(), 2);
            for child in &complex.children {
                let child_ref = self.component(child);
                writer.leaf(
                    "xs:element",
                    [
                        ("ref", child_ref.as_str()),
                        ("minOccurs", "0"),
                        ("maxOccurs", "unbounded"),
                    ],
                    None,
                    3,
                );
            }
            writer.close("xs:sequence", 2);
        }

        for attribute in &complex.attributes {
            match attribute {
                AttributeDecl::Local { name } => write_attribute_decl(writer, name, 2),
                AttributeDecl::Reference { qualified_name } => {
                    writer.leaf("xs:attribute", [("ref", qualified_name.as_str())], None, 2)
                }
            }
        }
        writer.close("xs:complexType", 1);
    }
}
