//! Resource model: turns submitted text into a typed FHIR document.
//!
//! Input is tried as JSON first and, failing that, as XML. A JSON document
//! must be an object with a string `resourceType`; an XML document's root
//! element must live in the `http://hl7.org/fhir` namespace.

use serde::Serialize;
use serde_json::Value;

use crate::error::DocumentError;
use crate::types::ContentKind;

/// The FHIR XML namespace.
pub const FHIR_NAMESPACE: &str = "http://hl7.org/fhir";

/// Resource type of a profile document.
pub const PROFILE_RESOURCE_TYPE: &str = "StructureDefinition";

/// Prefix of the core FHIR profile for each resource type.
pub const BASE_PROFILE_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

/// Owned copy of an XML element: local name, attributes and element children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        XmlElement {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            children: node
                .children()
                .filter(|n| n.is_element())
                .map(XmlElement::from_node)
                .collect(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First element child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parsed body of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentBody {
    Json(Value),
    Xml(XmlElement),
}

/// A well-formed FHIR resource, either JSON or namespaced XML.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    raw: String,
    body: DocumentBody,
}

/// Identifying summary of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescription {
    pub kind: ContentKind,
    pub resource_type: String,
}

impl Document {
    /// Parse text as a FHIR resource. See [`parse_document`].
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let body = match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                let has_type = value
                    .get("resourceType")
                    .map(Value::is_string)
                    .unwrap_or(false);
                if !has_type {
                    return Err(DocumentError::MissingResourceType);
                }
                DocumentBody::Json(value)
            }
            Err(_) => DocumentBody::Xml(parse_fhir_xml(text)?),
        };

        Ok(Document {
            raw: text.to_string(),
            body,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn body(&self) -> &DocumentBody {
        &self.body
    }

    pub fn kind(&self) -> ContentKind {
        match self.body {
            DocumentBody::Json(_) => ContentKind::Json,
            DocumentBody::Xml(_) => ContentKind::Xml,
        }
    }

    /// JSON `resourceType`, or the XML root element's name.
    pub fn resource_type(&self) -> &str {
        match &self.body {
            DocumentBody::Json(value) => value
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default(),
            DocumentBody::Xml(root) => &root.name,
        }
    }

    pub fn describe(&self) -> DocumentDescription {
        DocumentDescription {
            kind: self.kind(),
            resource_type: self.resource_type().to_string(),
        }
    }

    pub fn is_profile(&self) -> bool {
        self.resource_type() == PROFILE_RESOURCE_TYPE
    }

    /// Canonical URL of a StructureDefinition.
    pub fn profile_url(&self) -> Result<&str, DocumentError> {
        if !self.is_profile() {
            return Err(DocumentError::NotAProfile);
        }
        let url = match &self.body {
            DocumentBody::Json(value) => value.get("url").and_then(Value::as_str),
            DocumentBody::Xml(root) => root.child("url").and_then(|u| u.attribute("value")),
        };
        url.ok_or(DocumentError::MissingProfileUrl)
    }

    /// Profiles the resource claims conformance to in `meta.profile`.
    pub fn meta_profiles(&self) -> Vec<String> {
        match &self.body {
            DocumentBody::Json(value) => value
                .pointer("/meta/profile")
                .and_then(Value::as_array)
                .map(|profiles| {
                    profiles
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            DocumentBody::Xml(root) => root
                .child("meta")
                .map(|meta| {
                    meta.children_named("profile")
                        .filter_map(|p| p.attribute("value"))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// The core FHIR profile for this resource's type.
    pub fn base_profile_url(&self) -> String {
        format!("{}{}", BASE_PROFILE_PREFIX, self.resource_type())
    }
}

fn parse_fhir_xml(text: &str) -> Result<XmlElement, DocumentError> {
    let doc = roxmltree::Document::parse(text).map_err(|_| DocumentError::InvalidSyntax)?;
    let root = doc.root_element();
    // The root must declare the FHIR namespace as its default namespace
    if root.lookup_namespace_uri(None) != Some(FHIR_NAMESPACE) {
        return Err(DocumentError::MissingNamespace);
    }
    Ok(XmlElement::from_node(root))
}

/// Parse text as a FHIR resource.
///
/// JSON is attempted first. Text that is neither JSON nor well-formed XML
/// fails with `InvalidSyntax`; XML outside the FHIR namespace fails with
/// `MissingNamespace`; JSON without a string `resourceType` fails with
/// `MissingResourceType`.
pub fn parse_document(text: &str) -> Result<Document, DocumentError> {
    Document::parse(text)
}

pub fn describe_document(doc: &Document) -> DocumentDescription {
    doc.describe()
}

/// Canonical URL of a StructureDefinition document.
pub fn extract_profile_url(doc: &Document) -> Result<String, DocumentError> {
    doc.profile_url().map(str::to_string)
}

/// Input validator for resource text: empty on success, else the error message.
pub fn validate(text: &str) -> String {
    match parse_document(text) {
        Ok(_) => String::new(),
        Err(e) => e.to_string(),
    }
}

/// Input validator for profile text. An empty profile is acceptable.
pub fn validate_optional(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        validate(text)
    }
}
