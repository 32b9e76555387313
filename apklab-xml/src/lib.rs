//! A small owned XML tree built on top of `xml-rs`.
//! Used for editing the decoded (plain text) AndroidManifest.xml and network security config files
//! structurally, rather than by pattern matching over the raw text.
//!
//! The tree keeps the namespace mappings that were in scope for each element when it was read,
//! so that writing the document back out declares the same namespace prefixes in the same places.
//! Whitespace-only text is discarded on read and the document is re-indented on write.

mod reader;
mod writer;

pub use reader::parse_document;
pub use writer::write_document;

pub use xml::name::OwnedName;
use xml::{attribute::OwnedAttribute, namespace::Namespace};

pub const ANDROID_NS_URI: &str = "http://schemas.android.com/apk/res/android";

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The `encoding` given in the XML declaration.
    pub encoding: String,
    /// The `standalone` flag given in the XML declaration, if any.
    pub standalone: Option<bool>,
    /// Comments that appear before the root element.
    pub prolog: Vec<Node>,
    pub root: Element,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: OwnedName,
    pub attributes: Vec<OwnedAttribute>,
    /// All namespace mappings in scope for this element.
    pub(crate) namespace: Namespace,
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element with no namespace, no attributes and no children.
    pub fn new(local_name: &str) -> Self {
        Self {
            name: OwnedName::local(local_name),
            attributes: Vec::new(),
            namespace: Namespace::empty(),
            children: Vec::new(),
        }
    }

    /// Builder-style helper to add an un-namespaced attribute.
    pub fn with_attr(mut self, local_name: &str, value: &str) -> Self {
        self.set_attr(OwnedName::local(local_name), value);
        self
    }

    /// True if the local name of this element is `local_name`.
    pub fn is(&self, local_name: &str) -> bool {
        self.name.local_name == local_name
    }

    /// Gets the value of the attribute with the given local name and namespace URI.
    /// Pass `None` for `namespace` to match an attribute with no namespace.
    pub fn attr(&self, local_name: &str, namespace: Option<&str>) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| {
                attr.name.local_name == local_name && attr.name.namespace.as_deref() == namespace
            })
            .map(|attr| attr.value.as_str())
    }

    /// Sets an attribute, replacing the value of an existing attribute with the same local name and namespace.
    pub fn set_attr(&mut self, name: OwnedName, value: &str) {
        match self.attributes.iter_mut().find(|attr| {
            attr.name.local_name == name.local_name && attr.name.namespace == name.namespace
        }) {
            Some(existing) => existing.value = value.to_string(),
            None => self.attributes.push(OwnedAttribute::new(name, value)),
        }
    }

    /// Sets an attribute in the namespace with the given URI, using the prefix already bound to that URI
    /// or `fallback_prefix` if the namespace is not in scope.
    pub fn set_ns_attr(&mut self, local_name: &str, uri: &str, fallback_prefix: &str, value: &str) {
        let prefix = self.prefix_for(uri).unwrap_or(fallback_prefix).to_string();
        self.set_attr(OwnedName::qualified(local_name, uri, Some(prefix.as_str())), value);
    }

    /// Gets the prefix bound to the given namespace URI for this element, if there is one.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.namespace
            .0
            .iter()
            .find(|(prefix, bound_uri)| {
                bound_uri.as_str() == uri && !prefix.is_empty() && prefix.as_str() != "xmlns"
            })
            .map(|(prefix, _)| prefix.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Gets the first child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|element| element.is(local_name))
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|element| element.is(local_name))
    }

    /// Gets the first child element with the given local name, appending a new empty one if none exists.
    pub fn child_or_insert(&mut self, local_name: &str) -> &mut Element {
        if self.child(local_name).is_none() {
            self.push_child(Element::new(local_name));
        }

        self.child_mut(local_name)
            .expect("Child element should exist after being inserted")
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Removes every element with the given local name at any depth below this element.
    /// Returns the number of elements removed (nested matches inside a removed element are not counted).
    pub fn remove_descendants(&mut self, local_name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|node| !matches!(node, Node::Element(element) if element.is(local_name)));
        let mut removed = before - self.children.len();

        for child in self.child_elements_mut() {
            removed += child.remove_descendants(local_name);
        }

        removed
    }
}
