use std::borrow::Cow;

use anyhow::{Context, Result};
use xml::{
    attribute::Attribute,
    common::XmlVersion,
    writer::{EventWriter, XmlEvent},
    EmitterConfig,
};

use crate::{Document, Element, Node};

const INDENT: &str = "    ";

/// Serializes the document as indented XML, terminated with a newline.
pub fn write_document(doc: &Document) -> Result<String> {
    let mut output = Vec::new();
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .indent_string(INDENT)
        .create_writer(&mut output);

    writer.write(XmlEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some(&doc.encoding),
        standalone: doc.standalone,
    })?;

    for node in &doc.prolog {
        write_node(&mut writer, node)?;
    }
    write_element(&mut writer, &doc.root)?;

    drop(writer);
    output.push(b'\n');
    String::from_utf8(output).context("Written XML was not valid UTF-8")
}

fn write_element<W: std::io::Write>(writer: &mut EventWriter<W>, element: &Element) -> Result<()> {
    let attributes: Vec<Attribute> = element.attributes.iter().map(|attr| attr.borrow()).collect();

    // The emitter only declares the mappings that are not already in scope,
    // so passing the full in-scope namespace re-creates the original declarations.
    writer.write(XmlEvent::StartElement {
        name: element.name.borrow(),
        attributes: Cow::Owned(attributes),
        namespace: Cow::Borrowed(&element.namespace),
    })?;

    for child in &element.children {
        write_node(writer, child)?;
    }

    writer.write(XmlEvent::end_element())?;
    Ok(())
}

fn write_node<W: std::io::Write>(writer: &mut EventWriter<W>, node: &Node) -> Result<()> {
    match node {
        Node::Element(element) => write_element(writer, element)?,
        Node::Text(text) => writer.write(XmlEvent::characters(text))?,
        Node::CData(text) => writer.write(XmlEvent::cdata(text))?,
        Node::Comment(text) => writer.write(XmlEvent::comment(text))?,
    }

    Ok(())
}
