use std::io::Read;

use anyhow::{anyhow, Context, Result};
use xml::{common::Position, reader::XmlEvent, ParserConfig};

use crate::{Document, Element, Node};

/// Parses a complete XML document into an owned tree.
pub fn parse_document<R: Read>(source: R) -> Result<Document> {
    let mut reader = ParserConfig::new()
        .trim_whitespace(true)
        .ignore_comments(false)
        .create_reader(source);

    let mut encoding = "utf-8".to_string();
    let mut standalone = None;
    let mut prolog = Vec::new();
    let mut root: Option<Element> = None;

    // Elements that have been opened but not yet closed, innermost last.
    let mut open: Vec<Element> = Vec::new();

    loop {
        let event = reader
            .next()
            .with_context(|| format!("Parsing XML at {}", reader.position()))?;

        match event {
            XmlEvent::StartDocument {
                encoding: declared_encoding,
                standalone: declared_standalone,
                ..
            } => {
                encoding = declared_encoding;
                standalone = declared_standalone;
            }
            XmlEvent::StartElement {
                name,
                attributes,
                namespace,
            } => open.push(Element {
                name,
                attributes,
                namespace,
                children: Vec::new(),
            }),
            XmlEvent::EndElement { .. } => {
                let finished = open
                    .pop()
                    .ok_or(anyhow!("Closing tag with no matching opening tag"))?;

                match open.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(finished)),
                    None => root = Some(finished),
                }
            }
            XmlEvent::Characters(text) => push_node(&mut open, &mut prolog, Node::Text(text)),
            XmlEvent::CData(text) => push_node(&mut open, &mut prolog, Node::CData(text)),
            XmlEvent::Comment(text) => push_node(&mut open, &mut prolog, Node::Comment(text)),
            XmlEvent::EndDocument => break,
            // Processing instructions and doctypes are not used by any of the files we edit.
            _ => {}
        }
    }

    Ok(Document {
        encoding,
        standalone,
        prolog,
        root: root.ok_or(anyhow!("XML document had no root element"))?,
    })
}

fn push_node(open: &mut [Element], prolog: &mut Vec<Node>, node: Node) {
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        // Only comments can legally appear outside of the root
        None => {
            if let Node::Comment(_) = node {
                prolog.push(node)
            }
        }
    }
}
