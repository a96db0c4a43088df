//! HTML fragment parsing into the arena.
//!
//! The input is HTML produced by the course renderer (well-formed, mostly
//! XML-shaped) plus whatever raw HTML authors embedded in their markdown.
//! Parsing is therefore lenient: void elements need no closing tag,
//! mismatched closing tags are ignored, and elements left open at the end
//! of input are closed implicitly. Comments are dropped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::entities::decode_entity;
use crate::tree::{Document, NodeId};

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Error type for document parsing.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    /// Underlying XML reader error.
    #[error("malformed markup: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Document {
    /// Parse an HTML fragment into a document rooted at a `root_tag` element.
    pub fn parse(html: &str, root_tag: &str) -> Result<Self, DomError> {
        let wrapped = format!("<{root_tag}>{html}</{root_tag}>");
        let mut reader = Reader::from_str(&wrapped);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = false;

        let mut doc = Document::new(root_tag);
        let mut stack: Vec<NodeId> = vec![doc.root()];

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = open_element(&mut doc, &reader, &e, *stack.last().expect("stack"));
                    if !is_void(doc.tag(id)) {
                        stack.push(id);
                    }
                }
                Event::Empty(e) => {
                    open_element(&mut doc, &reader, &e, *stack.last().expect("stack"));
                }
                Event::End(e) => {
                    let name = decode_bytes(&reader, e.name().as_ref());
                    // Close the innermost matching open element; ignore strays.
                    if let Some(pos) = stack
                        .iter()
                        .skip(1)
                        .rposition(|&id| doc.tag(id) == name)
                    {
                        stack.truncate(pos + 1);
                    } else if name == root_tag {
                        stack.truncate(1);
                    }
                }
                Event::Text(e) => {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(quick_xml::Error::from)?
                        .into_owned();
                    append_text(&mut doc, *stack.last().expect("stack"), &text);
                }
                Event::GeneralRef(e) => {
                    let entity = reader
                        .decoder()
                        .decode(&e)
                        .map_err(quick_xml::Error::from)?
                        .into_owned();
                    let text =
                        decode_entity(&entity).unwrap_or_else(|| format!("&{entity};"));
                    append_text(&mut doc, *stack.last().expect("stack"), &text);
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    append_text(&mut doc, *stack.last().expect("stack"), &text);
                }
                Event::Eof => break,
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }

        Ok(doc)
    }
}

fn open_element<R>(
    doc: &mut Document,
    reader: &Reader<R>,
    e: &BytesStart,
    parent: NodeId,
) -> NodeId {
    let tag = decode_bytes(reader, e.name().as_ref());
    let id = doc.create_element(&tag);
    for attr in e.attributes().flatten() {
        let key = decode_bytes(reader, attr.key.as_ref());
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            std::borrow::Cow::into_owned,
        );
        doc.set_attr(id, &key, &value);
    }
    doc.append_child(parent, id);
    id
}

fn decode_bytes<R>(reader: &Reader<R>, bytes: &[u8]) -> String {
    reader.decoder().decode(bytes).map_or_else(
        |_| String::from_utf8_lossy(bytes).into_owned(),
        std::borrow::Cow::into_owned,
    )
}

/// Append text to the open element's text or its last child's tail.
fn append_text(doc: &mut Document, id: NodeId, text: &str) {
    if let Some(&last) = doc.children(id).last() {
        doc.push_tail(last, text);
    } else {
        doc.push_text(id, text);
    }
}
