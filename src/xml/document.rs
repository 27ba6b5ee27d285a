//! Owned XML tree built from quick-xml events.
//!
//! Text, comments and processing instructions inside the root element are
//! kept in place so an unmodified document serializes back to the same
//! structure. Attributes keep their source order. Whitespace between
//! top-level items is not preserved; the writer emits one newline between
//! them instead.

use crate::error::{ReconError, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Display;

fn xml_err<E: Display>(e: E) -> ReconError {
    ReconError::Xml(e.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes).map(str::to_string).map_err(xml_err)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    /// Unescaped character data
    Text(String),
    CData(String),
    /// Raw comment body
    Comment(String),
    /// Raw processing-instruction body (target and content)
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Element holding a single text node
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        let text = text.into();
        if !text.is_empty() {
            element.children.push(XmlNode::Text(text));
        }
        element
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing an existing value in place
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn append_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text and CDATA of this element and its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
                _ => {}
            }
        }
    }

    /// Depth-first, document order, including `self`
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            out.push(element);
            let children: Vec<&XmlElement> = element.child_elements().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// In-memory resource-object XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    pub declaration: Option<XmlDeclaration>,
    /// Comments, PIs and doctype before the root element
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
    /// Comments and PIs after the root element
    pub epilog: Vec<XmlNode>,
}

impl MetadataDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut stack: Vec<XmlElement> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|e| {
                ReconError::Xml(format!("parse error at byte {}: {}", reader.buffer_position(), e))
            })?;

            let node = match event {
                Event::Decl(e) => {
                    declaration = Some(read_declaration(&e)?);
                    continue;
                }
                Event::Start(e) => {
                    stack.push(read_start(&e)?);
                    continue;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ReconError::Xml("unexpected closing tag".to_string()))?;
                    XmlNode::Element(element)
                }
                Event::Empty(e) => XmlNode::Element(read_start(&e)?),
                Event::Text(e) => XmlNode::Text(e.unescape().map_err(xml_err)?.into_owned()),
                Event::CData(e) => XmlNode::CData(utf8(&e)?),
                Event::Comment(e) => XmlNode::Comment(utf8(&e)?),
                Event::PI(e) => XmlNode::ProcessingInstruction(utf8(&e)?),
                Event::DocType(e) => XmlNode::DocType(utf8(&e)?),
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => match node {
                    XmlNode::Element(element) => {
                        if root.is_some() {
                            return Err(ReconError::Xml("document has more than one root element".to_string()));
                        }
                        root = Some(element);
                    }
                    XmlNode::Text(text) | XmlNode::CData(text) => {
                        if !text.trim().is_empty() {
                            return Err(ReconError::Xml("text content outside the root element".to_string()));
                        }
                    }
                    other => {
                        if root.is_some() {
                            epilog.push(other);
                        } else {
                            prolog.push(other);
                        }
                    }
                },
            }
        }

        if let Some(open) = stack.last() {
            return Err(ReconError::Xml(format!("element '{}' is not closed", open.name)));
        }
        let root = root.ok_or_else(|| ReconError::Xml("document has no root element".to_string()))?;

        Ok(Self {
            declaration,
            prolog,
            root,
            epilog,
        })
    }

    pub fn serialize(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());

        if let Some(decl) = &self.declaration {
            writer
                .write_event(Event::Decl(BytesDecl::new(
                    &decl.version,
                    decl.encoding.as_deref(),
                    decl.standalone.as_deref(),
                )))
                .map_err(xml_err)?;
            write_newline(&mut writer)?;
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
            write_newline(&mut writer)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_newline(&mut writer)?;
            write_node(&mut writer, node)?;
        }

        String::from_utf8(writer.into_inner()).map_err(xml_err)
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }
}

fn read_declaration(e: &BytesDecl<'_>) -> Result<XmlDeclaration> {
    let version = utf8(&e.version().map_err(xml_err)?)?;
    let encoding = match e.encoding() {
        Some(enc) => Some(utf8(&enc.map_err(xml_err)?)?),
        None => None,
    };
    let standalone = match e.standalone() {
        Some(sa) => Some(utf8(&sa.map_err(xml_err)?)?),
        None => None,
    };
    Ok(XmlDeclaration {
        version,
        encoding,
        standalone,
    })
}

fn read_start(e: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(utf8(e.name().as_ref())?);
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn write_newline(writer: &mut Writer<Vec<u8>>) -> Result<()> {
    writer
        .write_event(Event::Text(BytesText::from_escaped("\n")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let event = match node {
        XmlNode::Element(element) => return write_element(writer, element),
        XmlNode::Text(text) => Event::Text(BytesText::new(text)),
        XmlNode::CData(text) => Event::CData(BytesCData::new(text.as_str())),
        XmlNode::Comment(text) => Event::Comment(BytesText::from_escaped(text.as_str())),
        XmlNode::ProcessingInstruction(text) => Event::PI(BytesPI::new(text.as_str())),
        XmlNode::DocType(text) => Event::DocType(BytesText::from_escaped(text.as_str())),
    };
    writer.write_event(event).map_err(xml_err)?;
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_err)?;
    Ok(())
}
