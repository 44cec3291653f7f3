//! CryXML binary format parser
//!
//! CryXML is a binary XML format used by CryEngine-based games like Star Citizen.
//! Vehicle implementation files and most auxiliary definitions ship in it.
//!
//! ## Format Details
//!
//! CryXML files start with a header ("CryXml", "CryXmlB", or "CRY3SDK") followed by:
//! - File metadata (length, offsets, counts)
//! - Node table (28 bytes per node)
//! - Attribute table (name/value string offsets)
//! - Child index table
//! - String data table
//!
//! The format exists in both byte orders; the stored file length tells them apart.
//! Plain text XML is accepted as well, so callers need not care which one an
//! entry holds.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;

use crate::binary::{BinaryCursor, Endian};
use crate::error::{Error, Result};

/// An element of a decoded document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct XmlElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attr(name).and_then(|v| v.trim().parse().ok())
    }

    /// First direct child with this tag
    pub fn find(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Every element below this one with this tag, in document order
    pub fn descendants<'a>(&'a self, tag: &str) -> Vec<&'a XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(element) = stack.pop() {
            if element.tag == tag {
                out.push(element);
            }
            stack.extend(element.children.iter().rev());
        }
        out
    }

    /// Render as indented text XML with a declaration
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| Error::InvalidCryXml(e.to_string()))?;
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::InvalidCryXml(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let name = escape_xml_name(&self.tag);
        let mut start = BytesStart::new(name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((escape_xml_name(key).as_str(), value.as_str()));
        }

        let text = self.text.as_deref().filter(|t| !t.is_empty());
        if self.children.is_empty() && text.is_none() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| Error::InvalidCryXml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| Error::InvalidCryXml(e.to_string()))?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| Error::InvalidCryXml(e.to_string()))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(|e| Error::InvalidCryXml(e.to_string()))
    }
}

/// A CryXML node
#[derive(Debug, Clone)]
struct CryXmlNode {
    tag_offset: u32,
    content_offset: u32,
    attribute_count: u16,
    parent_index: i32,
    first_attribute_index: i32,
}

/// CryXML reader for parsing binary CryXML files
pub struct CryXmlReader;

impl CryXmlReader {
    pub fn is_cryxml(data: &[u8]) -> bool {
        data.starts_with(b"CryXml") || data.starts_with(b"CRY3SDK")
    }

    pub fn is_plain_xml(data: &[u8]) -> bool {
        let trimmed = data
            .strip_prefix(b"\xEF\xBB\xBF".as_slice())
            .unwrap_or(data)
            .trim_ascii_start();
        trimmed.starts_with(b"<")
    }

    /// Decode binary or plain XML into an element tree
    pub fn parse(data: &[u8]) -> Result<XmlElement> {
        if data.is_empty() {
            return Err(Error::InvalidCryXml("empty document".to_string()));
        }
        if Self::is_plain_xml(data) {
            return Self::parse_text(&String::from_utf8_lossy(data));
        }

        let header_len = if data.starts_with(b"CryXmlB\0") {
            8
        } else if data.starts_with(b"CryXml\0") {
            7
        } else if data.starts_with(b"CRY3SDK") {
            9
        } else {
            let shown = String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned();
            return Err(Error::InvalidCryXml(format!("unknown header: {:?}", shown)));
        };

        let endian = Self::detect_byte_order(data, header_len)?;
        let mut cursor = BinaryCursor::with_endian(data, endian);
        cursor.seek(header_len)?;

        let _file_length = cursor.u32()?;
        let node_table_offset = cursor.u32()? as usize;
        let node_count = cursor.u32()? as usize;
        let attribute_table_offset = cursor.u32()? as usize;
        let attribute_count = cursor.u32()? as usize;
        let _child_table_offset = cursor.u32()?;
        let _child_count = cursor.u32()?;
        let string_table_offset = cursor.u32()? as usize;
        let _string_table_size = cursor.u32()?;

        if node_count == 0 {
            return Err(Error::InvalidCryXml("document has no nodes".to_string()));
        }

        cursor.seek(node_table_offset)?;
        let mut nodes = Vec::with_capacity(node_count.min(data.len() / 28));
        for _ in 0..node_count {
            let tag_offset = cursor.u32()?;
            let content_offset = cursor.u32()?;
            let node_attributes = cursor.u16()?;
            let _child_count = cursor.u16()?;
            let node = CryXmlNode {
                tag_offset,
                content_offset,
                attribute_count: node_attributes,
                parent_index: cursor.i32()?,
                first_attribute_index: cursor.i32()?,
            };
            let _first_child_index = cursor.i32()?;
            let _reserved = cursor.i32()?;
            nodes.push(node);
        }

        cursor.seek(attribute_table_offset)?;
        let mut attributes = Vec::with_capacity(attribute_count.min(data.len() / 8));
        for _ in 0..attribute_count {
            attributes.push((cursor.u32()?, cursor.u32()?));
        }

        let strings = |offset: u32| -> Result<String> {
            cursor.cstring_at(string_table_offset + offset as usize)
        };

        let mut elements = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut element = XmlElement::new(strings(node.tag_offset)?);
            let first = node.first_attribute_index.max(0) as usize;
            for &(name, value) in attributes
                .iter()
                .skip(first)
                .take(node.attribute_count as usize)
            {
                element.attributes.push((strings(name)?, strings(value)?));
            }
            let content = strings(node.content_offset)?;
            if !content.is_empty() {
                element.text = Some(content);
            }
            elements.push(element);
        }

        // Link children to parents; only forward edges are accepted so the tree is acyclic
        let mut child_lists: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();
        for (index, node) in nodes.iter().enumerate() {
            match usize::try_from(node.parent_index) {
                Ok(parent) if parent < index => child_lists[parent].push(index),
                _ => roots.push(index),
            }
        }

        let mut slots: Vec<Option<XmlElement>> = elements.into_iter().map(Some).collect();
        for index in (0..nodes.len()).rev() {
            let mut children = Vec::with_capacity(child_lists[index].len());
            for &child in &child_lists[index] {
                if let Some(element) = slots[child].take() {
                    children.push(element);
                }
            }
            if let Some(element) = slots[index].as_mut() {
                element.children = children;
            }
        }

        roots
            .first()
            .and_then(|&root| slots[root].take())
            .ok_or_else(|| Error::InvalidCryXml("no root node".to_string()))
    }

    /// Decode and render as text XML
    pub fn to_xml_string(data: &[u8]) -> Result<String> {
        Self::parse(data)?.to_xml_string()
    }

    fn detect_byte_order(data: &[u8], header_len: usize) -> Result<Endian> {
        let mut cursor = BinaryCursor::with_endian(data, Endian::Big);
        cursor.seek(header_len)?;
        let big = cursor.u32()?;
        cursor.seek(header_len)?;
        cursor.set_endian(Endian::Little);
        let little = cursor.u32()?;

        let len = data.len() as u32;
        Ok(if little == len && big != len {
            Endian::Little
        } else {
            Endian::Big
        })
    }

    fn parse_text(text: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(element_from(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = element_from(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::InvalidCryXml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::Text(t)) => {
                    let value = t
                        .unescape()
                        .map_err(|e| Error::InvalidCryXml(e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(current) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&c.into_inner()).into_owned();
                        current.text.get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::InvalidCryXml(format!(
                        "at byte {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
            }
        }

        if !stack.is_empty() {
            return Err(Error::InvalidCryXml("unclosed element".to_string()));
        }
        root.ok_or_else(|| Error::InvalidCryXml("no root element".to_string()))
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::InvalidCryXml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::InvalidCryXml(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Element and attribute names can't start with numbers or hold punctuation
fn escape_xml_name(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            result.push('_');
        }
        if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':' {
            result.push(c);
        } else {
            result.push('_');
        }
    }
    if result.is_empty() {
        result.push_str("_unnamed");
    }
    result
}
