//! Writer for binary CryXML documents

use std::collections::HashMap;

use crate::binary::Endian;
use crate::cryxml::XmlElement;

const HEADER: &[u8] = b"CryXmlB\0";
const NODE_SIZE: usize = 28;

pub(crate) struct CryXmlBuilder {
    endian: Endian,
    strings: Vec<u8>,
    offsets: HashMap<String, u32>,
}

struct FlatNode {
    tag: u32,
    content: u32,
    attr_count: u16,
    child_count: u16,
    parent: i32,
    first_attr: i32,
    first_child: i32,
}

impl CryXmlBuilder {
    pub(crate) fn new(endian: Endian) -> Self {
        Self {
            endian,
            strings: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        self.offsets.insert(s.to_string(), offset);
        offset
    }

    /// Nodes are laid out breadth-first so every child follows its parent
    /// and siblings are contiguous in the child table.
    pub(crate) fn build(mut self, root: &XmlElement) -> Vec<u8> {
        let mut nodes: Vec<FlatNode> = Vec::new();
        let mut attributes: Vec<(u32, u32)> = Vec::new();
        let mut child_table: Vec<i32> = Vec::new();

        let mut order: Vec<(&XmlElement, i32)> = vec![(root, -1)];
        let mut next = 0;
        while next < order.len() {
            let (element, parent) = order[next];
            let tag = self.intern(&element.tag);
            let content = self.intern(element.text.as_deref().unwrap_or(""));
            let first_attr = attributes.len() as i32;
            for (k, v) in &element.attributes {
                let pair = (self.intern(k), self.intern(v));
                attributes.push(pair);
            }
            let first_child = child_table.len() as i32;
            for child in &element.children {
                child_table.push(order.len() as i32);
                order.push((child, next as i32));
            }
            nodes.push(FlatNode {
                tag,
                content,
                attr_count: element.attributes.len() as u16,
                child_count: element.children.len() as u16,
                parent,
                first_attr,
                first_child,
            });
            next += 1;
        }

        let node_offset = HEADER.len() + 9 * 4;
        let attr_offset = node_offset + nodes.len() * NODE_SIZE;
        let child_offset = attr_offset + attributes.len() * 8;
        let string_offset = child_offset + child_table.len() * 4;
        let total = string_offset + self.strings.len();

        let mut out = HEADER.to_vec();
        let endian = self.endian;
        let u32s = |out: &mut Vec<u8>, v: u32| match endian {
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
        };
        let u16s = |out: &mut Vec<u8>, v: u16| match endian {
            Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
        };

        for v in [
            total,
            node_offset,
            nodes.len(),
            attr_offset,
            attributes.len(),
            child_offset,
            child_table.len(),
            string_offset,
            self.strings.len(),
        ] {
            u32s(&mut out, v as u32);
        }
        for node in &nodes {
            u32s(&mut out, node.tag);
            u32s(&mut out, node.content);
            u16s(&mut out, node.attr_count);
            u16s(&mut out, node.child_count);
            u32s(&mut out, node.parent as u32);
            u32s(&mut out, node.first_attr as u32);
            u32s(&mut out, node.first_child as u32);
            u32s(&mut out, 0);
        }
        for (k, v) in &attributes {
            u32s(&mut out, *k);
            u32s(&mut out, *v);
        }
        for child in &child_table {
            u32s(&mut out, *child as u32);
        }
        out.extend_from_slice(&self.strings);
        assert_eq!(out.len(), total);
        out
    }
}
