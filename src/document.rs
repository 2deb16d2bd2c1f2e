//! In-memory XML tree for query evaluation.
//!
//! Nodes live in a flat arena (`Vec<Node>`) addressed by integer indices
//! assigned in document order, so "earlier in the document" is a plain
//! index comparison and traversal never chases pointers.

use quick_xml::{Reader, events::Event};
use serde::Serialize;

use crate::error::{CoreError, Result};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub text: String,
    pub attrs: Vec<(String, String)>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub nodes: Vec<Node>,
    pub root: NodeId,
}

/// Tree statistics exposed upward next to query results.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub root_element: String,
    pub total_records: usize,
    pub total_elements: usize,
    pub depth: usize,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let id = push_node(&mut nodes, &stack, &mut root, &e)?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    push_node(&mut nodes, &stack, &mut root, &e)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| {
                        CoreError::malformed(format!("bad XML text content: {err}"))
                    })?;
                    if let Some(&current) = stack.last() {
                        nodes[current].text.push_str(text.trim());
                    }
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(CoreError::malformed(format!(
                        "XML document is not well-formed: {err}"
                    )));
                }
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| CoreError::malformed("XML document has no root element"))?;
        Ok(Document { nodes, root })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id].text
    }

    pub fn is_nil(&self, id: NodeId) -> bool {
        self.nodes[id]
            .attrs
            .iter()
            .any(|(key, value)| key == "xsi:nil" && (value == "true" || value == "1"))
    }

    pub fn children_by_tag<'a>(
        &'a self,
        id: NodeId,
        tag: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(move |&child| self.nodes[child].tag == tag)
    }

    /// Descendants of `id` in document order (excluding `id` itself).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.nodes[next].children.iter().rev().copied());
        }
        out
    }

    pub fn statistics(&self) -> DocumentStats {
        DocumentStats {
            root_element: self.nodes[self.root].tag.clone(),
            total_records: self
                .nodes
                .iter()
                .filter(|node| node.tag == "record")
                .count(),
            total_elements: self.nodes.len(),
            depth: self.depth_of(self.root, 0),
        }
    }

    fn depth_of(&self, id: NodeId, depth: usize) -> usize {
        self.nodes[id]
            .children
            .iter()
            .map(|&child| self.depth_of(child, depth + 1))
            .max()
            .unwrap_or(depth)
    }
}

fn push_node(
    nodes: &mut Vec<Node>,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<NodeId> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr =
            attr.map_err(|err| CoreError::malformed(format!("bad XML attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| CoreError::malformed(format!("bad attribute value: {err}")))?
            .into_owned();
        attrs.push((key, value));
    }

    let parent = stack.last().copied();
    let id = nodes.len();
    nodes.push(Node {
        tag,
        text: String::new(),
        attrs,
        parent,
        children: Vec::new(),
    });
    match parent {
        Some(parent_id) => nodes[parent_id].children.push(id),
        None => {
            if root.is_some() {
                return Err(CoreError::malformed(
                    "XML document has more than one root element",
                ));
            }
            *root = Some(id);
        }
    }
    Ok(id)
}
