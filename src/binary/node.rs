//! Binary node type for the WhatsApp Web protocol.
//!
//! Every request, response and push message inside an encrypted frame is a
//! tree of [`Node`]s: a description, a string-to-string attribute map and
//! one of four content shapes.

use std::collections::HashMap;

/// Attributes of a node. Order is irrelevant on the wire.
pub type Attrs = HashMap<String, String>;

/// Node represents one element of the protocol tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// The element name (`query`, `action`, `response`, ...)
    pub description: String,
    /// The attributes of the element
    pub attrs: Attrs,
    /// The content inside the element
    pub content: NodeContent,
}

/// Content of a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeContent {
    #[default]
    Empty,
    /// Raw binary payload
    Bytes(Vec<u8>),
    /// Text payload
    Text(String),
    /// Child nodes
    Children(Vec<Node>),
}

impl NodeContent {
    /// Text view of the content. Binary payloads are accepted when they are
    /// valid UTF-8, since raw strings travel as binary runs on the wire.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            NodeContent::Text(text) => Some(text),
            NodeContent::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeContent::Empty)
    }
}

impl Node {
    /// Create a new node with the given description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attrs: Attrs::new(),
            content: NodeContent::Empty,
        }
    }

    /// Create a new node with description and attributes
    pub fn with_attrs(description: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            description: description.into(),
            attrs,
            content: NodeContent::Empty,
        }
    }

    /// Builder-style attribute setter.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style content setter.
    pub fn content(mut self, content: NodeContent) -> Self {
        self.content = content;
        self
    }

    /// Set an attribute on this node
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Get an attribute value
    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Set the content to child nodes
    pub fn set_children(&mut self, children: Vec<Node>) {
        self.content = NodeContent::Children(children);
    }

    /// Add a child node
    pub fn add_child(&mut self, child: Node) {
        match &mut self.content {
            NodeContent::Children(children) => children.push(child),
            _ => self.content = NodeContent::Children(vec![child]),
        }
    }

    /// Set the content to bytes
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.content = NodeContent::Bytes(bytes);
    }

    /// Get children if content is children
    pub fn get_children(&self) -> Option<&[Node]> {
        match &self.content {
            NodeContent::Children(children) => Some(children),
            _ => None,
        }
    }

    /// Get children by description
    pub fn get_children_by_description(&self, description: &str) -> Vec<&Node> {
        match &self.content {
            NodeContent::Children(children) => children
                .iter()
                .filter(|n| n.description == description)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Get first child with the given description
    pub fn get_child(&self, description: &str) -> Option<&Node> {
        self.get_children()?
            .iter()
            .find(|n| n.description == description)
    }

    /// Get bytes content if present
    pub fn get_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            NodeContent::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let node = Node::new("query").attr("type", "chat").attr("epoch", "0");

        assert_eq!(node.description, "query");
        assert_eq!(node.get_attr("type"), Some("chat"));
        assert_eq!(node.get_attr("epoch"), Some("0"));
        assert!(node.content.is_empty());
    }

    #[test]
    fn test_node_children() {
        let mut parent = Node::new("action");
        parent.add_child(Node::new("message"));
        parent.add_child(Node::new("battery"));
        parent.add_child(Node::new("message"));

        let children = parent.get_children().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(parent.get_children_by_description("message").len(), 2);
        assert_eq!(parent.get_child("battery").unwrap().description, "battery");
        assert!(parent.get_child("user").is_none());
    }

    #[test]
    fn test_text_view_of_binary_content() {
        let node = Node::new("body").content(NodeContent::Bytes(b"hello".to_vec()));
        assert_eq!(node.content.as_text(), Some("hello"));

        let node = Node::new("body").content(NodeContent::Bytes(vec![0xff, 0xfe]));
        assert_eq!(node.content.as_text(), None);
    }
}
