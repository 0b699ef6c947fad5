//! Arena-backed document tree.
//!
//! The pipeline mutates documents heavily (sidecar attributes, content
//! replacement, node creation during space restoration), so parsed input is
//! converted into an owned arena of nodes addressed by [`NodeId`]. Qualified
//! names keep their namespace prefix verbatim (`w:t`, `text:span`), which is
//! what tag-set classification and serialization operate on.
//!
//! Traversal during mutation is next-sibling-safe by construction: walkers
//! read `next(id)` before touching the node, and unlinking never invalidates
//! ids because nodes are only ever detached, not reused.

mod parse;
mod serialize;

pub use parse::{parse_html, parse_xml};
pub use serialize::{escape_xml_into, SerializeOptions};

/// Handle into a [`Dom`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Node payload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The document itself; exactly one per arena, never has siblings.
    Root,
    Element,
    Text,
    Comment,
    /// Processing instruction; `name` is the target, `content` the data.
    Pi,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    name: String,
    content: String,
    attrs: Vec<(String, String)>,
    parent: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            name: String::new(),
            content: String::new(),
            attrs: Vec::new(),
            parent: None,
            prev: None,
            next: None,
            first_child: None,
            last_child: None,
        }
    }
}

/// An owned document tree.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
}

impl Dom {
    /// An empty document: just the root.
    pub fn new() -> Self {
        Dom {
            nodes: vec![Node::new(NodeKind::Root)],
        }
    }

    /// The document root.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).kind == NodeKind::Element
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.node(id).kind == NodeKind::Text
    }

    /// Qualified name (prefix included) of an element or PI target.
    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    /// Lower-cased qualified name, the form tag sets are matched against.
    pub fn lower_name(&self, id: NodeId) -> String {
        self.node(id).name.to_lowercase()
    }

    /// Local name without any namespace prefix.
    pub fn local_name(&self, id: NodeId) -> &str {
        let name = self.name(id);
        match name.find(':') {
            Some(pos) => &name[pos + 1..],
            None => name,
        }
    }

    /// Text/comment/PI content.
    pub fn content(&self, id: NodeId) -> &str {
        &self.node(id).content
    }

    pub fn set_content(&mut self, id: NodeId, content: impl Into<String>) {
        self.node_mut(id).content = content.into();
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        &self.node(id).attrs
    }

    pub fn has_attrs(&self, id: NodeId) -> bool {
        !self.node(id).attrs.is_empty()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute, keeping document order for new ones.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let node = self.node_mut(id);
        if let Some(entry) = node.attrs.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.into();
        } else {
            node.attrs.push((name.to_string(), value.into()));
        }
    }

    /// Remove an attribute, returning its value if present.
    pub fn take_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        let node = self.node_mut(id);
        let pos = node.attrs.iter().position(|(n, _)| n == name)?;
        Some(node.attrs.remove(pos).1)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first_child
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last_child
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.node(id).first_child.is_some()
    }

    /// Child ids snapshotted into a `Vec`, safe against tree mutation.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.first_child(id);
        while let Some(c) = cur {
            out.push(c);
            cur = self.next(c);
        }
        out
    }

    /// First element child with the given qualified name.
    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .into_iter()
            .find(|&c| self.is_element(c) && self.name(c) == name)
    }

    /// All element descendants with the given qualified name, document order.
    pub fn descendants_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_named(id, name, &mut out);
        out
    }

    fn collect_named(&self, id: NodeId, name: &str, out: &mut Vec<NodeId>) {
        let mut cur = self.first_child(id);
        while let Some(c) = cur {
            if self.is_element(c) {
                if self.name(c) == name {
                    out.push(c);
                }
                self.collect_named(c, name, out);
            }
            cur = self.next(c);
        }
    }

    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        let mut node = Node::new(NodeKind::Element);
        node.name = name.into();
        self.push(node)
    }

    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        let mut node = Node::new(NodeKind::Text);
        node.content = content.into();
        self.push(node)
    }

    pub fn create_comment(&mut self, content: impl Into<String>) -> NodeId {
        let mut node = Node::new(NodeKind::Comment);
        node.content = content.into();
        self.push(node)
    }

    pub fn create_pi(&mut self, target: impl Into<String>, data: impl Into<String>) -> NodeId {
        let mut node = Node::new(NodeKind::Pi);
        node.name = target.into();
        node.content = data.into();
        self.push(node)
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.unlink(child);
        let last = self.node(parent).last_child;
        self.node_mut(child).parent = Some(parent);
        self.node_mut(child).prev = last;
        self.node_mut(child).next = None;
        match last {
            Some(l) => self.node_mut(l).next = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Insert `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        match self.node(parent).first_child {
            Some(first) => self.insert_before(first, child),
            None => self.append_child(parent, child),
        }
    }

    /// Insert `new` immediately before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, new: NodeId) {
        self.unlink(new);
        let parent = self.node(anchor).parent.expect("anchor must be linked");
        let prev = self.node(anchor).prev;
        self.node_mut(new).parent = Some(parent);
        self.node_mut(new).prev = prev;
        self.node_mut(new).next = Some(anchor);
        self.node_mut(anchor).prev = Some(new);
        match prev {
            Some(p) => self.node_mut(p).next = Some(new),
            None => self.node_mut(parent).first_child = Some(new),
        }
    }

    /// Insert `new` immediately after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, new: NodeId) {
        self.unlink(new);
        let parent = self.node(anchor).parent.expect("anchor must be linked");
        let next = self.node(anchor).next;
        self.node_mut(new).parent = Some(parent);
        self.node_mut(new).prev = Some(anchor);
        self.node_mut(new).next = next;
        self.node_mut(anchor).next = Some(new);
        match next {
            Some(n) => self.node_mut(n).prev = Some(new),
            None => self.node_mut(parent).last_child = Some(new),
        }
    }

    /// Detach a node from its parent and siblings. The node and its subtree
    /// stay valid and can be re-linked elsewhere.
    pub fn unlink(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = self.node(id);
            (n.parent, n.prev, n.next)
        };
        if let Some(p) = prev {
            self.node_mut(p).next = next;
        } else if let Some(par) = parent {
            self.node_mut(par).first_child = next;
        }
        if let Some(n) = next {
            self.node_mut(n).prev = prev;
        } else if let Some(par) = parent {
            self.node_mut(par).last_child = prev;
        }
        let n = self.node_mut(id);
        n.parent = None;
        n.prev = None;
        n.next = None;
    }

    /// Replace an element's children with a single text node.
    pub fn set_element_text(&mut self, id: NodeId, text: impl Into<String>) {
        let mut cur = self.first_child(id);
        while let Some(c) = cur {
            cur = self.next(c);
            self.unlink(c);
        }
        let t = self.create_text(text);
        self.append_child(id, t);
    }

    /// Concatenated text content of a subtree, document order.
    pub fn text_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if self.is_text(id) {
            out.push_str(self.content(id));
        }
        let mut cur = self.first_child(id);
        while let Some(c) = cur {
            self.collect_text(c, out);
            cur = self.next(c);
        }
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}
