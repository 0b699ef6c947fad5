//! Builders from the ecosystem parsers into the arena tree.
//!
//! XML payloads (TEI, OOXML parts, our own styled/content files) go through
//! `roxmltree`; HTML goes through `html5ever`'s tree builder. Both are
//! converted into [`Dom`] so the rest of the pipeline sees one mutable
//! document model. Namespace prefixes are reconstructed into qualified names
//! and `xmlns` declarations reattached to the element that introduced them.

use super::{Dom, NodeId};
use crate::{Error, Result};
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// Parse an XML document into an arena tree.
pub fn parse_xml(input: &str) -> Result<Dom> {
    let opts = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(input, opts)
        .map_err(|e| Error::ParseMalformed(e.to_string()))?;

    let mut dom = Dom::new();
    let root = dom.root();
    for child in doc.root().children() {
        convert_xml_node(&mut dom, root, child);
    }
    Ok(dom)
}

fn convert_xml_node(dom: &mut Dom, parent: NodeId, node: roxmltree::Node) {
    use roxmltree::NodeType;
    match node.node_type() {
        NodeType::Element => {
            let el = dom.create_element(qualified_element_name(node));
            attach_namespace_decls(dom, el, node);
            for attr in node.attributes() {
                dom.set_attr(el, &qualified_attr_name(node, &attr), attr.value());
            }
            dom.append_child(parent, el);
            for child in node.children() {
                convert_xml_node(dom, el, child);
            }
        }
        NodeType::Text => {
            if let Some(text) = node.text() {
                append_text(dom, parent, text);
            }
        }
        NodeType::Comment => {
            let c = dom.create_comment(node.text().unwrap_or(""));
            dom.append_child(parent, c);
        }
        NodeType::PI => {
            if let Some(pi) = node.pi() {
                let p = dom.create_pi(pi.target, pi.value.unwrap_or(""));
                dom.append_child(parent, p);
            }
        }
        NodeType::Root => {}
    }
}

fn qualified_element_name(node: roxmltree::Node) -> String {
    let tag = node.tag_name();
    match tag.namespace().and_then(|uri| node.lookup_prefix(uri)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", tag.name()),
        _ => tag.name().to_string(),
    }
}

fn qualified_attr_name(node: roxmltree::Node, attr: &roxmltree::Attribute) -> String {
    let prefix = match attr.namespace() {
        Some(NS_XML) => Some("xml"),
        Some(uri) => node.lookup_prefix(uri),
        None => None,
    };
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}:{}", attr.name()),
        _ => attr.name().to_string(),
    }
}

/// Reattach the `xmlns` declarations this element introduced. roxmltree folds
/// declarations into scopes, so a declaration belongs here when the parent's
/// scope does not already carry it.
fn attach_namespace_decls(dom: &mut Dom, el: NodeId, node: roxmltree::Node) {
    let parent_scope: Vec<(Option<&str>, &str)> = node
        .parent()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    for ns in node.namespaces() {
        if ns.uri() == NS_XML {
            continue;
        }
        if parent_scope.contains(&(ns.name(), ns.uri())) {
            continue;
        }
        let attr_name = match ns.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        dom.set_attr(el, &attr_name, ns.uri());
    }
}

/// Parse an HTML document into an arena tree.
///
/// The tree builder recovers from tag soup the way browsers do: names are
/// lower-cased and the `html`/`head`/`body` scaffolding is always present.
pub fn parse_html(input: &str) -> Result<Dom> {
    let rcdom: RcDom = html5ever::parse_document(RcDom::default(), Default::default()).one(input);
    let mut dom = Dom::new();
    let root = dom.root();
    convert_rcdom_children(&mut dom, root, &rcdom.document);
    Ok(dom)
}

fn convert_rcdom_children(dom: &mut Dom, parent: NodeId, handle: &Handle) {
    for child in handle.children.borrow().iter() {
        convert_rcdom_node(dom, parent, child);
    }
}

fn convert_rcdom_node(dom: &mut Dom, parent: NodeId, handle: &Handle) {
    match &handle.data {
        NodeData::Document => convert_rcdom_children(dom, parent, handle),
        NodeData::Element { name, attrs, .. } => {
            let qname = match &name.prefix {
                Some(prefix) => format!("{prefix}:{}", name.local),
                None => name.local.to_string(),
            };
            let el = dom.create_element(qname);
            for attr in attrs.borrow().iter() {
                let aname = match &attr.name.prefix {
                    Some(prefix) => format!("{prefix}:{}", attr.name.local),
                    None => attr.name.local.to_string(),
                };
                dom.set_attr(el, &aname, attr.value.to_string());
            }
            dom.append_child(parent, el);
            convert_rcdom_children(dom, el, handle);
        }
        NodeData::Text { contents } => {
            append_text(dom, parent, &contents.borrow());
        }
        NodeData::Comment { contents } => {
            let c = dom.create_comment(contents.to_string());
            dom.append_child(parent, c);
        }
        NodeData::ProcessingInstruction { target, contents } => {
            let p = dom.create_pi(target.to_string(), contents.to_string());
            dom.append_child(parent, p);
        }
        // The adapters re-create the doctype from the original file.
        NodeData::Doctype { .. } => {}
    }
}

/// Append text under `parent`, merging into a trailing text sibling so that
/// whitespace analysis always sees one node per contiguous run.
fn append_text(dom: &mut Dom, parent: NodeId, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = dom.last_child(parent) {
        if dom.is_text(last) {
            let mut merged = dom.content(last).to_string();
            merged.push_str(text);
            dom.set_content(last, merged);
            return;
        }
    }
    let t = dom.create_text(text);
    dom.append_child(parent, t);
}
