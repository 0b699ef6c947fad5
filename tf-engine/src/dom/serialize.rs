//! Hand-written serializer for the arena tree.
//!
//! Text nodes escape the five XML meta characters; attribute values also turn
//! tab/CR/LF into character references so they survive reparsing. `tf-`
//! prefixed sidecar attributes can be stripped at the output boundary, and an
//! HTML mode serializes void elements without the self-closing slash.

use super::{Dom, NodeId, NodeKind};

/// Elements that are void in HTML serialization.
const HTML_VOID: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Output options.
#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Emit an `<?xml version="1.0" encoding="UTF-8"?>` prologue.
    pub xml_decl: bool,
    /// Drop `tf-` prefixed sidecar attributes.
    pub strip_tf: bool,
    /// HTML output: void elements lose the `/`, other empty elements get a
    /// real close tag.
    pub html: bool,
}

/// Append `text` with XML entity escaping. With `nls`, tab/CR/LF become
/// character references (attribute-value context).
pub fn escape_xml_into(out: &mut String, text: &str, nls: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' if nls => out.push_str("&#9;"),
            '\n' if nls => out.push_str("&#10;"),
            '\r' if nls => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

impl Dom {
    /// Serialize the whole document.
    pub fn serialize(&self, opts: &SerializeOptions) -> String {
        let mut out = String::new();
        if opts.xml_decl {
            out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        }
        let mut cur = self.first_child(self.root());
        while let Some(c) = cur {
            self.serialize_into(&mut out, c, opts);
            cur = self.next(c);
        }
        out
    }

    /// Serialize one node (and subtree) in XML mode, keeping sidecars.
    /// Used when a subtree itself becomes a stored style fragment.
    pub fn serialize_node(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.serialize_into(
            &mut out,
            id,
            &SerializeOptions {
                xml_decl: false,
                strip_tf: false,
                html: false,
            },
        );
        out
    }

    fn serialize_into(&self, out: &mut String, id: NodeId, opts: &SerializeOptions) {
        match self.kind(id) {
            NodeKind::Root => {
                let mut cur = self.first_child(id);
                while let Some(c) = cur {
                    self.serialize_into(out, c, opts);
                    cur = self.next(c);
                }
            }
            NodeKind::Text => escape_xml_into(out, self.content(id), false),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(self.content(id));
                out.push_str("-->");
            }
            NodeKind::Pi => {
                out.push_str("<?");
                out.push_str(self.name(id));
                if !self.content(id).is_empty() {
                    out.push(' ');
                    out.push_str(self.content(id));
                }
                out.push_str("?>");
            }
            NodeKind::Element => {
                let name = self.name(id);
                out.push('<');
                out.push_str(name);
                self.append_attrs(out, id, !opts.strip_tf);
                if self.has_children(id) {
                    out.push('>');
                    let mut cur = self.first_child(id);
                    while let Some(c) = cur {
                        self.serialize_into(out, c, opts);
                        cur = self.next(c);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                } else if opts.html {
                    if HTML_VOID.contains(&self.lower_name(id).as_str()) {
                        out.push('>');
                    } else {
                        out.push_str("></");
                        out.push_str(name);
                        out.push('>');
                    }
                } else {
                    out.push_str("/>");
                }
            }
        }
    }

    /// Append the attribute list of `id`, namespace declarations first.
    /// With `with_tf` false, `tf-` sidecars are dropped.
    pub fn append_attrs(&self, out: &mut String, id: NodeId, with_tf: bool) {
        for (name, value) in self.attrs(id) {
            if !with_tf && name.starts_with("tf-") {
                continue;
            }
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_xml_into(out, value, true);
            out.push('"');
        }
    }

    /// The open tag of an element (`<name attrs>`), sidecars included.
    pub fn open_tag_of(&self, id: NodeId, self_closing: bool) -> String {
        let mut out = String::from("<");
        out.push_str(self.name(id));
        self.append_attrs(&mut out, id, true);
        out.push_str(if self_closing { "/>" } else { ">" });
        out
    }

    /// The close tag of an element (`</name>`).
    pub fn close_tag_of(&self, id: NodeId) -> String {
        format!("</{}>", self.name(id))
    }
}
