//! Block extraction: find translatable text and textual attributes, emit
//! them into the stream, and leave searchable boundary markers behind.
//!
//! Every emitted block gets an id of the form `<counter>-<hash>`: the
//! 1-based extraction order joined with the base64-url encoded 32-bit hash
//! of the body. The tree copy keeps the body between
//! `BLK_OPEN_B id BLK_OPEN_E … BLK_CLOSE_B id BLK_CLOSE_E` so injection can
//! splice translations back by id.

use crate::dom::{Dom, NodeId, NodeKind};
use crate::hash::hash32_url64;
use crate::markers;
use crate::stream::StreamCodec;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tf_config::TagSets;

// Bodies without any alphanumeric content are not worth translating.
static RX_ANY_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w\p{L}\p{N}\p{M}]").unwrap());

struct Extractor<'a> {
    dom: &'a mut Dom,
    tags: &'a TagSets,
    codec: &'a StreamCodec,
    // Attribute names in deterministic order so block numbering is stable.
    attr_names: Vec<String>,
    blocks: usize,
}

/// Walk the style-factored tree, emit one stream body, and rewrite extracted
/// text and attribute values into boundary-marked form.
pub fn extract_blocks(
    dom: &mut Dom,
    tags: &TagSets,
    codec: &StreamCodec,
    work_dir: &Path,
) -> String {
    let mut out = String::new();
    codec.stream_header(&mut out, work_dir);
    let mut attr_names: Vec<String> = tags.attrs.iter().cloned().collect();
    attr_names.sort();
    let mut ex = Extractor {
        dom,
        tags,
        codec,
        attr_names,
        blocks: 0,
    };
    let root = ex.dom.root();
    ex.walk(&mut out, root, false, false);
    out
}

impl Extractor<'_> {
    fn walk(&mut self, out: &mut String, node: NodeId, txt: bool, header: bool) {
        // With no parent whitelist configured, every tag is a valid parent.
        let txt = txt || self.tags.parents_allow.is_empty();

        let mut cur = self.dom.first_child(node);
        while let Some(child) = cur {
            cur = self.dom.next(child);

            match self.dom.kind(child) {
                NodeKind::Comment | NodeKind::Pi | NodeKind::Root => continue,
                NodeKind::Element | NodeKind::Text => {}
            }

            let lname = self.dom.lower_name(child);
            if self.tags.prot.contains(&lname) || self.tags.prot_inline.contains(&lname) {
                continue;
            }

            if self.dom.is_element(child) {
                self.extract_attrs(out, child);
            }

            if self.tags.parents_allow.contains(&lname) {
                let header = header || self.tags.headers.contains(&lname);
                self.walk(out, child, true, header);
            } else if self.dom.is_element(child) {
                let header = header || self.tags.headers.contains(&lname);
                self.walk(out, child, txt, header);
            } else if !self.dom.content(child).is_empty() {
                if !txt {
                    continue;
                }
                let parent = match self.dom.parent(child) {
                    Some(p) => p,
                    None => continue,
                };
                if self.dom.attr(parent, "tf-protect").is_some() {
                    continue;
                }
                let pname = self.dom.lower_name(parent);
                if !self.tags.parents_direct.is_empty()
                    && !self.tags.parents_direct.contains(&pname)
                {
                    continue;
                }
                let body = self.dom.content(child).to_string();
                if !RX_ANY_ALNUM.is_match(&body) {
                    continue;
                }
                let header = header || self.tags.headers.contains(&pname);
                let id = self.emit(out, &body, header);
                let mut wrapped = String::new();
                markers::push_block_bounds(&mut wrapped, &id, &body);
                self.dom.set_content(child, wrapped);
            }
        }
    }

    /// Textual attributes become blocks of their own, ahead of the element's
    /// children in the stream.
    fn extract_attrs(&mut self, out: &mut String, child: NodeId) {
        for i in 0..self.attr_names.len() {
            let name = self.attr_names[i].clone();
            let Some(value) = self.dom.attr(child, &name).map(str::to_string) else {
                continue;
            };
            if !RX_ANY_ALNUM.is_match(&value) {
                // No alphanumeric payload, nothing to translate.
                continue;
            }
            let header = self.tags.attr_headers.contains(&name);
            let id = self.emit(out, &value, header);
            let mut wrapped = String::new();
            markers::push_block_bounds(&mut wrapped, &id, &value);
            self.dom.set_attr(child, &name, wrapped);
        }
    }

    fn emit(&mut self, out: &mut String, body: &str, header: bool) -> String {
        self.blocks += 1;
        let id = format!("{}-{}", self.blocks, hash32_url64(body.as_bytes()));
        self.codec.block_open(out, &id);
        self.codec.block_body(out, body);
        if header {
            self.codec.block_term_header(out);
        }
        self.codec.block_close(out, &id);
        id
    }
}
