//! Whitespace preservation around element boundaries.
//!
//! Translation streams normalize whitespace aggressively, so before anything
//! else touches the tree, every significant run of whitespace is recorded as
//! a sidecar attribute on a neighboring node (`tf-space-prefix`,
//! `tf-space-suffix` on the parent, `tf-space-after`, `tf-space-before` on
//! element siblings). On the way back in, the recorded runs are spliced into
//! the surviving text nodes, and runs whose carrier node was lost in
//! translation are materialized as fresh text nodes. Trimming the contact
//! edge before splicing keeps a recorded run from doubling whitespace the
//! translator preserved.

use crate::dom::{Dom, NodeId};
use crate::markers;
use once_cell::sync::Lazy;
use regex::Regex;
use tf_config::TagSets;

static RX_SPACE_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\p{Zs}]+$").unwrap());
static RX_BLANK_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\r\n\p{Z}]+$").unwrap());
static RX_BLANK_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\s\r\n\p{Z}]+").unwrap());
static RX_BLANK_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\r\n\p{Z}]+$").unwrap());

/// Space-only in the narrow sense: no line breaks beyond `\s`'s ASCII set.
pub fn is_space(text: &str) -> bool {
    RX_SPACE_ONLY.is_match(text)
}

/// Entirely whitespace, including all Unicode space separators.
pub fn is_blank(text: &str) -> bool {
    RX_BLANK_ONLY.is_match(text)
}

fn ltrim(text: &str) -> &str {
    match RX_BLANK_HEAD.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

fn rtrim(text: &str) -> &str {
    match RX_BLANK_TAIL.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// Record whitespace around and inside elements as sidecar attributes.
/// The text nodes themselves are left in place.
pub fn save_spaces(dom: &mut Dom, tags: &TagSets) {
    save_spaces_in(dom, tags, dom.root());
}

fn save_spaces_in(dom: &mut Dom, tags: &TagSets, node: NodeId) {
    let mut cur = dom.first_child(node);
    while let Some(child) = cur {
        cur = dom.next(child);

        if tags.prot.contains(&dom.lower_name(child)) {
            continue;
        }
        if !dom.is_text(child) {
            save_spaces_in(dom, tags, child);
            continue;
        }
        let parent = match dom.parent(child) {
            Some(p) => p,
            None => continue,
        };
        let content = dom.content(child).to_string();
        if content.is_empty() {
            continue;
        }

        if is_blank(&content) {
            if dom.prev(child).is_none() {
                dom.set_attr(parent, "tf-space-prefix", content);
            } else if dom.next(child).is_none() {
                dom.set_attr(parent, "tf-space-suffix", content);
            } else if dom.is_element(dom.prev(child).unwrap()) {
                dom.set_attr(dom.prev(child).unwrap(), "tf-space-after", content);
            } else if dom.is_element(dom.next(child).unwrap()) {
                dom.set_attr(dom.next(child).unwrap(), "tf-space-before", content);
            }
            // Entirely whitespace, so no separate leading/trailing runs.
            continue;
        }

        if let Some(head) = RX_BLANK_HEAD.find(&content) {
            let run = head.as_str().to_string();
            match dom.prev(child) {
                Some(prev) => {
                    if dom.is_element(prev) {
                        dom.set_attr(prev, "tf-space-after", run);
                    }
                }
                None => dom.set_attr(parent, "tf-space-prefix", run),
            }
        }
        if let Some(tail) = RX_BLANK_TAIL.find(&content) {
            let run = tail.as_str().to_string();
            match dom.next(child) {
                Some(next) => {
                    if dom.is_element(next) {
                        dom.set_attr(next, "tf-space-before", run);
                    }
                }
                None => dom.set_attr(parent, "tf-space-suffix", run),
            }
        }
    }
}

/// Splice recorded whitespace back into surviving text nodes, then
/// materialize whatever is left as fresh nodes.
pub fn restore_spaces(dom: &mut Dom, tags: &TagSets) {
    restore_spaces_in(dom, tags, dom.root());
    create_spaces_in(dom, tags, dom.root());
}

fn restore_spaces_in(dom: &mut Dom, tags: &TagSets, node: NodeId) {
    let mut cur = dom.first_child(node);
    while let Some(child) = cur {
        cur = dom.next(child);

        if tags.prot.contains(&dom.lower_name(child)) {
            continue;
        }
        if !dom.is_text(child) {
            restore_spaces_in(dom, tags, child);
            continue;
        }
        let parent = match dom.parent(child) {
            Some(p) => p,
            None => continue,
        };

        if let Some(prev) = dom.prev(child) {
            if let Some(run) = dom.take_attr(prev, "tf-space-after") {
                let merged = format!("{run}{}", ltrim(dom.content(child)));
                dom.set_content(child, merged);
            }
        }
        // Parent-edge sidecars are consumed only by the matching edge child;
        // if that edge is not a text node, create_spaces_in picks them up.
        if dom.first_child(parent) == Some(child) {
            if let Some(run) = dom.take_attr(parent, "tf-space-prefix") {
                let merged = format!("{run}{}", ltrim(dom.content(child)));
                dom.set_content(child, merged);
            }
        }
        if let Some(next) = dom.next(child) {
            if let Some(run) = dom.take_attr(next, "tf-space-before") {
                let merged = format!("{}{run}", rtrim(dom.content(child)));
                dom.set_content(child, merged);
            }
        }
        if dom.last_child(parent) == Some(child) {
            if let Some(run) = dom.take_attr(parent, "tf-space-suffix") {
                let merged = format!("{}{run}", rtrim(dom.content(child)));
                dom.set_content(child, merged);
            }
        }

        // Whitespace the extractor inserted synthetically is trimmed back out
        // of the adjacent text nodes.
        if dom.take_attr(parent, "tf-added-before").is_some() {
            if let Some(prev) = dom.prev(parent) {
                if dom.is_text(prev) {
                    let trimmed = rtrim(dom.content(prev)).to_string();
                    dom.set_content(prev, trimmed);
                }
            }
        }
        if dom.take_attr(parent, "tf-added-after").is_some() {
            if let Some(next) = dom.next(parent) {
                if dom.is_text(next) {
                    let trimmed = ltrim(dom.content(next)).to_string();
                    dom.set_content(next, trimmed);
                }
            }
        }

        if dom.content(child).contains(markers::SENTINEL) {
            let replaced = dom.content(child).replace(markers::SENTINEL, "\n");
            dom.set_content(child, replaced);
        }
    }
}

// restore_spaces_in can only modify existing text nodes; any sidecar still
// present means the carrier text was lost and gets a fresh node instead.
fn create_spaces_in(dom: &mut Dom, tags: &TagSets, node: NodeId) {
    let mut cur = dom.first_child(node);
    while let Some(child) = cur {
        cur = dom.next(child);

        if tags.prot.contains(&dom.lower_name(child)) {
            continue;
        }
        if !dom.is_element(child) {
            continue;
        }
        create_spaces_in(dom, tags, child);

        if let Some(run) = dom.take_attr(child, "tf-space-after") {
            let text = dom.create_text(run);
            dom.insert_after(child, text);
        }
        if let Some(run) = dom.take_attr(child, "tf-space-prefix") {
            let text = dom.create_text(run);
            dom.prepend_child(child, text);
        }
        if let Some(run) = dom.take_attr(child, "tf-space-before") {
            let text = dom.create_text(run);
            dom.insert_before(child, text);
        }
        if let Some(run) = dom.take_attr(child, "tf-space-suffix") {
            let text = dom.create_text(run);
            dom.append_child(child, text);
        }
    }
}

/// Whether `node` is the sole non-whitespace child of its parent, looking
/// through inline ancestors.
pub fn is_only_child(dom: &Dom, tags: &TagSets, node: NodeId) -> bool {
    let Some(parent) = dom.parent(node) else {
        return true;
    };
    let mut onlychild = true;
    let first = dom.first_child(parent);
    let last = dom.last_child(parent);

    let first_ok = first == Some(node)
        || first.is_some_and(|f| {
            dom.next(f) == Some(node) && dom.is_text(f) && is_space(dom.content(f))
        });
    if !first_ok {
        onlychild = false;
    } else {
        let last_ok = last == Some(node)
            || last.is_some_and(|l| {
                dom.prev(l) == Some(node) && dom.is_text(l) && is_space(dom.content(l))
            });
        if !last_ok {
            onlychild = false;
        }
    }

    if onlychild && tags.inline.contains(&dom.lower_name(parent)) {
        return is_only_child(dom, tags, parent);
    }
    onlychild
}

/// Whether any element descendant is neither inline nor inline-protected.
pub fn has_block_child(dom: &Dom, tags: &TagSets, node: NodeId) -> bool {
    let mut cur = dom.first_child(node);
    while let Some(child) = cur {
        cur = dom.next(child);
        if !dom.is_element(child) {
            continue;
        }
        let lname = dom.lower_name(child);
        if !(tags.inline.contains(&lname) || tags.prot_inline.contains(&lname))
            || has_block_child(dom, tags, child)
        {
            return true;
        }
    }
    false
}
