//! Style factoring: serialize the tree while turning inline formatting into
//! markers the stream can carry.
//!
//! Inline tags whose spans are translatable become
//! `INL_OPEN_B tag:hash INL_OPEN_E … INL_CLOSE` with the original open/close
//! markup stored behind the hash. Protected material (configured tags,
//! comments, processing instructions) is wrapped in `PROT_OPEN`/`PROT_CLOSE`
//! for the stream codec to convert into opaque references.

use crate::cleanup::cleanup_styles;
use crate::dom::{escape_xml_into, Dom, NodeId, NodeKind};
use crate::markers;
use crate::spaces::{has_block_child, is_only_child};
use crate::state::State;
use crate::stream::StreamCodec;
use crate::Result;
use tf_config::TagSets;

/// Serialize `dom` into marker-bearing text, storing factored styles.
///
/// The result is the `styled.xml` payload: real markup for block structure,
/// markers for inline formatting, protected references for everything the
/// translator must not see.
pub fn save_styles(
    dom: &Dom,
    tags: &TagSets,
    state: &State,
    codec: &StreamCodec,
    with_decl: bool,
    extend: bool,
) -> Result<String> {
    let mut out = String::new();
    if with_decl {
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    }
    state.begin()?;
    walk(dom, tags, state, &mut out, dom.root(), false)?;
    codec.protect_to_styles(&mut out, state)?;
    state.commit()?;
    cleanup_styles(&mut out, extend);
    Ok(out)
}

fn walk(
    dom: &Dom,
    tags: &TagSets,
    state: &State,
    out: &mut String,
    node: NodeId,
    protect: bool,
) -> Result<()> {
    let mut cur = dom.first_child(node);
    while let Some(child) = cur {
        cur = dom.next(child);
        match dom.kind(child) {
            NodeKind::Text => {
                if tags.raw.contains(&dom.lower_name(node)) {
                    out.push_str(dom.content(child));
                } else {
                    escape_xml_into(out, dom.content(child), false);
                }
            }
            NodeKind::Comment => {
                out.push(markers::PROT_OPEN);
                out.push_str("<!--");
                out.push_str(dom.content(child));
                out.push_str("-->");
                out.push(markers::PROT_CLOSE);
            }
            NodeKind::Pi => {
                out.push(markers::PROT_OPEN);
                out.push_str("<?");
                out.push_str(dom.name(child));
                out.push(' ');
                out.push_str(dom.content(child));
                out.push_str("?>");
                out.push(markers::PROT_CLOSE);
            }
            NodeKind::Element => {
                element(dom, tags, state, out, child, protect)?;
            }
            NodeKind::Root => {}
        }
    }
    Ok(())
}

fn element(
    dom: &Dom,
    tags: &TagSets,
    state: &State,
    out: &mut String,
    child: NodeId,
    protect: bool,
) -> Result<()> {
    let lname = dom.lower_name(child);
    let l_protect =
        protect || tags.prot.contains(&lname) || dom.attr(child, "tf-protect").is_some();

    if !dom.has_children(child) {
        let otag = dom.open_tag_of(child, true);
        if tags.prot_inline.contains(&lname) && !protect {
            out.push(markers::PROT_OPEN);
            out.push_str(&otag);
            out.push(markers::PROT_CLOSE);
        } else {
            out.push_str(&otag);
        }
        return Ok(());
    }

    let otag = dom.open_tag_of(child, false);
    let ctag = dom.close_tag_of(child);

    if tags.prot_inline.contains(&lname) && !protect {
        out.push(markers::PROT_OPEN);
        out.push_str(&otag);
        walk(dom, tags, state, out, child, true)?;
        out.push_str(&ctag);
        out.push(markers::PROT_CLOSE);
        return Ok(());
    }

    let first_child_name = dom
        .first_child(child)
        .map(|f| dom.lower_name(f))
        .unwrap_or_default();
    if !l_protect
        && tags.inline.contains(&lname)
        && !tags.prot.contains(&first_child_name)
        && !is_only_child(dom, tags, child)
        && !has_block_child(dom, tags, child)
    {
        let sname = dom.local_name(child).to_lowercase();
        // The stored fragment drops the tf-space sidecars: the whitespace
        // they record is already in the span's surrounding text, and equal
        // markup must hash equally wherever it appears. The tf-added markers
        // stay, since injection still has to undo that synthetic spacing.
        let mut clean_otag = format!("<{}", dom.name(child));
        for (name, value) in dom.attrs(child) {
            if name.starts_with("tf-space-") {
                continue;
            }
            clean_otag.push(' ');
            clean_otag.push_str(name);
            clean_otag.push_str("=\"");
            escape_xml_into(&mut clean_otag, value, true);
            clean_otag.push('"');
        }
        clean_otag.push('>');
        let hash = state.save_style(&sname, &clean_otag, &ctag, "")?;
        out.push(markers::INL_OPEN_B);
        out.push_str(&sname);
        out.push(':');
        out.push_str(&hash);
        out.push(markers::INL_OPEN_E);
        walk(dom, tags, state, out, child, false)?;
        out.push(markers::INL_CLOSE);
        return Ok(());
    }

    out.push_str(&otag);
    walk(dom, tags, state, out, child, l_protect)?;
    out.push_str(&ctag);
    Ok(())
}
