//! TEI adapter for human-generated post corpora.
//!
//! Only the human/system-authored `ab` payloads of `post` elements are
//! translatable; their children are gathered under `<tf-text>` wrappers that
//! the parent whitelist keys on. `figDesc` captions inside figures become
//! inline `figure` styles so the caption text travels with its block.
//! `<lb/>` line breaks get synthetic spacing so surrounding tokens stay
//! apart, recorded for removal at inject time.

use crate::dom::{parse_xml, Dom, NodeId, SerializeOptions};
use crate::markers;
use crate::spaces::save_spaces;
use crate::state::State;
use crate::stream::StreamCodec;
use crate::styles::save_styles;
use crate::{Document, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

static RX_LB_BOTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\s\p{Z}<>;&])<lb/>([^\s\p{Z}<>;&])").unwrap());
static RX_LB_BEFORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([^\s\p{Z}<>;&])<lb/>").unwrap());
static RX_LB_AFTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<lb/>([^\s\p{Z}<>;&])").unwrap());

static RX_TF_HELPERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?tf-(text|protect)>").unwrap());
static RX_LB_ADDED_BOTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#" <lb tf-added-(before|after)="1" tf-added-(before|after)="1"/> "#).unwrap()
});
static RX_LB_ADDED_BEFORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#" <lb tf-added-before="1"/>"#).unwrap());
static RX_LB_ADDED_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<lb tf-added-after="1"/> "#).unwrap());
static RX_TF_ADDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#" tf-added-(before|after)="1""#).unwrap());

pub fn extract(state: &mut State) -> Result<Document> {
    let mut data = super::load_original(state)?;

    // Put spaces around <lb/> to avoid token merging, and record that we did.
    data = RX_LB_BOTH
        .replace_all(&data, "$1 <lb tf-added-before=\"1\" tf-added-after=\"1\"/> $2")
        .into_owned();
    data = RX_LB_BEFORE
        .replace_all(&data, "$1 <lb tf-added-before=\"1\"/>")
        .into_owned();
    data = RX_LB_AFTER
        .replace_all(&data, "<lb tf-added-after=\"1\"/> $1")
        .into_owned();

    let mut dom = parse_xml(&data)?;
    find_text(state, &mut dom)?;

    let tags = state.settings.tag_sets("tei");
    save_spaces(&mut dom, &tags);

    let codec = StreamCodec::new(state.settings.stream, state.settings.apertium_n);
    let styled = save_styles(&dom, &tags, state, &codec, true, !state.settings.no_extend)?;
    fs::write(state.path("styled.xml"), &styled)?;
    let dom = parse_xml(&styled)?;

    log::info!("TEI ready for extraction");
    Ok(Document::new(dom, tags))
}

fn generated_by_ok(dom: &Dom, node: NodeId) -> bool {
    match dom.attr(node, "generatedBy") {
        None | Some("human") | Some("system") => true,
        Some(_) => false,
    }
}

/// Mark up the translatable payloads: inline the figure captions, then wrap
/// each eligible `ab`'s children in `<tf-text>`.
fn find_text(state: &mut State, dom: &mut Dom) -> Result<()> {
    state.begin()?;

    // figDesc under post[@generatedBy='human']/ab/figure becomes an inline
    // figure style attached to the neighboring text.
    for fig_desc in dom.descendants_named(dom.root(), "figDesc") {
        let Some(figure) = dom.parent(fig_desc).filter(|&f| dom.name(f) == "figure") else {
            continue;
        };
        let Some(ab) = dom.parent(figure).filter(|&a| dom.name(a) == "ab") else {
            continue;
        };
        let post_ok = dom
            .parent(ab)
            .is_some_and(|p| dom.name(p) == "post" && dom.attr(p, "generatedBy") == Some("human"));
        if !post_ok || !generated_by_ok(dom, ab) || !generated_by_ok(dom, fig_desc) {
            continue;
        }
        match dom.attr(fig_desc, "source") {
            None | Some("human") | Some("system") => {}
            Some(_) => continue,
        }

        let caption = dom
            .first_child(fig_desc)
            .map(|c| dom.content(c).to_string())
            .unwrap_or_default();
        dom.set_element_text(fig_desc, markers::s::SENTINEL);

        // The figure's serialization, split at the caption position, becomes
        // the stored fragment pair.
        let serialized = dom.serialize_node(figure);
        let (otag, ctag) = match serialized.find(markers::SENTINEL) {
            Some(pos) => (
                serialized[..pos].to_string(),
                serialized[pos + markers::SENTINEL.len_utf8()..].to_string(),
            ),
            None => (serialized, String::new()),
        };
        let hash = state.save_style("figure", &otag, &ctag, "")?;

        let mut span = String::new();
        span.push(markers::INL_OPEN_B);
        span.push_str("figure:");
        span.push_str(&hash);
        span.push(markers::INL_OPEN_E);
        span.push_str(&caption);
        span.push(markers::INL_CLOSE);

        attach_span(dom, figure, span);
        dom.unlink(figure);
    }

    // Gather each eligible ab's children under a tf-text wrapper; the
    // extraction whitelist keys on it, and injection strips it again.
    for ab in dom.descendants_named(dom.root(), "ab") {
        let post_ok = dom
            .parent(ab)
            .is_some_and(|p| dom.name(p) == "post" && dom.attr(p, "generatedBy") == Some("human"));
        if !post_ok || !generated_by_ok(dom, ab) || !dom.has_children(ab) {
            continue;
        }
        let wrapper = dom.create_element("tf-text");
        for child in dom.children(ab) {
            dom.append_child(wrapper, child);
        }
        dom.append_child(ab, wrapper);
    }

    state.commit()?;
    Ok(())
}

/// Attach an inline span to the text node neighboring `node`, merging into
/// an existing `tf-text` or text sibling, or creating a fresh text node.
fn attach_span(dom: &mut Dom, node: NodeId, span: String) {
    if let Some(prev) = dom.prev(node) {
        if dom.is_element(prev) && dom.name(prev) == "tf-text" {
            let mut text = dom.text_of(prev);
            text.push_str(&span);
            dom.set_element_text(prev, text);
            return;
        }
        if dom.is_text(prev) {
            let mut text = dom.content(prev).to_string();
            text.push_str(&span);
            dom.set_content(prev, text);
            return;
        }
    }
    if let Some(next) = dom.next(node) {
        if dom.is_element(next) && dom.name(next) == "tf-text" {
            let mut text = span;
            text.push_str(&dom.text_of(next));
            dom.set_element_text(next, text);
            return;
        }
        if dom.is_text(next) {
            let mut text = span;
            text.push_str(dom.content(next));
            dom.set_content(next, text);
            return;
        }
    }
    let text = dom.create_text(span);
    if dom.prev(node).is_some() {
        dom.insert_before(node, text);
    } else {
        dom.insert_after(node, text);
    }
}

pub fn inject(state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    let mut data = dom.serialize(&SerializeOptions {
        xml_decl: true,
        ..Default::default()
    });

    // Remove the helper elements and the synthetic lb spacing we added.
    data = RX_TF_HELPERS.replace_all(&data, "").into_owned();
    data = RX_LB_ADDED_BOTH.replace_all(&data, "<lb/>").into_owned();
    data = RX_LB_ADDED_BEFORE.replace_all(&data, "<lb/>").into_owned();
    data = RX_LB_ADDED_AFTER.replace_all(&data, "<lb/>").into_owned();
    data = RX_TF_ADDED.replace_all(&data, "").into_owned();

    let path = state.path("injected.xml");
    fs::write(&path, &data)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn state_with(dir: &std::path::Path, xml: &str) -> State {
        fs::write(dir.join("original"), xml).unwrap();
        let mut settings = Settings::new();
        settings.config = tf_config::load().unwrap();
        State::open(dir, settings, false).unwrap()
    }

    #[test]
    fn ab_children_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let xml = "<TEI><post generatedBy=\"human\"><ab>Hello there</ab></post>\
                   <post generatedBy=\"bot\"><ab>machine text</ab></post></TEI>";
        let mut state = state_with(dir.path(), xml);
        extract(&mut state).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        assert!(styled.contains("<tf-text>Hello there</tf-text>"));
        assert!(!styled.contains("<tf-text>machine text"));
    }

    #[test]
    fn lb_gets_recorded_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let xml = "<TEI><post generatedBy=\"human\"><ab>one<lb/>two</ab></post></TEI>";
        let mut state = state_with(dir.path(), xml);
        extract(&mut state).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        // The lb is inline-protected, so it survives as a stored reference,
        // but the synthetic spaces are in the text.
        assert!(styled.contains("one "), "styled: {styled}");
        assert!(styled.contains(" two"), "styled: {styled}");
    }

    #[test]
    fn fig_desc_becomes_inline_style() {
        let dir = tempfile::tempdir().unwrap();
        let xml = "<TEI><post generatedBy=\"human\"><ab>before \
                   <figure><figDesc>a caption</figDesc></figure> after</ab></post></TEI>";
        let mut state = state_with(dir.path(), xml);
        extract(&mut state).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        assert!(styled.contains("a caption"), "styled: {styled}");
        assert!(!styled.contains("figDesc"), "styled: {styled}");
    }

    #[test]
    fn inject_strips_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(dir.path(), "<TEI/>");
        let mut dom = parse_xml(
            "<TEI><post generatedBy=\"human\"><ab><tf-text>ok <lb tf-added-before=\"1\"/>x</tf-text></ab></post></TEI>",
        )
        .unwrap();
        let path = inject(&mut state, &mut dom).unwrap();
        let out = fs::read_to_string(path).unwrap();
        assert!(!out.contains("tf-text"));
        assert!(!out.contains("tf-added"));
        assert!(out.contains("ok<lb/>x"));
    }
}
