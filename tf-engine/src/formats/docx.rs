//! OOXML word-processing adapter.
//!
//! Word splits paragraphs into formatting runs, so the adapter merges every
//! paragraph's `<w:t>` runs into a single `<tf-text>` wrapper, remembering
//! bold/italic/hyperlink formatting as stored styles. Revision tracking and
//! proofing chaff is scrubbed first so run merging and style hashing see
//! stable markup. Injection reverses the wrapping and repacks the archive
//! with the main document replaced.

use crate::dom::{parse_xml, Dom, NodeId, SerializeOptions};
use crate::markers;
use crate::spaces::save_spaces;
use crate::state::State;
use crate::{cleanup, Document, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

const MAIN_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

static RX_RSID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#" w:rsid(P|RDefault|RPr|R|Del)="[^"]+""#).unwrap());
static RX_LANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:lang [^/>]*/>").unwrap());
static RX_PROOF: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:proofErr [^/>]*/>").unwrap());
static RX_T_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</w:t>[^<>]*?<w:t( [^>]*)?>").unwrap());
static RX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<w:r( [^>]*)?>.*?</w:r>").unwrap());

static RX_TEXT_AFTER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(</w:t></w:r>)([^<>]+)").unwrap());
static RX_TEXT_AFTER_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(</w:t></w:r></w:hyperlink>)([^<>]+)").unwrap());
static RX_TEXT_BEFORE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^>])(<w:r( [^>]*)?>(?s:.*?)<w:t( [^>]*)?>)").unwrap());
static RX_TEXT_BEFORE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([^>])(<w:hyperlink( [^>]*)?>(?s:.*?)<w:r( [^>]*)?>(?s:.*?)<w:t( [^>]*)?>)")
        .unwrap()
});
static RX_EMPTY_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:r><w:t/></w:r>").unwrap());
static RX_TF_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?tf-text>").unwrap());
static RX_WT_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:t([ >])").unwrap());

pub fn extract(state: &mut State) -> Result<Document> {
    let original = state.path("original");
    let docname = main_document(state)?;
    state.set_info("docx-document-main", &docname)?;

    let bytes = super::zip_member(&original, &docname)?
        .ok_or_else(|| Error::Archive(format!("DOCX did not have main document {docname}")))?;
    if bytes.is_empty() {
        return Err(Error::Archive(format!("DOCX main document {docname} was empty")));
    }
    let mut data = String::from_utf8_lossy(&bytes).into_owned();

    // Wipe chaff that's not relevant when translated, or simply superfluous.
    data = data.replace(" xml:space=\"preserve\"", "");
    data = data.replace(" w:eastAsiaTheme=\"minorHAnsi\"", "");
    data = data.replace(" w:type=\"textWrapping\"", "");
    data = RX_RSID.replace_all(&data, "").into_owned();
    // Full-tag chaff after attributes, since removing those may leave these
    // tags empty.
    data = RX_LANG.replace_all(&data, "").into_owned();
    data = RX_PROOF.replace_all(&data, "").into_owned();
    data = data.replace("<w:lang/>", "");
    data = data.replace("<w:noProof/>", "");
    data = data.replace("<w:lastRenderedPageBreak/>", "");
    data = data.replace("<w:color w:val=\"auto\"/>", "");
    data = data.replace("<w:rFonts/>", "");
    data = data.replace("<w:rFonts></w:rFonts>", "");
    data = data.replace("<w:rPr></w:rPr>", "");
    data = data.replace("<w:softHyphen/>", "");
    data = data.replace("<w:br/>", "<w:t>\n</w:t>");
    data = data.replace("<w:cr/>", "<w:t>\n</w:t>");
    data = data.replace("<w:noBreakHyphen/>", "<w:t>-</w:t>");
    data = RX_T_JOIN.replace_all(&data, "").into_owned();
    data = isolate_tabs(&data);

    let mut dom = parse_xml(&data)?;
    drop(data);

    merge_runs(state, &mut dom)?;

    let tags = state.settings.tag_sets("docx");
    save_spaces(&mut dom, &tags);

    let mut styled = dom.serialize(&SerializeOptions {
        xml_decl: true,
        ..Default::default()
    });
    cleanup::cleanup_styles(&mut styled, !state.settings.no_extend);
    styled = styled.replace("</tf-text><tf-text>", "");

    fs::write(state.path("styled.xml"), &styled)?;
    let dom = parse_xml(&styled)?;
    Ok(Document::new(dom, tags))
}

/// DOCX allows renaming the main document; `[Content_Types].xml` knows.
fn main_document(state: &State) -> Result<String> {
    let original = state.path("original");
    let mut docname = "word/document.xml".to_string();
    if super::zip_member(&original, &docname)?.is_some() {
        return Ok(docname);
    }
    let ctypes = super::zip_member(&original, "[Content_Types].xml")?
        .ok_or_else(|| Error::Archive("DOCX did not have [Content_Types].xml".to_string()))?;
    let ctypes = String::from_utf8_lossy(&ctypes);

    let override_marker = format!(".xml\" ContentType=\"{MAIN_TYPE}\"");
    if let Some(off) = ctypes.find(&override_marker) {
        let nb = ctypes[..off].rfind('"').map(|p| p + 1).unwrap_or(0);
        docname = ctypes[nb..off + 4].to_string();
    } else {
        let marker = format!(" ContentType=\"{MAIN_TYPE}\" PartName=\"");
        if let Some(off) = ctypes.find(&marker) {
            let nb = off + marker.len();
            if let Some(ne) = ctypes[nb..].find('"') {
                docname = ctypes[nb..nb + ne].to_string();
            }
        }
    }
    if let Some(stripped) = docname.strip_prefix('/') {
        docname = stripped.to_string();
    }
    Ok(docname)
}

/// Move `<w:tab/>` into a run of its own so it interferes with neither
/// `<w:t>` merging nor style hashing.
fn isolate_tabs(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut last = 0;
    for m in RX_RUN.find_iter(data) {
        out.push_str(&data[last..m.start()]);
        let run = m.as_str();
        if let Some(tab) = run.find("<w:tab/><w:t>") {
            out.push_str(&run[..tab]);
            out.push_str("<w:tab/></w:r>");
            out.push_str(&run[..tab]);
            out.push_str(&run[tab + 8..]);
        } else {
            out.push_str(run);
        }
        last = m.end();
    }
    out.push_str(&data[last..]);
    out
}

/// Merge each paragraph's text runs into `<tf-text>` wrappers, remembering
/// run formatting as stored styles.
fn merge_runs(state: &mut State, dom: &mut Dom) -> Result<()> {
    state.begin()?;

    for p in dom.descendants_named(dom.root(), "w:p") {
        let ts = dom.descendants_named(p, "w:t");
        if ts.len() <= 1 {
            continue;
        }

        for t in ts {
            let content = dom.text_of(t);
            dom.set_element_text(t, markers::s::SENTINEL);

            let run = match dom.parent(t) {
                Some(r) => r,
                None => continue,
            };
            let serialized = dom.serialize_node(run);
            let has_b = serialized.contains("<w:b/>");
            let has_i = serialized.contains("<w:i/>");
            let style_type = match (has_b, has_i) {
                (true, true) => "b+i",
                (true, false) => "b",
                (false, true) => "i",
                (false, false) => "text",
            };
            let span = store_split_style(state, style_type, &serialized, &content)?;
            attach_to_tf_text(dom, run, span);
            dom.unlink(run);
        }

        // Fold single-child hyperlinks into the merged text as `a` styles.
        for link in dom.descendants_named(p, "w:hyperlink") {
            let Some(text) = dom.first_child(link) else {
                continue;
            };
            if dom.next(text).is_some() {
                // TOC-style hyperlinks carry extra data; leave them alone.
                continue;
            }
            dom.unlink(text);
            dom.insert_before(link, text);

            dom.set_element_text(link, markers::s::SENTINEL);
            let serialized = dom.serialize_node(link);
            let inner = if dom.is_element(text) {
                dom.text_of(text)
            } else {
                dom.content(text).to_string()
            };
            let span = store_split_style(state, "a", &serialized, &inner)?;
            if dom.is_element(text) {
                dom.set_element_text(text, span);
            } else {
                dom.set_content(text, span);
            }
            dom.unlink(link);
        }
    }

    state.commit()
}

/// Split `serialized` at the sentinel into an open/close fragment pair,
/// store it under `tag`, and return the inline span carrying `content`.
pub(crate) fn store_split_style(
    state: &State,
    tag: &str,
    serialized: &str,
    content: &str,
) -> Result<String> {
    let (otag, ctag) = match serialized.find(markers::SENTINEL) {
        Some(pos) => (
            &serialized[..pos],
            &serialized[pos + markers::SENTINEL.len_utf8()..],
        ),
        None => (serialized, ""),
    };
    let hash = state.save_style(tag, otag, ctag, "")?;

    let mut span = String::new();
    span.push(markers::INL_OPEN_B);
    span.push_str(tag);
    span.push(':');
    span.push_str(&hash);
    span.push(markers::INL_OPEN_E);
    span.push_str(content);
    span.push(markers::INL_CLOSE);
    Ok(span)
}

/// Append `span` to the `<tf-text>` preceding `node`, creating one if the
/// previous sibling is something else.
pub(crate) fn attach_to_tf_text(dom: &mut Dom, node: NodeId, span: String) {
    if let Some(prev) = dom.prev(node) {
        if dom.is_element(prev) && dom.name(prev) == "tf-text" {
            let mut text = dom.text_of(prev);
            text.push_str(&span);
            dom.set_element_text(prev, text);
            return;
        }
    }
    let wrapper = dom.create_element("tf-text");
    dom.insert_before(node, wrapper);
    dom.set_element_text(wrapper, span);
}

pub fn inject(state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    let mut data = dom.serialize(&SerializeOptions {
        xml_decl: true,
        strip_tf: true,
        ..Default::default()
    });

    // DOCX can't have any text outside w:t. Wrap stray text after runs in
    // fresh runs that inherit no formatting, and pull text from before a run
    // inside it.
    data = RX_TEXT_AFTER_RUN
        .replace_all(&data, "$1<w:r><w:t>$2</w:t></w:r>")
        .into_owned();
    data = RX_TEXT_AFTER_LINK
        .replace_all(&data, "$1<w:r><w:t>$2</w:t></w:r>")
        .into_owned();
    data = move_text_inside(&data, &RX_TEXT_BEFORE_RUN);
    data = move_text_inside(&data, &RX_TEXT_BEFORE_LINK);

    data = RX_EMPTY_RUN.replace_all(&data, "").into_owned();
    data = RX_TF_TEXT.replace_all(&data, "").into_owned();
    // Word ignores leading/trailing whitespace unless told not to.
    data = RX_WT_OPEN
        .replace_all(&data, "<w:t xml:space=\"preserve\"$1")
        .into_owned();

    fs::write(state.path("injected.xml"), &data)?;

    let docname = state
        .info("docx-document-main")?
        .unwrap_or_else(|| "word/document.xml".to_string());
    let path = state.path("injected.docx");
    super::repack_zip(
        &state.path("original"),
        &path,
        &[(docname, data.into_bytes())],
    )?;
    Ok(path)
}

/// Move loose text preceding a run (or hyperlink) inside its first `<w:t>`.
/// The loose prefix extends back to the previous tag end.
pub(crate) fn move_text_inside(data: &str, rx: &Regex) -> String {
    let mut out = String::with_capacity(data.len());
    let mut last = 0;
    for caps in rx.captures_iter(data) {
        let g1 = caps.get(1).unwrap();
        let g2 = caps.get(2).unwrap();
        let mut pb = g1.start();
        while pb > 0 && data.as_bytes()[pb - 1] != b'>' {
            pb -= 1;
        }
        if pb < last {
            // Overlapping with an earlier rewrite; leave this one in place.
            out.push_str(&data[last..g2.end()]);
            last = g2.end();
            continue;
        }
        out.push_str(&data[last..pb]);
        out.push_str(g2.as_str());
        out.push_str(&data[pb..g2.start()]);
        last = g2.end();
    }
    out.push_str(&data[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::io::Write;

    fn make_docx(dir: &std::path::Path, document: &str) -> std::path::PathBuf {
        let path = dir.join("original");
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("[Content_Types].xml", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(b"<Types/>").unwrap();
        zip.start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        zip.finish().unwrap();
        path
    }

    fn state_for(dir: &std::path::Path) -> State {
        let mut settings = Settings::new();
        settings.config = tf_config::load().unwrap();
        State::open(dir, settings, false).unwrap()
    }

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>plain </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r></w:p></w:body></w:document>"#;

    #[test]
    fn runs_merge_into_tf_text() {
        let dir = tempfile::tempdir().unwrap();
        make_docx(dir.path(), DOC);
        let mut state = state_for(dir.path());
        let doc = extract(&mut state).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        assert!(styled.contains("<tf-text>"), "styled: {styled}");
        assert!(!styled.contains("<w:r>"), "styled: {styled}");
        assert!(styled.contains("plain"));
        assert!(styled.contains("bold"));
        // Formatting went into the store, typed by run formatting.
        let open = format!("{}text:", markers::INL_OPEN_B);
        let bold = format!("{}b:", markers::INL_OPEN_B);
        assert!(styled.contains(&open) || styled.contains(&bold), "styled: {styled}");
        drop(doc);
    }

    #[test]
    fn main_document_name_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        make_docx(dir.path(), DOC);
        let mut state = state_for(dir.path());
        extract(&mut state).unwrap();
        assert_eq!(
            state.info("docx-document-main").unwrap().as_deref(),
            Some("word/document.xml")
        );
    }

    #[test]
    fn isolate_tabs_splits_runs() {
        let data = "<w:r><w:rPr><w:b/></w:rPr><w:tab/><w:t>x</w:t></w:r>";
        let out = isolate_tabs(data);
        assert_eq!(
            out,
            "<w:r><w:rPr><w:b/></w:rPr><w:tab/></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>x</w:t></w:r>"
        );
    }

    #[test]
    fn inject_wraps_stray_text() {
        let data = "<w:p><w:r><w:t>a</w:t></w:r>stray</w:p>";
        let out = RX_TEXT_AFTER_RUN
            .replace_all(data, "$1<w:r><w:t>$2</w:t></w:r>")
            .into_owned();
        assert_eq!(
            out,
            "<w:p><w:r><w:t>a</w:t></w:r><w:r><w:t>stray</w:t></w:r></w:p>"
        );
    }

    #[test]
    fn inject_moves_leading_text_into_run() {
        let data = "<w:p>lead<w:r><w:t>body</w:t></w:r></w:p>";
        let out = move_text_inside(data, &RX_TEXT_BEFORE_RUN);
        assert_eq!(out, "<w:p><w:r><w:t>leadbody</w:t></w:r></w:p>");
    }

    #[test]
    fn preserve_space_is_added() {
        let data = "<w:t>x</w:t><w:t xml:lang=\"en\">y</w:t>";
        let out = RX_WT_OPEN
            .replace_all(data, "<w:t xml:space=\"preserve\"$1")
            .into_owned();
        assert!(out.starts_with("<w:t xml:space=\"preserve\">x"));
        assert!(out.contains("<w:t xml:space=\"preserve\" xml:lang=\"en\">y"));
    }
}
