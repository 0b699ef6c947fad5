//! OOXML presentation adapter.
//!
//! All slides are concatenated under one synthetic `<tf-slides>` root so the
//! pipeline sees a single document; injection splits the `<p:sld>` elements
//! back into per-slide archive members. Run merging mirrors the
//! word-processing adapter, with formatting read from `b="1"`/`i="1"`
//! attributes and `<a:hlinkClick>` children.

use crate::dom::{parse_xml, Dom, SerializeOptions};
use crate::markers;
use crate::spaces::save_spaces;
use crate::state::State;
use crate::{cleanup, Document, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

static RX_SLIDE_LANG: Lazy<Regex> = Lazy::new(|| Regex::new(r#" lang="[^"]*""#).unwrap());
static RX_T_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</a:t>[^<>]+?<a:t( [^>]*)?>").unwrap());

static RX_TEXT_AFTER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(</a:t></a:r>)([^<>]+)").unwrap());
static RX_TEXT_BEFORE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^<>]+)(<a:r( [^>]*)?>(?s:.*?)<a:t( [^>]*)?>)").unwrap());
static RX_EMPTY_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<a:r><a:t/></a:r>").unwrap());
static RX_TF_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?tf-text>").unwrap());

pub fn extract(state: &mut State) -> Result<Document> {
    let original = state.path("original");

    let mut data = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tf-slides>");
    for i in 1.. {
        let name = format!("ppt/slides/slide{i}.xml");
        let Some(slide) = super::zip_member(&original, &name)? else {
            break;
        };
        if slide.is_empty() {
            return Err(Error::Archive(format!("Empty pptx slide {name}")));
        }
        let slide = String::from_utf8_lossy(&slide);
        // Drop each slide's XML declaration; the synthetic root has one.
        match slide.find("?>") {
            Some(pos) => data.push_str(slide[pos + 2..].trim_start_matches(['\r', '\n'])),
            None => data.push_str(&slide),
        }
    }
    data.push_str("</tf-slides>");

    data = RX_SLIDE_LANG.replace_all(&data, "").into_owned();
    data = data.replace("<a:rPr/>", "");
    data = RX_T_JOIN.replace_all(&data, "").into_owned();

    let mut dom = parse_xml(&data)?;
    drop(data);

    merge_runs(state, &mut dom)?;

    let tags = state.settings.tag_sets("pptx");
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

/// Merge each paragraph's `<a:t>` runs into `<tf-text>` wrappers. Formatting
/// lives in run-property attributes and hyperlink children, so the style
/// type is read off the serialized run.
fn merge_runs(state: &mut State, dom: &mut Dom) -> Result<()> {
    state.begin()?;

    for p in dom.descendants_named(dom.root(), "a:p") {
        let ts = dom.descendants_named(p, "a:t");
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
            let has_a = serialized.contains("a:hlinkClick");
            let has_b = serialized.contains(" b=\"1\"");
            let has_i = serialized.contains(" i=\"1\"");
            let style_type = match (has_a, has_b, has_i) {
                (true, true, true) => "a+b+i",
                (false, true, true) => "b+i",
                (true, true, false) => "a+b",
                (true, false, true) => "a+i",
                (true, false, false) => "a",
                (false, true, false) => "b",
                (false, false, true) => "i",
                (false, false, false) => "text",
            };
            let span = super::docx::store_split_style(state, style_type, &serialized, &content)?;
            super::docx::attach_to_tf_text(dom, run, span);
            dom.unlink(run);
        }
    }

    state.commit()
}

pub fn inject(state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    let mut data = dom.serialize(&SerializeOptions {
        xml_decl: true,
        strip_tf: true,
        ..Default::default()
    });

    // Slides can't have text outside a:t; move strays inside the runs.
    data = RX_TEXT_AFTER_RUN.replace_all(&data, "$2$1").into_owned();
    data = RX_TEXT_BEFORE_RUN.replace_all(&data, "$2$1").into_owned();
    data = RX_EMPTY_RUN.replace_all(&data, "").into_owned();
    data = RX_TF_TEXT.replace_all(&data, "").into_owned();

    fs::write(state.path("injected.xml"), &data)?;

    // Split the synthetic root back into one file per slide.
    let mut replacements = Vec::new();
    let mut cursor = 0;
    let mut index = 0;
    while let Some(rel) = data[cursor..].find("<p:sld ") {
        let b = cursor + rel;
        let Some(erel) = data[b..].find("</p:sld>") else {
            break;
        };
        let e = b + erel + "</p:sld>".len();
        index += 1;
        let mut slide =
            String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        slide.push_str(&data[b..e]);
        replacements.push((format!("ppt/slides/slide{index}.xml"), slide.into_bytes()));
        cursor = e;
    }

    let path = state.path("injected.pptx");
    super::repack_zip(&state.path("original"), &path, &replacements)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use std::io::Write;

    const SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:txBody><a:p><a:r><a:rPr lang="en-US" b="1"/><a:t>Bold</a:t></a:r><a:r><a:t> tail</a:t></a:r></a:p></p:txBody></p:sld>"#;

    fn make_pptx(dir: &std::path::Path) {
        let file = fs::File::create(dir.join("original")).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("ppt/slides/slide1.xml", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(SLIDE.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn slides_concatenate_and_runs_merge() {
        let dir = tempfile::tempdir().unwrap();
        make_pptx(dir.path());
        let mut settings = Settings::new();
        settings.config = tf_config::load().unwrap();
        let mut state = State::open(dir.path(), settings, false).unwrap();
        extract(&mut state).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        assert!(styled.contains("<tf-slides>"));
        assert!(styled.contains("<tf-text>"), "styled: {styled}");
        assert!(styled.contains("Bold"));
        assert!(styled.contains("tail"));
        // The bold run was typed `b`.
        assert!(styled.contains(&format!("{}b:", markers::INL_OPEN_B)), "styled: {styled}");
    }

    #[test]
    fn inject_moves_text_into_runs() {
        let data = "<a:p><a:r><a:t>a</a:t></a:r>stray</a:p>";
        let out = RX_TEXT_AFTER_RUN.replace_all(data, "$2$1").into_owned();
        assert_eq!(out, "<a:p><a:r><a:t>astray</a:t></a:r></a:p>");
        let data = "<a:p>lead<a:r><a:t>b</a:t></a:r></a:p>";
        let out = RX_TEXT_BEFORE_RUN.replace_all(data, "$2$1").into_owned();
        assert_eq!(out, "<a:p><a:r><a:t>leadb</a:t></a:r></a:p>");
    }
}
