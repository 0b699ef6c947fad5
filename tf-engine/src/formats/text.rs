//! Plain-text adapter: escape, split into paragraphs, and ride the HTML
//! pipeline. `line` mode treats every newline as a paragraph break; plain
//! mode keeps single newlines as `<br>` line breaks inside one paragraph.

use crate::dom::Dom;
use crate::state::State;
use crate::{Document, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

// A blank-ish line (possibly several) separates paragraphs.
static RX_MULTILINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[\s\p{Zs}]*(\n[\s\p{Zs}]*)+").unwrap());

pub fn extract(state: &mut State, by_line: bool) -> Result<Document> {
    let data = super::load_original(state)?;
    let mut data = data
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;");

    data = RX_MULTILINE.replace_all(&data, "</p><p>").into_owned();
    if by_line {
        data = data.replace('\n', "</p><p>");
    } else {
        data = data.replace('\n', "<br>\n");
    }
    data = data.replace("</p><p>", "</p>\n<p>");

    let wrapped = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"></head><body><p>{data}</p></body></html>"
    );
    super::html::extract(state, Some(wrapped))
}

pub fn inject(state: &mut State, dom: &mut Dom, by_line: bool) -> Result<PathBuf> {
    let html_path = super::html::write_html(state, dom, "injected.html")?;
    let mut txt = fs::read_to_string(html_path)?;

    if let Some(e) = txt.find("</p></body>") {
        txt.truncate(e);
    }
    if let Some(b) = txt.find("<body><p>") {
        txt.replace_range(..b + 9, "");
    }

    txt = txt.replace("<p>", "").replace("<br>", "");
    txt = txt.replace("</p>", if by_line { "" } else { "\n" });
    txt = txt
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let path = state.path("injected.txt");
    fs::write(&path, &txt)?;
    Ok(path)
}
