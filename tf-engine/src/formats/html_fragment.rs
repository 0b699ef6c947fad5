//! XHTML-fragment adapter: wrap loose markup in a synthetic document, let
//! the HTML adapter do the work, and strip the wrapper on the way out.

use crate::dom::Dom;
use crate::state::State;
use crate::{Document, Result};
use std::fs;
use std::path::PathBuf;

pub fn extract(state: &mut State) -> Result<Document> {
    let data = super::load_original(state)?;
    let wrapped = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"></head><body>{data}</body></html>"
    );
    super::html::extract(state, Some(wrapped))
}

pub fn inject(state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    let html_path = super::html::write_html(state, dom, "injected.html")?;
    let mut fragment = fs::read_to_string(html_path)?;

    if let Some(e) = fragment.find("</body>") {
        fragment.truncate(e);
    }
    if let Some(b) = fragment.find("<body>") {
        fragment.replace_range(..b + 6, "");
    }

    let path = state.path("injected.fragment");
    fs::write(&path, &fragment)?;
    Ok(path)
}
