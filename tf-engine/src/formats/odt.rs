//! OpenDocument text/presentation adapter.
//!
//! The translatable payload is the archive's `content.xml`. Locale and
//! revision chaff is stripped before parsing, and automatic styles that are
//! identical except for their generated name are deduplicated so the style
//! factor sees one hash per real style.

use crate::dom::{parse_xml, Dom, SerializeOptions};
use crate::spaces::save_spaces;
use crate::state::State;
use crate::stream::StreamCodec;
use crate::styles::save_styles;
use crate::{Document, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

static RX_CHAFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#" (fo:language|style:language-complex|style:language-asian|fo:country|style:country-complex|style:country-asian|officeooo:paragraph-rsid|officeooo:rsid)="[^"]+""#,
    )
    .unwrap()
});

static RX_STYLES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(<style:style style:name=")([^"]+)(".+?</style:style>)"#).unwrap());

pub fn extract(state: &mut State) -> Result<Document> {
    let bytes = super::zip_member(&state.path("original"), "content.xml")?
        .ok_or_else(|| Error::Archive("ODT/ODP did not have content.xml".to_string()))?;
    if bytes.is_empty() {
        return Err(Error::Archive("ODT/ODP content.xml was empty".to_string()));
    }
    let mut data = String::from_utf8_lossy(&bytes).into_owned();

    data = RX_CHAFF.replace_all(&data, "").into_owned();
    data = data.replace("<style:text-properties/>", "");
    data = dedupe_styles(&data);

    let mut dom = parse_xml(&data)?;
    drop(data);

    let tags = state.settings.tag_sets("odt");
    save_spaces(&mut dom, &tags);

    let codec = StreamCodec::new(state.settings.stream, state.settings.apertium_n);
    let styled = save_styles(&dom, &tags, state, &codec, true, !state.settings.no_extend)?;
    fs::write(state.path("styled.xml"), &styled)?;
    let dom = parse_xml(&styled)?;

    Ok(Document::new(dom, tags))
}

/// Collapse automatic styles that differ only in their generated name, and
/// remap `text:style-name` references onto the surviving one.
fn dedupe_styles(data: &str) -> String {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut normed = data.to_string();
    for caps in RX_STYLES.captures_iter(data) {
        let key = format!("{}{}", &caps[1], &caps[3]);
        let name = caps[2].to_string();
        match seen.get(&key) {
            Some(existing) => {
                normed = normed.replace(&caps[0], "");
                let from = format!(" text:style-name=\"{name}\"");
                let to = format!(" text:style-name=\"{existing}\"");
                normed = normed.replace(&from, &to);
            }
            None => {
                seen.insert(key, name);
            }
        }
    }
    normed
}

pub fn inject(state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    let data = dom.serialize(&SerializeOptions {
        xml_decl: true,
        strip_tf: true,
        ..Default::default()
    });
    fs::write(state.path("injected.xml"), &data)?;

    let path = state.path("injected.odt");
    super::repack_zip(
        &state.path("original"),
        &path,
        &[("content.xml".to_string(), data.into_bytes())],
    )?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_identical_styles() {
        let data = r#"<office:automatic-styles><style:style style:name="T1"><style:text-properties fo:font-weight="bold"/></style:style><style:style style:name="T2"><style:text-properties fo:font-weight="bold"/></style:style></office:automatic-styles><text:p><text:span text:style-name="T1">a</text:span><text:span text:style-name="T2">b</text:span></text:p>"#;
        let out = dedupe_styles(data);
        assert!(!out.contains("style:name=\"T2\""));
        assert!(!out.contains("text:style-name=\"T2\""));
        assert_eq!(out.matches("text:style-name=\"T1\"").count(), 2);
    }

    #[test]
    fn keeps_distinct_styles() {
        let data = r#"<style:style style:name="T1"><style:text-properties fo:font-weight="bold"/></style:style><style:style style:name="T2"><style:text-properties fo:font-style="italic"/></style:style>"#;
        let out = dedupe_styles(data);
        assert!(out.contains("style:name=\"T1\""));
        assert!(out.contains("style:name=\"T2\""));
    }

    #[test]
    fn chaff_is_removed() {
        let data = r#"<text:p fo:language="en" officeooo:rsid="00c5c356">x</text:p>"#;
        let out = RX_CHAFF.replace_all(data, "").into_owned();
        assert_eq!(out, "<text:p>x</text:p>");
    }
}
