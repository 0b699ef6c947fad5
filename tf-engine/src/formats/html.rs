//! HTML adapter.
//!
//! Pre-processing happens on the raw text before the tree builder sees it:
//! the declared charset is swapped for a placeholder codepoint so injection
//! can restore it after everything has become UTF-8, `<script>`/`<style>`
//! bodies are stored as unique fragments (their content would otherwise
//! confuse both the XML layer and the translator), soft hyphens are
//! scrubbed, and `<sub>`/`<sup>` get recorded synthetic spacing so tokens
//! do not fuse.

use crate::dom::{parse_html, parse_xml, SerializeOptions};
use crate::markers;
use crate::spaces::save_spaces;
use crate::state::State;
use crate::stream::StreamCodec;
use crate::styles::save_styles;
use crate::{Document, Dom, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;

static RX_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)charset\s*=(["']?)\s*([-\w\d]+)\s*(["']?)"#).unwrap());

static RX_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^<>]*>(.*?)</script[^<>]*>").unwrap());
static RX_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^<>]*>(.*?)</style[^<>]*>").unwrap());

// Soft hyphens in all the forms they take on real pages.
static RX_SHY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(<wbr\s*/?>)|(\x{00AD})|(&shy;)|(&#173;)|(&#x0*ad;)").unwrap());

static RX_SUBP_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([^>\s])(<su[bp])( |>)").unwrap());
static RX_SUB_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<sub( |>)(.*?)(</sub>)([^<\s])").unwrap());
static RX_SUP_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<sup( |>)(.*?)(</sup>)([^<\s])").unwrap());

/// Extract from HTML. `data` carries pre-wrapped text when another adapter
/// (fragment, plain text) delegates here.
pub fn extract(state: &mut State, data: Option<String>) -> Result<Document> {
    let mut data = match data {
        Some(d) => d,
        None => {
            let d = super::load_original(state)?;
            // Without a closing tag this cannot be a full document.
            if !d.to_lowercase().contains("</html>") {
                state.set_format("html-fragment")?;
                return super::html_fragment::extract(state);
            }
            d
        }
    };

    // Park the declared charset behind a placeholder; everything is UTF-8
    // from here on and injection puts the real name back.
    if let Some(caps) = RX_CHARSET.captures(&data) {
        let replacement = format!(
            "charset={}{}{}",
            &caps[1],
            markers::XML_ENC_PLACEHOLDER,
            &caps[3]
        );
        let range = caps.get(0).unwrap().range();
        data.replace_range(range, &replacement);
    }

    store_unique(&mut data, &RX_SCRIPT, state)?;
    store_unique(&mut data, &RX_STYLE, state)?;

    data = RX_SHY.replace_all(&data, "").into_owned();

    // Space out sub/sup so neighboring tokens stay separable, and leave a
    // record so injection can take the spaces back out.
    data = RX_SUBP_OPEN
        .replace_all(&data, "$1 $2 tf-added-before=\"1\"$3")
        .into_owned();
    for (rx, tag) in [(&*RX_SUB_CLOSE, "sub"), (&*RX_SUP_CLOSE, "sup")] {
        data = rx
            .replace_all(&data, format!("<{tag} tf-added-after=\"1\"$1$2$3 $4"))
            .into_owned();
    }

    let mut dom = parse_html(&data)?;
    drop(data);

    let tags = state.settings.tag_sets("html");
    save_spaces(&mut dom, &tags);

    let codec = StreamCodec::new(state.settings.stream, state.settings.apertium_n);
    let styled = save_styles(&dom, &tags, state, &codec, true, !state.settings.no_extend)?;
    fs::write(state.path("styled.xml"), &styled)?;
    let dom = parse_xml(&styled)?;

    Ok(Document::new(dom, tags))
}

/// Store `<script>`/`<style>` bodies as unique `U` fragments and leave
/// `UNIQ_OPEN hash UNIQ_CLOSE` references in the text.
fn store_unique(data: &mut String, rx: &Regex, state: &State) -> Result<()> {
    // Collect first: replacements shrink the string.
    let matches: Vec<(std::ops::Range<usize>, String)> = rx
        .captures_iter(data)
        .filter_map(|caps| {
            let inner = caps.get(1).unwrap();
            if inner.is_empty() {
                None
            } else {
                Some((inner.range(), inner.as_str().to_string()))
            }
        })
        .collect();
    let mut out = String::with_capacity(data.len());
    let mut last = 0;
    for (range, content) in matches {
        let hash = state.save_style("U", &content, "", "")?;
        out.push_str(&data[last..range.start]);
        out.push(markers::UNIQ_OPEN);
        out.push_str(&hash);
        out.push(markers::UNIQ_CLOSE);
        last = range.end;
    }
    out.push_str(&data[last..]);
    *data = out;
    Ok(())
}

/// Serialize the injected tree as HTML and restore what extraction parked:
/// the declared charset, the doctype, and the unique fragments.
pub fn inject(state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    write_html(state, dom, "injected.html")
}

pub(crate) fn write_html(state: &mut State, dom: &Dom, filename: &str) -> Result<PathBuf> {
    let mut content = dom.serialize(&SerializeOptions {
        xml_decl: false,
        strip_tf: true,
        html: true,
    });

    content = content.replacen(markers::XML_ENC_PLACEHOLDER, "UTF-8", 1);

    let original = fs::read(state.path("original"))?;
    let first_line = String::from_utf8_lossy(&original)
        .lines()
        .next()
        .unwrap_or("")
        .to_lowercase();
    if first_line.contains("<!doctype") {
        content.insert_str(0, "<!DOCTYPE html>\n");
    }

    // Put unique fragments (script/style bodies) back from the store.
    while let Some(b) = content.find(markers::UNIQ_OPEN) {
        let Some(rel) = content[b..].find(markers::UNIQ_CLOSE) else {
            break;
        };
        let hash_start = b + markers::UNIQ_OPEN.len_utf8();
        let hash = content[hash_start..b + rel].to_string();
        let replacement = match state.style("U", &hash)?.cloned() {
            Some(rec) => format!("{}{}", rec.otag, rec.ctag),
            None => {
                log::warn!("Unique fragment U:{hash} did not exist in this document.");
                String::new()
            }
        };
        content.replace_range(b..b + rel + markers::UNIQ_CLOSE.len_utf8(), &replacement);
    }

    let path = state.path(filename);
    fs::write(&path, &content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn state_with(dir: &std::path::Path, html: &str) -> State {
        fs::write(dir.join("original"), html).unwrap();
        let mut settings = Settings::new();
        settings.config = tf_config::load().unwrap();
        State::open(dir, settings, false).unwrap()
    }

    #[test]
    fn charset_is_parked_and_scripts_stored() {
        let dir = tempfile::tempdir().unwrap();
        let html = "<html><head><meta charset=\"utf-8\"><script>if (1 < 2) {}</script></head>\
                    <body><p>text</p></body></html>";
        let mut state = state_with(dir.path(), html);
        let doc = extract(&mut state, None).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        assert!(styled.contains(markers::XML_ENC_PLACEHOLDER));
        assert!(!styled.contains("if (1 < 2)"));
        assert!(styled.contains(markers::UNIQ_OPEN));
        // The stored fragment resolves.
        let b = styled.find(markers::UNIQ_OPEN).unwrap() + markers::UNIQ_OPEN.len_utf8();
        let e = styled[b..].find(markers::UNIQ_CLOSE).unwrap() + b;
        let rec = state.style("U", &styled[b..e]).unwrap().cloned().unwrap();
        assert_eq!(rec.otag, "if (1 < 2) {}");
        drop(doc);
    }

    #[test]
    fn soft_hyphens_are_scrubbed() {
        let dir = tempfile::tempdir().unwrap();
        let html = "<html><body><p>hy&shy;phen a\u{00AD}b c<wbr>d &#173; &#xad;</p></body></html>";
        let mut state = state_with(dir.path(), html);
        extract(&mut state, None).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        assert!(styled.contains("hyphen"));
        assert!(styled.contains("ab c"));
        assert!(!styled.contains('\u{00AD}'));
    }

    #[test]
    fn sub_sup_get_recorded_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let html = "<html><body><p>E=mc<sup>2</sup>!</p></body></html>";
        let mut state = state_with(dir.path(), html);
        extract(&mut state, None).unwrap();
        let styled = fs::read_to_string(dir.path().join("styled.xml")).unwrap();
        // The sup was factored into a span whose stored fragment remembers
        // the synthetic spacing.
        let open = format!("{}sup:", markers::INL_OPEN_B);
        let b = styled.find(&open).expect("sup span") + open.len();
        let e = styled[b..].find(markers::INL_OPEN_E).unwrap() + b;
        let hash = styled[b..e].to_string();
        let rec = state.style("sup", &hash).unwrap().cloned().unwrap();
        assert!(rec.otag.contains("tf-added-before"), "otag: {}", rec.otag);
        assert!(rec.otag.contains("tf-added-after"), "otag: {}", rec.otag);
    }

    #[test]
    fn bare_fragment_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(dir.path(), "loose <b>bold</b> text");
        extract(&mut state, None).unwrap();
        assert_eq!(state.format().unwrap().as_deref(), Some("html-fragment"));
    }
}
