//! Format adapters.
//!
//! Each adapter owns the format-specific halves of the pipeline: unpack and
//! pre-process on extract (archive payloads, run merging, charset quirks,
//! tag-set configuration), and post-process and repack on inject. Dispatch is
//! static over the format name stored in the state.

mod docx;
mod html;
mod html_fragment;
mod odt;
mod pptx;
mod tei;
mod text;

use crate::dom::Dom;
use crate::state::State;
use crate::{Document, Error, Result};
use std::fs;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Known format names, as accepted by `--format`.
pub const FORMATS: [&str; 9] = [
    "text",
    "line",
    "html",
    "html-fragment",
    "tei",
    "odt",
    "odp",
    "docx",
    "pptx",
];

/// Parse and pre-process `original` for the given format.
pub fn extract(format: &str, state: &mut State) -> Result<Document> {
    match format {
        "docx" => docx::extract(state),
        "pptx" => pptx::extract(state),
        "odt" | "odp" => odt::extract(state),
        "html" => html::extract(state, None),
        "html-fragment" => html_fragment::extract(state),
        "tei" => tei::extract(state),
        "text" => text::extract(state, false),
        "line" => text::extract(state, true),
        other => Err(Error::FormatUnknown(other.to_string())),
    }
}

/// Serialize, post-process, and repack the injected tree. Returns the path of
/// the final artifact inside the work dir.
pub fn inject(format: &str, state: &mut State, dom: &mut Dom) -> Result<PathBuf> {
    match format {
        "docx" => docx::inject(state, dom),
        "pptx" => pptx::inject(state, dom),
        "odt" | "odp" => odt::inject(state, dom),
        "html" => html::inject(state, dom),
        "html-fragment" => html_fragment::inject(state, dom),
        "tei" => tei::inject(state, dom),
        "text" => text::inject(state, dom, false),
        "line" => text::inject(state, dom, true),
        other => Err(Error::FormatUnknown(other.to_string())),
    }
}

/// Auto-detect the input format from the extension, the archive layout, or
/// the content of `<work_dir>/original`.
pub fn detect(work_dir: &Path, input: &Path) -> Result<String> {
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "docx" => return Ok("docx".into()),
        "pptx" => return Ok("pptx".into()),
        "odt" => return Ok("odt".into()),
        "odp" => return Ok("odp".into()),
        "xml" => return Ok("tei".into()),
        "html" | "htm" => return Ok("html".into()),
        "text" | "txt" => return Ok("text".into()),
        _ => {}
    }

    let original = work_dir.join("original");
    let bytes = fs::read(&original)?;
    if is_zip(&bytes) {
        let mut zip = zip::ZipArchive::new(File::open(&original)?)?;
        if zip.by_name("word/document.xml").is_ok() {
            return Ok("docx".into());
        }
        if zip.by_name("ppt/slides/slide1.xml").is_ok() {
            return Ok("pptx".into());
        }
        if zip.by_name("[Content_Types].xml").is_ok() {
            return Ok("docx".into());
        }
        if zip.by_name("content.xml").is_ok() {
            // ODP and ODT share a layout; the adapter treats them alike.
            return Ok("odt".into());
        }
        return Err(Error::FormatUnknown(input.display().to_string()));
    }

    let text = String::from_utf8_lossy(&bytes).to_lowercase();
    if text.contains("</html>") {
        return Ok("html".into());
    }
    if text.contains("</tei>") {
        return Ok("tei".into());
    }
    const INLINE_CLOSERS: [&str; 11] = [
        "</b>", "</a>", "</i>", "</span>", "</p>", "</u>", "</strong>", "</em>", "</s>", "</q>",
        "</font>",
    ];
    if INLINE_CLOSERS.iter().any(|c| text.contains(c)) {
        return Ok("html-fragment".into());
    }
    Ok("text".into())
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && bytes[0] == b'P'
        && bytes[1] == b'K'
        && matches!(
            (bytes[2], bytes[3]),
            (0x03, 0x04) | (0x05, 0x06) | (0x07, 0x08)
        )
}

/// Load and charset-decode the `original` file.
///
/// BOMs win; otherwise a `charset=` label in the head of the file is
/// honored, and UTF-8 is the fallback.
pub(crate) fn load_original(state: &State) -> Result<String> {
    let bytes = fs::read(state.path("original"))
        .map_err(|e| Error::InputMissing(format!("{}: {e}", state.path("original").display())))?;
    Ok(decode(&bytes))
}

pub(crate) fn decode(bytes: &[u8]) -> String {
    if let Some((encoding, _)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(2048)]).to_lowercase();
    if let Some(pos) = head.find("charset=") {
        let label: String = head[pos + 8..]
            .trim_start_matches(['"', '\''])
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Read one member of a ZIP archive as bytes.
pub(crate) fn zip_member(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut zip = zip::ZipArchive::new(File::open(path)?)?;
    let mut file = match zip.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// Copy `src` to `dst` with the named members replaced.
///
/// Archives are repacked, not patched in place; only the textual payload is
/// preserved byte-faithfully.
pub(crate) fn repack_zip(
    src: &Path,
    dst: &Path,
    replacements: &[(String, Vec<u8>)],
) -> Result<()> {
    let mut zin = zip::ZipArchive::new(File::open(src)?)?;
    let mut zout = zip::ZipWriter::new(File::create(dst)?);
    for i in 0..zin.len() {
        let entry = zin.by_index_raw(i)?;
        if replacements.iter().any(|(name, _)| name == entry.name()) {
            continue;
        }
        zout.raw_copy_file(entry)?;
    }
    for (name, content) in replacements {
        zout.start_file(name.as_str(), zip::write::FileOptions::default())?;
        zout.write_all(content)?;
    }
    zout.finish()?;
    Ok(())
}
