//! Injection driver: splice translated blocks back into the stored content,
//! rehydrate markup from the style store, restore whitespace, repack.

use crate::cleanup::cleanup_styles;
use crate::dom::{escape_xml_into, parse_xml};
use crate::formats;
use crate::markers;
use crate::spaces::restore_spaces;
use crate::state::State;
use crate::stream::{StreamCodec, StreamKind};
use crate::{Error, Result, Settings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;

static RX_INLINES: Lazy<Regex> = Lazy::new(|| {
    Regex::new("\u{E011}([^\u{E012}]+)\u{E012}([^\u{E011}-\u{E013}]*)\u{E013}").unwrap()
});

static RX_PROTS: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E020}([^\u{E021}]+?):([^\u{E021}:]+)\u{E021}").unwrap());

const MAX_REHYDRATE_ROUNDS: usize = 100;

/// Run an injection from `input`. Returns the work directory and the path of
/// the final artifact produced by the format adapter.
pub fn inject(settings: Settings, input: &mut dyn BufRead) -> Result<(PathBuf, PathBuf)> {
    let mut header = String::new();
    input.read_line(&mut header)?;

    let kind = match settings.stream {
        StreamKind::Detect => {
            if header.contains("[transfuse:") {
                StreamKind::Apertium
            } else if header.contains("<STREAMCMD:TRANSFUSE:") {
                StreamKind::Visl
            } else {
                return Err(Error::StreamFormatUnknown);
            }
        }
        kind => kind,
    };
    let mut codec = StreamCodec::new(kind, settings.apertium_n);

    let work_dir = settings
        .work_dir
        .clone()
        .or_else(|| codec.work_dir_from_header(&header))
        .ok_or_else(|| {
            Error::WorkDirUnavailable("no state folder in the stream header".to_string())
        })?;
    for file in ["original", "content.xml", crate::state::STORE_FILE] {
        if !work_dir.join(file).exists() {
            return Err(Error::StateMissing(work_dir));
        }
    }

    let mut content = fs::read_to_string(work_dir.join("content.xml"))?;
    let mut state = State::open(&work_dir, settings, true)?;

    splice_blocks(&mut content, &mut codec, input, &state)?;
    strip_stray_markers(&mut content, markers::BLK_OPEN_B, markers::BLK_OPEN_E);
    strip_stray_markers(&mut content, markers::BLK_CLOSE_B, markers::BLK_CLOSE_E);

    cleanup_styles(&mut content, !state.settings.no_extend);
    rehydrate(&mut content, &mut state)?;

    let mut dom =
        parse_xml(&content).map_err(|e| Error::RehydratedMalformed(e.to_string()))?;
    restore_spaces(&mut dom, &Default::default());

    let format = state
        .format()?
        .ok_or_else(|| Error::StateMissing(work_dir.clone()))?;
    let artifact = formats::inject(&format, &mut state, &mut dom)?;
    crate::settings::run_inject_hook(&state.settings, &artifact)?;

    Ok((work_dir, artifact))
}

/// Read every stream block and splice it over its boundary-marked span,
/// searching forward from a running cursor (blocks arrive in document order).
fn splice_blocks(
    content: &mut String,
    codec: &mut StreamCodec,
    input: &mut dyn BufRead,
    state: &State,
) -> Result<()> {
    let cg = codec.kind() == StreamKind::Cg;
    let mut cursor = 0usize;
    while let Some((id, mut body)) = codec.read_block(input)? {
        if id.is_empty() {
            continue;
        }
        if !state.settings.inject_raw {
            if !cg {
                reduce_ws(&mut body);
            }
            let mut escaped = String::with_capacity(body.len());
            escape_xml_into(&mut escaped, &body, cg);
            body = escaped;
        }

        let open = format!("{}{}{}", markers::BLK_OPEN_B, id, markers::BLK_OPEN_E);
        let close = format!("{}{}{}", markers::BLK_CLOSE_B, id, markers::BLK_CLOSE_E);
        let found = content[cursor..].find(&open).and_then(|rel| {
            let b = cursor + rel;
            content[b + open.len()..]
                .find(&close)
                .map(|crel| (b, b + open.len() + crel + close.len()))
        });
        match found {
            Some((b, e)) => {
                content.replace_range(b..e, &body);
                cursor = b + body.len();
            }
            None => {
                log::warn!("Block {id} did not exist in this document or was out-of-order.");
            }
        }
    }
    Ok(())
}

/// Drop marker/id pairs whose blocks never arrived; the original body text
/// between them stays in place.
fn strip_stray_markers(content: &mut String, open: char, close: char) {
    while let Some(b) = content.find(open) {
        match content[b..].find(close) {
            Some(rel) => {
                content.replace_range(b..b + rel + close.len_utf8(), "");
            }
            None => {
                content.replace_range(b..b + open.len_utf8(), "");
            }
        }
    }
}

/// Streams collapse whitespace runs at block edges to at most one space.
fn reduce_ws(s: &mut String) {
    let is_sp = |c: char| matches!(c, ' ' | '\t' | '\r' | '\n');

    let mut had_space = false;
    while s.ends_with(is_sp) {
        if s.ends_with(' ') {
            had_space = true;
        }
        s.pop();
    }
    if had_space {
        s.push(' ');
    }

    let mut head = 0;
    let mut had_space = false;
    for c in s.chars() {
        if !is_sp(c) {
            break;
        }
        if c == ' ' {
            had_space = true;
        }
        head += c.len_utf8();
    }
    s.replace_range(..head, if had_space { " " } else { "" });
}

/// Replace inline spans and protected references with their stored markup,
/// iterated to a fixed point so nested spans converge.
fn rehydrate(content: &mut String, state: &mut State) -> Result<()> {
    for _ in 0..MAX_REHYDRATE_ROUNDS {
        let mut did = false;
        did |= rehydrate_inlines(content, state)?;
        did |= rehydrate_prots(content, state)?;
        if !did {
            return Ok(());
        }
    }
    log::warn!("Inline rehydration did not converge, proceeding");
    Ok(())
}

fn rehydrate_inlines(content: &mut String, state: &mut State) -> Result<bool> {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    let mut did = false;
    while let Some(caps) = RX_INLINES.captures_at(content, last) {
        let m = caps.get(0).unwrap();
        out.push_str(&content[last..m.start()]);
        last = m.end();
        did = true;

        let tagspec = caps.get(1).unwrap().as_str();
        let body = caps.get(2).unwrap().as_str();
        let mut closes = String::new();
        let mut drop_body = false;
        for part in tagspec.split(';') {
            let part = markers::trim_tagspec(part);
            if part.is_empty() {
                continue;
            }
            let (tag, hash) = part.split_once(':').unwrap_or((part, ""));
            match state.style(tag, hash)?.cloned() {
                Some(rec) => {
                    out.push_str(&rec.otag);
                    // Closing tags nest in reverse order of the opens.
                    closes.insert_str(0, &rec.ctag);
                    if rec.flags.contains('P') {
                        drop_body = true;
                    }
                }
                None => {
                    log::warn!("Inline tag {part} did not exist in this document.");
                }
            }
        }
        if !drop_body {
            out.push_str(body);
        }
        out.push_str(&closes);
    }
    if did {
        out.push_str(&content[last..]);
        *content = out;
    }
    Ok(did)
}

fn rehydrate_prots(content: &mut String, state: &mut State) -> Result<bool> {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    let mut did = false;
    while let Some(caps) = RX_PROTS.captures_at(content, last) {
        let m = caps.get(0).unwrap();
        out.push_str(&content[last..m.start()]);
        last = m.end();
        did = true;

        let tag = caps.get(1).unwrap().as_str();
        let hash = caps.get(2).unwrap().as_str();
        match state.style(tag, hash)?.cloned() {
            Some(rec) => {
                out.push_str(&rec.otag);
                out.push_str(&rec.ctag);
            }
            None => {
                log::warn!("Protected inline tag {tag}:{hash} did not exist in this document.");
            }
        }
    }
    if did {
        out.push_str(&content[last..]);
        *content = out;
    }
    Ok(did)
}
