//! Apertium superblank stream dialect.
//!
//! Wire form: `[transfuse:<dir>]` prologue, `[tf-block:<id>]` block openers,
//! bodies with `[[t:…]]` / `[[/]]` inline spans and `[tf:…]` protected
//! references, `.[]` + NUL block terminators. Everything metadata lives in
//! brackets; body text backslash-escapes the Apertium meta characters.

use crate::markers;
use crate::state::State;
use crate::stream::Block;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{BufRead, ErrorKind, Read};
use std::path::{Path, PathBuf};

// Adjacent protected regions with only whitespace between them collapse into
// one region.
static RX_PROT_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E021}([\\s\\r\\n\\p{Z}]*)\u{E020}").unwrap());

static RX_PROTS: Lazy<Regex> = Lazy::new(|| Regex::new("(?s)\u{E020}(.*?)\u{E021}").unwrap());

// A protected region sitting at a block-tag edge stays literal markup.
static RX_BLOCK_START: Lazy<Regex> = Lazy::new(|| Regex::new(">[\\s\\p{Zs}]*$").unwrap());
static RX_BLOCK_END: Lazy<Regex> = Lazy::new(|| Regex::new("^[\\s\\p{Zs}]*<").unwrap());

/// The Apertium dialect. The reader keeps tag-spec state across bracketed
/// regions within one block.
pub struct ApertiumStream {
    /// Suppress the `.[]` terminator (`--apertium-n`).
    no_term: bool,
    wbs: Vec<String>,
}

fn escape_meta(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '^' | '$' | '[' | ']' | '{' | '}' | '/' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl ApertiumStream {
    pub fn new(no_term: bool) -> Self {
        ApertiumStream {
            no_term,
            wbs: Vec::new(),
        }
    }

    /// Store protected regions as `P` styles and leave opaque references,
    /// except where the region touches a block-tag boundary.
    pub fn protect_to_styles(&self, styled: &mut String, state: &State) -> Result<()> {
        if RX_PROT_JOIN.is_match(styled) {
            *styled = RX_PROT_JOIN.replace_all(styled, "$1").into_owned();
        }

        let mut ns = String::with_capacity(styled.len());
        let mut last = 0;
        while let Some(caps) = RX_PROTS.captures_at(styled, last) {
            let m = caps.get(0).unwrap();
            let content = caps.get(1).unwrap().as_str();
            ns.push_str(&styled[last..m.start()]);
            last = m.end();

            if RX_BLOCK_START.is_match(&ns) || RX_BLOCK_END.is_match(&styled[last..]) {
                // At a block-tag edge the protected markup can stay in place.
                ns.push_str(content);
                continue;
            }

            let hash = state.save_style("P", content, "", "")?;
            ns.push(markers::PROT_OPEN);
            ns.push_str("P:");
            ns.push_str(&hash);
            ns.push(markers::PROT_CLOSE);
        }
        ns.push_str(&styled[last..]);
        *styled = ns;
        Ok(())
    }

    pub fn stream_header(&self, out: &mut String, work_dir: &Path) {
        out.push_str("[transfuse:");
        escape_meta(out, &work_dir.to_string_lossy());
        out.push_str("]\n");
        out.push('\0');
    }

    pub fn block_open(&self, out: &mut String, id: &str) {
        out.push_str("\n[tf-block:");
        escape_meta(out, id);
        out.push_str("]\n\n");
    }

    pub fn block_body(&self, out: &mut String, body: &str) {
        let mut i = 0;
        while i < body.len() {
            let c = body[i..].chars().next().unwrap();
            match c {
                markers::INL_OPEN_B => {
                    let start = i + c.len_utf8();
                    let end = body[start..]
                        .find(markers::INL_OPEN_E)
                        .map(|p| start + p)
                        .unwrap_or(body.len());
                    out.push_str("[[");
                    let mut first = true;
                    for part in body[start..end].split(';').filter(|p| !p.is_empty()) {
                        if !first {
                            out.push(';');
                        }
                        out.push_str("t:");
                        out.push_str(part);
                        first = false;
                    }
                    out.push_str("]]");
                    i = if end < body.len() {
                        end + markers::INL_OPEN_E.len_utf8()
                    } else {
                        end
                    };
                }
                markers::INL_CLOSE => {
                    out.push_str("[[/]]");
                    i += c.len_utf8();
                }
                markers::PROT_OPEN => {
                    out.push_str("[tf:");
                    i += c.len_utf8();
                }
                markers::PROT_CLOSE => {
                    out.push(']');
                    i += c.len_utf8();
                }
                '^' | '$' | '[' | ']' | '{' | '}' | '/' | '\\' | '@' | '<' | '>' => {
                    out.push('\\');
                    out.push(c);
                    i += 1;
                }
                _ => {
                    out.push(c);
                    i += c.len_utf8();
                }
            }
        }
    }

    pub fn block_term_header(&self, out: &mut String) {
        out.push(markers::HEADER_TERM);
    }

    pub fn block_close(&self, out: &mut String, _id: &str) {
        if !self.no_term {
            out.push_str(".[]");
        }
        out.push('\n');
        out.push('\0');
    }

    pub fn work_dir_from_header(&self, line: &str) -> Option<PathBuf> {
        // Undo backslash escaping first.
        let mut unescaped = String::with_capacity(line.len());
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(n) = chars.next() {
                    unescaped.push(n);
                }
            } else {
                unescaped.push(c);
            }
        }
        let b = unescaped.find("[transfuse:")?;
        let e = unescaped[b..].find(']')? + b;
        Some(PathBuf::from(&unescaped[b + 11..e]))
    }

    /// Consume input until one block is recovered. Blocks are NUL-terminated;
    /// bracketed regions are superblanks carrying markup metadata.
    pub fn read_block(&mut self, input: &mut dyn BufRead) -> Result<Option<Block>> {
        let mut body: Vec<u8> = Vec::new();
        let mut block_id = String::new();
        let mut unesc: Vec<u8> = Vec::new();
        self.wbs.clear();

        let mut in_blank = false;
        let mut in_wblank = false;
        let mut read_any = false;

        loop {
            let Some(c) = next_byte(input)? else { break };
            read_any = true;

            if c == b'\\' {
                match next_byte(input)? {
                    Some(n) if in_blank => unesc.push(n),
                    Some(n) => body.push(n),
                    None => break,
                }
                continue;
            }
            if c == 0 {
                break;
            }

            if c == b'[' {
                if in_blank {
                    in_wblank = true;
                }
                in_blank = true;
            }
            if in_blank {
                unesc.push(c);
            } else {
                body.push(c);
            }

            if in_wblank && c == b']' {
                in_wblank = false;
            } else if in_blank && c == b']' {
                in_blank = false;
                self.end_blank(&unesc, &mut body, &mut block_id);
                unesc.clear();
            }
        }

        if !read_any {
            return Ok(None);
        }
        Ok(Some((
            block_id,
            String::from_utf8_lossy(&body).into_owned(),
        )))
    }

    fn end_blank(&mut self, unesc: &[u8], body: &mut Vec<u8>, block_id: &mut String) {
        if unesc.starts_with(b"[[/]]") {
            if !self.wbs.is_empty() {
                body.extend_from_slice(markers::s::INL_CLOSE.as_bytes());
            }
            return;
        }
        if unesc.starts_with(b"[[") {
            self.wbs.clear();
            let inner = String::from_utf8_lossy(&unesc[2..unesc.len() - 2]).into_owned();
            for part in inner.split(';') {
                let part = markers::trim_tagspec(part);
                // Deduplicate, and discard non-markup data.
                if let Some(tag) = part.strip_prefix("t:") {
                    if !self.wbs.iter().any(|w| w == tag) {
                        self.wbs.push(tag.to_string());
                    }
                }
            }
            if !self.wbs.is_empty() {
                body.extend_from_slice(markers::s::INL_OPEN_B.as_bytes());
                for tag in &self.wbs {
                    body.extend_from_slice(tag.as_bytes());
                    body.push(b';');
                }
                body.extend_from_slice(markers::s::INL_OPEN_E.as_bytes());
            }
            return;
        }

        let text = String::from_utf8_lossy(unesc).into_owned();
        if let Some(b) = text.find("[tf-block:") {
            if let Some(e) = text[b..].find(']') {
                *block_id = text[b + 10..b + e].to_string();
                return;
            }
        }
        if let Some(b) = text.find("[tf:") {
            if let Some(e) = text[b..].find(']') {
                body.extend_from_slice(markers::s::PROT_OPEN.as_bytes());
                body.extend_from_slice(text[b + 4..b + e].as_bytes());
                body.extend_from_slice(markers::s::PROT_CLOSE.as_bytes());
                return;
            }
        }
        if text == "[]" {
            // End of block; the optional `.` terminator goes with it.
            if body.last() == Some(&b'.') {
                body.pop();
            }
            return;
        }
        // A plain superblank: keep its content, drop the brackets.
        if text.len() >= 2 {
            body.extend_from_slice(text[1..text.len() - 1].as_bytes());
        }
    }
}

fn next_byte(input: &mut dyn BufRead) -> std::io::Result<Option<u8>> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
