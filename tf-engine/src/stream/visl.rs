//! VISL and CG stream dialects.
//!
//! Wire form: `<STREAMCMD:TRANSFUSE:<dir>>` prologue, `<s id="…">…</s>`
//! blocks, inline spans as `<STYLE:…>…</STYLE>`. CG writes identical output;
//! its reader additionally inserts `SENTINEL` after every line so an external
//! constraint-grammar parser can keep line boundaries.

use crate::markers;
use crate::state::State;
use crate::stream::Block;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::BufRead;
use std::path::{Path, PathBuf};

static RX_PROT_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E021}([\\s\\r\\n\\p{Z}]*)\u{E020}").unwrap());

static RX_PROTS: Lazy<Regex> = Lazy::new(|| Regex::new("(?s)\u{E020}(.*?)\u{E021}").unwrap());

static RX_BLOCK_START: Lazy<Regex> = Lazy::new(|| Regex::new(">[\\s\\p{Zs}]*$").unwrap());
static RX_BLOCK_END: Lazy<Regex> = Lazy::new(|| Regex::new("^[\\s\\p{Zs}]*<").unwrap());

// Right after the opening of an existing style span.
static RX_IFX_START: Lazy<Regex> =
    Lazy::new(|| Regex::new("(\u{E011}[^\u{E012}]+\u{E012})[\\s\\p{Zs}]*$").unwrap());
// Right after the close of a style span.
static RX_PFX_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new("\u{E013}[\\s\\p{Zs}]*$").unwrap());
// Right after a bare token.
static RX_PFX_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^>\\s\\p{Z}\u{E012}]+[\\s\\p{Zs}]*$").unwrap());

/// The VISL dialect; also the writer half of CG.
pub struct VislStream {
    line: String,
}

impl VislStream {
    pub fn new() -> Self {
        VislStream {
            line: String::new(),
        }
    }

    /// Turn protected regions into styles attached to the surrounding tokens.
    ///
    /// VISL has no opaque-reference wire syntax, so a protected fragment is
    /// stored as the opening or closing half of a synthetic `P` style wrapped
    /// around whatever precedes it: the inside of a just-opened span, the
    /// previous span, or the previous bare token. Fragments at block-tag
    /// edges stay literal markup.
    pub fn protect_to_styles(&self, styled: &mut String, state: &State) -> Result<()> {
        if RX_PROT_JOIN.is_match(styled) {
            *styled = RX_PROT_JOIN.replace_all(styled, "$1").into_owned();
        }

        for _ in 0..100 {
            let mut ns = String::with_capacity(styled.len());
            let mut last = 0;
            while let Some(caps) = RX_PROTS.captures_at(styled, last) {
                let m = caps.get(0).unwrap();
                let content = caps.get(1).unwrap().as_str().to_string();
                ns.push_str(&styled[last..m.start()]);
                last = m.end();

                if RX_BLOCK_START.is_match(&ns) || RX_BLOCK_END.is_match(&styled[last..]) {
                    ns.push_str(&content);
                    continue;
                }

                if let Some(im) = RX_IFX_START.captures(&ns) {
                    // Inside the start of an existing style: wrap its whole
                    // inside in a synthetic opening style.
                    let hash = state.save_style("P", &content, "", "")?;
                    let open_end = im.get(1).unwrap().end();
                    let tail = ns.split_off(open_end);
                    push_p_open(&mut ns, &hash);
                    ns.push_str(&tail);
                    let first_close = styled[last..]
                        .find(markers::INL_CLOSE)
                        .map(|p| last + p)
                        .unwrap_or(styled.len());
                    ns.push_str(&styled[last..first_close]);
                    ns.push(markers::INL_CLOSE);
                    last = first_close;
                    continue;
                }
                if RX_PFX_STYLE.is_match(&ns) {
                    // Wrap the immediately preceding style span.
                    let hash = state.save_style("P", "", &content, "")?;
                    let wrap_from = ns.rfind(markers::INL_OPEN_B).unwrap_or(0);
                    let tail = ns.split_off(wrap_from);
                    push_p_open(&mut ns, &hash);
                    ns.push_str(&tail);
                    ns.push(markers::INL_CLOSE);
                    continue;
                }
                if let Some(tm) = RX_PFX_TOKEN.find(&ns) {
                    // Wrap the immediately preceding token.
                    let hash = state.save_style("P", "", &content, "")?;
                    let tail = ns.split_off(tm.start());
                    push_p_open(&mut ns, &hash);
                    ns.push_str(&tail);
                    ns.push(markers::INL_CLOSE);
                    continue;
                }
                // Nothing to attach to; the fragment is dropped.
            }
            if last == 0 {
                break;
            }
            ns.push_str(&styled[last..]);
            *styled = ns;
        }
        Ok(())
    }

    pub fn stream_header(&self, out: &mut String, work_dir: &Path) {
        out.push_str("<STREAMCMD:TRANSFUSE:");
        out.push_str(&work_dir.to_string_lossy());
        out.push_str(">\n\n");
    }

    pub fn block_open(&self, out: &mut String, id: &str) {
        out.push_str("\n<s id=\"");
        out.push_str(id);
        out.push_str("\">\n");
    }

    pub fn block_body(&self, out: &mut String, body: &str) {
        for c in body.chars() {
            match c {
                markers::INL_OPEN_B => out.push_str("<STYLE:"),
                markers::INL_OPEN_E => out.push('>'),
                markers::INL_CLOSE => out.push_str("</STYLE>"),
                _ => out.push(c),
            }
        }
    }

    pub fn block_term_header(&self, _out: &mut String) {}

    pub fn block_close(&self, out: &mut String, _id: &str) {
        out.push_str("\n</s>\n\n");
    }

    pub fn work_dir_from_header(&self, line: &str) -> Option<PathBuf> {
        let b = line.find("<STREAMCMD:TRANSFUSE:")?;
        let e = line[b..].find('>')? + b;
        Some(PathBuf::from(&line[b + 21..e]))
    }

    /// Line-oriented reader: `<s id="…">` opens, `</s>` closes, `<STYLE:` /
    /// `</STYLE>` map back to inline markers.
    pub fn read_block(&mut self, input: &mut dyn BufRead) -> Result<Option<Block>> {
        let mut body = String::new();
        let mut block_id = String::new();
        loop {
            match self.next_line(input)? {
                None => return Ok(None),
                Some(line) => {
                    if let Some(id) = parse_s_open(&line) {
                        block_id = id;
                        continue;
                    }
                    if line == "</s>" {
                        break;
                    }
                    let mut buf = line.as_str();
                    loop {
                        let bs = buf.find("<STYLE:");
                        let es = buf.find("</STYLE>");
                        match (bs, es) {
                            (_, Some(e)) if bs.is_none() || e < bs.unwrap() => {
                                body.push_str(&buf[..e]);
                                buf = &buf[e + 8..];
                                body.push(markers::INL_CLOSE);
                            }
                            (Some(b), _) if es.is_none() || b < es.unwrap() => {
                                body.push_str(&buf[..b]);
                                body.push(markers::INL_OPEN_B);
                                buf = &buf[b + 7..];
                                let c = buf.find('>').unwrap_or(buf.len());
                                body.push_str(&buf[..c]);
                                buf = &buf[(c + 1).min(buf.len())..];
                                body.push(';');
                                body.push(markers::INL_OPEN_E);
                            }
                            _ => break,
                        }
                    }
                    body.push_str(buf);
                }
            }
        }
        Ok(Some((block_id, body)))
    }

    /// CG reader: same wire format, but every consumed line is terminated
    /// with `SENTINEL` so line boundaries survive the round trip.
    pub fn read_block_cg(&mut self, input: &mut dyn BufRead) -> Result<Option<Block>> {
        let mut body = String::new();
        let mut block_id = String::new();
        loop {
            match self.next_line(input)? {
                None => return Ok(None),
                Some(mut line) => {
                    if let Some(id) = parse_s_open(&line) {
                        block_id = id;
                        body.push(markers::SENTINEL);
                        continue;
                    }
                    if block_id.is_empty() {
                        continue;
                    }
                    if line.starts_with("<STYLE:") {
                        let trimmed = line.trim();
                        body.push(markers::INL_OPEN_B);
                        body.push_str(&trimmed[7..trimmed.len() - 1]);
                        body.push(';');
                        body.push(markers::INL_OPEN_E);
                        body.push(markers::SENTINEL);
                        continue;
                    }
                    if line == "</STYLE>" {
                        body.push(markers::INL_CLOSE);
                        body.push(markers::SENTINEL);
                        continue;
                    }
                    if line == "</s>" {
                        break;
                    }
                    line.push(markers::SENTINEL);
                    body.push_str(&line);
                }
            }
        }
        Ok(Some((block_id, body)))
    }

    fn next_line(&mut self, input: &mut dyn BufRead) -> Result<Option<String>> {
        self.line.clear();
        if input.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        while self.line.ends_with('\n') || self.line.ends_with('\r') {
            self.line.pop();
        }
        Ok(Some(self.line.clone()))
    }
}

impl Default for VislStream {
    fn default() -> Self {
        Self::new()
    }
}

fn push_p_open(out: &mut String, hash: &str) {
    out.push(markers::INL_OPEN_B);
    out.push_str("P:");
    out.push_str(hash);
    out.push(markers::INL_OPEN_E);
}

fn parse_s_open(line: &str) -> Option<String> {
    if !line.starts_with("<s id=\"") {
        return None;
    }
    let e = line.find("\">")?;
    Some(line[7..e].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::s;
    use crate::settings::Settings;

    fn codec() -> VislStream {
        VislStream::new()
    }

    #[test]
    fn header_and_recovery() {
        let mut out = String::new();
        codec().stream_header(&mut out, Path::new("/tmp/tf"));
        assert_eq!(out, "<STREAMCMD:TRANSFUSE:/tmp/tf>\n\n");
        assert_eq!(
            codec().work_dir_from_header(out.lines().next().unwrap()),
            Some(PathBuf::from("/tmp/tf"))
        );
    }

    #[test]
    fn body_maps_markers_to_style_tags() {
        let mut out = String::new();
        let body = format!("a {}b:h{}x{} b", s::INL_OPEN_B, s::INL_OPEN_E, s::INL_CLOSE);
        codec().block_body(&mut out, &body);
        assert_eq!(out, "a <STYLE:b:h>x</STYLE> b");
    }

    #[test]
    fn reader_round_trips_a_block() {
        let mut stream = String::new();
        let c = codec();
        c.block_open(&mut stream, "1-AbCd");
        c.block_body(
            &mut stream,
            &format!("a {}b:h{}x{} b", s::INL_OPEN_B, s::INL_OPEN_E, s::INL_CLOSE),
        );
        c.block_close(&mut stream, "1-AbCd");

        let mut reader = stream.as_bytes();
        let mut c = codec();
        let (id, body) = c.read_block(&mut reader).unwrap().unwrap();
        assert_eq!(id, "1-AbCd");
        assert_eq!(
            body,
            format!("a {}b:h;{}x{} b", s::INL_OPEN_B, s::INL_OPEN_E, s::INL_CLOSE)
        );
    }

    #[test]
    fn cg_reader_inserts_sentinels() {
        let input = "\n<s id=\"1-x\">\nline one\nline two\n</s>\n\n";
        let mut reader = input.as_bytes();
        let mut c = codec();
        let (id, body) = c.read_block_cg(&mut reader).unwrap().unwrap();
        assert_eq!(id, "1-x");
        assert_eq!(
            body,
            format!(
                "{0}line one{0}line two{0}",
                markers::SENTINEL
            )
        );
    }

    #[test]
    fn cg_reader_handles_style_lines() {
        let input = "<s id=\"1-x\">\n<STYLE:b:h>\nword\n</STYLE>\n</s>\n";
        let mut reader = input.as_bytes();
        let mut c = codec();
        let (_, body) = c.read_block_cg(&mut reader).unwrap().unwrap();
        let expected = format!(
            "{sent}{ob}b:h;{oe}{sent}word{sent}{cl}{sent}",
            sent = markers::SENTINEL,
            ob = markers::INL_OPEN_B,
            oe = markers::INL_OPEN_E,
            cl = markers::INL_CLOSE
        );
        assert_eq!(body, expected);
    }

    #[test]
    fn protect_wraps_preceding_token() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::open(dir.path(), Settings::new(), false).unwrap();
        let mut styled = format!("word{}<br/>{} tail", s::PROT_OPEN, s::PROT_CLOSE);
        codec().protect_to_styles(&mut styled, &state).unwrap();
        // The token before the fragment is wrapped in a synthetic P style.
        let expected_prefix = format!("{}P:", markers::INL_OPEN_B);
        assert!(styled.contains(&expected_prefix), "styled: {styled:?}");
        assert!(styled.contains(&format!("word{}", markers::INL_CLOSE)));
        assert!(!styled.contains(markers::PROT_OPEN));
    }

    #[test]
    fn protect_leaves_block_edges() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::open(dir.path(), Settings::new(), false).unwrap();
        let mut styled = format!("<p>{}<!-- c -->{}text</p>", s::PROT_OPEN, s::PROT_CLOSE);
        codec().protect_to_styles(&mut styled, &state).unwrap();
        assert_eq!(styled, "<p><!-- c -->text</p>");
    }
}
