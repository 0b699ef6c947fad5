//! End-to-end extract/inject scenarios over real work directories.

use std::fs;
use std::io::BufReader;
use std::path::PathBuf;
use tf_engine::{extract, hash, inject, markers, Settings, StreamKind};

struct Fixture {
    _root: tempfile::TempDir,
    work_dir: PathBuf,
    input: PathBuf,
}

impl Fixture {
    fn new(name: &str, content: &str) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let work_dir = root.path().join("state");
        let input = root.path().join(name);
        fs::write(&input, content).unwrap();
        Fixture {
            _root: root,
            work_dir,
            input,
        }
    }

    fn settings(&self, format: &str) -> Settings {
        let mut s = Settings::new();
        s.config = tf_config::load().unwrap();
        s.work_dir = Some(self.work_dir.clone());
        s.keep = true;
        s.input = self.input.clone();
        s.format = format.to_string();
        s
    }

    fn extract(&self, format: &str) -> String {
        extract(self.settings(format)).unwrap();
        fs::read_to_string(self.work_dir.join("extracted")).unwrap()
    }

    fn content(&self) -> String {
        fs::read_to_string(self.work_dir.join("content.xml")).unwrap()
    }

    fn inject_stream(&self, stream: &[u8]) -> String {
        let mut settings = Settings::new();
        settings.config = tf_config::load().unwrap();
        settings.keep = true;
        let mut reader = BufReader::new(std::io::Cursor::new(stream.to_vec()));
        let (_, artifact) = inject(settings, &mut reader).unwrap();
        fs::read_to_string(artifact).unwrap()
    }

    fn round_trip(&self, format: &str) -> String {
        let stream = self.extract(format);
        self.inject_stream(stream.as_bytes())
    }
}

fn style_hash(otag: &str, ctag: &str) -> String {
    hash::hash32_url64(format!("{otag}{}{ctag}", markers::HASH_SEP).as_bytes())
}

#[test]
fn html_bold_round_trip() {
    let doc = "<!DOCTYPE html>\n<html><head><title>t</title></head>\
               <body><p>Hello <b>bold</b> world.</p></body></html>";
    let fx = Fixture::new("in.html", doc);
    let stream = fx.extract("auto");

    // Prologue carries the state dir.
    assert!(stream.starts_with("[transfuse:"), "stream: {stream}");
    // The factored span references <b>/</b> under their content hash.
    let h = style_hash("<b>", "</b>");
    assert!(
        stream.contains(&format!("Hello [[t:b:{h}]]bold[[/]] world.")),
        "stream: {stream}"
    );

    let out = fx.inject_stream(stream.as_bytes());
    assert!(
        out.contains("<p>Hello <b>bold</b> world.</p>"),
        "out: {out}"
    );
    assert!(out.starts_with("<!DOCTYPE html>"), "out: {out}");
}

#[test]
fn whitespace_is_preserved() {
    let fx = Fixture::new("in.html", "<p>  a <i>b</i>  c  </p>");
    fx.extract("html-fragment");

    let content = fx.content();
    assert!(content.contains("tf-space-prefix=\"  \""), "content: {content}");
    assert!(content.contains("tf-space-suffix=\"  \""), "content: {content}");

    let stream = fs::read_to_string(fx.work_dir.join("extracted")).unwrap();
    let out = fx.inject_stream(stream.as_bytes());
    assert!(out.contains("<p>  a <i>b</i>  c  </p>"), "out: {out}");
}

#[test]
fn adjacent_equal_spans_merge() {
    let fx = Fixture::new("in.html", "<p><b>foo</b> <b>bar</b></p>");
    let stream = fx.extract("html-fragment");
    let h = style_hash("<b>", "</b>");
    assert!(
        stream.contains(&format!("[[t:b:{h}]]foo bar[[/]]")),
        "stream: {stream}"
    );
}

#[test]
fn perfect_nesting_flattens() {
    let fx = Fixture::new("in.html", "<p>w <b><i>x</i></b> y</p>");
    let stream = fx.extract("html-fragment");
    let hb = style_hash("<b>", "</b>");
    let hi = style_hash("<i>", "</i>");
    assert!(
        stream.contains(&format!("[[t:b:{hb};t:i:{hi}]]x[[/]]")),
        "stream: {stream}"
    );
}

#[test]
fn protected_inline_becomes_reference() {
    let fx = Fixture::new("in.html", "<p>alpha<br>omega</p>");
    let stream = fx.extract("html-fragment");
    // The <br/> is stored opaquely and referenced from the body.
    assert!(stream.contains("alpha[tf:P:"), "stream: {stream}");
    assert!(stream.contains("]omega"), "stream: {stream}");

    let out = fx.inject_stream(stream.as_bytes());
    assert!(out.contains("alpha<br>omega"), "out: {out}");
}

#[test]
fn out_of_order_block_is_skipped_but_rest_is_spliced() {
    let doc = "<div><p>one</p><p>two</p></div>";
    let fx = Fixture::new("in.html", doc);
    let stream = fx.extract("html-fragment");

    let id2 = format!("2-{}", hash::hash32_url64(b"two"));
    assert!(stream.contains(&format!("[tf-block:{id2}]")), "stream: {stream}");

    // A stream that only delivers the second block, translated.
    let partial = format!(
        "[transfuse:{}]\n\0\n[tf-block:{id2}]\n\nTWO.[]\n\0",
        fx.work_dir.display()
    );
    let out = fx.inject_stream(partial.as_bytes());
    // The delivered block is spliced, the missing one keeps its original
    // body with the boundary markers stripped.
    assert!(out.contains("TWO"), "out: {out}");
    assert!(out.contains("one"), "out: {out}");
    assert!(!out.contains(markers::BLK_OPEN_B), "out: {out}");
}

#[test]
fn block_ids_appear_once_as_open_and_close() {
    let fx = Fixture::new("in.html", "<div><p>first</p><p>second</p></div>");
    let stream = fx.extract("html-fragment");
    assert_eq!(stream.matches("[tf-block:").count(), 2, "stream: {stream}");

    let content = fx.content();
    for (i, body) in ["first", "second"].iter().enumerate() {
        let id = format!("{}-{}", i + 1, hash::hash32_url64(body.as_bytes()));
        let open = format!("{}{id}{}", markers::BLK_OPEN_B, markers::BLK_OPEN_E);
        let close = format!("{}{id}{}", markers::BLK_CLOSE_B, markers::BLK_CLOSE_E);
        assert_eq!(content.matches(&open).count(), 1, "content: {content}");
        assert_eq!(content.matches(&close).count(), 1, "content: {content}");
    }
}

#[test]
fn empty_document_gives_prologue_only() {
    let fx = Fixture::new("in.txt", "");
    let stream = fx.extract("text");
    assert!(stream.starts_with("[transfuse:"));
    assert!(!stream.contains("[tf-block:"));
}

#[test]
fn protected_only_document_has_no_blocks() {
    let fx = Fixture::new("in.html", "<pre>code only</pre>");
    let stream = fx.extract("html-fragment");
    assert!(!stream.contains("[tf-block:"), "stream: {stream}");
}

#[test]
fn attribute_values_become_blocks() {
    let fx = Fixture::new(
        "in.html",
        "<p><img src=\"x.png\" alt=\"a picture\">caption</p>",
    );
    let stream = fx.extract("html-fragment");
    assert!(stream.contains("a picture"), "stream: {stream}");
    // Attribute block precedes the element's children in the stream.
    let alt = stream.find("a picture").unwrap();
    let cap = stream.find("caption").unwrap();
    assert!(alt < cap);

    let out = fx.round_trip("html-fragment");
    assert!(out.contains("alt=\"a picture\""), "out: {out}");
    assert!(out.contains("caption"), "out: {out}");
}

#[test]
fn text_round_trip_preserves_paragraphs() {
    let text = "first paragraph\n\nsecond one\nwith a line break\n";
    let fx = Fixture::new("in.txt", text);
    let out = fx.round_trip("text");
    assert_eq!(out, text);
}

#[test]
fn line_mode_blocks_per_line() {
    let fx = Fixture::new("in.txt", "line one\nline two\n");
    let stream = fx.extract("line");
    assert!(stream.contains("line one"));
    assert!(stream.contains("line two"));
    assert_eq!(stream.matches("[tf-block:").count(), 2, "stream: {stream}");
}

#[test]
fn visl_stream_round_trips() {
    let fx = Fixture::new("in.html", "<p>Hello <b>bold</b> world.</p>");
    let mut settings = fx.settings("html-fragment");
    settings.stream = StreamKind::Visl;
    extract(settings).unwrap();
    let stream = fs::read_to_string(fx.work_dir.join("extracted")).unwrap();
    assert!(stream.starts_with("<STREAMCMD:TRANSFUSE:"), "stream: {stream}");
    assert!(stream.contains("<s id=\"1-"), "stream: {stream}");
    assert!(stream.contains("<STYLE:b:"), "stream: {stream}");

    let out = fx.inject_stream(stream.as_bytes());
    assert!(out.contains("Hello <b>bold</b> world."), "out: {out}");
}

#[test]
fn translated_entities_are_escaped_on_inject() {
    let fx = Fixture::new("in.html", "<p>plain words</p>");
    let stream = fx.extract("html-fragment");
    let id = format!("1-{}", hash::hash32_url64(b"plain words"));
    let translated = format!(
        "[transfuse:{}]\n\0\n[tf-block:{id}]\n\nwords & more \\<stuff\\>.[]\n\0",
        fx.work_dir.display()
    );
    let out = fx.inject_stream(translated.as_bytes());
    assert!(out.contains("words &amp; more &lt;stuff&gt;"), "out: {out}");
}

#[test]
fn existing_extraction_is_reused() {
    let fx = Fixture::new("in.html", "<p>stable text</p>");
    let first = fx.extract("html-fragment");
    // Second run must not re-extract; it reuses styled.xml and re-emits.
    let second = fx.extract("html-fragment");
    assert_eq!(first, second);
}

#[test]
fn work_dir_is_recovered_from_prologue() {
    let fx = Fixture::new("in.html", "<p>recoverable</p>");
    let stream = fx.extract("html-fragment");
    // The prologue carries the state dir with Apertium meta escaping.
    let line = stream.lines().next().unwrap();
    let escaped = fx.work_dir.display().to_string().replace('/', "\\/");
    assert!(line.contains(&escaped), "prologue: {line}");
}
