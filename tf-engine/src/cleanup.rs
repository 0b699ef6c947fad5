//! Fixed-point normalization of inline-marker sequences.
//!
//! Downstream NLP tooling wants span boundaries on word boundaries: not
//! mid-token, not across whitespace, and never doubled. One round applies the
//! rules in order (merge, flatten, absorb, evict, merge again); rounds repeat
//! until nothing changes, bounded at 100 as an escape hatch for pathological
//! nesting.

use crate::markers;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const MAX_ROUNDS: usize = 100;

// Adjacent spans with byte-equal open markers, at most whitespace between.
// The equality check lives in code: the engine has no backreferences.
static RX_MERGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "(\u{E011}[^\u{E012}]+\u{E012})([^\u{E011}-\u{E013}]+)\u{E013}([\\s\\p{Zs}]*)(\u{E011}[^\u{E012}]+\u{E012})",
    )
    .unwrap()
});

// A span containing exactly one nested span and nothing else.
static RX_NESTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "\u{E011}([^\u{E012}]+)\u{E012}\u{E011}([^\u{E012}]+)\u{E012}([^\u{E011}-\u{E013}]+)\u{E013}\u{E013}",
    )
    .unwrap()
});

// Alphanumeric run ending in a letter right before an open marker whose span
// starts with letters.
static RX_ALPHA_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new("([\\p{L}\\p{N}\\p{M}]*?[\\p{L}\\p{M}])(\u{E011}[^\u{E012}]+\u{E012})(\\p{L}+)")
        .unwrap()
});

// Letters right before a close marker followed by an alphanumeric run that
// starts with a letter.
static RX_ALPHA_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new("(\\p{L}[\\p{L}\\p{M}]*)(\u{E013})(\\p{L}[\\p{L}\\p{N}\\p{M}]*)").unwrap()
});

static RX_SPC_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new("(\u{E011}[^\u{E012}]+\u{E012})([\\s\\p{Zs}]+)").unwrap());

static RX_SPC_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new("([\\s\\p{Zs}]+)(\u{E013})").unwrap());

/// Merge adjacent identical inline spans separated by at most whitespace:
/// `⟨open t⟩a⟨close⟩ ⟨open t⟩b⟨close⟩` becomes `⟨open t⟩a b⟨close⟩`.
fn merge_spans(s: &mut String) -> bool {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    let mut pos = 0;
    let mut did = false;
    while let Some(caps) = RX_MERGE.captures_at(s, pos) {
        let open1 = caps.get(1).unwrap();
        let body1 = caps.get(2).unwrap();
        let ws = caps.get(3).unwrap();
        let open2 = caps.get(4).unwrap();
        if open1.as_str() != open2.as_str() {
            // Different spans; the second open may still pair with what
            // follows it.
            pos = open2.start();
            continue;
        }
        out.push_str(&s[last..open1.start()]);
        out.push_str(open1.as_str());
        out.push_str(body1.as_str());
        out.push_str(ws.as_str());
        // The second span's body and close are picked up from `last` onward.
        last = open2.end();
        pos = open2.end();
        did = true;
    }
    if did {
        out.push_str(&s[last..]);
        *s = out;
    }
    did
}

fn replace_rule(s: &mut String, rx: &Regex, repl: impl FnMut(&Captures) -> String) -> bool {
    if !rx.is_match(s) {
        return false;
    }
    *s = rx.replace_all(s, repl).into_owned();
    true
}

/// Flatten a perfectly nested pair into one span with a joined tag spec.
fn flatten_nested(s: &mut String) -> bool {
    replace_rule(s, &RX_NESTED, |caps: &Captures| {
        let outer = markers::trim_tagspec(&caps[1]);
        let inner = markers::trim_tagspec(&caps[2]);
        format!(
            "{}{outer};{inner}{}{}{}",
            markers::INL_OPEN_B,
            markers::INL_OPEN_E,
            &caps[3],
            markers::INL_CLOSE
        )
    })
}

/// Run the rewrite system on `s` until it reaches a fixed point.
///
/// With `extend` false the alphanumeric absorption rules are skipped
/// (`--no-extend`).
pub fn cleanup_styles(s: &mut String, extend: bool) {
    let mut rounds = 0;
    loop {
        let mut did = false;

        did |= merge_spans(s);
        did |= flatten_nested(s);
        if extend {
            // Move a token prefix inside the span: `bo⟨open⟩ld⟨close⟩`
            // becomes `⟨open⟩bold⟨close⟩`.
            did |= replace_rule(s, &RX_ALPHA_PREFIX, |c: &Captures| {
                format!("{}{}{}", &c[2], &c[1], &c[3])
            });
            // And symmetrically for a token suffix.
            did |= replace_rule(s, &RX_ALPHA_SUFFIX, |c: &Captures| {
                format!("{}{}{}", &c[1], &c[3], &c[2])
            });
        }
        // Edge whitespace moves out of the span.
        did |= replace_rule(s, &RX_SPC_PREFIX, |c: &Captures| {
            format!("{}{}", &c[2], &c[1])
        });
        did |= replace_rule(s, &RX_SPC_SUFFIX, |c: &Captures| {
            format!("{}{}", &c[2], &c[1])
        });
        did |= merge_spans(s);

        if !did {
            break;
        }
        rounds += 1;
        if rounds >= MAX_ROUNDS {
            log::warn!("Inline cleanup did not converge after {MAX_ROUNDS} rounds, proceeding");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(tagspec: &str) -> String {
        format!("{}{}{}", markers::INL_OPEN_B, tagspec, markers::INL_OPEN_E)
    }

    fn close() -> String {
        markers::INL_CLOSE.to_string()
    }

    fn span(tagspec: &str, body: &str) -> String {
        format!("{}{}{}", open(tagspec), body, close())
    }

    #[test]
    fn merges_adjacent_identical_spans() {
        let mut s = format!("{} {}", span("b:h", "foo"), span("b:h", "bar"));
        cleanup_styles(&mut s, true);
        assert_eq!(s, span("b:h", "foo bar"));
    }

    #[test]
    fn keeps_different_spans_apart() {
        let mut s = format!("{} {}", span("b:h1", "foo"), span("i:h2", "bar"));
        cleanup_styles(&mut s, true);
        assert_eq!(
            s,
            format!("{} {}", span("b:h1", "foo"), span("i:h2", "bar"))
        );
    }

    #[test]
    fn merges_chains() {
        let mut s = format!(
            "{} {} {}",
            span("b:h", "a"),
            span("b:h", "b"),
            span("b:h", "c")
        );
        cleanup_styles(&mut s, true);
        assert_eq!(s, span("b:h", "a b c"));
    }

    #[test]
    fn flattens_perfect_nesting() {
        let mut s = format!("{}{}{}", open("b:h1"), span("i:h2", "x"), close());
        cleanup_styles(&mut s, true);
        assert_eq!(s, span("b:h1;i:h2", "x"));
    }

    #[test]
    fn absorbs_token_prefix_and_suffix() {
        let mut s = format!("bo{}ld", span("b:h", "l"));
        cleanup_styles(&mut s, true);
        assert_eq!(s, span("b:h", "bold"));
    }

    #[test]
    fn no_extend_skips_absorption() {
        let mut s = format!("bo{}", span("b:h", "ld"));
        let expected = s.clone();
        cleanup_styles(&mut s, false);
        assert_eq!(s, expected);
    }

    #[test]
    fn evicts_edge_whitespace() {
        let mut s = span("b:h", "  x  ");
        cleanup_styles(&mut s, true);
        assert_eq!(s, format!("  {}  ", span("b:h", "x")));
    }

    #[test]
    fn eviction_enables_merge() {
        // After whitespace leaves the spans, the two become adjacent equals.
        let mut s = format!("{}{}", span("b:h", "a "), span("b:h", "b"));
        cleanup_styles(&mut s, true);
        assert_eq!(s, span("b:h", "a b"));
    }

    #[test]
    fn idempotent_on_clean_input() {
        let mut s = format!("plain {} text", span("b:h", "bold"));
        cleanup_styles(&mut s, true);
        let once = s.clone();
        cleanup_styles(&mut s, true);
        assert_eq!(s, once);
    }

    #[test]
    fn plain_text_untouched() {
        let mut s = "no markers here, just text & symbols".to_string();
        cleanup_styles(&mut s, true);
        assert_eq!(s, "no markers here, just text & symbols");
    }
}
