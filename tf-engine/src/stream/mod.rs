//! Stream dialects exchanged with external NLP tooling.
//!
//! All three dialects operate on the same marker-bearing text and differ only
//! in wire syntax. The codec is a tagged variant rather than a trait object:
//! there are exactly three dialects and dispatch stays static.

mod apertium;
mod visl;

pub use apertium::ApertiumStream;
pub use visl::VislStream;

use crate::state::State;
use crate::Result;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Stream dialect selection, `Detect` until resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamKind {
    #[default]
    Detect,
    Apertium,
    Visl,
    Cg,
}

impl StreamKind {
    pub fn from_name(name: &str) -> Option<StreamKind> {
        match name {
            "detect" => Some(StreamKind::Detect),
            "apertium" => Some(StreamKind::Apertium),
            "visl" => Some(StreamKind::Visl),
            "cg" => Some(StreamKind::Cg),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Detect => "detect",
            StreamKind::Apertium => "apertium",
            StreamKind::Visl => "visl",
            StreamKind::Cg => "cg",
        }
    }
}

/// One block recovered from a stream: `(id, body)`. The id can be empty when
/// the reader consumed non-block material; callers skip those.
pub type Block = (String, String);

/// A stream codec instance. Readers carry parse state across calls.
pub enum StreamCodec {
    Apertium(ApertiumStream),
    Visl(VislStream),
    /// CG shares the VISL wire format for writing; its reader preserves line
    /// boundaries with `SENTINEL` markers.
    Cg(VislStream),
}

impl StreamCodec {
    /// Build a codec for a resolved (non-`Detect`) stream kind.
    pub fn new(kind: StreamKind, apertium_n: bool) -> StreamCodec {
        match kind {
            StreamKind::Visl => StreamCodec::Visl(VislStream::new()),
            StreamKind::Cg => StreamCodec::Cg(VislStream::new()),
            // Detect resolves to Apertium on the extract side.
            StreamKind::Detect | StreamKind::Apertium => {
                StreamCodec::Apertium(ApertiumStream::new(apertium_n))
            }
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            StreamCodec::Apertium(_) => StreamKind::Apertium,
            StreamCodec::Visl(_) => StreamKind::Visl,
            StreamCodec::Cg(_) => StreamKind::Cg,
        }
    }

    /// Rewrite protected regions of the styled serialization into stored
    /// style references, dialect-specifically.
    pub fn protect_to_styles(&self, styled: &mut String, state: &State) -> Result<()> {
        match self {
            StreamCodec::Apertium(s) => s.protect_to_styles(styled, state),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.protect_to_styles(styled, state),
        }
    }

    /// One-time stream prologue carrying the state directory.
    pub fn stream_header(&self, out: &mut String, work_dir: &Path) {
        match self {
            StreamCodec::Apertium(s) => s.stream_header(out, work_dir),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.stream_header(out, work_dir),
        }
    }

    pub fn block_open(&self, out: &mut String, id: &str) {
        match self {
            StreamCodec::Apertium(s) => s.block_open(out, id),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.block_open(out, id),
        }
    }

    pub fn block_body(&self, out: &mut String, body: &str) {
        match self {
            StreamCodec::Apertium(s) => s.block_body(out, body),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.block_body(out, body),
        }
    }

    /// Header-block terminator, where the dialect has one.
    pub fn block_term_header(&self, out: &mut String) {
        match self {
            StreamCodec::Apertium(s) => s.block_term_header(out),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.block_term_header(out),
        }
    }

    pub fn block_close(&self, out: &mut String, id: &str) {
        match self {
            StreamCodec::Apertium(s) => s.block_close(out, id),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.block_close(out, id),
        }
    }

    /// Recover the state directory from the stream prologue line.
    pub fn work_dir_from_header(&self, line: &str) -> Option<PathBuf> {
        match self {
            StreamCodec::Apertium(s) => s.work_dir_from_header(line),
            StreamCodec::Visl(s) | StreamCodec::Cg(s) => s.work_dir_from_header(line),
        }
    }

    /// Consume input until one block is recovered. `Ok(None)` at end of
    /// stream; an empty id means non-block material was consumed.
    pub fn read_block(&mut self, input: &mut dyn BufRead) -> Result<Option<Block>> {
        match self {
            StreamCodec::Apertium(s) => s.read_block(input),
            StreamCodec::Visl(s) => s.read_block(input),
            StreamCodec::Cg(s) => s.read_block_cg(input),
        }
    }
}
