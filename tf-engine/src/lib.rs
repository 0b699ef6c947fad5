//! Transfuse engine: a bidirectional pipeline between richly-formatted
//! documents and line-oriented streams for language tooling.
//!
//! Extraction parses a document, factors inline formatting and protected
//! material into private-use markers backed by a content-addressed style
//! store, and emits translatable blocks as a stream (Apertium, VISL, or CG
//! dialect). Injection reads the translated stream plus the persisted state
//! and splices the translations back, rehydrating markup from the store and
//! restoring recorded whitespace.
//!
//! Pipeline shape (see `extract` and `inject` for the drivers):
//!
//! ```text
//! extract: parse -> save_spaces -> save_styles -> reparse -> extract_blocks
//! inject:  read blocks -> splice -> cleanup -> rehydrate -> reparse
//!          -> restore_spaces -> format adapter repack
//! ```
//!
//! Format-specific handling (archive payloads, run merging, charset quirks)
//! lives in the [`formats`] adapters; everything else is format-agnostic.

pub mod blocks;
pub mod cleanup;
pub mod dom;
pub mod error;
pub mod extract;
pub mod formats;
pub mod hash;
pub mod inject;
pub mod markers;
pub mod settings;
pub mod spaces;
pub mod state;
pub mod stream;
pub mod styles;

pub use dom::Dom;
pub use error::{Error, Result};
pub use extract::extract;
pub use inject::inject;
pub use settings::Settings;
pub use state::State;
pub use stream::StreamKind;

use tf_config::TagSets;

/// A parsed document together with the tag sets that classify it.
///
/// Adapters configure the tag sets; the extraction passes consume both.
pub struct Document {
    pub dom: Dom,
    pub tags: TagSets,
}

impl Document {
    pub fn new(dom: Dom, tags: TagSets) -> Self {
        Document { dom, tags }
    }
}
