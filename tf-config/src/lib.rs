//! Shared tag-set configuration for the Transfuse pipeline.
//!
//! `defaults/transfuse.default.toml` is embedded into every binary so that the
//! documented per-format tag sets and runtime behavior stay in sync. A user
//! file named by the `TRANSFUSE_CONFIG` environment variable is layered on top
//! of those defaults via [`Loader`], and `--tags-*` command-line overrides are
//! applied last through [`TagOverrides`].

use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

const DEFAULT_TOML: &str = include_str!("../defaults/transfuse.default.toml");

/// Names of the overridable tag sets, as they appear on the command line.
pub const SET_NAMES: [&str; 11] = [
    "tags-prot",
    "tags-prot-inline",
    "tags-raw",
    "tags-inline",
    "tags-semantic",
    "tags-unique",
    "tags-parents-allow",
    "tags-parents-direct",
    "tag-attrs",
    "tags-headers",
    "attrs-headers",
];

/// The tag sets steering classification during extraction.
///
/// Empty sets are inert: an empty `parents_allow` means every parent is a
/// valid extraction parent, an empty `prot` protects nothing, and so on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSets {
    /// Fully protected tags: never recursed into, never extracted.
    pub prot: HashSet<String>,
    /// Inline protected tags: replaced by opaque placeholder references.
    pub prot_inline: HashSet<String>,
    /// Tags with CDATA-like bodies that must not be entity-escaped.
    pub raw: HashSet<String>,
    /// Inline styling tags, factored into inline markers.
    pub inline: HashSet<String>,
    /// Inline tags emitted even when they span a whole block.
    pub semantic: HashSet<String>,
    /// Tags that must never be merged with adjacent equal spans.
    pub unique: HashSet<String>,
    /// When non-empty, only descendants of these tags are extracted.
    pub parents_allow: HashSet<String>,
    /// When non-empty, a text node's immediate parent must be listed here.
    pub parents_direct: HashSet<String>,
    /// Attributes whose values are extracted as separate blocks.
    pub attrs: HashSet<String>,
    /// Tags whose blocks receive the U+2761 header terminator.
    pub headers: HashSet<String>,
    /// Attributes whose blocks receive the U+2761 header terminator.
    pub attr_headers: HashSet<String>,
}

impl TagSets {
    fn set_mut(&mut self, name: &str) -> Option<&mut HashSet<String>> {
        match name {
            "tags-prot" => Some(&mut self.prot),
            "tags-prot-inline" => Some(&mut self.prot_inline),
            "tags-raw" => Some(&mut self.raw),
            "tags-inline" => Some(&mut self.inline),
            "tags-semantic" => Some(&mut self.semantic),
            "tags-unique" => Some(&mut self.unique),
            "tags-parents-allow" => Some(&mut self.parents_allow),
            "tags-parents-direct" => Some(&mut self.parents_direct),
            "tag-attrs" => Some(&mut self.attrs),
            "tags-headers" => Some(&mut self.headers),
            "attrs-headers" => Some(&mut self.attr_headers),
            _ => None,
        }
    }
}

/// Raw per-format tag lists as they appear in the TOML files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormatTagSets {
    #[serde(rename = "tags-prot")]
    pub tags_prot: Vec<String>,
    #[serde(rename = "tags-prot-inline")]
    pub tags_prot_inline: Vec<String>,
    #[serde(rename = "tags-raw")]
    pub tags_raw: Vec<String>,
    #[serde(rename = "tags-inline")]
    pub tags_inline: Vec<String>,
    #[serde(rename = "tags-semantic")]
    pub tags_semantic: Vec<String>,
    #[serde(rename = "tags-unique")]
    pub tags_unique: Vec<String>,
    #[serde(rename = "tags-parents-allow")]
    pub tags_parents_allow: Vec<String>,
    #[serde(rename = "tags-parents-direct")]
    pub tags_parents_direct: Vec<String>,
    #[serde(rename = "tag-attrs")]
    pub tag_attrs: Vec<String>,
    #[serde(rename = "tags-headers")]
    pub tags_headers: Vec<String>,
    #[serde(rename = "attrs-headers")]
    pub attrs_headers: Vec<String>,
}

impl FormatTagSets {
    /// Materialize the runtime [`TagSets`].
    ///
    /// The header sets are opt-in: they stay empty unless `mark_headers` is
    /// requested, so plain extractions never emit the U+2761 terminator.
    pub fn to_tag_sets(&self, mark_headers: bool) -> TagSets {
        fn collect(v: &[String]) -> HashSet<String> {
            v.iter().map(|s| s.to_lowercase()).collect()
        }
        TagSets {
            prot: collect(&self.tags_prot),
            prot_inline: collect(&self.tags_prot_inline),
            raw: collect(&self.tags_raw),
            inline: collect(&self.tags_inline),
            semantic: collect(&self.tags_semantic),
            unique: collect(&self.tags_unique),
            parents_allow: collect(&self.tags_parents_allow),
            parents_direct: collect(&self.tags_parents_direct),
            attrs: collect(&self.tag_attrs),
            headers: if mark_headers {
                collect(&self.tags_headers)
            } else {
                HashSet::new()
            },
            attr_headers: if mark_headers {
                collect(&self.attrs_headers)
            } else {
                HashSet::new()
            },
        }
    }
}

/// Top-level configuration: a table of tag sets keyed by format name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransfuseConfig {
    #[serde(default)]
    pub formats: BTreeMap<String, FormatTagSets>,
}

impl TransfuseConfig {
    /// Tag sets for `format`, or empty sets when the format has no entry
    /// (plain text and line input need none).
    pub fn tag_sets_for(&self, format: &str, mark_headers: bool) -> TagSets {
        self.formats
            .get(format)
            .map(|f| f.to_tag_sets(mark_headers))
            .unwrap_or_default()
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: config::builder::ConfigBuilder<config::builder::DefaultState>,
}

impl Loader {
    /// Start from the embedded defaults.
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Loader { builder }
    }

    /// Layer a user configuration file on top of the defaults.
    pub fn with_file(mut self, path: &std::path::Path) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.to_path_buf()).required(false));
        self
    }

    /// Build the final configuration.
    pub fn load(self) -> Result<TransfuseConfig, config::ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line tag-set overrides, keyed by set name.
///
/// A value list whose first entry is `+` extends the configured set; any
/// other list replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct TagOverrides {
    sets: BTreeMap<String, Vec<String>>,
}

impl TagOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Record an override for `name` (one of [`SET_NAMES`]) from a raw
    /// comma- or whitespace-separated value list.
    pub fn insert(&mut self, name: &str, raw: &str) {
        let values = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.sets.insert(name.to_string(), values);
    }

    /// Apply the recorded overrides to `tags`. Unknown set names are ignored.
    pub fn apply(&self, tags: &mut TagSets) {
        for (name, values) in &self.sets {
            let Some(set) = tags.set_mut(name) else {
                continue;
            };
            let extend = values.first().map(String::as_str) == Some("+");
            if !extend {
                set.clear();
            }
            for v in values.iter().filter(|v| v.as_str() != "+") {
                set.insert(v.to_lowercase());
            }
        }
    }
}

/// Load the layered configuration, honoring `TRANSFUSE_CONFIG`.
pub fn load() -> Result<TransfuseConfig, config::ConfigError> {
    let mut loader = Loader::new();
    if let Some(path) = std::env::var_os("TRANSFUSE_CONFIG") {
        loader = loader.with_file(std::path::Path::new(&path));
    }
    loader.load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cfg = Loader::new().load().expect("embedded defaults must parse");
        assert!(cfg.formats.contains_key("html"));
        assert!(cfg.formats.contains_key("tei"));
        assert!(cfg.formats.contains_key("docx"));
    }

    #[test]
    fn html_sets_materialize() {
        let cfg = Loader::new().load().unwrap();
        let tags = cfg.tag_sets_for("html", false);
        assert!(tags.prot.contains("script"));
        assert!(tags.inline.contains("b"));
        assert!(tags.prot_inline.contains("br"));
        assert!(tags.attrs.contains("alt"));
        // Header sets are opt-in.
        assert!(tags.headers.is_empty());
        let marked = cfg.tag_sets_for("html", true);
        assert!(marked.headers.contains("h1"));
        assert!(marked.attr_headers.contains("title"));
    }

    #[test]
    fn unknown_format_is_empty() {
        let cfg = Loader::new().load().unwrap();
        let tags = cfg.tag_sets_for("text", false);
        assert!(tags.prot.is_empty());
        assert!(tags.parents_allow.is_empty());
    }

    #[test]
    fn override_replaces() {
        let cfg = Loader::new().load().unwrap();
        let mut tags = cfg.tag_sets_for("html", false);
        let mut ov = TagOverrides::new();
        ov.insert("tags-inline", "b,i");
        ov.apply(&mut tags);
        assert_eq!(tags.inline.len(), 2);
        assert!(tags.inline.contains("b"));
        assert!(!tags.inline.contains("span"));
    }

    #[test]
    fn override_extends_with_plus() {
        let cfg = Loader::new().load().unwrap();
        let mut tags = cfg.tag_sets_for("html", false);
        let before = tags.inline.len();
        let mut ov = TagOverrides::new();
        ov.insert("tags-inline", "+,blink");
        ov.apply(&mut tags);
        assert_eq!(tags.inline.len(), before + 1);
        assert!(tags.inline.contains("blink"));
    }
}
