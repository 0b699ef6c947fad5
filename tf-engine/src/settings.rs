//! Runtime options shared by every pipeline pass.

use crate::stream::StreamKind;
use std::path::PathBuf;
use tf_config::{TagOverrides, TransfuseConfig};

/// Options assembled by the command line and threaded through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Input format name, `"auto"` to detect.
    pub format: String,
    /// Stream dialect.
    pub stream: StreamKind,
    /// Work directory, when given explicitly with `--dir`.
    pub work_dir: Option<PathBuf>,
    /// Input file; `-` means stdin.
    pub input: PathBuf,
    /// Progress reporting on stderr.
    pub verbose: bool,
    /// Keep the work directory after injection.
    pub keep: bool,
    /// Wipe the work directory before extraction.
    pub no_keep: bool,
    /// Populate the header tag sets so header blocks get U+2761 terminators.
    pub mark_headers: bool,
    /// Suppress the `.[]` block terminator in the Apertium stream.
    pub apertium_n: bool,
    /// Splice translations verbatim, without XML entity re-escaping.
    pub inject_raw: bool,
    /// Disable the alphanumeric absorption rules of the cleanup pass.
    pub no_extend: bool,
    /// Program to run after injection, receiving the output filename.
    pub hook_inject: Option<String>,
    /// `--tags-*` command-line overrides.
    pub tag_overrides: TagOverrides,
    /// Layered tag-set configuration.
    pub config: TransfuseConfig,
}

impl Settings {
    pub fn new() -> Self {
        Settings {
            format: "auto".into(),
            input: PathBuf::from("-"),
            ..Default::default()
        }
    }

    /// Tag sets for `format` with command-line overrides applied.
    pub fn tag_sets(&self, format: &str) -> tf_config::TagSets {
        let mut tags = self.config.tag_sets_for(format, self.mark_headers);
        self.tag_overrides.apply(&mut tags);
        tags
    }
}

/// Run the `--hook-inject` program, if configured, with the artifact path.
pub fn run_inject_hook(settings: &Settings, artifact: &std::path::Path) -> crate::Result<()> {
    let Some(hook) = &settings.hook_inject else {
        return Ok(());
    };
    log::info!("Running inject hook: {hook}");
    let status = std::process::Command::new(hook)
        .arg(artifact)
        .status()
        .map_err(|e| crate::Error::Hook(format!("{hook}: {e}")))?;
    if !status.success() {
        return Err(crate::Error::Hook(format!("{hook} exited with {status}")));
    }
    Ok(())
}
