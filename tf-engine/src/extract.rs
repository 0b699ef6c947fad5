//! Extraction driver: work-dir lifecycle, format dispatch, artifact output.

use crate::blocks::extract_blocks;
use crate::dom::{parse_xml, SerializeOptions};
use crate::formats;
use crate::state::State;
use crate::stream::{StreamCodec, StreamKind};
use crate::{Document, Error, Result, Settings};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Run an extraction. Returns the work directory holding `original`,
/// `styled.xml`, `content.xml`, `extracted`, and the state store.
///
/// When the work directory already contains an `extracted` file, the prior
/// extraction is reused and only the stream emission step runs again. That is
/// an idempotence contract for one extract/inject lifecycle, not a
/// concurrency guarantee.
pub fn extract(mut settings: Settings) -> Result<PathBuf> {
    if settings.stream == StreamKind::Detect {
        settings.stream = StreamKind::Apertium;
    }

    let work_dir = resolve_work_dir(&settings)?;
    if settings.no_keep {
        log::info!("Removing state folder {}", work_dir.display());
        let _ = fs::remove_dir_all(&work_dir);
    }
    fs::create_dir_all(&work_dir)
        .map_err(|e| Error::WorkDirUnavailable(format!("{}: {e}", work_dir.display())))?;
    log::info!("State folder: {}", work_dir.display());

    let stream_kind = settings.stream;
    let apertium_n = settings.apertium_n;

    let mut doc = if !work_dir.join("extracted").exists() {
        snapshot_original(&settings, &work_dir)?;

        let input_name = settings
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());
        let format = if settings.format == "auto" {
            formats::detect(&work_dir, &settings.input)?
        } else {
            settings.format.clone()
        };
        log::info!("Document format: {format}");

        let mut state = State::open(&work_dir, settings, false)?;
        state.set_name(&input_name)?;
        state.set_format(&format)?;
        state.set_stream(stream_kind.name())?;

        formats::extract(&format, &mut state)?
    } else {
        // Reuse the prior extraction: reparse the styled tree and emit again.
        log::info!("Reusing existing extraction");
        let styled = fs::read_to_string(work_dir.join("styled.xml"))?;
        Document::new(parse_xml(&styled)?, Default::default())
    };

    let codec = StreamCodec::new(stream_kind, apertium_n);
    let stream_body = extract_blocks(&mut doc.dom, &doc.tags, &codec, &work_dir);
    fs::write(work_dir.join("extracted"), &stream_body)?;

    let content = doc.dom.serialize(&SerializeOptions {
        xml_decl: true,
        ..Default::default()
    });
    fs::write(work_dir.join("content.xml"), &content)?;

    log::info!("Extracted");
    Ok(work_dir)
}

fn resolve_work_dir(settings: &Settings) -> Result<PathBuf> {
    if let Some(dir) = &settings.work_dir {
        return Ok(dir.clone());
    }
    let dir = tempfile::Builder::new()
        .prefix("transfuse-")
        .tempdir()
        .map_err(|e| Error::WorkDirUnavailable(e.to_string()))?;
    // Lifetime is managed by the keep/no-keep flags, not by scope.
    Ok(dir.into_path())
}

/// Copy the input into the work dir so every later pass reads one stable file.
fn snapshot_original(settings: &Settings, work_dir: &Path) -> Result<()> {
    let target = work_dir.join("original");
    if settings.input == Path::new("-") {
        log::info!("Reading original from stdin");
        let mut buf = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buf)?;
        fs::write(&target, buf)?;
    } else {
        log::info!("Copying original from {}", settings.input.display());
        fs::copy(&settings.input, &target)
            .map_err(|_| Error::InputMissing(settings.input.display().to_string()))?;
    }
    Ok(())
}
