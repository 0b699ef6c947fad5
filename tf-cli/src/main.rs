// Command-line interface for transfuse
//
// One binary, three operating modes: extract a document into a translation
// stream, inject a translated stream back into the document, or clean
// (extract and immediately inject again, which normalizes documents for CAT
// tools). The mode comes from --mode or from the name the binary was invoked
// as (tf-extract, tf-inject, tf-clean).
//
// Usage:
//  transfuse [options] [input-file] [output-file]
//
// The pipeline itself lives in tf-engine; this layer only parses options,
// wires stdin/stdout, and owns the work-directory keep/delete policy.

use clap::{Arg, ArgAction, Command};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tf_engine::{hash, Settings, StreamKind};

fn build_command() -> Command {
    let mut cmd = Command::new("transfuse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Extracts translatable content from documents and injects translations back")
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("input file format: text, html, html-fragment, line, odt, odp, docx, pptx, tei; defaults to auto"),
        )
        .arg(
            Arg::new("stream")
                .short('s')
                .long("stream")
                .value_name("STREAM")
                .help("stream format: apertium, visl, cg; defaults to detect"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("operating mode: extract, inject, clean; default depends on executable name"),
        )
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_name("DIR")
                .help("folder to store state in (implies -k); defaults to creating a temporary"),
        )
        .arg(
            Arg::new("keep")
                .short('k')
                .long("keep")
                .action(ArgAction::SetTrue)
                .help("don't delete the state folder after injection"),
        )
        .arg(
            Arg::new("no-keep")
                .short('K')
                .long("no-keep")
                .action(ArgAction::SetTrue)
                .help("recreate the state folder before extraction and delete it after injection"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("input file, if not passed as arg; default and - is stdin"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("output file, if not passed as arg; default and - is stdout"),
        )
        .arg(
            Arg::new("mark-headers")
                .short('H')
                .long("mark-headers")
                .action(ArgAction::SetTrue)
                .help("append \u{2761} to blocks extracted from header elements"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("report progress on stderr"),
        )
        .arg(
            Arg::new("apertium-n")
                .long("apertium-n")
                .action(ArgAction::SetTrue)
                .help("suppress the .[] block terminator in the apertium stream"),
        )
        .arg(
            Arg::new("inject-raw")
                .long("inject-raw")
                .action(ArgAction::SetTrue)
                .help("splice translations verbatim, without XML entity re-escaping"),
        )
        .arg(
            Arg::new("no-extend")
                .long("no-extend")
                .action(ArgAction::SetTrue)
                .help("don't extend inline spans over neighboring alphanumerics"),
        )
        .arg(
            Arg::new("hook-inject")
                .long("hook-inject")
                .value_name("CMD")
                .help("program to run after injection, receiving the output filename"),
        )
        .arg(
            Arg::new("url64")
                .long("url64")
                .value_name("VALUE")
                .help("base64-url encode the passed value and exit"),
        )
        .arg(
            Arg::new("hash32")
                .long("hash32")
                .value_name("VALUE")
                .help("xxhash32 + base64-url encode the passed value and exit"),
        )
        .arg(
            Arg::new("hash64")
                .long("hash64")
                .value_name("VALUE")
                .help("xxhash64 + base64-url encode the passed value and exit"),
        )
        .arg(Arg::new("in-file").value_name("INPUT").index(1))
        .arg(Arg::new("out-file").value_name("OUTPUT").index(2));

    // One override option per named tag set; a leading + in the value list
    // extends the configured set instead of replacing it.
    for name in tf_config::SET_NAMES {
        cmd = cmd.arg(
            Arg::new(name)
                .long(name)
                .value_name("LIST")
                .hide(true)
                .help("override or extend (+) a tag set"),
        );
    }
    cmd
}

fn main() {
    match run() {
        Ok(()) => {}
        Err(e) => {
            eprintln!("transfuse: {e}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let matches = build_command().get_matches();

    // Diagnostics short-circuit everything else.
    if let Some(v) = matches.get_one::<String>("url64") {
        println!("{}", hash::encode_url64(v.as_bytes()));
        return Ok(());
    }
    if let Some(v) = matches.get_one::<String>("hash32") {
        println!("{}", hash::hash32_url64(v.as_bytes()));
        return Ok(());
    }
    if let Some(v) = matches.get_one::<String>("hash64") {
        println!("{}", hash::hash64_url64(v.as_bytes()));
        return Ok(());
    }

    let verbose = matches.get_flag("verbose");
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "info" } else { "warn" }),
    )
    .format_timestamp(None)
    .init();

    let mode = match matches.get_one::<String>("mode") {
        Some(m) => m.clone(),
        None => mode_from_program_name(),
    };

    let mut settings = Settings::new();
    settings.verbose = verbose;
    if let Some(f) = matches.get_one::<String>("format") {
        settings.format = f.clone();
    }
    if let Some(s) = matches.get_one::<String>("stream") {
        settings.stream = StreamKind::from_name(s)
            .ok_or_else(|| format!("unknown stream format: {s}"))?;
    }
    let explicit_dir = matches.get_one::<String>("dir").map(PathBuf::from);
    settings.work_dir = explicit_dir.clone();
    settings.no_keep = matches.get_flag("no-keep");
    // --dir implies --keep; --no-keep wins over both.
    settings.keep =
        (matches.get_flag("keep") || explicit_dir.is_some()) && !settings.no_keep;
    settings.mark_headers = matches.get_flag("mark-headers");
    settings.apertium_n = matches.get_flag("apertium-n");
    settings.inject_raw = matches.get_flag("inject-raw");
    settings.no_extend = matches.get_flag("no-extend");
    settings.hook_inject = matches.get_one::<String>("hook-inject").cloned();
    for name in tf_config::SET_NAMES {
        if let Some(list) = matches.get_one::<String>(name) {
            settings.tag_overrides.insert(name, list);
        }
    }
    settings.config = tf_config::load()?;

    // Funnel remaining positionals into input and output.
    let mut input = matches.get_one::<String>("input").map(PathBuf::from);
    let mut output = matches.get_one::<String>("out-file").map(PathBuf::from);
    if let Some(pos) = matches.get_one::<String>("in-file") {
        if input.is_none() {
            input = Some(PathBuf::from(pos));
        } else if output.is_none() {
            output = Some(PathBuf::from(pos));
        }
    }
    if let Some(o) = matches.get_one::<String>("output") {
        output = Some(PathBuf::from(o));
    }
    settings.input = input.unwrap_or_else(|| PathBuf::from("-"));
    let output = output.unwrap_or_else(|| PathBuf::from("-"));

    let keep = settings.keep;
    match mode.as_str() {
        "extract" => {
            let work_dir = tf_engine::extract(settings)?;
            emit_file(&work_dir.join("extracted"), &output)?;
        }
        "inject" => {
            let mut reader = open_input(&settings.input)?;
            let (work_dir, artifact) = tf_engine::inject(settings, &mut reader)?;
            emit_file(&artifact, &output)?;
            if !keep {
                let _ = fs::remove_dir_all(&work_dir);
            }
        }
        "clean" => {
            let inject_settings = {
                let mut s = settings.clone();
                s.input = PathBuf::from("-");
                s
            };
            let work_dir = tf_engine::extract(settings)?;
            let mut reader = BufReader::new(fs::File::open(work_dir.join("extracted"))?);
            let (work_dir, artifact) = tf_engine::inject(inject_settings, &mut reader)?;
            emit_file(&artifact, &output)?;
            if !keep {
                let _ = fs::remove_dir_all(&work_dir);
            }
        }
        other => return Err(format!("unknown mode: {other}").into()),
    }
    Ok(())
}

/// tf-extract, tf-inject, and tf-clean are the same binary under different
/// names.
fn mode_from_program_name() -> String {
    let exe = std::env::args()
        .next()
        .map(PathBuf::from)
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();
    match exe.as_str() {
        "tf-extract" => "extract".to_string(),
        "tf-inject" => "inject".to_string(),
        _ => "clean".to_string(),
    }
}

fn open_input(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buf)?;
        Ok(Box::new(BufReader::new(std::io::Cursor::new(buf))))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(path)?)))
    }
}

fn emit_file(artifact: &Path, output: &Path) -> std::io::Result<()> {
    let data = fs::read(artifact)?;
    if output == Path::new("-") {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(&data)?;
        lock.flush()
    } else {
        fs::write(output, data)
    }
}
