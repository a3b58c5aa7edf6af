//! obstream - Inspect serialized object streams
//!
//! This tool decodes binary object-graph streams (magic `AC ED`, version 5)
//! and prints the decoded contents as an indented tree or as summary counts.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use obstream_core::input::{STREAM_MAGIC, STREAM_VERSION};
use obstream_core::render::walk;
use obstream_core::{
    Content, DecoderConfig, GraphRenderer, ObjectInputStream, RenderConfig, StatsVisitor,
};
use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect serialized object streams
#[derive(Parser, Debug)]
#[command(name = "obstream")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    format: OutputFormat,

    /// Do not pre-register handlers for boxed primitives and collections
    #[arg(long)]
    no_builtins: bool,

    /// Maximum object nesting accepted by the decoder
    #[arg(long, default_value = "512")]
    max_depth: usize,

    /// Maximum nesting printed in tree output
    #[arg(long, default_value = "64")]
    render_depth: usize,

    /// Print object ids only on back-references
    #[arg(long)]
    hide_ids: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single stream file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of stream files to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for decoded streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Indented tree of every decoded content
    Tree,
    /// Node counts by kind
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Process a single stream file
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let (output, failure) = inspect(cli, file)?;
    print!("{}", output);
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Process every stream file under a directory
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut processed = 0;
    let mut failed = 0;

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        if !is_likely_stream(path) {
            trace!("Skipping non-stream: {}", path.display());
            continue;
        }

        debug!("Processing stream: {}", path.display());
        println!("==> {} <==", path.display());
        match inspect(cli, path) {
            Ok((output, failure)) => {
                print!("{}", output);
                if let Some(e) = failure {
                    warn!("Error processing {}: {:#}", path.display(), e);
                    failed += 1;
                }
            }
            Err(e) => {
                // Log error but continue with other files
                warn!("Error processing {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
        processed += 1;
    }

    info!("Processed {} streams, {} failed", processed, failed);
    Ok(())
}

/// Checks the stream header without reading the whole file
fn is_likely_stream(path: &Path) -> bool {
    let mut header = [0u8; 4];
    let read = fs::File::open(path).and_then(|mut file| file.read_exact(&mut header));
    if read.is_err() {
        return false;
    }
    header[..2] == STREAM_MAGIC.to_be_bytes() && header[2..] == STREAM_VERSION.to_be_bytes()
}

/// Decodes one file and formats its contents
///
/// Contents decoded before a failure are still formatted and returned along
/// with the failure.
fn inspect(cli: &Cli, path: &Path) -> Result<(String, Option<anyhow::Error>)> {
    trace!("Reading {}", path.display());
    let data = fs::read(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let config = DecoderConfig::new()
        .register_builtins(!cli.no_builtins)
        .max_depth(cli.max_depth);
    let mut stream = ObjectInputStream::with_config(data, config)
        .with_context(|| format!("Not a valid object stream: {}", path.display()))?;

    let mut contents: Vec<Content> = Vec::new();
    let mut failure = None;
    for content in stream.contents() {
        match content {
            Ok(content) => contents.push(content),
            Err(e) => failure = Some(e),
        }
    }
    debug!(
        "Decoded {} contents ({} objects) from {}",
        contents.len(),
        stream.heap().len(),
        path.display()
    );

    let output = match cli.format {
        OutputFormat::Tree => {
            let config = RenderConfig::new()
                .show_ids(!cli.hide_ids)
                .max_depth(cli.render_depth);
            GraphRenderer::with_config(stream.heap(), config).render(&contents)
        }
        OutputFormat::Stats => format_stats(&stream, &contents),
    };

    let failure = failure.map(|e| {
        anyhow::Error::new(e).context(format!(
            "Failed to decode {} at offset {}",
            path.display(),
            stream.offset()
        ))
    });
    Ok((output, failure))
}

fn format_stats(stream: &ObjectInputStream, contents: &[Content]) -> String {
    let mut stats = StatsVisitor::default();
    walk(stream.heap(), contents, &mut stats);

    let mut out = String::new();
    let rows = [
        ("contents", contents.len()),
        ("instances", stats.instance_count),
        ("arrays", stats.array_count),
        ("strings", stats.string_count),
        ("enums", stats.enum_count),
        ("class descriptors", stats.class_desc_count),
        ("classes", stats.class_count),
        ("collections", stats.collection_count),
        ("maps", stats.map_count),
        ("block data bytes", stats.block_data_bytes),
        ("handle resets", stream.handles().epoch() as usize),
    ];
    for (label, count) in rows {
        let _ = writeln!(out, "{:<18} {}", label, count);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Header, then TC_STRING "hi" and a two-byte block
    const SAMPLE: &[u8] = &[
        0xAC, 0xED, 0x00, 0x05, 0x74, 0x00, 0x02, b'h', b'i', 0x77, 0x02, 0xCA, 0xFE,
    ];

    fn cli_for(path: &Path, format: OutputFormat) -> Cli {
        Cli {
            input: InputMode {
                file: Some(path.to_path_buf()),
                directory: None,
            },
            verbose: 0,
            format,
            no_builtins: false,
            max_depth: 512,
            render_depth: 64,
            hide_ids: false,
        }
    }

    #[test]
    fn test_is_likely_stream() {
        let temp_dir = TempDir::new().unwrap();
        let stream = temp_dir.path().join("a.ser");
        let other = temp_dir.path().join("b.txt");
        let short = temp_dir.path().join("c.bin");
        fs::write(&stream, SAMPLE).unwrap();
        fs::write(&other, b"hello world").unwrap();
        fs::write(&short, [0xAC, 0xED]).unwrap();

        assert!(is_likely_stream(&stream));
        assert!(!is_likely_stream(&other));
        assert!(!is_likely_stream(&short));
        assert!(!is_likely_stream(&temp_dir.path().join("missing")));
    }

    #[test]
    fn test_inspect_tree() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.ser");
        fs::write(&path, SAMPLE).unwrap();

        let (output, failure) = inspect(&cli_for(&path, OutputFormat::Tree), &path).unwrap();
        assert_eq!(output, "string @0 \"hi\"\nblock (2 bytes) ca fe\n");
        assert!(failure.is_none());
    }

    #[test]
    fn test_inspect_stats() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.ser");
        fs::write(&path, SAMPLE).unwrap();

        let (output, _) = inspect(&cli_for(&path, OutputFormat::Stats), &path).unwrap();
        assert!(output.contains("strings            1"));
        assert!(output.contains("block data bytes   2"));
    }

    #[test]
    fn test_inspect_rejects_bad_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.ser");
        fs::write(&path, [0xCA, 0xFE, 0xBA, 0xBE]).unwrap();

        assert!(inspect(&cli_for(&path, OutputFormat::Tree), &path).is_err());
    }

    #[test]
    fn test_inspect_returns_partial_output_with_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("truncated.ser");
        // The string decodes, then an unknown type code follows
        let mut data = SAMPLE[..9].to_vec();
        data.push(0x69);
        fs::write(&path, data).unwrap();

        let (output, failure) = inspect(&cli_for(&path, OutputFormat::Tree), &path).unwrap();
        assert_eq!(output, "string @0 \"hi\"\n");
        let failure = failure.expect("decode failure");
        assert!(format!("{:#}", failure).contains("at offset"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
