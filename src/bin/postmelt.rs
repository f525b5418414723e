//! postmelt: Flatten social-media posts into post and user tables
//!
//! Usage:
//!   # One post from a file, records to stdout
//!   postmelt --query olympics tweet.json
//!
//!   # Stream NDJSON from stdin, write <query>_posts.jsonl / <query>_users.jsonl
//!   cat stream.jsonl | postmelt --ndjson --query olympics "swim-dive set" -o ./out
//!
//!   # Delimited multi-value columns instead of arrays
//!   postmelt --ndjson --delim '|' stream.jsonl

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use postmelt::melt::{RecordSink, RecordWriter, SingleWriter};
use postmelt::{melt_posts, query_tag, FieldRegistry, MeltConfig, MeltStats, PostMelter};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "postmelt")]
#[command(about = "Flatten social-media posts into post and user records", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Process newline-delimited JSON (one post per line)
    #[arg(long)]
    ndjson: bool,

    /// Search terms the posts were collected for; stamped into every post record
    #[arg(long, num_args = 1..)]
    query: Vec<String>,

    /// Join multi-value fields with this delimiter instead of emitting arrays
    #[arg(long)]
    delim: Option<String>,

    /// Stop after this many posts
    #[arg(long)]
    limit: Option<usize>,

    /// Output directory for <query>_posts.jsonl and <query>_users.jsonl.
    /// If omitted, writes to stdout as a single stream with a _kind column
    #[arg(long, short = 'o')]
    output_dir: Option<String>,

    /// Skip user extraction
    #[arg(long)]
    no_users: bool,

    /// JSON field registry replacing the built-in post schema
    #[arg(long)]
    registry: Option<String>,

    /// Maximum envelope/repost nesting depth (default: 10)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let registry = match &args.registry {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry file: {}", path))?;
            FieldRegistry::from_json(&text)
                .with_context(|| format!("Failed to load registry file: {}", path))?
        }
        None => FieldRegistry::default(),
    };

    // Build config
    let mut config = MeltConfig::default()
        .with_query(query_tag(&args.query))
        .with_delimiter(args.delim.clone());
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
    config.include_users = !args.no_users;

    if let Some(delim) = &config.delimiter {
        info!(delimiter = %delim, "Multi-value fields will be joined into strings");
    }
    info!(query = %config.query, "Melting posts");

    let melter = PostMelter::new(registry, config);

    let reader: Box<dyn Read> = if let Some(file_path) = &args.input {
        Box::new(BufReader::new(
            File::open(file_path).with_context(|| format!("Failed to open input: {}", file_path))?,
        ))
    } else {
        Box::new(std::io::stdin())
    };

    let mut sink: Box<dyn RecordSink> = match &args.output_dir {
        Some(dir) => {
            info!(output_dir = %dir, "Writing post and user tables");
            Box::new(RecordWriter::new(dir, &melter.config().query)?)
        }
        None => Box::new(SingleWriter::new(std::io::stdout().lock())),
    };

    let stats = if args.ndjson {
        melt_posts(BufReader::new(reader), sink.as_mut(), &melter, args.limit)?
    } else {
        melt_document(reader, sink.as_mut(), &melter, args.limit)?
    };
    sink.flush()?;

    info!(
        posts_read = stats.posts_read,
        posts_skipped = stats.posts_skipped,
        post_records = stats.post_records,
        user_records = stats.user_records,
        "Finished melting"
    );

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries records, so logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Melt a single JSON document: one post, or a top-level array of posts
fn melt_document(
    reader: Box<dyn Read>,
    sink: &mut dyn RecordSink,
    melter: &PostMelter,
    limit: Option<usize>,
) -> Result<MeltStats> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_to_end(&mut content)?;

    // Try SIMD parsing first, fall back to serde_json for a precise error
    let value: Value = match simd_json::serde::from_slice(&mut content.clone()) {
        Ok(value) => value,
        Err(_) => serde_json::from_slice(&content).context("Failed to parse input JSON")?,
    };

    let posts = match value {
        Value::Array(mut posts) => {
            if let Some(limit) = limit {
                posts.truncate(limit);
            }
            posts
        }
        other => vec![other],
    };

    let mut stats = MeltStats::default();
    for result in melter.melt_batch(&posts) {
        match result {
            Ok(records) => {
                stats.record(&records);
                sink.write_records(records)?;
            }
            Err(e) => {
                warn!(error = %e, "Skipping post that could not be decomposed");
                stats.posts_skipped += 1;
            }
        }
    }

    Ok(stats)
}
