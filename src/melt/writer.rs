use crate::types::{FlatRecord, RecordKind};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Destination for melted records
pub trait RecordSink {
    fn write_records(&mut self, records: Vec<FlatRecord>) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// Turn a query tag into a file-name-safe prefix
pub fn file_prefix(query: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(query, "_").into_owned()
}

/// Writes records to JSON Lines files in a directory, one file per record kind
pub struct RecordWriter {
    output_dir: PathBuf,
    prefix: String,
    writers: HashMap<RecordKind, BufWriter<File>>,
    counts: HashMap<RecordKind, usize>,
}

impl RecordWriter {
    /// Files are named `<prefix>_posts.jsonl` and `<prefix>_users.jsonl`
    /// (just `posts.jsonl` when the prefix is empty).
    pub fn new<P: AsRef<Path>>(output_dir: P, query: &str) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).context("Failed to create output directory")?;

        Ok(RecordWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            prefix: file_prefix(query),
            writers: HashMap::new(),
            counts: HashMap::new(),
        })
    }

    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        table_path(&self.output_dir, &self.prefix, kind)
    }

    /// Number of records written so far for `kind`
    pub fn count(&self, kind: RecordKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

impl RecordSink for RecordWriter {
    fn write_records(&mut self, records: Vec<FlatRecord>) -> Result<()> {
        for record in records {
            let writer = match self.writers.entry(record.kind) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let path = table_path(&self.output_dir, &self.prefix, record.kind);
                    let file = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .with_context(|| format!("Failed to open file: {}", path.display()))?;
                    entry.insert(BufWriter::new(file))
                }
            };
            let json = serde_json::to_string(&record.data).context("Failed to serialize record")?;
            writeln!(writer, "{}", json).context("Failed to write record")?;
            *self.counts.entry(record.kind).or_insert(0) += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush().context("Failed to flush writer")?;
        }
        Ok(())
    }
}

fn table_path(output_dir: &Path, prefix: &str, kind: RecordKind) -> PathBuf {
    let name = if prefix.is_empty() {
        format!("{}.jsonl", kind.table_name())
    } else {
        format!("{}_{}.jsonl", prefix, kind.table_name())
    };
    output_dir.join(name)
}

/// Writes all records to a single stream, tagging each with a `_kind` column
pub struct SingleWriter<W: Write> {
    writer: W,
    counts: HashMap<RecordKind, usize>,
}

impl<W: Write> SingleWriter<W> {
    pub fn new(writer: W) -> Self {
        SingleWriter {
            writer,
            counts: HashMap::new(),
        }
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

impl<W: Write> RecordSink for SingleWriter<W> {
    fn write_records(&mut self, records: Vec<FlatRecord>) -> Result<()> {
        for record in records {
            let mut data = record.data;
            data.insert(
                "_kind".to_string(),
                serde_json::Value::String(record.kind.as_str().to_string()),
            );

            let json = serde_json::to_string(&data).context("Failed to serialize record")?;
            writeln!(self.writer, "{}", json).context("Failed to write record")?;
            *self.counts.entry(record.kind).or_insert(0) += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}
