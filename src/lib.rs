//! # Postmelt - Social-Media Post Flattening
//!
//! Turns arbitrarily nested social-media post payloads (authors, reposts,
//! mentions, hashtags, places, point geometries) into flat records ready for
//! columnar storage or publication on a message bus.
//!
//! ## Modules
//!
//! - **registry**: field schema registry and per-field classification
//! - **extractor**: reference, object and coordinate extraction
//! - **normalize**: array vs. delimited-string output modes
//! - **melt**: post decomposition, user extraction and record writers
//!
//! ## Quick Start
//!
//! ```rust
//! use postmelt::{MeltConfig, PostMelter};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let post = json!({
//!     "id": 1,
//!     "text": "RT original",
//!     "user": {"id": 5, "name": "B"},
//!     "retweeted_status": {"id": 2, "text": "original", "user": {"id": 9, "name": "A"}}
//! });
//!
//! let melter = PostMelter::with_config(MeltConfig::default().with_query("rust"));
//! let posts = melter.decompose(&post)?;
//! let users = melter.extract_users(&post);
//!
//! // posts[0] = outer post (user = 5, retweeted_status = 2)
//! // posts[1] = the embedded repost
//! // users = one record per author object, in document order
//! assert_eq!(posts.len(), 2);
//! assert_eq!(users.len(), 2);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::BufRead;
use tracing::warn;

pub mod error;
pub mod extractor;
pub mod melt;
pub mod normalize;
pub mod registry;
pub mod types;

// Re-export commonly used types for convenience
pub use error::MeltError;
pub use melt::{decompose_post, extract_users, PostMelter, RecordSink, RecordWriter, SingleWriter};
pub use registry::{FieldClass, FieldRegistry, RegistrySpec, DEFAULT_REGISTRY};
pub use types::{query_tag, FlatRecord, MeltConfig, Payload, RecordKind};

/// Counters for one melting run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MeltStats {
    pub posts_read: usize,
    pub posts_skipped: usize,
    pub post_records: usize,
    pub user_records: usize,
}

impl MeltStats {
    pub fn record(&mut self, records: &[FlatRecord]) {
        self.posts_read += 1;
        for record in records {
            match record.kind {
                RecordKind::Post => self.post_records += 1,
                RecordKind::User => self.user_records += 1,
            }
        }
    }
}

/// Melt a newline-delimited stream of posts into `sink`.
///
/// Lines that cannot be decomposed are logged and skipped; I/O and write
/// failures abort the run.
pub fn melt_posts<R: BufRead, S: RecordSink + ?Sized>(
    reader: R,
    sink: &mut S,
    melter: &PostMelter,
    limit: Option<usize>,
) -> Result<MeltStats> {
    let mut stats = MeltStats::default();

    for line in reader.lines() {
        if limit.is_some_and(|limit| stats.posts_read >= limit) {
            break;
        }
        let line = line.context("Failed to read line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value = match parse_line(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Skipping line that is not valid JSON");
                stats.posts_skipped += 1;
                continue;
            }
        };

        match melter.melt(&value) {
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

/// SIMD parse first, serde_json on failure for a precise error
fn parse_line(line: &str) -> serde_json::Result<Value> {
    let mut bytes = line.as_bytes().to_vec();
    match simd_json::serde::from_slice(&mut bytes) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(line),
    }
}
