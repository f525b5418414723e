//! Post melting - flatten social-media posts into relational rows
//!
//! A single post payload becomes one post record, one extra post record per
//! embedded repost, and one user record per author object found anywhere in
//! the payload.

pub mod decomposer;
pub mod users;
pub mod writer;

pub use decomposer::{decompose_post, PostMelter};
pub use users::extract_users;
pub use writer::{file_prefix, RecordSink, RecordWriter, SingleWriter};
