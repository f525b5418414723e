use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which table a flat record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Post,
    User,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Post => "post",
            RecordKind::User => "user",
        }
    }

    /// Base name of the JSON Lines file holding records of this kind
    pub fn table_name(self) -> &'static str {
        match self {
            RecordKind::Post => "posts",
            RecordKind::User => "users",
        }
    }
}

/// One flat, schema-conformant output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub kind: RecordKind,

    /// Column name -> value
    pub data: Map<String, Value>,
}

impl FlatRecord {
    pub fn new(kind: RecordKind, data: Map<String, Value>) -> Self {
        FlatRecord { kind, data }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Decode the raw-payload column back into the source structure
    pub fn raw_payload(&self, raw_key: &str) -> Option<Value> {
        match self.data.get(raw_key) {
            Some(Value::String(text)) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }
}

/// Input to the decomposer: either raw UTF-8 JSON bytes or a decoded tree
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Raw(&'a [u8]),
    Json(&'a Value),
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Raw(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Payload::Raw(bytes.as_slice())
    }
}

impl<'a> From<&'a Value> for Payload<'a> {
    fn from(value: &'a Value) -> Self {
        Payload::Json(value)
    }
}

/// Configuration for one melting run
#[derive(Debug, Clone)]
pub struct MeltConfig {
    /// Query tag stamped into every post record
    pub query: String,

    /// Join list values with this string instead of emitting arrays
    pub delimiter: Option<String>,

    /// Maximum envelope and repost nesting depth
    pub max_depth: usize,

    /// Column holding the serialized source object
    pub raw_key: String,

    /// Column holding the query tag
    pub query_key: String,

    /// Whether `melt` also emits user records
    pub include_users: bool,
}

impl Default for MeltConfig {
    fn default() -> Self {
        MeltConfig {
            query: String::new(),
            delimiter: None,
            max_depth: 10,
            raw_key: String::from("raw"),
            query_key: String::from("query"),
            include_users: true,
        }
    }
}

impl MeltConfig {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: Option<String>) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Build a query tag from search terms: each term quoted, joined with ` OR `.
///
/// Terms that already start with a double quote are used as given.
pub fn query_tag<S: AsRef<str>>(terms: &[S]) -> String {
    terms
        .iter()
        .map(|term| {
            let term = term.as_ref();
            if term.starts_with('"') {
                term.to_string()
            } else {
                format!("\"{}\"", term)
            }
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}
