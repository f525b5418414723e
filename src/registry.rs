//! Field schema registry
//!
//! Classifies every field name a post may carry into exactly one extraction
//! strategy. The classification is resolved once, when the registry is
//! built, so the decomposer only does a single map lookup per field.

use crate::error::{MeltError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Envelope keys unwrapped before classification, in lookup order.
pub const ENVELOPE_KEYS: [&str; 2] = ["tweet", "data"];

/// Field holding an embedded repost, decomposed into its own record.
pub const REPOST_FIELD: &str = "retweeted_status";

/// Field holding an author object.
pub const USER_FIELD: &str = "user";

/// Field whose inner map holds entity lists keyed by entity type.
pub const ENTITIES_FIELD: &str = "entities";

/// Shared default registry for social-media posts.
pub static DEFAULT_REGISTRY: Lazy<Arc<FieldRegistry>> = Lazy::new(|| {
    Arc::new(FieldRegistry::new(RegistrySpec::default()).expect("default registry spec is valid"))
});

/// How a top-level field is turned into output columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldClass {
    /// Copied verbatim
    Scalar,
    /// Entity reference stored as its first resolved value
    SingleReference { subfield: String },
    /// Entity reference stored as the full list of resolved values
    Reference { subfield: String },
    /// Nested object flattened into `<field>_<key>` columns
    Object { inner_keys: Vec<String> },
    /// Point geometry split into named axis columns
    Coordinates { output_names: Vec<String> },
    /// Map of entity type to entity list
    Entities,
}

/// Declarative form of the registry, loadable from JSON.
///
/// Sections missing from a JSON document keep their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySpec {
    pub scalar_fields: Vec<String>,

    /// Reference fields that hold at most one entity
    pub single_reference_fields: Vec<String>,

    /// Field name -> sub-field identifying the referenced entity
    pub reference_fields: BTreeMap<String, String>,

    /// Field name -> inner keys to flatten, in output order
    pub object_fields: BTreeMap<String, Vec<String>>,

    /// Field name -> output names, positionally matching the source pair
    pub coordinate_fields: BTreeMap<String, Vec<String>>,

    /// List-valued fields that are never emitted as null
    pub multi_value_fields: Vec<String>,

    /// Projection applied to every discovered user object
    pub user_fields: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RegistrySpec {
    fn default() -> Self {
        let reference_fields = [
            ("user", "id"),
            ("retweeted_status", "id"),
            ("hashtags", "text"),
            ("user_mentions", "id"),
            ("symbols", "text"),
            ("extended_tweet", "full_text"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut object_fields = BTreeMap::new();
        object_fields.insert(
            "place".to_string(),
            strings(&["name", "full_name", "country_code", "country", "place_type"]),
        );

        // "geo" is the legacy encoding and stores latitude first.
        let mut coordinate_fields = BTreeMap::new();
        coordinate_fields.insert("coordinates".to_string(), strings(&["longitude", "latitude"]));
        coordinate_fields.insert("geo".to_string(), strings(&["latitude", "longitude"]));

        RegistrySpec {
            scalar_fields: strings(&[
                "created_at",
                "id",
                "id_str",
                "text",
                "in_reply_to_status_id",
                "in_reply_to_status_id_str",
                "in_reply_to_user_id",
                "in_reply_to_user_id_str",
                "in_reply_to_screen_name",
                "contributors",
                "quoted_status_id",
                "quoted_status_id_str",
                "is_quote_status",
                "quote_count",
                "reply_count",
                "retweet_count",
                "favorite_count",
                "favorited",
                "retweeted",
                "lang",
                "timestamp_ms",
            ]),
            single_reference_fields: strings(&[USER_FIELD, REPOST_FIELD]),
            reference_fields,
            object_fields,
            coordinate_fields,
            multi_value_fields: strings(&["hashtags", "user_mentions", "symbols", "extended_tweet"]),
            user_fields: strings(&[
                "id",
                "id_str",
                "name",
                "screen_name",
                "location",
                "description",
                "followers_count",
                "friends_count",
                "listed_count",
                "favourites_count",
                "statuses_count",
                "created_at",
                "following",
                "follow_request_sent",
                "notifications",
            ]),
        }
    }
}

/// Immutable, resolved field registry
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    spec: RegistrySpec,
    classes: HashMap<String, FieldClass>,
    user_fields: HashSet<String>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        FieldRegistry::clone(&DEFAULT_REGISTRY)
    }
}

impl FieldRegistry {
    /// Validate a spec and resolve the classification of every field it names.
    pub fn new(spec: RegistrySpec) -> Result<Self> {
        Self::validate(&spec)?;

        let entities = ENTITIES_FIELD.to_string();
        let mut names: Vec<&String> = spec
            .scalar_fields
            .iter()
            .chain(spec.single_reference_fields.iter())
            .chain(spec.reference_fields.keys())
            .chain(spec.object_fields.keys())
            .chain(spec.coordinate_fields.keys())
            .collect();
        names.push(&entities);

        let mut classes = HashMap::with_capacity(names.len());
        for name in names {
            if classes.contains_key(name) {
                continue;
            }
            if let Some(class) = Self::classify_name(&spec, name) {
                classes.insert(name.clone(), class);
            }
        }

        let user_fields = spec.user_fields.iter().cloned().collect();

        Ok(FieldRegistry {
            spec,
            classes,
            user_fields,
        })
    }

    /// Parse a JSON registry document and build a registry from it
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: RegistrySpec = serde_json::from_str(text)?;
        Self::new(spec)
    }

    fn validate(spec: &RegistrySpec) -> Result<()> {
        for field in &spec.single_reference_fields {
            if !spec.reference_fields.contains_key(field) {
                return Err(MeltError::Registry(format!(
                    "single reference field '{}' has no reference sub-field",
                    field
                )));
            }
        }
        for (field, keys) in &spec.object_fields {
            if keys.is_empty() {
                return Err(MeltError::Registry(format!(
                    "object field '{}' lists no inner keys",
                    field
                )));
            }
        }
        for (field, names) in &spec.coordinate_fields {
            if names.is_empty() {
                return Err(MeltError::Registry(format!(
                    "coordinate field '{}' lists no output names",
                    field
                )));
            }
        }
        Ok(())
    }

    /// First matching category wins.
    fn classify_name(spec: &RegistrySpec, name: &str) -> Option<FieldClass> {
        if spec.scalar_fields.iter().any(|f| f == name) {
            return Some(FieldClass::Scalar);
        }
        if let Some(subfield) = spec.reference_fields.get(name) {
            let subfield = subfield.clone();
            if spec.single_reference_fields.iter().any(|f| f == name) {
                return Some(FieldClass::SingleReference { subfield });
            }
            return Some(FieldClass::Reference { subfield });
        }
        if let Some(inner_keys) = spec.object_fields.get(name) {
            return Some(FieldClass::Object {
                inner_keys: inner_keys.clone(),
            });
        }
        if let Some(output_names) = spec.coordinate_fields.get(name) {
            return Some(FieldClass::Coordinates {
                output_names: output_names.clone(),
            });
        }
        if name == ENTITIES_FIELD {
            return Some(FieldClass::Entities);
        }
        None
    }

    /// Classification of a top-level field; `None` means the field is dropped.
    pub fn classify(&self, field: &str) -> Option<&FieldClass> {
        self.classes.get(field)
    }

    pub fn reference_subfield(&self, field: &str) -> Option<&str> {
        self.spec.reference_fields.get(field).map(String::as_str)
    }

    pub fn object_keys(&self, field: &str) -> Option<&[String]> {
        self.spec.object_fields.get(field).map(Vec::as_slice)
    }

    pub fn coordinate_names(&self, field: &str) -> Option<&[String]> {
        self.spec.coordinate_fields.get(field).map(Vec::as_slice)
    }

    pub fn multi_value_fields(&self) -> &[String] {
        &self.spec.multi_value_fields
    }

    pub fn is_user_field(&self, field: &str) -> bool {
        self.user_fields.contains(field)
    }

    pub fn spec(&self) -> &RegistrySpec {
        &self.spec
    }
}
