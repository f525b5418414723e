use crate::error::{json_type_name, MeltError, Result};
use crate::extractor::{extract_coordinates, flatten_object, resolve_reference};
use crate::normalize::normalize;
use crate::registry::{FieldClass, FieldRegistry, DEFAULT_REGISTRY, ENVELOPE_KEYS, REPOST_FIELD};
use crate::types::{FlatRecord, MeltConfig, Payload, RecordKind};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns social-media post payloads into flat post and user records.
///
/// Holds no mutable state, so one melter can be shared across threads.
#[derive(Debug, Clone)]
pub struct PostMelter {
    registry: Arc<FieldRegistry>,
    config: MeltConfig,
}

impl PostMelter {
    pub fn new(registry: impl Into<Arc<FieldRegistry>>, config: MeltConfig) -> Self {
        PostMelter {
            registry: registry.into(),
            config,
        }
    }

    /// Melter over the default social-media registry
    pub fn with_config(config: MeltConfig) -> Self {
        Self::new(Arc::clone(&DEFAULT_REGISTRY), config)
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MeltConfig {
        &self.config
    }

    /// Decompose one post into its own record followed by one record per
    /// embedded repost.
    pub fn decompose<'a>(&self, payload: impl Into<Payload<'a>>) -> Result<Vec<FlatRecord>> {
        let value = decode(payload.into())?;
        self.decompose_value(&value, 0)
    }

    /// Post records followed by user records for a single payload.
    ///
    /// User records are left out when `include_users` is off.
    pub fn melt<'a>(&self, payload: impl Into<Payload<'a>>) -> Result<Vec<FlatRecord>> {
        let value = decode(payload.into())?;
        let mut records = self.decompose_value(&value, 0)?;
        if self.config.include_users {
            records.extend(self.extract_users(&value));
        }
        Ok(records)
    }

    /// Melt many payloads in parallel. Results keep the input order.
    pub fn melt_batch(&self, payloads: &[Value]) -> Vec<Result<Vec<FlatRecord>>> {
        payloads.par_iter().map(|payload| self.melt(payload)).collect()
    }

    fn decompose_value(&self, payload: &Value, depth: usize) -> Result<Vec<FlatRecord>> {
        let (post, depth) = self.unwrap_envelopes(payload, depth)?;
        let Value::Object(fields) = post else {
            return Err(MeltError::NotAnObject {
                found: json_type_name(post),
            });
        };

        let mut row = Map::new();
        let mut reposts = Vec::new();

        for (field, value) in fields {
            if value.is_null() {
                continue;
            }

            match self.registry.classify(field) {
                Some(FieldClass::Scalar) => {
                    row.insert(field.clone(), value.clone());
                }
                Some(FieldClass::SingleReference { .. }) => {
                    let resolved = resolve_reference(&self.registry, field, value);
                    if let Some(first) = resolved.into_iter().next() {
                        row.insert(field.clone(), first);
                    }
                }
                Some(FieldClass::Reference { .. }) => {
                    let resolved = resolve_reference(&self.registry, field, value);
                    if !resolved.is_empty() {
                        row.insert(field.clone(), Value::Array(resolved));
                    }
                }
                Some(FieldClass::Object { .. }) => {
                    row.extend(flatten_object(&self.registry, field, value));
                }
                Some(FieldClass::Coordinates { .. }) => {
                    // Both point encodings keep the pair under an inner "coordinates" key.
                    if let Some(pair) = value.get("coordinates") {
                        if let Some(axes) = extract_coordinates(&self.registry, field, pair) {
                            row.extend(axes);
                        }
                    }
                }
                Some(FieldClass::Entities) => {
                    if let Value::Object(entities) = value {
                        for (entity_type, entity) in entities {
                            let resolved = resolve_reference(&self.registry, entity_type, entity);
                            if !resolved.is_empty() {
                                row.insert(entity_type.clone(), Value::Array(resolved));
                            }
                        }
                    }
                }
                None => {}
            }

            if field == REPOST_FIELD {
                match self.decompose_value(value, depth + 1) {
                    Ok(nested) => reposts.extend(nested),
                    Err(e) => {
                        warn!(error = %e, repost = %value, "Skipping unparseable embedded repost");
                    }
                }
            }
        }

        row.insert(
            self.config.query_key.clone(),
            Value::String(self.config.query.clone()),
        );

        for field in self.registry.multi_value_fields() {
            let missing = row.get(field).map_or(true, Value::is_null);
            if missing {
                row.insert(field.clone(), Value::Array(Vec::new()));
            }
        }

        row.insert(self.config.raw_key.clone(), Value::String(post.to_string()));

        let row = normalize(row, self.config.delimiter.as_deref());
        let id = row.get("id").unwrap_or(&Value::Null);
        debug!(id = %id, reposts = reposts.len(), "Decomposed post");

        let mut records = Vec::with_capacity(reposts.len() + 1);
        records.push(FlatRecord::new(RecordKind::Post, row));
        records.extend(reposts);
        Ok(records)
    }

    /// Strip `tweet`/`data` envelopes, counting each one against the depth limit.
    fn unwrap_envelopes<'v>(&self, mut payload: &'v Value, mut depth: usize) -> Result<(&'v Value, usize)> {
        loop {
            if depth > self.config.max_depth {
                return Err(MeltError::DepthExceeded {
                    limit: self.config.max_depth,
                });
            }
            let inner = ENVELOPE_KEYS
                .iter()
                .find_map(|key| payload.get(*key).filter(|v| !v.is_null()));
            match inner {
                Some(inner) => {
                    payload = inner;
                    depth += 1;
                }
                None => return Ok((payload, depth)),
            }
        }
    }
}

fn decode(payload: Payload<'_>) -> Result<Cow<'_, Value>> {
    match payload {
        Payload::Raw(bytes) => Ok(Cow::Owned(serde_json::from_slice(bytes)?)),
        Payload::Json(value) => Ok(Cow::Borrowed(value)),
    }
}

/// Decompose one post against the default registry.
pub fn decompose_post<'a>(
    payload: impl Into<Payload<'a>>,
    query: &str,
    delimiter: Option<&str>,
) -> Result<Vec<FlatRecord>> {
    let config = MeltConfig::default()
        .with_query(query)
        .with_delimiter(delimiter.map(str::to_string));
    PostMelter::with_config(config).decompose(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn melter(delimiter: Option<&str>) -> PostMelter {
        PostMelter::with_config(
            MeltConfig::default()
                .with_query("test")
                .with_delimiter(delimiter.map(str::to_string)),
        )
    }

    #[test]
    fn test_simple_post() {
        let input = json!({
            "id": 1,
            "text": "hi",
            "user": {"id": 5, "name": "B"},
            "weird_experimental_field": {"a": 1}
        });

        let records = melter(None).decompose(&input).unwrap();
        assert_eq!(records.len(), 1);

        let post = &records[0];
        assert_eq!(post.kind, RecordKind::Post);
        assert_eq!(post.get("id").unwrap(), 1);
        assert_eq!(post.get("text").unwrap(), "hi");
        assert_eq!(post.get("user").unwrap(), 5);
        assert_eq!(post.get("query").unwrap(), "test");
        assert!(!post.contains_key("weird_experimental_field"));
        assert_eq!(post.raw_payload("raw").unwrap(), input);
    }

    #[test]
    fn test_repost_yields_outer_first() {
        let input = json!({
            "id": 1,
            "text": "RT original",
            "retweeted_status": {"id": 2, "text": "original", "user": {"id": 9}},
            "user": {"id": 5}
        });

        let records = melter(None).decompose(&input).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].get("id").unwrap(), 1);
        assert_eq!(records[0].get("retweeted_status").unwrap(), 2);
        assert_eq!(records[0].get("user").unwrap(), 5);

        assert_eq!(records[1].get("id").unwrap(), 2);
        assert_eq!(records[1].get("user").unwrap(), 9);
        assert_eq!(records[1].get("query").unwrap(), "test");
        assert_eq!(
            records[1].raw_payload("raw").unwrap(),
            input["retweeted_status"]
        );
    }

    #[test]
    fn test_nested_repost_chain() {
        let input = json!({
            "id": 1,
            "retweeted_status": {
                "id": 2,
                "retweeted_status": {"id": 3}
            }
        });

        let records = melter(None).decompose(&input).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.get("id").unwrap().clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_malformed_repost_keeps_outer() {
        let input = json!({
            "id": 1,
            "retweeted_status": ["not", "a", "post"]
        });

        let records = melter(None).decompose(&input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id").unwrap(), 1);
        assert!(!records[0].contains_key("retweeted_status"));
    }

    #[test]
    fn test_envelopes_unwrapped() {
        let input = json!({"data": {"tweet": {"id": 7, "text": "wrapped"}}});

        let records = melter(None).decompose(&input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id").unwrap(), 7);
        assert_eq!(
            records[0].raw_payload("raw").unwrap(),
            json!({"id": 7, "text": "wrapped"})
        );
    }

    #[test]
    fn test_raw_bytes() {
        let bytes = br#"{"id": 3, "lang": "en"}"#;

        let records = melter(None).decompose(&bytes[..]).unwrap();
        assert_eq!(records[0].get("lang").unwrap(), "en");

        let err = melter(None).decompose(&b"{not json"[..]).unwrap_err();
        assert!(matches!(err, MeltError::Decode(_)));

        let err = melter(None).decompose(&b"{\"text\": \"\xff\"}"[..]).unwrap_err();
        assert!(matches!(err, MeltError::Decode(_)));
    }

    #[test]
    fn test_null_envelope_is_not_unwrapped() {
        let input = json!({"data": null, "id": 1, "text": "hi"});

        let records = melter(None).decompose(&input).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id").unwrap(), 1);
        assert_eq!(records[0].get("text").unwrap(), "hi");

        let input = json!({"tweet": null, "data": {"id": 2}});
        let records = melter(None).decompose(&input).unwrap();
        assert_eq!(records[0].get("id").unwrap(), 2);
    }

    #[test]
    fn test_non_object_payload() {
        let err = melter(None).decompose(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, MeltError::NotAnObject { found: "array" }));
    }

    #[test]
    fn test_depth_limit() {
        let mut config = MeltConfig::default().with_query("test");
        config.max_depth = 1;
        let melter = PostMelter::with_config(config);

        let wrapped = json!({"data": {"data": {"id": 1}}});
        let err = melter.decompose(&wrapped).unwrap_err();
        assert!(matches!(err, MeltError::DepthExceeded { limit: 1 }));

        // Too-deep reposts are dropped, the outer post survives.
        let chain = json!({"id": 1, "retweeted_status": {"id": 2, "retweeted_status": {"id": 3}}});
        let records = melter.decompose(&chain).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_multi_value_fields_default_to_empty_lists() {
        let records = melter(None).decompose(&json!({"id": 1})).unwrap();
        let post = &records[0];

        for field in ["hashtags", "user_mentions", "symbols", "extended_tweet"] {
            assert_eq!(post.get(field).unwrap(), &json!([]), "field {}", field);
        }
    }

    #[test]
    fn test_multi_value_fields_delimited() {
        let input = json!({
            "id": 1,
            "entities": {
                "hashtags": [{"text": "rust"}, {"text": "json"}],
                "user_mentions": [{"id": 5}, {"id": 9}],
                "urls": [{"url": "https://example.com"}]
            }
        });

        let records = melter(Some("|")).decompose(&input).unwrap();
        let post = &records[0];

        assert_eq!(post.get("hashtags").unwrap(), "rust|json");
        assert_eq!(post.get("user_mentions").unwrap(), "5|9");
        assert_eq!(post.get("symbols").unwrap(), "");
        assert_eq!(post.get("extended_tweet").unwrap(), "");
        assert!(!post.contains_key("urls"));
        assert!(!post.contains_key("entities"));
    }

    #[test]
    fn test_entities_as_arrays() {
        let input = json!({
            "id": 1,
            "entities": {"hashtags": [{"text": "rust"}], "symbols": []},
            "extended_tweet": {"full_text": "a much longer text"}
        });

        let records = melter(None).decompose(&input).unwrap();
        let post = &records[0];

        assert_eq!(post.get("hashtags").unwrap(), &json!(["rust"]));
        assert_eq!(post.get("symbols").unwrap(), &json!([]));
        assert_eq!(post.get("extended_tweet").unwrap(), &json!(["a much longer text"]));
    }

    #[test]
    fn test_place_and_coordinates() {
        let input = json!({
            "id": 1,
            "place": {"name": "X", "country_code": "NO", "id": "abc"},
            "geo": {"type": "Point", "coordinates": [23.7, 84.5]},
            "coordinates": {"type": "Point", "coordinates": [84.5, 23.7]}
        });

        let records = melter(None).decompose(&input).unwrap();
        let post = &records[0];

        assert_eq!(post.get("place_name").unwrap(), "X");
        assert_eq!(post.get("place_country_code").unwrap(), "NO");
        assert!(!post.contains_key("place_full_name"));
        assert!(!post.contains_key("place_id"));
        assert_eq!(post.get("latitude").unwrap(), 23.7);
        assert_eq!(post.get("longitude").unwrap(), 84.5);
        assert!(!post.contains_key("geo"));
        assert!(!post.contains_key("coordinates"));
    }

    #[test]
    fn test_malformed_coordinates_dropped() {
        let input = json!({
            "id": 1,
            "geo": {"type": "Point", "coordinates": [23.7]},
            "coordinates": {"type": "Point"}
        });

        let records = melter(None).decompose(&input).unwrap();
        assert!(!records[0].contains_key("latitude"));
        assert!(!records[0].contains_key("longitude"));
    }

    #[test]
    fn test_null_values_skipped() {
        let input = json!({"id": 1, "text": null, "place": null, "user": null});

        let records = melter(None).decompose(&input).unwrap();
        assert!(!records[0].contains_key("text"));
        assert!(!records[0].contains_key("user"));
    }

    #[test]
    fn test_melt_batch_keeps_order() {
        let payloads = vec![
            json!({"id": 1, "user": {"id": 5}}),
            json!("garbage"),
            json!({"id": 2}),
        ];

        let results = melter(None).melt_batch(&payloads);
        assert_eq!(results.len(), 3);

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].kind, RecordKind::Post);
        assert_eq!(first[1].kind, RecordKind::User);

        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap()[0].get("id").unwrap(), 2);
    }

    #[test]
    fn test_decompose_post_default_registry() {
        let records = decompose_post(&json!({"id": 1}), "q", Some(",")).unwrap();
        assert_eq!(records[0].get("query").unwrap(), "q");
        assert_eq!(records[0].get("hashtags").unwrap(), "");
    }
}
