use crate::melt::decomposer::PostMelter;
use crate::registry::{FieldRegistry, DEFAULT_REGISTRY, ENVELOPE_KEYS, USER_FIELD};
use crate::types::{FlatRecord, MeltConfig, RecordKind};
use serde_json::{Map, Value};

impl PostMelter {
    /// Collect every author object embedded anywhere in `value`.
    ///
    /// Reposts, quoted posts and mention lists can each carry their own
    /// user, so all of them are returned in document order. Identical users
    /// are not deduplicated.
    pub fn extract_users(&self, value: &Value) -> Vec<FlatRecord> {
        let mut users = Vec::new();
        collect_users(self.registry(), &self.config().raw_key, value, &mut users);
        users
    }
}

/// Collect users against the default registry
pub fn extract_users(value: &Value) -> Vec<FlatRecord> {
    let mut users = Vec::new();
    collect_users(&DEFAULT_REGISTRY, &MeltConfig::default().raw_key, value, &mut users);
    users
}

fn collect_users(registry: &FieldRegistry, raw_key: &str, value: &Value, users: &mut Vec<FlatRecord>) {
    match value {
        Value::Object(obj) => {
            // A "tweet" envelope is projected as a single user record.
            if let Some(inner) = obj.get(ENVELOPE_KEYS[0]).filter(|v| !v.is_null()) {
                users.push(project_user(registry, raw_key, inner));
                return;
            }

            for (field, inner) in obj {
                if inner.is_null() {
                    continue;
                }
                if field == USER_FIELD {
                    users.push(project_user(registry, raw_key, inner));
                } else if inner.is_object() || inner.is_array() {
                    collect_users(registry, raw_key, inner, users);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_users(registry, raw_key, item, users);
            }
        }
        _ => {}
    }
}

fn project_user(registry: &FieldRegistry, raw_key: &str, user: &Value) -> FlatRecord {
    let mut row = Map::new();

    if let Value::Object(fields) = user {
        for (field, value) in fields {
            if !value.is_null() && registry.is_user_field(field) {
                row.insert(field.clone(), value.clone());
            }
        }
    }
    row.insert(raw_key.to_string(), Value::String(user.to_string()));

    FlatRecord::new(RecordKind::User, row)
}
