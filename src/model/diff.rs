//! Flat field-level diff between two versions of a book record
//!
//! Records are flat, so no recursive diffing is needed: every field of the
//! old version is compared against the new one and any inequality becomes a
//! `{old, new}` pair. The identity field is never diffed; crawl metadata
//! lives outside the record and never reaches this function.

use crate::model::Book;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Old/new pair for a single changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Fields excluded from diffing
const SKIPPED_FIELDS: &[&str] = &["bts_id"];

/// Computes the field-by-field changes between two versions of a record
///
/// Returns an empty map when the records are identical. Keys are ordered,
/// so serialized change maps are deterministic.
pub fn field_changes(old: &Book, new: &Book) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();

    let (Ok(Value::Object(old_fields)), Ok(Value::Object(new_fields))) =
        (serde_json::to_value(old), serde_json::to_value(new))
    else {
        // A Book always serializes to an object; nothing sensible to diff otherwise.
        return changes;
    };

    for (field, old_value) in &old_fields {
        if SKIPPED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        let new_value = new_fields.get(field).cloned().unwrap_or(Value::Null);
        if *old_value != new_value {
            changes.insert(
                field.clone(),
                FieldChange {
                    old: old_value.clone(),
                    new: new_value,
                },
            );
        }
    }

    changes
}
