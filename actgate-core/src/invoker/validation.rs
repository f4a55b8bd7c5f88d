//! Response status inspection.
//!
//! Components report application-level failures in-band: the transport succeeds, but somewhere in
//! the response a status-like field says `ERROR`. There is no declared contract field for this,
//! so every field whose name contains the marker is checked, at any depth. Both the field name
//! and the value are compared case-insensitively.
//!
//! The heuristic can misfire on unrelated fields that happen to contain the marker (e.g. a
//! `status_text` carrying free-form text), which is why both the marker and the failure value
//! are configurable.
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, Value};

#[derive(Debug, Clone)]
pub struct StatusCheck {
    marker: String,
    error_status: String,
}

impl StatusCheck {
    pub fn new(marker: &str, error_status: &str) -> Self {
        Self {
            marker: marker.to_lowercase(),
            error_status: error_status.to_string(),
        }
    }

    /// Path of the first status field carrying the failure value, e.g. `detail.next.status`.
    pub fn find_failure(&self, message: &DynamicMessage) -> Option<String> {
        self.walk(message, "")
    }

    fn walk(&self, message: &DynamicMessage, prefix: &str) -> Option<String> {
        for (field, value) in message.fields() {
            let path = if prefix.is_empty() {
                field.name().to_string()
            } else {
                format!("{prefix}.{}", field.name())
            };

            if self.is_status_field(&field) && self.is_failure(&field, value) {
                return Some(path);
            }
            if let Some(found) = self.descend(value, &path) {
                return Some(found);
            }
        }
        None
    }

    fn descend(&self, value: &Value, path: &str) -> Option<String> {
        match value {
            Value::Message(nested) => self.walk(nested, path),
            Value::List(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| self.descend(item, &format!("{path}[{i}]"))),
            Value::Map(entries) => entries.values().find_map(|item| self.descend(item, path)),
            _ => None,
        }
    }

    fn is_status_field(&self, field: &FieldDescriptor) -> bool {
        field.name().to_lowercase().contains(&self.marker)
    }

    fn is_failure(&self, field: &FieldDescriptor, value: &Value) -> bool {
        match value {
            Value::String(s) => s.eq_ignore_ascii_case(&self.error_status),
            Value::EnumNumber(number) => match field.kind() {
                Kind::Enum(desc) => desc
                    .get_value(*number)
                    .is_some_and(|v| v.name().eq_ignore_ascii_case(&self.error_status)),
                _ => false,
            },
            Value::List(items) => items.iter().any(|item| self.is_failure(field, item)),
            _ => false,
        }
    }
}
