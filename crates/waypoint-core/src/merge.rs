use crate::FieldValue;

/// Merged value of one field given what the device holds and what the store reported.
///
/// A `true` flag or a non-empty string already held locally survives any fetch, stale
/// or not. A fetched flag is OR-ed into the local value, a fetched string fills an
/// empty or missing local value, and any other fetched value replaces the local one.
pub fn merge_value(local: Option<&FieldValue>, fetched: &FieldValue) -> FieldValue {
    match (local, fetched) {
        (Some(held), _) if held.is_true() || held.is_non_empty_text() => held.clone(),
        (_, FieldValue::Flag(flag)) => FieldValue::Flag(*flag),
        (_, FieldValue::Text(text)) => FieldValue::Text(text.clone()),
        (_, other) => other.clone(),
    }
}
