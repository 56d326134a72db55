use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{merge_value, FieldName, FieldValue};

/// All synchronized fields of one session, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionFields(BTreeMap<FieldName, FieldValue>);

impl SessionFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &FieldName) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn insert(
        &mut self,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &FieldName) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &FieldName) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, FieldName, FieldValue> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &FieldName> {
        self.0.keys()
    }

    /// `true` only when the field holds boolean `true`.
    pub fn flag(&self, name: &FieldName) -> bool {
        self.get(name).is_some_and(FieldValue::is_true)
    }

    pub fn text(&self, name: &FieldName) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// Fields outside the known schema, shown verbatim on the host panel.
    pub fn unknown_fields(&self) -> impl Iterator<Item = (&FieldName, &FieldValue)> {
        self.0.iter().filter(|(name, _)| !name.is_known())
    }

    /// Copies every entry of `other` over this record (store-side upsert).
    pub fn upsert_all(&mut self, other: &SessionFields) {
        for (name, value) in other.iter() {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Folds a fetched record into this local view with [`merge_value`] and returns the
    /// names whose value changed.
    pub fn merge_remote(&mut self, fetched: &SessionFields) -> Vec<FieldName> {
        let mut changed = Vec::new();
        for (name, incoming) in fetched.iter() {
            let current = self.0.get(name);
            let merged = merge_value(current, incoming);
            if current != Some(&merged) {
                self.0.insert(name.clone(), merged);
                changed.push(name.clone());
            }
        }
        changed
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.to_json()))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for SessionFields {
    fn from(map: Map<String, Value>) -> Self {
        Self(
            map.into_iter()
                .map(|(name, value)| (FieldName::from(name), FieldValue::from(value)))
                .collect(),
        )
    }
}

impl FromIterator<(FieldName, FieldValue)> for SessionFields {
    fn from_iter<I: IntoIterator<Item = (FieldName, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for SessionFields {
    type Item = (FieldName, FieldValue);
    type IntoIter = btree_map::IntoIter<FieldName, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SessionFields {
    type Item = (&'a FieldName, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, FieldName, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test_timeout::timeout]
    fn serializes_as_a_plain_object() {
        let mut fields = SessionFields::new();
        fields.insert(FieldName::Started, true);
        fields.insert(FieldName::Token1, "C");
        fields.insert("note", FieldValue::from(json!({ "seen": 2 })));

        let encoded = serde_json::to_value(&fields).unwrap();
        assert_eq!(
            encoded,
            json!({ "started": true, "token1": "C", "note": { "seen": 2 } })
        );
        let decoded: SessionFields = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, fields);
    }

    #[test_timeout::timeout]
    fn unknown_fields_skip_the_schema() {
        let fields: SessionFields = serde_json::from_value(json!({
            "started": true,
            "s3_heat": false,
            "hostNote": "slow start",
        }))
        .unwrap();
        let unknown: Vec<_> = fields.unknown_fields().map(|(n, _)| n.as_str()).collect();
        assert_eq!(unknown, vec!["hostNote"]);
        assert!(fields.flag(&FieldName::Started));
        assert!(!fields.flag(&FieldName::S3Heat));
    }

    #[test_timeout::timeout]
    fn merge_reports_only_changed_names() {
        let mut local: SessionFields = serde_json::from_value(json!({
            "started": true,
            "token1": "C",
        }))
        .unwrap();
        let fetched: SessionFields = serde_json::from_value(json!({
            "started": false,
            "token1": "",
            "s1_identityOk": true,
        }))
        .unwrap();

        let changed = local.merge_remote(&fetched);
        assert_eq!(changed, vec![FieldName::S1IdentityOk]);
        assert!(local.flag(&FieldName::Started));
        assert_eq!(local.text(&FieldName::Token1), Some("C"));

        assert!(local.merge_remote(&fetched).is_empty());
    }
}
