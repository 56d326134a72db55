use serde_json::Value;

use crate::{FieldName, FieldValue, SessionCode, SessionFields, ValidationError};

/// Reserved key under which a device pushes its whole cache in one request.
pub const SNAPSHOT_KEY: &str = "__stateSnapshot";

/// One write travelling from a device to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Field {
        session: SessionCode,
        name: FieldName,
        value: FieldValue,
    },
    /// Every entry is upserted as its own field in a single store operation.
    Snapshot {
        session: SessionCode,
        fields: SessionFields,
    },
}

impl FieldUpdate {
    pub fn field(
        session: SessionCode,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue>,
    ) -> Self {
        FieldUpdate::Field {
            session,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn snapshot(session: SessionCode, fields: SessionFields) -> Self {
        FieldUpdate::Snapshot { session, fields }
    }

    /// Validates a raw `{ key, value }` progress request.
    ///
    /// `value` is `None` only when the request omitted it; an explicit JSON `null` is a
    /// legitimate value. A snapshot is recognised by the reserved key together with an
    /// object value; the reserved key with any other value is stored as a plain field.
    pub fn from_request(
        session: &str,
        key: Option<&Value>,
        value: Option<Value>,
    ) -> Result<Self, ValidationError> {
        let session = SessionCode::parse(session)?;
        let key = match key {
            Some(Value::String(key)) if !key.trim().is_empty() => key.as_str(),
            _ => return Err(ValidationError::Key),
        };
        let value = value.ok_or(ValidationError::Value)?;

        match value {
            Value::Object(map) if key == SNAPSHOT_KEY => {
                if let Some(blank) = map.keys().find(|name| name.trim().is_empty()) {
                    return Err(ValidationError::SnapshotKey(blank.clone()));
                }
                Ok(FieldUpdate::Snapshot {
                    session,
                    fields: SessionFields::from(map),
                })
            }
            value => Ok(FieldUpdate::Field {
                session,
                name: FieldName::from(key),
                value: FieldValue::from(value),
            }),
        }
    }

    pub fn session(&self) -> &SessionCode {
        match self {
            FieldUpdate::Field { session, .. } | FieldUpdate::Snapshot { session, .. } => session,
        }
    }

    /// Wire form `(key, value)` for the progress endpoint.
    pub fn to_request_parts(&self) -> (String, Value) {
        match self {
            FieldUpdate::Field { name, value, .. } => (name.to_string(), value.to_json()),
            FieldUpdate::Snapshot { fields, .. } => (SNAPSHOT_KEY.to_string(), fields.to_json()),
        }
    }
}
