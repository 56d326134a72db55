use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

/// How a known field is interpreted by the merge rules and the host view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Progress or unlock flag; only ever moves from false to true on a device.
    Flag,
    /// Token or name; the first non-empty value a device sees is kept.
    Text,
}

/// Which device normally writes a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Host,
    Player,
}

macro_rules! known_fields {
    ($($variant:ident => $wire:literal, $kind:ident, $owner:ident;)+) => {
        /// Name of a session field.
        ///
        /// Fields the puzzle flow reasons about get their own variant; anything else a
        /// device writes is carried as [`FieldName::Other`] so the host panel can still
        /// show it. Identity is the wire name, so `Other("started")` and `Started` are
        /// the same field.
        #[derive(Debug, Clone)]
        pub enum FieldName {
            $($variant,)+
            Other(String),
        }

        impl FieldName {
            pub const KNOWN: &'static [FieldName] = &[$(FieldName::$variant,)+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(FieldName::$variant => $wire,)+
                    FieldName::Other(name) => name,
                }
            }

            pub fn kind(&self) -> Option<FieldKind> {
                match self {
                    $(FieldName::$variant => Some(FieldKind::$kind),)+
                    FieldName::Other(_) => None,
                }
            }

            pub fn owner(&self) -> Option<Owner> {
                match self {
                    $(FieldName::$variant => Some(Owner::$owner),)+
                    FieldName::Other(_) => None,
                }
            }
        }

        impl From<&str> for FieldName {
            fn from(raw: &str) -> Self {
                match raw {
                    $($wire => FieldName::$variant,)+
                    other => FieldName::Other(other.to_string()),
                }
            }
        }
    };
}

known_fields! {
    Started => "started", Flag, Host;
    PlayerName => "playerName", Text, Player;
    DevMode => "devMode", Flag, Player;
    Token1 => "token1", Text, Player;
    Token2 => "token2", Text, Player;
    Token3 => "token3", Text, Player;
    S1IntegralsOk => "s1_integralsOk", Flag, Player;
    S1IdentityOk => "s1_identityOk", Flag, Player;
    S2ProductOk => "s2_productOk", Flag, Player;
    S2ConditionOk => "s2_conditionOk", Flag, Player;
    S3Heat => "s3_heat", Flag, Host;
    S3Pressure => "s3_pressure", Flag, Host;
    S3Excess => "s3_excess", Flag, Host;
    S3Confirmed => "s3_confirmed", Flag, Player;
    S4CatalystOk => "s4_catalystOk", Flag, Player;
    S4PersistentOk => "s4_persistentOk", Flag, Player;
    FinalOk => "final_ok", Flag, Player;
    DebriefSeen => "debriefSeen", Flag, Player;
    HintsS1Unlocked => "hints_s1_unlocked", Flag, Host;
    HintsS2Unlocked => "hints_s2_unlocked", Flag, Host;
    HintsS4Unlocked => "hints_s4_unlocked", Flag, Host;
    HintsFinalUnlocked => "hints_final_unlocked", Flag, Host;
    RevealQuestionVerified => "reveal_question_verified", Flag, Host;
}

impl FieldName {
    pub fn is_known(&self) -> bool {
        self.kind().is_some()
    }
}

impl From<String> for FieldName {
    fn from(raw: String) -> Self {
        match FieldName::from(raw.as_str()) {
            FieldName::Other(_) => FieldName::Other(raw),
            known => known,
        }
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for FieldName {}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialOrd for FieldName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(FieldName::from)
    }
}

/// Value of one session field, kept in its native JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
    Number(Number),
    /// Null, arrays and objects. Stored and echoed verbatim.
    Opaque(Value),
}

impl FieldValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, FieldValue::Flag(true))
    }

    pub fn is_non_empty_text(&self) -> bool {
        matches!(self, FieldValue::Text(text) if !text.is_empty())
    }

    pub fn to_json(&self) -> Value {
        self.clone().into()
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(flag) => FieldValue::Flag(flag),
            Value::String(text) => FieldValue::Text(text),
            Value::Number(number) => FieldValue::Number(number),
            other => FieldValue::Opaque(other),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Flag(flag) => Value::Bool(flag),
            FieldValue::Text(text) => Value::String(text),
            FieldValue::Number(number) => Value::Number(number),
            FieldValue::Opaque(other) => other,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(flag: bool) -> Self {
        FieldValue::Flag(flag)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::Text(text.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        FieldValue::Text(text)
    }
}

impl From<i64> for FieldValue {
    fn from(number: i64) -> Self {
        FieldValue::Number(number.into())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Flag(flag) => serializer.serialize_bool(*flag),
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Number(number) => number.serialize(serializer),
            FieldValue::Opaque(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FieldValue::from)
    }
}
