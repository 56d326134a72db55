use std::fmt;
use std::str::FromStr;

use crate::{FieldName, SessionFields, ValidationError};

/// Gated stage of the puzzle, in play order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Station {
    One,
    Two,
    Three,
    Four,
    Final,
}

impl Station {
    pub const ALL: [Station; 5] = [
        Station::One,
        Station::Two,
        Station::Three,
        Station::Four,
        Station::Final,
    ];

    /// Flag the host sets to reveal hints. Station three is verified field by field by
    /// the host instead and has no hints.
    pub fn hint_field(self) -> Option<FieldName> {
        match self {
            Station::One => Some(FieldName::HintsS1Unlocked),
            Station::Two => Some(FieldName::HintsS2Unlocked),
            Station::Three => None,
            Station::Four => Some(FieldName::HintsS4Unlocked),
            Station::Final => Some(FieldName::HintsFinalUnlocked),
        }
    }

    pub fn completion_fields(self) -> &'static [FieldName] {
        const ONE: &[FieldName] = &[FieldName::S1IntegralsOk, FieldName::S1IdentityOk];
        const TWO: &[FieldName] = &[FieldName::S2ProductOk, FieldName::S2ConditionOk];
        const THREE: &[FieldName] = &[
            FieldName::S3Heat,
            FieldName::S3Pressure,
            FieldName::S3Excess,
            FieldName::S3Confirmed,
        ];
        const FOUR: &[FieldName] = &[FieldName::S4CatalystOk, FieldName::S4PersistentOk];
        const FINAL: &[FieldName] = &[FieldName::FinalOk];

        match self {
            Station::One => ONE,
            Station::Two => TWO,
            Station::Three => THREE,
            Station::Four => FOUR,
            Station::Final => FINAL,
        }
    }

    pub fn progress(self, fields: &SessionFields) -> StationProgress {
        let required = self.completion_fields();
        StationProgress {
            station: self,
            done: required.iter().filter(|name| fields.flag(name)).count(),
            required: required.len(),
            hints_unlocked: self.hint_field().is_some_and(|hint| fields.flag(&hint)),
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Station::One => "station 1",
            Station::Two => "station 2",
            Station::Three => "station 3",
            Station::Four => "station 4",
            Station::Final => "final lock",
        };
        f.write_str(label)
    }
}

/// Accepts `1`..`4` (optionally prefixed `s`) and `final`, case-insensitively.
impl FromStr for Station {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let key = normalized.strip_prefix('s').unwrap_or(&normalized);
        match key {
            "1" => Ok(Station::One),
            "2" => Ok(Station::Two),
            "3" => Ok(Station::Three),
            "4" => Ok(Station::Four),
            "final" => Ok(Station::Final),
            _ => Err(ValidationError::Station(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationProgress {
    pub station: Station,
    pub done: usize,
    pub required: usize,
    pub hints_unlocked: bool,
}

impl StationProgress {
    pub fn is_complete(&self) -> bool {
        self.done == self.required
    }
}
