//! Shared primitives for Waypoint sessions.
//!
//! A session is one play-through shared by a host device and a player device. Both
//! sides write individual fields (or whole snapshots) to the session store and read the
//! merged record back by polling. The types here describe that record and the rules a
//! device uses to fold a fetched record into its local cache.

mod code;
mod error;
mod field;
mod fields;
mod merge;
mod station;
mod update;

pub use code::SessionCode;
pub use error::ValidationError;
pub use field::{FieldKind, FieldName, FieldValue, Owner};
pub use fields::SessionFields;
pub use merge::merge_value;
pub use station::{Station, StationProgress};
pub use update::{FieldUpdate, SNAPSHOT_KEY};
