//! Device side of Waypoint session sync.
//!
//! Every device holding a session code keeps a [`LocalCache`], writes its own changes
//! optimistically and publishes them in the background, and runs a [`SyncAgent`] that
//! polls the shared record and folds it into the cache with the type-directed merge
//! rules from `waypoint-core`. Polling is the consistency mechanism; write
//! acknowledgements are best effort.

mod agent;
mod cache;
mod client;
mod device;
mod feed;

pub use agent::{SyncAgent, SyncHandle, DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
pub use cache::{LocalCache, SyncEvent};
pub use client::{ClientError, WaypointClient};
pub use device::DeviceSession;
pub use feed::SessionFeed;
