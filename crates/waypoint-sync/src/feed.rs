use async_trait::async_trait;
use waypoint_core::{FieldUpdate, SessionCode, SessionFields};

use crate::{ClientError, WaypointClient};

/// Transport between a device and the shared session record.
///
/// The HTTP client is the production implementation; anything that can fetch the
/// current record and publish an update can stand in for it.
#[async_trait]
pub trait SessionFeed: Send + Sync {
    async fn fetch(&self, session: &SessionCode) -> Result<SessionFields, ClientError>;

    async fn publish(&self, update: &FieldUpdate) -> Result<(), ClientError>;
}

#[async_trait]
impl SessionFeed for WaypointClient {
    async fn fetch(&self, session: &SessionCode) -> Result<SessionFields, ClientError> {
        self.fetch_session(session).await
    }

    async fn publish(&self, update: &FieldUpdate) -> Result<(), ClientError> {
        self.push(update).await
    }
}
