//! Write and read paths shared by the HTTP handlers.

use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use waypoint_core::{FieldName, FieldUpdate, FieldValue, SessionCode, SessionFields, ValidationError};

use crate::config::Config;
use crate::storage::{SharedStore, StoreError};

/// Retry budget used to paper over store propagation delay.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    pub verify_attempts: u32,
    pub verify_delay: Duration,
    pub read_retry_delay: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            verify_attempts: 3,
            verify_delay: Duration::from_millis(25),
            read_retry_delay: Duration::from_millis(50),
        }
    }
}

impl From<&Config> for SyncPolicy {
    fn from(config: &Config) -> Self {
        Self {
            verify_attempts: config.verify_attempts,
            verify_delay: Duration::from_millis(config.verify_delay_ms),
            read_retry_delay: Duration::from_millis(config.read_retry_delay_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("store failure: {0}")]
    Backend(#[from] StoreError),
}

/// Outcome of an accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub fields_written: usize,
    /// Read-back result for single-field writes; `None` for snapshots.
    pub verified: Option<bool>,
}

#[derive(Clone)]
pub struct SessionService {
    store: SharedStore,
    policy: SyncPolicy,
}

impl SessionService {
    pub fn new(store: SharedStore, policy: SyncPolicy) -> Self {
        Self { store, policy }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn apply(&self, update: FieldUpdate) -> Result<WriteReceipt, ServiceError> {
        match update {
            FieldUpdate::Snapshot { session, fields } => {
                self.store
                    .merge_snapshot(&session, &fields)
                    .await
                    .map_err(|err| backend_fault(&session, None, err))?;
                counter!("waypoint_snapshot_merges_total", 1);
                info!(session = %session, fields = fields.len(), "merged state snapshot");
                Ok(WriteReceipt {
                    fields_written: fields.len(),
                    verified: None,
                })
            }
            FieldUpdate::Field {
                session,
                name,
                value,
            } => {
                self.store
                    .set_field(&session, &name, &value)
                    .await
                    .map_err(|err| backend_fault(&session, Some(&name), err))?;
                counter!("waypoint_field_writes_total", 1, "field" => field_label(&name).to_string());

                let verified = self.verify(&session, &name, &value).await?;
                if !verified {
                    counter!("waypoint_write_verification_failures_total", 1);
                    warn!(
                        session = %session,
                        field = %name,
                        "write verification failed, acknowledging anyway"
                    );
                }
                info!(session = %session, field = %name, value = %value.to_json(), verified, "field written");
                Ok(WriteReceipt {
                    fields_written: 1,
                    verified: Some(verified),
                })
            }
        }
    }

    /// Re-reads the field until it structurally equals what was written or the attempt
    /// budget runs out.
    async fn verify(
        &self,
        session: &SessionCode,
        name: &FieldName,
        expected: &FieldValue,
    ) -> Result<bool, ServiceError> {
        for attempt in 1..=self.policy.verify_attempts {
            tokio::time::sleep(self.policy.verify_delay).await;
            let current = self
                .store
                .get_field(session, name)
                .await
                .map_err(|err| backend_fault(session, Some(name), err))?;
            if current.as_ref() == Some(expected) {
                debug!(session = %session, field = %name, attempt, "write verified");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Current record; one delayed retry when the first read comes back empty.
    pub async fn read(&self, session: &SessionCode) -> Result<SessionFields, ServiceError> {
        counter!("waypoint_session_reads_total", 1);
        let fields = self
            .store
            .get_all(session)
            .await
            .map_err(|err| backend_fault(session, None, err))?;
        if !fields.is_empty() {
            return Ok(fields);
        }

        counter!("waypoint_empty_read_retries_total", 1);
        tokio::time::sleep(self.policy.read_retry_delay).await;
        let fields = self
            .store
            .get_all(session)
            .await
            .map_err(|err| backend_fault(session, None, err))?;
        debug!(session = %session, fields = fields.len(), "session read after empty retry");
        Ok(fields)
    }
}

/// Metric label for a written field. Arbitrary client keys share one series so the
/// recorder stays bounded.
fn field_label(name: &FieldName) -> &str {
    if name.is_known() {
        name.as_str()
    } else {
        "other"
    }
}

fn backend_fault(session: &SessionCode, field: Option<&FieldName>, err: StoreError) -> ServiceError {
    counter!("waypoint_backend_errors_total", 1);
    match field {
        Some(field) => error!(session = %session, field = %field, error = %err, "session store failure"),
        None => error!(session = %session, error = %err, "session store failure"),
    }
    ServiceError::Backend(err)
}
