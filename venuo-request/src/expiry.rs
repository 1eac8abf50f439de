use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use venuo_core::StoreError;

use crate::models::RequestError;
use crate::repository::RequestRepo;

/// Out-of-band expiry sweep for open requests whose deadline has passed.
/// A customer accept racing the sweep is decided by commit order: both
/// sides are conditional on the current status, so whichever CAS lands
/// first wins and the loser's write is dropped.
pub struct RequestExpirySweep {
    repo: Arc<dyn RequestRepo>,
}

impl RequestExpirySweep {
    pub fn new(repo: Arc<dyn RequestRepo>) -> Self {
        Self { repo }
    }

    /// Runs one pass; returns the ids of requests it expired.
    pub async fn run_once(&self) -> Result<Vec<Uuid>, RequestError> {
        let now = Utc::now();
        let due = self.repo.list_due(now).await?;
        let mut expired = Vec::new();

        for request_id in due {
            let Some(mut thread) = self.repo.get(request_id).await? else {
                continue;
            };
            if !thread.sweep_expired(now) {
                continue;
            }
            match self.repo.update(&thread).await {
                Ok(()) => {
                    tracing::info!(%request_id, "request expired by sweep");
                    expired.push(request_id);
                }
                // An accept (or another sweep) committed first; skip.
                Err(StoreError::RevConflict) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(expired)
    }
}
