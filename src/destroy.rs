use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::probe::{ExistenceProbe, ProbeError};

#[derive(Debug, Error)]
pub enum DestroyError {
    #[error("{resource_type} {id} still exists")]
    StillExists { resource_type: String, id: String },

    #[error("unexpected error verifying destruction of {id}: {source}")]
    Unexpected {
        id: String,
        #[source]
        source: ProbeError,
    },
}

/// Confirms that every identifier is gone after teardown.
pub struct DestructionVerifier {
    probe: Arc<dyn ExistenceProbe>,
    tolerate_access_revoked: bool,
}

impl DestructionVerifier {
    pub fn new(probe: Arc<dyn ExistenceProbe>) -> Self {
        Self {
            probe,
            tolerate_access_revoked: true,
        }
    }

    /// Whether a revoked-credentials error counts as successful deletion.
    pub fn tolerate_access_revoked(mut self, tolerate: bool) -> Self {
        self.tolerate_access_revoked = tolerate;
        self
    }

    /// Checks every identifier; the first failure is returned.
    pub async fn verify_destroyed(&self, ids: &BTreeSet<String>) -> Result<(), DestroyError> {
        for id in ids {
            match self.probe.probe(id).await {
                Ok(_) => {
                    return Err(DestroyError::StillExists {
                        resource_type: self.probe.resource_type().to_string(),
                        id: id.clone(),
                    });
                }
                Err(ProbeError::Absent { .. }) => {
                    tracing::debug!(id = %id, "confirmed destroyed");
                }
                Err(ProbeError::AccessRevoked { message, .. }) if self.tolerate_access_revoked => {
                    tracing::warn!(id = %id, %message, "access revoked during destroy check, treating as destroyed");
                }
                Err(source) => {
                    return Err(DestroyError::Unexpected {
                        id: id.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}
