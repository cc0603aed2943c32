pub mod cloud9;

use async_trait::async_trait;
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::terraform::state::Attributes;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// The external system reports no such resource, either through a typed
    /// not-found error or an empty result set.
    #[error("resource {id} not found")]
    Absent { id: String },

    /// The caller's own credentials were torn down before the check ran.
    #[error("access revoked while probing {id}: {message}")]
    AccessRevoked { id: String, message: String },

    #[error("probe of {id} failed: {message}")]
    Service { id: String, message: String },
}

impl ProbeError {
    pub fn is_absent(&self) -> bool {
        matches!(self, ProbeError::Absent { .. })
    }
}

/// Describe-by-id against the external system.
#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    /// Resource type this probe understands, e.g. `aws_cloud9_environment_ec2`.
    fn resource_type(&self) -> &str;

    async fn probe(&self, id: &str) -> Result<Attributes, ProbeError>;
}

/// Probes `id`, retrying only while the resource is reported absent.
pub async fn probe_until_visible(
    probe: &dyn ExistenceProbe,
    id: &str,
    policy: &RetryPolicy,
) -> Result<Attributes, ProbeError> {
    policy.retry(|| probe.probe(id), ProbeError::is_absent).await
}
