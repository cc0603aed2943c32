pub mod state;

mod command;

pub use command::TerraformCli;

use async_trait::async_trait;
use thiserror::Error;

use crate::render::RenderedConfig;
use crate::resource::Address;
use state::{AppliedState, StateError};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("apply rejected: {message}")]
    Rejected { message: String },
}

/// Reconciles rendered configuration against the external system.
///
/// Ordering among resources inside one configuration is the applier's job;
/// callers only hand over the whole configuration.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, config: &RenderedConfig) -> Result<AppliedState, ApplyError>;

    /// Re-derives state for `address` from the remote object `id` alone.
    ///
    /// The returned snapshot is independent of the state `apply` maintains.
    async fn import(
        &self,
        address: &Address,
        id: &str,
        config: &RenderedConfig,
    ) -> Result<AppliedState, ApplyError>;

    async fn destroy(&self, config: &RenderedConfig) -> Result<(), ApplyError>;

    /// Everything currently under management, including resources left
    /// behind by an apply that failed part way.
    async fn state(&self) -> Result<AppliedState, ApplyError>;
}
