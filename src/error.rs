use thiserror::Error;

use crate::assertion::AssertionFailure;
use crate::config::ConfigError;
use crate::destroy::DestroyError;
use crate::precheck::PreCheckError;
use crate::probe::ProbeError;
use crate::render::InvalidSpec;
use crate::terraform::ApplyError;
use crate::terraform::state::StateError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpec),

    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("assertion failed: {0}")]
    Assertion(#[from] AssertionFailure),

    #[error(transparent)]
    Destroy(#[from] DestroyError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a failed lifecycle run.
///
/// A step failure carries the teardown failure, if any, alongside it so that
/// neither masks the other.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("pre-check failed: {0}")]
    PreCheck(#[from] PreCheckError),

    #[error("step {step} failed: {source}")]
    Step {
        /// 1-based index of the failing step.
        step: usize,
        #[source]
        source: HarnessError,
        teardown: Option<Box<HarnessError>>,
    },

    #[error("teardown failed: {0}")]
    Teardown(#[source] HarnessError),
}

impl RunError {
    pub fn teardown_error(&self) -> Option<&HarnessError> {
        match self {
            RunError::Step { teardown, .. } => teardown.as_deref(),
            RunError::Teardown(err) => Some(err),
            RunError::PreCheck(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Address;

    #[test]
    fn test_invalid_spec_is_transparent() {
        let err: HarnessError = InvalidSpec::UnknownResourceType {
            resource_type: "aws_nope".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "invalid spec: unknown resource type 'aws_nope'");
    }

    #[test]
    fn test_probe_error_from_conversion() {
        let err: HarnessError = ProbeError::Absent {
            id: "env-1".to_string(),
        }
        .into();
        assert!(matches!(err, HarnessError::Probe(_)));
        assert_eq!(err.to_string(), "resource env-1 not found");
    }

    #[test]
    fn test_step_error_display_and_teardown() {
        let err = RunError::Step {
            step: 2,
            source: AssertionFailure::NotSet {
                address: Address::new("aws_cloud9_environment_ec2", "test"),
                name: "arn".to_string(),
            }
            .into(),
            teardown: Some(Box::new(
                DestroyError::StillExists {
                    resource_type: "aws_cloud9_environment_ec2".to_string(),
                    id: "env-1".to_string(),
                }
                .into(),
            )),
        };
        assert_eq!(
            err.to_string(),
            "step 2 failed: assertion failed: aws_cloud9_environment_ec2.test: attribute 'arn' expected to be set"
        );
        assert!(err
            .teardown_error()
            .unwrap()
            .to_string()
            .contains("still exists"));
    }

    #[test]
    fn test_pre_check_from_conversion() {
        let err: RunError = PreCheckError::NoRegion.into();
        assert!(err.to_string().starts_with("pre-check failed"));
        assert!(err.teardown_error().is_none());
    }
}
