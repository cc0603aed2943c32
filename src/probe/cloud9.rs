use async_trait::async_trait;
use aws_sdk_cloud9::Client;
use aws_sdk_cloud9::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_cloud9::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloud9::operation::describe_environments::DescribeEnvironmentsError;
use aws_sdk_cloud9::types::Environment;

use super::{ExistenceProbe, ProbeError};
use crate::terraform::state::Attributes;

pub const RESOURCE_TYPE: &str = "aws_cloud9_environment_ec2";

const ACCESS_DENIED_CODE: &str = "AccessDeniedException";
// Only the wording IAM uses once the caller's role is gone; other denials stay fatal.
const ACCESS_REVOKED_MESSAGE: &str = "is not authorized to access this resource";

/// Looks up Cloud9 environments through `DescribeEnvironments`.
#[derive(Clone, Debug)]
pub struct Cloud9Probe {
    client: Client,
}

impl Cloud9Probe {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// NOTE: Primarily used for testing with mock servers.
    pub fn with_endpoint_url(
        region: impl Into<String>,
        endpoint_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        let config = aws_sdk_cloud9::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url)
            .build();
        Self {
            client: Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ExistenceProbe for Cloud9Probe {
    fn resource_type(&self) -> &str {
        RESOURCE_TYPE
    }

    async fn probe(&self, id: &str) -> Result<Attributes, ProbeError> {
        let output = self
            .client
            .describe_environments()
            .environment_ids(id)
            .send()
            .await
            .map_err(|err| classify(id, err))?;

        let environment = output
            .environments()
            .first()
            .ok_or_else(|| ProbeError::Absent { id: id.to_string() })?;

        tracing::debug!(id, "cloud9 environment found");
        Ok(environment_attributes(environment))
    }
}

fn classify<R>(id: &str, err: SdkError<DescribeEnvironmentsError, R>) -> ProbeError
where
    R: std::fmt::Debug,
{
    if let Some(service) = err.as_service_error() {
        if service.is_not_found_exception() {
            return ProbeError::Absent { id: id.to_string() };
        }
        if is_access_revoked(service.code(), service.message()) {
            return ProbeError::AccessRevoked {
                id: id.to_string(),
                message: service.message().unwrap_or_default().to_string(),
            };
        }
    }

    ProbeError::Service {
        id: id.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
}

pub fn is_access_revoked(code: Option<&str>, message: Option<&str>) -> bool {
    code == Some(ACCESS_DENIED_CODE)
        && message.is_some_and(|m| m.contains(ACCESS_REVOKED_MESSAGE))
}

/// Attributes in the same shape Terraform records for the resource.
pub fn environment_attributes(environment: &Environment) -> Attributes {
    let mut attributes = Attributes::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(value) = value {
            attributes.insert(key.to_string(), value.to_string());
        }
    };

    put("id", environment.id());
    put("name", environment.name());
    put("description", environment.description());
    put("type", Some(environment.r#type().as_str()));
    put("arn", Some(environment.arn()));
    put("owner_arn", Some(environment.owner_arn()));
    put(
        "connection_type",
        environment.connection_type().map(|c| c.as_str()),
    );
    put(
        "lifecycle_status",
        environment
            .lifecycle()
            .and_then(|l| l.status())
            .map(|s| s.as_str()),
    );

    attributes
}
