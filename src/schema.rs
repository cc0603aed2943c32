use std::collections::{BTreeMap, BTreeSet};

use crate::render::InvalidSpec;
use crate::resource::ResourceSpec;

/// Attribute names a resource type accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSchema {
    pub required: BTreeSet<String>,
    pub optional: BTreeSet<String>,
}

impl ResourceSchema {
    pub fn new<R, O>(required: R, optional: O) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        }
    }

    fn accepts(&self, attribute: &str) -> bool {
        self.required.contains(attribute) || self.optional.contains(attribute)
    }
}

/// Per-type attribute schemas used to validate specs before rendering.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, ResourceSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloud9 environments plus the VPC scaffolding they are placed into.
    pub fn aws() -> Self {
        Self::new()
            .with_resource(
                "aws_cloud9_environment_ec2",
                ResourceSchema::new(
                    ["name", "instance_type"],
                    [
                        "description",
                        "automatic_stop_time_minutes",
                        "subnet_id",
                        "owner_arn",
                        "tags",
                    ],
                ),
            )
            .with_resource(
                "aws_vpc",
                ResourceSchema::new(
                    ["cidr_block"],
                    [
                        "enable_dns_hostnames",
                        "enable_dns_support",
                        "instance_tenancy",
                        "tags",
                    ],
                ),
            )
            .with_resource(
                "aws_subnet",
                ResourceSchema::new(
                    ["vpc_id", "cidr_block"],
                    ["availability_zone", "map_public_ip_on_launch", "tags"],
                ),
            )
            .with_resource(
                "aws_internet_gateway",
                ResourceSchema::new(Vec::<String>::new(), ["vpc_id", "tags"]),
            )
            .with_resource(
                "aws_route_table",
                ResourceSchema::new(["vpc_id"], ["route", "tags"]),
            )
            .with_resource(
                "aws_route_table_association",
                ResourceSchema::new(["route_table_id"], ["subnet_id", "gateway_id"]),
            )
    }

    pub fn with_resource(mut self, resource_type: impl Into<String>, schema: ResourceSchema) -> Self {
        self.types.insert(resource_type.into(), schema);
        self
    }

    pub fn get(&self, resource_type: &str) -> Option<&ResourceSchema> {
        self.types.get(resource_type)
    }

    pub fn validate(&self, spec: &ResourceSpec) -> Result<(), InvalidSpec> {
        let schema = self
            .get(&spec.resource_type)
            .ok_or_else(|| InvalidSpec::UnknownResourceType {
                resource_type: spec.resource_type.clone(),
            })?;

        if let Some(missing) = schema
            .required
            .iter()
            .find(|name| !spec.attributes.contains_key(name.as_str()))
        {
            return Err(InvalidSpec::MissingAttribute {
                address: spec.address(),
                attribute: missing.clone(),
            });
        }

        if let Some(unknown) = spec.attributes.keys().find(|name| !schema.accepts(name)) {
            return Err(InvalidSpec::UnknownAttribute {
                address: spec.address(),
                attribute: unknown.clone(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Address;

    #[test]
    fn test_valid_cloud9_spec() {
        let spec = ResourceSpec::new("aws_cloud9_environment_ec2", "test")
            .attr("instance_type", "t2.micro")
            .attr("name", "env1");
        assert!(Schema::aws().validate(&spec).is_ok());
    }

    #[test]
    fn test_missing_required_attribute() {
        let spec =
            ResourceSpec::new("aws_cloud9_environment_ec2", "test").attr("name", "env1");
        let err = Schema::aws().validate(&spec).unwrap_err();
        assert_eq!(
            err,
            InvalidSpec::MissingAttribute {
                address: Address::new("aws_cloud9_environment_ec2", "test"),
                attribute: "instance_type".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_attribute() {
        let spec = ResourceSpec::new("aws_vpc", "test")
            .attr("cidr_block", "10.0.0.0/16")
            .attr("cidr", "10.0.0.0/16");
        let err = Schema::aws().validate(&spec).unwrap_err();
        assert!(matches!(err, InvalidSpec::UnknownAttribute { attribute, .. } if attribute == "cidr"));
    }

    #[test]
    fn test_unknown_resource_type() {
        let spec = ResourceSpec::new("aws_cloud9_environment_ssh", "test");
        let err = Schema::aws().validate(&spec).unwrap_err();
        assert!(matches!(err, InvalidSpec::UnknownResourceType { .. }));
    }

    #[test]
    fn test_type_without_required_attributes() {
        let spec = ResourceSpec::new("aws_internet_gateway", "test");
        assert!(Schema::aws().validate(&spec).is_ok());
    }

    #[test]
    fn test_custom_schema() {
        let schema = Schema::new().with_resource("null_resource", ResourceSchema::default());
        assert!(schema.validate(&ResourceSpec::new("null_resource", "a")).is_ok());
        assert!(schema.validate(&ResourceSpec::new("aws_vpc", "a")).is_err());
    }
}
