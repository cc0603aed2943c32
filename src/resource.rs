use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a resource inside one configuration, `<type>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Address {
    pub resource_type: String,
    pub name: String,
}

impl Address {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Parses `aws_vpc.test`. Module-qualified and indexed addresses are rejected.
    pub fn parse(input: &str) -> Option<Self> {
        let (resource_type, name) = input.split_once('.')?;
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !valid(resource_type) || !valid(name) || resource_type == "module" {
            return None;
        }
        Some(Self::new(resource_type, name))
    }

    /// Reference expression to one of this resource's attributes.
    pub fn attr(&self, attribute: impl Into<String>) -> Value {
        Value::Reference {
            address: self.clone(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    String(String),
    Number(i64),
    Bool(bool),
    Reference { address: Address, attribute: String },
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Nested configuration block, e.g. `route { ... }`.
    Block(BTreeMap<String, Value>),
}

impl Value {
    pub fn block<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Block(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Every resource address this value refers to, in encounter order.
    pub fn references(&self) -> Vec<&Address> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Address>) {
        match self {
            Value::Reference { address, .. } => out.push(address),
            Value::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Value::Map(entries) | Value::Block(entries) => {
                entries.values().for_each(|v| v.collect_references(out))
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

/// One declared resource. Built once per step and never mutated after rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceSpec {
    pub resource_type: String,
    pub name: String,
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<Address>,
}

impl ResourceSpec {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn depends_on(mut self, address: Address) -> Self {
        self.depends_on.push(address);
        self
    }

    pub fn address(&self) -> Address {
        Address::new(&self.resource_type, &self.name)
    }

    /// Attribute references plus explicit `depends_on` edges.
    pub fn references(&self) -> Vec<&Address> {
        let mut refs: Vec<&Address> = self
            .attributes
            .values()
            .flat_map(|v| v.references())
            .collect();
        refs.extend(self.depends_on.iter());
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let address = Address::new("aws_cloud9_environment_ec2", "test");
        assert_eq!(address.to_string(), "aws_cloud9_environment_ec2.test");
        assert_eq!(
            Address::parse("aws_cloud9_environment_ec2.test"),
            Some(address)
        );
    }

    #[test]
    fn test_address_parse_rejects_malformed() {
        assert!(Address::parse("aws_vpc").is_none());
        assert!(Address::parse(".test").is_none());
        assert!(Address::parse("aws_vpc.").is_none());
        assert!(Address::parse("module.net").is_none());
        assert!(Address::parse("aws_vpc.test[0]").is_none());
        assert!(Address::parse("aws_vpc.test.id").is_none());
    }

    #[test]
    fn test_spec_references_include_depends_on() {
        let subnet = Address::new("aws_subnet", "test");
        let assoc = Address::new("aws_route_table_association", "test");
        let spec = ResourceSpec::new("aws_cloud9_environment_ec2", "test")
            .attr("subnet_id", subnet.attr("id"))
            .depends_on(assoc.clone());

        let refs = spec.references();
        assert_eq!(refs, vec![&subnet, &assoc]);
    }

    #[test]
    fn test_nested_block_references() {
        let igw = Address::new("aws_internet_gateway", "test");
        let value = Value::List(vec![Value::block([
            ("cidr_block", Value::from("0.0.0.0/0")),
            ("gateway_id", igw.attr("id")),
        ])]);
        assert_eq!(value.references(), vec![&igw]);
    }

    #[test]
    fn test_spec_serialization_snake_case() {
        let spec = ResourceSpec::new("aws_vpc", "test").attr("cidr_block", "10.10.0.0/16");
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("resource_type"));
        assert!(json.contains("depends_on"));
        assert!(!json.contains("resourceType"));
    }

    #[test]
    fn test_spec_deserialization_defaults_depends_on() {
        let json = r#"{
            "resource_type": "aws_vpc",
            "name": "test",
            "attributes": {"cidr_block": {"string": "10.10.0.0/16"}}
        }"#;
        let spec: ResourceSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.address(), Address::new("aws_vpc", "test"));
        assert_eq!(
            spec.attributes["cidr_block"],
            Value::String("10.10.0.0/16".to_string())
        );
        assert!(spec.depends_on.is_empty());
    }
}
