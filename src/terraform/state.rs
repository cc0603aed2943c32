//! Applied Terraform state.
//!
//! Parses the JSON emitted by `terraform show -json` and flattens each
//! resource's values into the string attribute map Terraform's own test
//! framework checks against (`tags.%`, `route.#`, `route.0.cidr_block`).

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::resource::Address;

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("not found in state: {address}")]
    NotFound { address: Address },

    #[error("no identifier set for {address}")]
    NoIdentifier { address: Address },

    #[error("failed to parse state: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceState {
    pub id: String,
    pub attributes: Attributes,
}

/// Snapshot produced by one apply. Verification code only reads it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedState {
    resources: BTreeMap<Address, ResourceState>,
}

impl AppliedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, resource: ResourceState) {
        self.resources.insert(address, resource);
    }

    /// Identifier and attributes of a created resource.
    ///
    /// A resource present with an empty identifier was declared but never
    /// created and is reported as `NoIdentifier`.
    pub fn lookup(&self, address: &Address) -> Result<(&str, &Attributes), StateError> {
        let resource = self
            .resources
            .get(address)
            .ok_or_else(|| StateError::NotFound {
                address: address.clone(),
            })?;

        if resource.id.is_empty() {
            return Err(StateError::NoIdentifier {
                address: address.clone(),
            });
        }

        Ok((resource.id.as_str(), &resource.attributes))
    }

    pub fn resources(&self) -> impl Iterator<Item = (&Address, &ResourceState)> {
        self.resources.iter()
    }

    /// Identifiers of every created resource of the given type.
    pub fn ids_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.resources
            .iter()
            .filter(move |(address, _)| address.resource_type == resource_type)
            .map(|(_, resource)| resource.id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Parses `terraform show -json`. Data sources and child modules are skipped.
    pub fn from_show_json(json: &str) -> Result<Self, StateError> {
        let output: ShowOutput = serde_json::from_str(json)?;
        let mut state = Self::new();

        let Some(values) = output.values else {
            return Ok(state);
        };

        for resource in values.root_module.resources {
            if resource.mode != "managed" {
                continue;
            }

            let mut attributes = Attributes::new();
            for (key, value) in &resource.values {
                flatten(key, value, &mut attributes);
            }
            let id = attributes.get("id").cloned().unwrap_or_default();

            state.insert(
                Address::new(resource.resource_type, resource.name),
                ResourceState { id, attributes },
            );
        }

        Ok(state)
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Attributes) {
    use serde_json::Value as Json;

    match value {
        Json::Null => {}
        Json::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Json::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Json::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Json::Array(items) => {
            out.insert(format!("{prefix}.#"), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                flatten(&format!("{prefix}.{i}"), item, out);
            }
        }
        Json::Object(entries) => {
            out.insert(format!("{prefix}.%"), entries.len().to_string());
            for (key, item) in entries {
                flatten(&format!("{prefix}.{key}"), item, out);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShowOutput {
    #[serde(default)]
    values: Option<ShowValues>,
}

#[derive(Debug, Deserialize)]
struct ShowValues {
    root_module: ShowModule,
}

#[derive(Debug, Deserialize)]
struct ShowModule {
    #[serde(default)]
    resources: Vec<ShowResource>,
}

#[derive(Debug, Deserialize)]
struct ShowResource {
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    values: serde_json::Map<String, serde_json::Value>,
}
