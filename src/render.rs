//! Renders resource specs into HCL configuration text.
//!
//! Output is canonical: attributes are emitted in sorted order with aligned
//! `=`, nested blocks follow the attributes, and `depends_on` comes last.
//! Rendering the same specs twice always yields byte-identical text.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::resource::{Address, ResourceSpec, Value};
use crate::schema::Schema;

const INDENT: &str = "  ";

/// Configuration problems caught before anything reaches the external system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSpec {
    #[error("invalid spec: unknown resource type '{resource_type}'")]
    UnknownResourceType { resource_type: String },

    #[error("invalid spec: {address} is missing required attribute '{attribute}'")]
    MissingAttribute { address: Address, attribute: String },

    #[error("invalid spec: {address} has unknown attribute '{attribute}'")]
    UnknownAttribute { address: Address, attribute: String },

    #[error("invalid spec: {address} is declared more than once")]
    DuplicateAddress { address: Address },

    #[error("invalid spec: {address} references undeclared resource {reference}")]
    ForwardReference { address: Address, reference: Address },

    #[error("invalid spec: import step for {address} has no prior apply step")]
    ImportWithoutApply { address: Address },
}

/// Rendered configuration text together with the specs it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedConfig {
    pub text: String,
    pub resources: Vec<ResourceSpec>,
}

impl RenderedConfig {
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.resources.iter().map(ResourceSpec::address)
    }
}

/// Renders a single resource block.
pub fn render(spec: &ResourceSpec, schema: &Schema) -> Result<String, InvalidSpec> {
    schema.validate(spec)?;

    let mut out = String::new();
    out.push_str(&format!(
        "resource {} {} {{\n",
        quote(&spec.resource_type),
        quote(&spec.name)
    ));
    render_body(&mut out, &spec.attributes, 1);

    if !spec.depends_on.is_empty() {
        if !spec.attributes.is_empty() {
            out.push('\n');
        }
        let deps: Vec<String> = spec.depends_on.iter().map(Address::to_string).collect();
        out.push_str(&format!("{INDENT}depends_on = [{}]\n", deps.join(", ")));
    }

    out.push_str("}\n");
    Ok(out)
}

/// Renders a whole configuration, one blank line between resources.
pub fn render_all(specs: &[ResourceSpec], schema: &Schema) -> Result<RenderedConfig, InvalidSpec> {
    let mut seen = BTreeSet::new();
    let mut blocks = Vec::with_capacity(specs.len());

    for spec in specs {
        let address = spec.address();
        if !seen.insert(address.clone()) {
            return Err(InvalidSpec::DuplicateAddress { address });
        }
        blocks.push(render(spec, schema)?);
    }

    Ok(RenderedConfig {
        text: blocks.join("\n"),
        resources: specs.to_vec(),
    })
}

fn render_body(out: &mut String, entries: &BTreeMap<String, Value>, depth: usize) {
    let indent = INDENT.repeat(depth);
    let (blocks, attributes): (Vec<_>, Vec<_>) =
        entries.iter().partition(|(_, value)| is_block(value));

    let width = attributes
        .iter()
        .map(|(name, _)| key(name).len())
        .max()
        .unwrap_or(0);

    for (name, value) in &attributes {
        out.push_str(&format!(
            "{indent}{:<width$} = {}\n",
            key(name),
            expression(value, depth),
        ));
    }

    for (name, value) in blocks {
        let bodies: Vec<&BTreeMap<String, Value>> = match value {
            Value::Block(body) => vec![body],
            Value::List(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Block(body) => Some(body),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        for body in bodies {
            if !out.ends_with("{\n") {
                out.push('\n');
            }
            out.push_str(&format!("{indent}{name} {{\n"));
            render_body(out, body, depth + 1);
            out.push_str(&format!("{indent}}}\n"));
        }
    }
}

fn is_block(value: &Value) -> bool {
    match value {
        Value::Block(_) => true,
        Value::List(items) => !items.is_empty() && items.iter().all(|v| matches!(v, Value::Block(_))),
        _ => false,
    }
}

fn expression(value: &Value, depth: usize) -> String {
    match value {
        Value::String(s) => quote(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Reference { address, attribute } => format!("{address}.{attribute}"),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|v| expression(v, depth)).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) | Value::Block(entries) => {
            if entries.is_empty() {
                return "{}".to_string();
            }
            let inner = INDENT.repeat(depth + 1);
            let outer = INDENT.repeat(depth);
            let width = entries.keys().map(|k| key(k).len()).max().unwrap_or(0);
            let mut out = String::from("{\n");
            for (name, value) in entries {
                out.push_str(&format!(
                    "{inner}{:<width$} = {}\n",
                    key(name),
                    expression(value, depth + 1)
                ));
            }
            out.push_str(&format!("{outer}}}"));
            out
        }
    }
}

/// Map keys that are not bare identifiers must be quoted.
fn key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Quotes a string literal, escaping template sequences so they stay literal.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> ResourceSpec {
        ResourceSpec::new("aws_cloud9_environment_ec2", "test")
            .attr("instance_type", "t2.micro")
            .attr("name", name)
    }

    #[test]
    fn test_render_basic_environment() {
        let text = render(&env("env1"), &Schema::aws()).unwrap();
        assert_eq!(
            text,
            "resource \"aws_cloud9_environment_ec2\" \"test\" {\n  instance_type = \"t2.micro\"\n  name          = \"env1\"\n}\n"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let schema = Schema::aws();
        let a = render(&env("env1"), &schema).unwrap();
        let b = render(&env("env1"), &schema).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_rejects_missing_required() {
        let spec = ResourceSpec::new("aws_cloud9_environment_ec2", "test").attr("name", "x");
        let err = render(&spec, &Schema::aws()).unwrap_err();
        assert!(err.to_string().contains("instance_type"));
        assert!(err.to_string().starts_with("invalid spec"));
    }

    #[test]
    fn test_render_references_and_depends_on() {
        let subnet = Address::new("aws_subnet", "test");
        let assoc = Address::new("aws_route_table_association", "test");
        let spec = env("env1")
            .attr("subnet_id", subnet.attr("id"))
            .attr("automatic_stop_time_minutes", 60)
            .depends_on(assoc);

        let text = render(&spec, &Schema::aws()).unwrap();
        assert!(text.contains("  subnet_id                   = aws_subnet.test.id\n"));
        assert!(text.contains("  automatic_stop_time_minutes = 60\n"));
        assert!(text.ends_with("\n  depends_on = [aws_route_table_association.test]\n}\n"));
    }

    #[test]
    fn test_render_nested_block() {
        let vpc = Address::new("aws_vpc", "test");
        let igw = Address::new("aws_internet_gateway", "test");
        let spec = ResourceSpec::new("aws_route_table", "test")
            .attr("vpc_id", vpc.attr("id"))
            .attr(
                "route",
                Value::block([
                    ("cidr_block", Value::from("0.0.0.0/0")),
                    ("gateway_id", igw.attr("id")),
                ]),
            );

        let text = render(&spec, &Schema::aws()).unwrap();
        assert_eq!(
            text,
            "resource \"aws_route_table\" \"test\" {\n  vpc_id = aws_vpc.test.id\n\n  route {\n    cidr_block = \"0.0.0.0/0\"\n    gateway_id = aws_internet_gateway.test.id\n  }\n}\n"
        );
    }

    #[test]
    fn test_render_map_with_quoted_keys() {
        let spec = ResourceSpec::new("aws_vpc", "test")
            .attr("cidr_block", "10.10.0.0/16")
            .attr("tags", Value::map([("Name", "net"), ("team:owner", "qa")]));
        let text = render(&spec, &Schema::aws()).unwrap();
        assert!(text.contains("  tags       = {\n    Name         = \"net\"\n    \"team:owner\" = \"qa\"\n  }\n"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
        assert_eq!(quote("line\nbreak\ttab"), "\"line\\nbreak\\ttab\"");
        assert_eq!(quote("${var.x}"), "\"$${var.x}\"");
        assert_eq!(quote("%{ if x }"), "\"%%{ if x }\"");
        assert_eq!(quote("cost: $5 or 10%"), "\"cost: $5 or 10%\"");
    }

    #[test]
    fn test_render_all_joins_with_blank_line() {
        let vpc = ResourceSpec::new("aws_vpc", "test").attr("cidr_block", "10.10.0.0/16");
        let config = render_all(&[env("env1"), vpc], &Schema::aws()).unwrap();
        assert!(config.text.contains("}\n\nresource \"aws_vpc\" \"test\" {"));
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.addresses().count(), 2);
    }

    #[test]
    fn test_render_all_rejects_duplicates() {
        let err = render_all(&[env("a"), env("b")], &Schema::aws()).unwrap_err();
        assert!(matches!(err, InvalidSpec::DuplicateAddress { .. }));
    }
}
