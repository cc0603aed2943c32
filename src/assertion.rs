use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::resource::Address;
use crate::terraform::state::{AppliedState, Attributes};

pub type Predicate = Arc<dyn Fn(&AppliedState) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssertionFailure {
    #[error("{address}: attribute '{name}' expected {expected:?}, got {}", display_actual(.actual))]
    Mismatch {
        address: Address,
        name: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("{address}: attribute '{name}' expected to be set")]
    NotSet { address: Address, name: String },

    #[error("{address}: not found in applied state")]
    MissingResource { address: Address },

    #[error("{address}: no probed attributes")]
    NotProbed { address: Address },

    #[error("{address}: replaced ({before} -> {after}), expected an in-place update")]
    Replaced {
        address: Address,
        before: String,
        after: String,
    },

    #[error("{address}: imported state differs in {}", display_diffs(.differences))]
    ImportMismatch {
        address: Address,
        differences: Vec<AttributeDiff>,
    },

    #[error("{description}: {message}")]
    Custom { description: String, message: String },
}

fn display_actual(actual: &Option<String>) -> String {
    match actual {
        Some(value) => format!("{value:?}"),
        None => "<unset>".to_string(),
    }
}

fn display_diffs(differences: &[AttributeDiff]) -> String {
    differences
        .iter()
        .map(AttributeDiff::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One attribute that did not survive an import round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDiff {
    pub name: String,
    pub applied: Option<String>,
    pub imported: Option<String>,
}

impl fmt::Display for AttributeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} vs {})",
            self.name,
            display_actual(&self.applied),
            display_actual(&self.imported)
        )
    }
}

/// What an assertion may look at once a step's apply has completed.
pub struct CheckContext<'a> {
    pub state: &'a AppliedState,
    /// State recorded by the previous successful step, if any.
    pub previous: Option<&'a AppliedState>,
    pub probed: &'a BTreeMap<Address, Attributes>,
}

#[derive(Clone)]
pub enum Assertion {
    AttributeEquals {
        address: Address,
        name: String,
        expected: String,
    },
    AttributeSet {
        address: Address,
        name: String,
    },
    /// The identifier matches the previous step's, i.e. no replacement happened.
    IdentifierStable { address: Address },
    /// Like `AttributeEquals`, but against what the probe reported.
    Probed {
        address: Address,
        name: String,
        expected: String,
    },
    Custom {
        description: String,
        predicate: Predicate,
    },
}

impl Assertion {
    pub fn equals(address: &Address, name: &str, expected: impl Into<String>) -> Self {
        Assertion::AttributeEquals {
            address: address.clone(),
            name: name.to_string(),
            expected: expected.into(),
        }
    }

    pub fn set(address: &Address, name: &str) -> Self {
        Assertion::AttributeSet {
            address: address.clone(),
            name: name.to_string(),
        }
    }

    pub fn stable(address: &Address) -> Self {
        Assertion::IdentifierStable {
            address: address.clone(),
        }
    }

    pub fn probed(address: &Address, name: &str, expected: impl Into<String>) -> Self {
        Assertion::Probed {
            address: address.clone(),
            name: name.to_string(),
            expected: expected.into(),
        }
    }

    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&AppliedState) -> Result<(), String> + Send + Sync + 'static,
    {
        Assertion::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn evaluate(&self, ctx: &CheckContext<'_>) -> Result<(), AssertionFailure> {
        match self {
            Assertion::AttributeEquals {
                address,
                name,
                expected,
            } => {
                let (_, attributes) = resource(ctx.state, address)?;
                compare(address, name, expected, attributes)
            }
            Assertion::AttributeSet { address, name } => {
                let (_, attributes) = resource(ctx.state, address)?;
                match attributes.get(name) {
                    Some(value) if !value.is_empty() => Ok(()),
                    _ => Err(AssertionFailure::NotSet {
                        address: address.clone(),
                        name: name.clone(),
                    }),
                }
            }
            Assertion::IdentifierStable { address } => {
                let (after, _) = resource(ctx.state, address)?;
                let Some(previous) = ctx.previous else {
                    return Ok(());
                };
                let (before, _) = resource(previous, address)?;
                if before == after {
                    Ok(())
                } else {
                    Err(AssertionFailure::Replaced {
                        address: address.clone(),
                        before: before.to_string(),
                        after: after.to_string(),
                    })
                }
            }
            Assertion::Probed {
                address,
                name,
                expected,
            } => {
                let attributes =
                    ctx.probed
                        .get(address)
                        .ok_or_else(|| AssertionFailure::NotProbed {
                            address: address.clone(),
                        })?;
                compare(address, name, expected, attributes)
            }
            Assertion::Custom {
                description,
                predicate,
            } => predicate(ctx.state).map_err(|message| AssertionFailure::Custom {
                description: description.clone(),
                message,
            }),
        }
    }
}

fn resource<'a>(
    state: &'a AppliedState,
    address: &Address,
) -> Result<(&'a str, &'a Attributes), AssertionFailure> {
    state
        .lookup(address)
        .map_err(|_| AssertionFailure::MissingResource {
            address: address.clone(),
        })
}

fn compare(
    address: &Address,
    name: &str,
    expected: &str,
    attributes: &Attributes,
) -> Result<(), AssertionFailure> {
    let actual = attributes.get(name);
    match actual {
        Some(value) if value == expected => Ok(()),
        // An empty collection is recorded as an absent count key.
        None if expected == "0" && (name.ends_with(".#") || name.ends_with(".%")) => Ok(()),
        _ => Err(AssertionFailure::Mismatch {
            address: address.clone(),
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.cloned(),
        }),
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::AttributeEquals {
                address,
                name,
                expected,
            } => write!(f, "AttributeEquals({address}.{name} == {expected:?})"),
            Assertion::AttributeSet { address, name } => {
                write!(f, "AttributeSet({address}.{name})")
            }
            Assertion::IdentifierStable { address } => write!(f, "IdentifierStable({address})"),
            Assertion::Probed {
                address,
                name,
                expected,
            } => write!(f, "Probed({address}.{name} == {expected:?})"),
            Assertion::Custom { description, .. } => write!(f, "Custom({description})"),
        }
    }
}
