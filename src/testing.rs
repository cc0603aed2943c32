//! In-memory cloud for exercising the lifecycle runner without Terraform or AWS.
//!
//! [`FakeCloud`] is both the [`Applier`] and the Cloud9 [`ExistenceProbe`], so
//! whatever an apply creates is immediately (or, with lag, eventually)
//! visible to probes. Failure knobs cover the situations the runner must
//! survive: eventual consistency, failed applies, failed or leaky destroys,
//! and credentials that vanish during teardown.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::probe::cloud9::RESOURCE_TYPE as CLOUD9;
use crate::probe::{ExistenceProbe, ProbeError};
use crate::render::RenderedConfig;
use crate::resource::{Address, ResourceSpec, Value};
use crate::terraform::state::{AppliedState, Attributes, ResourceState};
use crate::terraform::{ApplyError, Applier};

const ACCOUNT: &str = "123456789012";
const REGION: &str = "us-west-2";
const REVOKED_MESSAGE: &str = "User: arn:aws:sts::123456789012:assumed-role/acctest/session is not authorized to access this resource";

#[derive(Clone, Default)]
pub struct FakeCloud {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    /// What the applier believes it manages.
    state: BTreeMap<Address, ResourceState>,
    /// What actually exists, keyed by identifier.
    remote: BTreeMap<String, (String, Attributes)>,
    /// Remaining `Absent` replies per freshly created identifier.
    hidden: BTreeMap<String, u32>,
    probe_lag: u32,
    apply_calls: usize,
    fail_apply_on: Option<usize>,
    fail_after_apply_on: Option<usize>,
    fail_destroy: Option<String>,
    leak_on_destroy: bool,
    revoke_on_destroy: bool,
    revoked: bool,
    import_drops: BTreeSet<String>,
    calls: Vec<String>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// New resources answer `Absent` to the first `probes` lookups.
    pub fn with_probe_lag(self, probes: u32) -> Self {
        self.lock().probe_lag = probes;
        self
    }

    /// The `call`th apply (1-based) is rejected before touching anything.
    pub fn fail_apply_on(self, call: usize) -> Self {
        self.lock().fail_apply_on = Some(call);
        self
    }

    /// The `call`th apply (1-based) makes every change and then reports failure,
    /// the way a create that times out waiting for readiness does.
    pub fn fail_after_apply_on(self, call: usize) -> Self {
        self.lock().fail_after_apply_on = Some(call);
        self
    }

    pub fn fail_destroy(self, message: impl Into<String>) -> Self {
        self.lock().fail_destroy = Some(message.into());
        self
    }

    /// Destroy reports success but leaves the remote objects in place.
    pub fn leak_on_destroy(self) -> Self {
        self.lock().leak_on_destroy = true;
        self
    }

    /// Every probe after a destroy fails with an access-revoked denial.
    pub fn revoke_on_destroy(self) -> Self {
        self.lock().revoke_on_destroy = true;
        self
    }

    /// Attribute the remote API never returns, so import cannot recover it.
    pub fn drop_on_import(self, name: impl Into<String>) -> Self {
        self.lock().import_drops.insert(name.into());
        self
    }

    pub fn apply_count(&self) -> usize {
        self.lock().apply_calls
    }

    /// Identifiers of every remote object still present.
    pub fn remote_ids(&self) -> BTreeSet<String> {
        self.lock().remote.keys().cloned().collect()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.lock().remote.contains_key(id)
    }

    /// Ordered log of collaborator calls, e.g. `apply`, `probe env-00000001`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn allocate_id(&mut self, resource_type: &str) -> String {
        self.next_id += 1;
        let prefix = match resource_type {
            "aws_vpc" => "vpc",
            "aws_subnet" => "subnet",
            "aws_internet_gateway" => "igw",
            "aws_route_table" => "rtb",
            "aws_route_table_association" => "rtbassoc",
            CLOUD9 => "env",
            _ => "res",
        };
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn applied_state(&self) -> AppliedState {
        let mut state = AppliedState::new();
        for (address, resource) in &self.state {
            state.insert(address.clone(), resource.clone());
        }
        state
    }

    fn apply(&mut self, config: &RenderedConfig) -> Result<AppliedState, ApplyError> {
        self.apply_calls += 1;
        if self.fail_apply_on == Some(self.apply_calls) {
            return Err(ApplyError::Rejected {
                message: format!("injected failure on apply #{}", self.apply_calls),
            });
        }

        let ordered = dependency_order(&config.resources)?;
        let mut next = BTreeMap::new();

        for spec in ordered {
            let address = spec.address();
            let existing = self.state.get(&address).map(|r| r.id.clone());
            let created = existing.is_none();
            let id = match existing {
                Some(id) => id,
                None => self.allocate_id(&spec.resource_type),
            };

            let mut attributes = Attributes::new();
            for (name, value) in &spec.attributes {
                flatten(name, value, &next, &mut attributes);
            }
            computed_attributes(&spec.resource_type, &id, &mut attributes);

            if created {
                self.hidden.insert(id.clone(), self.probe_lag);
            }
            self.remote
                .insert(id.clone(), (spec.resource_type.clone(), attributes.clone()));
            next.insert(address, ResourceState { id, attributes });
        }

        for (address, dropped) in &self.state {
            if !next.contains_key(address) {
                self.remote.remove(&dropped.id);
            }
        }

        self.state = next;
        if self.fail_after_apply_on == Some(self.apply_calls) {
            return Err(ApplyError::Rejected {
                message: format!("injected failure after apply #{}", self.apply_calls),
            });
        }
        Ok(self.applied_state())
    }

    fn import(&self, address: &Address, id: &str) -> Result<AppliedState, ApplyError> {
        let Some((resource_type, attributes)) = self.remote.get(id) else {
            return Err(ApplyError::Rejected {
                message: format!("cannot import non-existent remote object {id}"),
            });
        };
        if resource_type != &address.resource_type {
            return Err(ApplyError::Rejected {
                message: format!("{id} is not a {}", address.resource_type),
            });
        }

        let attributes = attributes
            .iter()
            .filter(|(name, _)| !self.import_drops.contains(*name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut state = AppliedState::new();
        state.insert(
            address.clone(),
            ResourceState {
                id: id.to_string(),
                attributes,
            },
        );
        Ok(state)
    }

    fn destroy(&mut self) -> Result<(), ApplyError> {
        if let Some(message) = &self.fail_destroy {
            return Err(ApplyError::Rejected {
                message: message.clone(),
            });
        }

        let state = std::mem::take(&mut self.state);
        if !self.leak_on_destroy {
            for resource in state.values() {
                self.remote.remove(&resource.id);
            }
        }
        if self.revoke_on_destroy {
            self.revoked = true;
        }
        Ok(())
    }

    fn probe(&mut self, id: &str) -> Result<Attributes, ProbeError> {
        if self.revoked {
            return Err(ProbeError::AccessRevoked {
                id: id.to_string(),
                message: REVOKED_MESSAGE.to_string(),
            });
        }

        if let Some(remaining) = self.hidden.get_mut(id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ProbeError::Absent { id: id.to_string() });
        }

        match self.remote.get(id) {
            Some((resource_type, attributes)) if resource_type == CLOUD9 => Ok(attributes.clone()),
            _ => Err(ProbeError::Absent { id: id.to_string() }),
        }
    }
}

#[async_trait]
impl Applier for FakeCloud {
    async fn apply(&self, config: &RenderedConfig) -> Result<AppliedState, ApplyError> {
        let mut inner = self.lock();
        inner.calls.push("apply".to_string());
        inner.apply(config)
    }

    async fn import(
        &self,
        address: &Address,
        id: &str,
        _config: &RenderedConfig,
    ) -> Result<AppliedState, ApplyError> {
        let mut inner = self.lock();
        inner.calls.push(format!("import {address} {id}"));
        inner.import(address, id)
    }

    async fn destroy(&self, _config: &RenderedConfig) -> Result<(), ApplyError> {
        let mut inner = self.lock();
        inner.calls.push("destroy".to_string());
        inner.destroy()
    }

    async fn state(&self) -> Result<AppliedState, ApplyError> {
        let mut inner = self.lock();
        inner.calls.push("state".to_string());
        Ok(inner.applied_state())
    }
}

#[async_trait]
impl ExistenceProbe for FakeCloud {
    fn resource_type(&self) -> &str {
        CLOUD9
    }

    async fn probe(&self, id: &str) -> Result<Attributes, ProbeError> {
        let mut inner = self.lock();
        inner.calls.push(format!("probe {id}"));
        inner.probe(id)
    }
}

/// Orders resources so that every reference is resolved before use.
fn dependency_order(resources: &[ResourceSpec]) -> Result<Vec<&ResourceSpec>, ApplyError> {
    let declared: BTreeSet<Address> = resources.iter().map(ResourceSpec::address).collect();
    let mut done: BTreeSet<Address> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(resources.len());
    let mut pending: Vec<&ResourceSpec> = resources.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for spec in pending {
            let mut needs = spec.references();
            needs.extend(spec.depends_on.iter());
            if let Some(unknown) = needs.iter().find(|a| !declared.contains(**a)) {
                return Err(ApplyError::Rejected {
                    message: format!("reference to undeclared resource {unknown}"),
                });
            }
            if needs.iter().all(|a| done.contains(*a)) {
                done.insert(spec.address());
                ordered.push(spec);
            } else {
                waiting.push(spec);
            }
        }
        if waiting.len() == before {
            return Err(ApplyError::Rejected {
                message: "cycle between resources".to_string(),
            });
        }
        pending = waiting;
    }

    Ok(ordered)
}

fn flatten(
    prefix: &str,
    value: &Value,
    resolved: &BTreeMap<Address, ResourceState>,
    out: &mut Attributes,
) {
    match value {
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        Value::Reference { address, attribute } => {
            let target = resolved
                .get(address)
                .and_then(|r| r.attributes.get(attribute))
                .cloned()
                .unwrap_or_default();
            out.insert(prefix.to_string(), target);
        }
        Value::List(items) => {
            out.insert(format!("{prefix}.#"), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                flatten(&format!("{prefix}.{i}"), item, resolved, out);
            }
        }
        Value::Map(entries) => {
            out.insert(format!("{prefix}.%"), entries.len().to_string());
            for (key, item) in entries {
                flatten(&format!("{prefix}.{key}"), item, resolved, out);
            }
        }
        // Terraform stores a single nested block as a one-element list.
        Value::Block(entries) => {
            out.insert(format!("{prefix}.#"), "1".to_string());
            for (key, item) in entries {
                flatten(&format!("{prefix}.0.{key}"), item, resolved, out);
            }
        }
    }
}

fn computed_attributes(resource_type: &str, id: &str, attributes: &mut Attributes) {
    attributes.insert("id".to_string(), id.to_string());
    if resource_type == CLOUD9 {
        attributes.insert(
            "arn".to_string(),
            format!("arn:aws:cloud9:{REGION}:{ACCOUNT}:environment:{id}"),
        );
        attributes
            .entry("owner_arn".to_string())
            .or_insert_with(|| format!("arn:aws:iam::{ACCOUNT}:user/acctest"));
        attributes.insert("type".to_string(), "ec2".to_string());
    } else {
        let service = resource_type.trim_start_matches("aws_");
        attributes.insert(
            "arn".to_string(),
            format!("arn:aws:ec2:{REGION}:{ACCOUNT}:{service}/{id}"),
        );
    }
}
