//! Lifecycle runner: render, apply, probe, assert, repeat, then tear down.
//!
//! Steps run strictly in declaration order and the first failure stops the
//! run. Teardown runs whenever anything may have been created, whether the
//! steps passed or not, and its own failure is reported next to the step
//! failure instead of replacing it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::assertion::{Assertion, AssertionFailure, AttributeDiff, CheckContext};
use crate::destroy::DestructionVerifier;
use crate::error::{HarnessError, RunError};
use crate::precheck::PreCheck;
use crate::probe::{ExistenceProbe, probe_until_visible};
use crate::render::{InvalidSpec, RenderedConfig, render_all};
use crate::resource::{Address, ResourceSpec};
use crate::retry::RetryPolicy;
use crate::schema::Schema;
use crate::terraform::Applier;
use crate::terraform::state::{AppliedState, Attributes};

/// A named, ordered sequence of steps.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<Step>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub resources: Vec<ResourceSpec>,
    pub assertions: Vec<Assertion>,
    pub import: Option<ImportCheck>,
}

/// Re-import `address` by identifier and compare against the applied state.
#[derive(Debug, Clone)]
pub struct ImportCheck {
    pub address: Address,
    /// Attributes that are not expected to survive import. A name also
    /// covers its nested keys (`tags` covers `tags.%` and `tags.Name`).
    pub ignore: BTreeSet<String>,
}

impl Step {
    pub fn apply(resources: impl IntoIterator<Item = ResourceSpec>) -> Self {
        Self {
            resources: resources.into_iter().collect(),
            assertions: Vec::new(),
            import: None,
        }
    }

    /// Import verification reuses the configuration of the previous apply step.
    pub fn import(address: &Address) -> Self {
        Self {
            resources: Vec::new(),
            assertions: Vec::new(),
            import: Some(ImportCheck {
                address: address.clone(),
                ignore: BTreeSet::new(),
            }),
        }
    }

    pub fn check(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn checks(mut self, assertions: impl IntoIterator<Item = Assertion>) -> Self {
        self.assertions.extend(assertions);
        self
    }

    pub fn ignore<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        if let Some(import) = self.import.as_mut() {
            import.ignore.extend(names.into_iter().map(Into::into));
        }
        self
    }

    pub fn kind(&self) -> StepKind {
        if self.import.is_some() {
            StepKind::Import
        } else {
            StepKind::Apply
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Apply,
    Import,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Apply => f.write_str("apply"),
            StepKind::Import => f.write_str("import"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based.
    pub step: usize,
    pub kind: StepKind,
    pub identifiers: BTreeMap<Address, String>,
    pub probed: BTreeMap<Address, Attributes>,
    pub assertions: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReport {
    /// Nothing was ever handed to the applier.
    Skipped,
    Destroyed { verified: usize },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub case: String,
    pub steps: Vec<StepReport>,
    pub teardown: TeardownReport,
}

/// Per-run bookkeeping, dropped when the run ends.
#[derive(Default)]
struct Session {
    defined: BTreeSet<Address>,
    last_config: Option<RenderedConfig>,
    applied: Option<AppliedState>,
    created: BTreeSet<String>,
}

pub struct LifecycleRunner {
    applier: Arc<dyn Applier>,
    probe: Arc<dyn ExistenceProbe>,
    schema: Arc<Schema>,
    pre_check: Option<Arc<dyn PreCheck>>,
    retry: RetryPolicy,
    verifier: DestructionVerifier,
}

impl LifecycleRunner {
    pub fn new(applier: Arc<dyn Applier>, probe: Arc<dyn ExistenceProbe>, schema: Arc<Schema>) -> Self {
        let verifier = DestructionVerifier::new(Arc::clone(&probe));
        Self {
            applier,
            probe,
            schema,
            pre_check: None,
            retry: RetryPolicy::default(),
            verifier,
        }
    }

    pub fn with_pre_check(mut self, pre_check: Arc<dyn PreCheck>) -> Self {
        self.pre_check = Some(pre_check);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn tolerate_access_revoked(mut self, tolerate: bool) -> Self {
        self.verifier =
            DestructionVerifier::new(Arc::clone(&self.probe)).tolerate_access_revoked(tolerate);
        self
    }

    pub async fn run(&self, case: &TestCase) -> Result<RunReport, RunError> {
        if let Some(pre_check) = &self.pre_check {
            pre_check.check()?;
        }

        info!(case = %case.name, steps = case.steps.len(), "starting lifecycle run");

        let mut session = Session::default();
        let mut reports = Vec::with_capacity(case.steps.len());
        let mut failure = None;

        for (i, step) in case.steps.iter().enumerate() {
            let index = i + 1;
            match self.run_step(index, step, &mut session).await {
                Ok(report) => {
                    info!(case = %case.name, step = index, kind = %report.kind, "step passed");
                    reports.push(report);
                }
                Err(err) => {
                    error!(case = %case.name, step = index, error = %err, "step failed");
                    failure = Some((index, err));
                    break;
                }
            }
        }

        let teardown = self.teardown(&session).await;
        if let Err(err) = &teardown {
            error!(case = %case.name, error = %err, "teardown failed");
        }

        match (failure, teardown) {
            (None, Ok(teardown)) => Ok(RunReport {
                case: case.name.clone(),
                steps: reports,
                teardown,
            }),
            (None, Err(err)) => Err(RunError::Teardown(err)),
            (Some((step, source)), teardown) => Err(RunError::Step {
                step,
                source,
                teardown: teardown.err().map(Box::new),
            }),
        }
    }

    async fn run_step(
        &self,
        index: usize,
        step: &Step,
        session: &mut Session,
    ) -> Result<StepReport, HarnessError> {
        let started = Instant::now();
        let kind = step.kind();

        let (state, probed) = match &step.import {
            Some(check) => (self.verify_import(check, session).await?, BTreeMap::new()),
            None => self.apply_step(index, step, session).await?,
        };

        let ctx = CheckContext {
            state: &state,
            previous: session.applied.as_ref(),
            probed: &probed,
        };
        for assertion in &step.assertions {
            debug!(step = index, ?assertion, "evaluating");
            assertion.evaluate(&ctx)?;
        }

        let identifiers = state
            .resources()
            .filter(|(_, resource)| !resource.id.is_empty())
            .map(|(address, resource)| (address.clone(), resource.id.clone()))
            .collect();

        if kind == StepKind::Apply {
            session.applied = Some(state);
        }

        Ok(StepReport {
            step: index,
            kind,
            identifiers,
            probed,
            assertions: step.assertions.len(),
            elapsed: started.elapsed(),
        })
    }

    async fn apply_step(
        &self,
        index: usize,
        step: &Step,
        session: &mut Session,
    ) -> Result<(AppliedState, BTreeMap<Address, Attributes>), HarnessError> {
        check_references(&step.resources, &session.defined)?;
        let config = render_all(&step.resources, &self.schema)?;
        debug!(step = index, config = %config.text, "rendered configuration");

        session.defined.extend(config.addresses());
        // Recorded before applying so a partial apply is still torn down.
        session.last_config = Some(config.clone());

        let state = self.applier.apply(&config).await?;
        let probe_type = self.probe.resource_type();
        session
            .created
            .extend(state.ids_of_type(probe_type).map(str::to_string));

        let mut probed = BTreeMap::new();
        for address in config.addresses().filter(|a| a.resource_type == probe_type) {
            let (id, _) = state.lookup(&address)?;
            let attributes = probe_until_visible(self.probe.as_ref(), id, &self.retry).await?;
            debug!(step = index, %address, id, "resource exists");
            probed.insert(address, attributes);
        }

        Ok((state, probed))
    }

    async fn verify_import(
        &self,
        check: &ImportCheck,
        session: &Session,
    ) -> Result<AppliedState, HarnessError> {
        let (Some(config), Some(applied)) = (&session.last_config, &session.applied) else {
            return Err(InvalidSpec::ImportWithoutApply {
                address: check.address.clone(),
            }
            .into());
        };

        let (id, original) = applied.lookup(&check.address)?;
        info!(address = %check.address, id, "verifying import");

        let imported_state = self.applier.import(&check.address, id, config).await?;
        let (imported_id, imported) = imported_state.lookup(&check.address)?;

        let mut differences = diff_attributes(original, imported, &check.ignore);
        if imported_id != id && !differences.iter().any(|d| d.name == "id") {
            differences.insert(
                0,
                AttributeDiff {
                    name: "id".to_string(),
                    applied: Some(id.to_string()),
                    imported: Some(imported_id.to_string()),
                },
            );
        }

        if !differences.is_empty() {
            return Err(AssertionFailure::ImportMismatch {
                address: check.address.clone(),
                differences,
            }
            .into());
        }

        Ok(imported_state)
    }

    async fn teardown(&self, session: &Session) -> Result<TeardownReport, HarnessError> {
        let Some(config) = &session.last_config else {
            debug!("nothing applied, skipping teardown");
            return Ok(TeardownReport::Skipped);
        };

        // A failed apply may still have created resources it never reported.
        let mut tracked = session.created.clone();
        match self.applier.state().await {
            Ok(state) => tracked.extend(
                state
                    .ids_of_type(self.probe.resource_type())
                    .map(str::to_string),
            ),
            Err(err) => warn!(error = %err, "could not read managed state before destroy"),
        }

        info!(tracked = tracked.len(), "tearing down");
        self.applier.destroy(config).await?;
        self.verifier.verify_destroyed(&tracked).await?;

        Ok(TeardownReport::Destroyed {
            verified: tracked.len(),
        })
    }
}

/// Every reference must point at a resource declared in this step or an earlier one.
fn check_references(resources: &[ResourceSpec], defined: &BTreeSet<Address>) -> Result<(), InvalidSpec> {
    let local: BTreeSet<Address> = resources.iter().map(ResourceSpec::address).collect();
    for spec in resources {
        if let Some(reference) = spec
            .references()
            .into_iter()
            .find(|r| !local.contains(*r) && !defined.contains(*r))
        {
            return Err(InvalidSpec::ForwardReference {
                address: spec.address(),
                reference: reference.clone(),
            });
        }
    }
    Ok(())
}

/// Attributes that differ between applied and imported state, minus ignored names.
pub fn diff_attributes(
    applied: &Attributes,
    imported: &Attributes,
    ignore: &BTreeSet<String>,
) -> Vec<AttributeDiff> {
    let names: BTreeSet<&String> = applied.keys().chain(imported.keys()).collect();
    names
        .into_iter()
        .filter(|name| !is_ignored(name, ignore))
        .filter_map(|name| {
            let a = applied.get(name);
            let b = imported.get(name);
            (a != b).then(|| AttributeDiff {
                name: name.clone(),
                applied: a.cloned(),
                imported: b.cloned(),
            })
        })
        .collect()
}

fn is_ignored(name: &str, ignore: &BTreeSet<String>) -> bool {
    ignore.iter().any(|prefix| {
        name == prefix
            || name
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    })
}
