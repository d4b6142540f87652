use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use semver::Version;
use tokio::task::JoinSet;

use crate::activation::error::ActivationError;
use crate::activation::graph::DependencyGraph;
use crate::kernel::constants;
use crate::kernel::error::{DynError, Error};
use crate::loader::arena::{LoaderArena, NodeId};
use crate::units::descriptor::{HookKind, UnitDescriptor, ValueSpec};
use crate::units::error::UnitSystemError;
use crate::units::factory::{ResolvedValue, UnitFactory, UnitInstance};
use crate::units::registry::{RecordedHookCall, TeardownSpec, UnitRegistry, UnitState};

/// The outcome of one unit's activation attempt.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: String,
    pub result: Result<(), Arc<Error>>,
}

/// Per-unit outcomes of one activation batch plus the first recorded
/// error. Successful units stay registered even when siblings failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<UnitOutcome>,
    pub first_error: Option<Arc<Error>>,
    /// Names this batch claimed in the registry, in admission order.
    /// Rejected admissions (duplicates, unmet kernel requirements) never
    /// claimed their name and are not listed.
    pub claimed: Vec<String>,
}

impl BatchReport {
    fn record_success(&mut self, unit: String) {
        self.outcomes.push(UnitOutcome {
            unit,
            result: Ok(()),
        });
    }

    fn record_failure(&mut self, unit: String, error: Error) {
        let error = Arc::new(error);
        if self.first_error.is_none() {
            self.first_error = Some(error.clone());
        }
        self.outcomes.push(UnitOutcome {
            unit,
            result: Err(error),
        });
    }

    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Names of units that reached STARTED, in completion order.
    pub fn started_units(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.unit.clone())
            .collect()
    }

    pub fn failed_units(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.unit.clone())
            .collect()
    }

    /// Claimed names that did not start: their registry state is ERROR
    /// with no instance behind it. Undeploy discards these to return the
    /// names to availability.
    pub fn failed_claimed(&self) -> Vec<String> {
        let started = self.started_units();
        self.claimed
            .iter()
            .filter(|name| !started.contains(name))
            .cloned()
            .collect()
    }

    pub fn outcome_of(&self, unit: &str) -> Option<&Result<(), Arc<Error>>> {
        self.outcomes
            .iter()
            .find(|o| o.unit == unit)
            .map(|o| &o.result)
    }

    /// Collapse the report into the caller-facing aggregated result.
    pub fn into_result(self) -> Result<(), ActivationError> {
        match self.first_error {
            None => Ok(()),
            Some(first) => Err(ActivationError::BatchFailed {
                total: self.outcomes.len(),
                failed: self.outcomes.iter().filter(|o| o.result.is_err()).count(),
                units: self
                    .outcomes
                    .iter()
                    .filter(|o| o.result.is_err())
                    .map(|o| o.unit.clone())
                    .collect(),
                first,
            }),
        }
    }
}

/// Activates batches of unit descriptors: claims names, wires dependency
/// barriers, and runs one task per unit on the shared runtime so sibling
/// units start concurrently wherever the dependency graph allows.
pub struct ActivationEngine {
    registry: Arc<UnitRegistry>,
    arena: Arc<LoaderArena>,
    kernel_version: Version,
}

impl ActivationEngine {
    pub fn new(registry: Arc<UnitRegistry>, arena: Arc<LoaderArena>) -> crate::kernel::error::Result<Self> {
        let kernel_version = Version::parse(constants::KERNEL_API_VERSION)
            .map_err(|e| Error::Other(format!("Failed to parse KERNEL_API_VERSION constant: {e}")))?;
        Ok(Self {
            registry,
            arena,
            kernel_version,
        })
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    pub fn arena(&self) -> &Arc<LoaderArena> {
        &self.arena
    }

    /// Activate one batch. Factories are resolved through `node`.
    ///
    /// The batch completes when every unit has reported; a failed unit
    /// never aborts its siblings, and whatever started stays registered.
    pub async fn activate(&self, descriptors: Vec<UnitDescriptor>, node: NodeId) -> BatchReport {
        let mut report = BatchReport::default();
        log::info!("Activating batch of {} unit(s)", descriptors.len());

        // Admission: claim a NotStarted placeholder for every accepted
        // descriptor before any dependency-unknown decision is made.
        let mut admitted: Vec<UnitDescriptor> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(requirement) = descriptor.kernel_requirement.clone() {
                if !requirement.matches(&self.kernel_version) {
                    report.record_failure(
                        descriptor.name.clone(),
                        UnitSystemError::KernelRequirement {
                            unit: descriptor.name,
                            requirement,
                            provided: self.kernel_version.clone(),
                        }
                        .into(),
                    );
                    continue;
                }
            }
            match self.registry.begin_registration(&descriptor.name) {
                Ok(()) => {
                    report.claimed.push(descriptor.name.clone());
                    admitted.push(descriptor);
                }
                Err(e) => {
                    log::warn!("Batch admission rejected unit '{}': {e}", descriptor.name);
                    report.record_failure(descriptor.name, e.into());
                }
            }
        }

        let graph = DependencyGraph::build(&admitted);
        let cycle = graph.cycle_members();
        let mut runnable: Vec<UnitDescriptor> = Vec::with_capacity(admitted.len());
        for descriptor in admitted {
            if cycle.contains(&descriptor.name) {
                self.registry.set_state(&descriptor.name, UnitState::Error);
                report.record_failure(
                    descriptor.name,
                    UnitSystemError::DependencyCycle {
                        members: cycle.iter().cloned().collect(),
                    }
                    .into(),
                );
            } else {
                runnable.push(descriptor);
            }
        }

        // Wait-set assembly. Every placeholder is in by now, so a name with
        // no state at all can never be satisfied.
        let mut tasks: JoinSet<(String, Result<(), Error>)> = JoinSet::new();
        'units: for descriptor in runnable {
            let mut waits = Vec::new();
            for dep in descriptor.dependency_names() {
                match self.registry.state_of(&dep) {
                    None => {
                        self.registry.set_state(&descriptor.name, UnitState::Error);
                        report.record_failure(
                            descriptor.name.clone(),
                            UnitSystemError::UnknownDependency {
                                unit: descriptor.name.clone(),
                                dependency: dep,
                            }
                            .into(),
                        );
                        continue 'units;
                    }
                    Some(state) if state.is_terminal() => {}
                    Some(_) => {
                        if let Some(rx) = self.registry.subscribe(&dep) {
                            waits.push(rx);
                        }
                    }
                }
            }
            let registry = self.registry.clone();
            let arena = self.arena.clone();
            let name = descriptor.name.clone();
            tasks.spawn(async move {
                let result = activate_unit(descriptor, waits, registry, arena, node).await;
                (name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => report.record_success(name),
                Ok((name, Err(e))) => {
                    log::error!("Unit '{name}' failed to activate: {e}");
                    report.record_failure(name, e);
                }
                Err(join_error) => {
                    log::error!("Activation task aborted: {join_error}");
                    report.record_failure(
                        "<unknown>".to_string(),
                        Error::Other(format!("activation task aborted: {join_error}")),
                    );
                }
            }
        }

        log::info!(
            "Batch complete: {} started, {} failed",
            report.started_units().len(),
            report.failed_units().len()
        );
        report
    }
}

async fn activate_unit(
    descriptor: UnitDescriptor,
    waits: Vec<tokio::sync::watch::Receiver<UnitState>>,
    registry: Arc<UnitRegistry>,
    arena: Arc<LoaderArena>,
    node: NodeId,
) -> Result<(), Error> {
    for mut rx in waits {
        // A closed channel means the other side went away mid-teardown;
        // proceed and let the state re-check below decide.
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }

    for dep in descriptor.dependency_names() {
        match registry.state_of(&dep) {
            Some(UnitState::Started) => {}
            _ => {
                registry.set_state(&descriptor.name, UnitState::Error);
                return Err(UnitSystemError::DependencyFailed {
                    unit: descriptor.name.clone(),
                    dependency: dep,
                }
                .into());
            }
        }
    }

    registry.set_state(&descriptor.name, UnitState::Starting);
    match build_unit(&descriptor, &registry, &arena, node) {
        Ok(()) => {
            // Registration precedes this broadcast, so dependents woken
            // here always observe the finished instance.
            registry.set_state(&descriptor.name, UnitState::Started);
            log::info!("Unit '{}' started", descriptor.name);
            Ok(())
        }
        Err(e) => {
            registry.set_state(&descriptor.name, UnitState::Error);
            Err(e)
        }
    }
}

fn build_unit(
    descriptor: &UnitDescriptor,
    registry: &Arc<UnitRegistry>,
    arena: &Arc<LoaderArena>,
    node: NodeId,
) -> Result<(), Error> {
    let unit = descriptor.name.as_str();
    let factory = arena.resolve_factory(node, &descriptor.factory)?;

    let mut args = Vec::with_capacity(descriptor.constructor_args.len());
    for spec in &descriptor.constructor_args {
        args.push(resolve_value(spec, None, registry, unit)?);
    }
    let instance = guarded(unit, "constructor", || factory.construct(&args)).map_err(|e| {
        Error::UnitSystem(match e {
            GuardedError::Panicked(message) => UnitSystemError::construction(unit, message),
            GuardedError::Failed(source) => UnitSystemError::ConstructionFailure {
                unit: unit.to_string(),
                message: "constructor failed".to_string(),
                source: Some(source),
            },
        })
    })?;

    for property in &descriptor.properties {
        let setter = factory.find_setter(&property.name).ok_or_else(|| {
            UnitSystemError::construction(unit, format!("no setter for property '{}'", property.name))
        })?;
        let value = resolve_value(&property.value, Some(&instance), registry, unit)?;
        guarded(unit, &property.name, || setter(&instance, value)).map_err(|e| {
            Error::UnitSystem(UnitSystemError::ConstructionFailure {
                unit: unit.to_string(),
                message: format!("property '{}' assignment failed", property.name),
                source: e.into_source(),
            })
        })?;
    }

    invoke_lifecycle_hook(descriptor, &factory, &instance, HookKind::Create)?;
    invoke_lifecycle_hook(descriptor, &factory, &instance, HookKind::Start)?;

    for call in &descriptor.installs {
        run_install(call, &factory, &instance, registry, unit)?;
    }

    let teardown = TeardownSpec {
        stop: descriptor
            .lifecycle
            .stop
            .resolved_name(HookKind::Stop)
            .map(str::to_string),
        destroy: descriptor
            .lifecycle
            .destroy
            .resolved_name(HookKind::Destroy)
            .map(str::to_string),
        uninstalls: descriptor
            .uninstalls
            .iter()
            .map(|call| RecordedHookCall {
                target: call.target.clone(),
                method: call.method.clone(),
            })
            .collect(),
    };
    registry.register(unit, instance, factory, teardown)?;
    Ok(())
}

fn invoke_lifecycle_hook(
    descriptor: &UnitDescriptor,
    factory: &UnitFactory,
    instance: &UnitInstance,
    kind: HookKind,
) -> Result<(), Error> {
    let unit = descriptor.name.as_str();
    let Some(hook_name) = descriptor.lifecycle.hook(kind).resolved_name(kind) else {
        return Ok(());
    };
    // Probing for an absent optional hook is fine; only a hook that exists
    // and fails is an error.
    let Some(hook) = factory.find_hook(hook_name) else {
        return Ok(());
    };
    guarded(unit, hook_name, || hook(instance)).map_err(|e| {
        Error::UnitSystem(UnitSystemError::HookFailure {
            unit: unit.to_string(),
            hook: hook_name.to_string(),
            source: e.into_dyn(),
        })
    })
}

fn run_install(
    call: &crate::units::descriptor::HookCallSpec,
    factory: &UnitFactory,
    instance: &UnitInstance,
    registry: &Arc<UnitRegistry>,
    unit: &str,
) -> Result<(), Error> {
    let hook_failure = |source: DynError| {
        Error::UnitSystem(UnitSystemError::HookFailure {
            unit: unit.to_string(),
            hook: call.method.clone(),
            source,
        })
    };
    match &call.target {
        None => {
            let hook = factory
                .find_hook(&call.method)
                .ok_or_else(|| hook_failure(format!("install hook '{}' not found", call.method).into()))?
                .clone();
            guarded(unit, &call.method, || hook(instance)).map_err(|e| hook_failure(e.into_dyn()))
        }
        Some(target) => {
            let target_instance = registry.lookup(target).ok_or_else(|| {
                hook_failure(format!("install target '{target}' is not registered").into())
            })?;
            let target_factory = registry.factory_of(target).ok_or_else(|| {
                hook_failure(format!("install target '{target}' has no factory").into())
            })?;
            let install = target_factory
                .find_install(&call.method)
                .ok_or_else(|| {
                    hook_failure(
                        format!("install callback '{}' not found on '{target}'", call.method).into(),
                    )
                })?
                .clone();
            guarded(unit, &call.method, || install(&target_instance, instance))
                .map_err(|e| hook_failure(e.into_dyn()))
        }
    }
}

fn resolve_value(
    spec: &ValueSpec,
    this: Option<&UnitInstance>,
    registry: &Arc<UnitRegistry>,
    unit: &str,
) -> Result<ResolvedValue, Error> {
    match spec {
        ValueSpec::Literal(value) => Ok(ResolvedValue::Literal(value.clone())),
        ValueSpec::Null => Ok(ResolvedValue::Null),
        ValueSpec::SelfRef => match this {
            Some(instance) => Ok(ResolvedValue::Unit(instance.clone())),
            // The instance does not exist yet while its own constructor runs.
            None => Err(UnitSystemError::construction(
                unit,
                "self reference is not available in constructor arguments",
            )
            .into()),
        },
        ValueSpec::Ref {
            unit: target,
            accessor,
        } => {
            let instance = registry.lookup(target).ok_or_else(|| {
                UnitSystemError::construction(unit, format!("dependency '{target}' is not available"))
            })?;
            match accessor {
                None => Ok(ResolvedValue::Unit(instance)),
                Some(accessor_name) => {
                    let target_factory = registry.factory_of(target).ok_or_else(|| {
                        UnitSystemError::construction(
                            unit,
                            format!("dependency '{target}' has no factory"),
                        )
                    })?;
                    let accessor_fn =
                        target_factory.find_accessor(accessor_name).ok_or_else(|| {
                            UnitSystemError::construction(
                                unit,
                                format!("no accessor '{accessor_name}' on unit '{target}'"),
                            )
                        })?;
                    accessor_fn(&instance).map_err(|source| {
                        Error::UnitSystem(UnitSystemError::ConstructionFailure {
                            unit: unit.to_string(),
                            message: format!("accessor '{accessor_name}' on '{target}' failed"),
                            source: Some(source),
                        })
                    })
                }
            }
        }
        ValueSpec::List(items) => Ok(ResolvedValue::List(resolve_all(items, this, registry, unit)?)),
        ValueSpec::Set(items) => Ok(ResolvedValue::Set(resolve_all(items, this, registry, unit)?)),
        ValueSpec::Map(pairs) => {
            let mut resolved = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                resolved.push((
                    resolve_value(key, this, registry, unit)?,
                    resolve_value(value, this, registry, unit)?,
                ));
            }
            Ok(ResolvedValue::Map(resolved))
        }
    }
}

fn resolve_all(
    items: &[ValueSpec],
    this: Option<&UnitInstance>,
    registry: &Arc<UnitRegistry>,
    unit: &str,
) -> Result<Vec<ResolvedValue>, Error> {
    let mut resolved = Vec::with_capacity(items.len());
    for item in items {
        resolved.push(resolve_value(item, this, registry, unit)?);
    }
    Ok(resolved)
}

enum GuardedError {
    Failed(DynError),
    Panicked(String),
}

impl GuardedError {
    fn into_dyn(self) -> DynError {
        match self {
            GuardedError::Failed(source) => source,
            GuardedError::Panicked(message) => message.into(),
        }
    }

    fn into_source(self) -> Option<DynError> {
        Some(self.into_dyn())
    }
}

/// Run collaborator code, converting a panic into an error instead of
/// taking the activation task down with it.
fn guarded<T>(
    unit: &str,
    what: &str,
    f: impl FnOnce() -> Result<T, DynError>,
) -> Result<T, GuardedError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(GuardedError::Failed(source)),
        Err(_) => {
            log::error!("'{what}' panicked while activating unit '{unit}'");
            Err(GuardedError::Panicked(format!("'{what}' panicked")))
        }
    }
}
