use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::activation::engine::ActivationEngine;
use crate::deployment::deployer::{DeployContext, Deployer, DeploymentRecord};
use crate::deployment::error::DeploymentError;
use crate::deployment::order::sort_deployers;
use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::loader::arena::{LoadPolicy, LoaderArena, NodeId};
use crate::units::capability::DeployPhase;
use crate::units::descriptor::UnitDescriptor;
use crate::units::registry::UnitRegistry;

/// Whether phase-hook failures surface to the caller or are only logged.
/// Caller-synchronous API paths surface; watcher-driven calls log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseFailureMode {
    Surface,
    LogOnly,
}

/// Orchestrates the ordered set of pluggable deployers, tracks which
/// deployments are currently registered, and drives the pre/post phase
/// callbacks around every deploy and undeploy.
///
/// Deploy and undeploy are serialized relative to each other by an
/// internal gate; unit-level concurrency lives below, in the engine.
pub struct DeploymentCoordinator {
    registry: Arc<UnitRegistry>,
    engine: Arc<ActivationEngine>,
    arena: Arc<LoaderArena>,
    baseline_node: NodeId,
    deployment_policy: LoadPolicy,
    deployers: RwLock<Vec<Arc<dyn Deployer>>>,
    records: StdMutex<Vec<DeploymentRecord>>,
    gate: Mutex<()>,
}

impl DeploymentCoordinator {
    pub fn new(
        registry: Arc<UnitRegistry>,
        engine: Arc<ActivationEngine>,
        arena: Arc<LoaderArena>,
        baseline_node: NodeId,
        deployment_policy: LoadPolicy,
    ) -> Self {
        Self {
            registry,
            engine,
            arena,
            baseline_node,
            deployment_policy,
            deployers: RwLock::new(Vec::new()),
            records: StdMutex::new(Vec::new()),
            gate: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<ActivationEngine> {
        &self.engine
    }

    /// Register a deployer strategy; the list is kept priority-sorted.
    pub fn add_deployer(&self, deployer: Arc<dyn Deployer>) {
        let mut deployers = self
            .deployers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        log::info!(
            "Registered deployer '{}' (priority {})",
            deployer.name(),
            deployer.order()
        );
        deployers.push(deployer);
        sort_deployers(&mut deployers);
    }

    /// Deployer names in execution order.
    pub fn deployer_names(&self) -> Vec<String> {
        self.deployers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Currently registered deployment records, oldest first.
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push_record(&self, record: DeploymentRecord) {
        log::info!(
            "Deployment registered: {} unit(s) from {} via '{}'",
            record.units.len(),
            record
                .location
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<programmatic>".to_string()),
            record.deployer
        );
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Deploy a location through every accepting deployer, in ascending
    /// priority order. The first deployer error aborts the remaining
    /// deployers for this location only.
    pub async fn deploy(&self, location: &Path) -> Result<()> {
        self.deploy_with_mode(location, PhaseFailureMode::Surface)
            .await
    }

    pub(crate) async fn deploy_with_mode(
        &self,
        location: &Path,
        mode: PhaseFailureMode,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.run_phase(DeployPhase::PreDeploy, mode)?;

        let node = self.arena.add_node(
            &location.display().to_string(),
            self.deployment_policy,
            Some(self.baseline_node),
            Vec::new(),
        );
        let mut context = DeployContext::new(self.engine.clone(), node);
        let deployers: Vec<Arc<dyn Deployer>> = self
            .deployers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut outcome = Ok(());
        let mut accepted = false;
        for deployer in deployers {
            if !deployer.accepts(location) {
                continue;
            }
            accepted = true;
            log::info!(
                "Running deployer '{}' against {}",
                deployer.name(),
                location.display()
            );
            match deployer.deploy(location, &mut context).await {
                Ok(Some(record)) => self.push_record(record),
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "Deployer '{}' failed for {}: {e}",
                        deployer.name(),
                        location.display()
                    );
                    outcome = Err(Error::Deployment(DeploymentError::DeployerFailed {
                        deployer: deployer.name().to_string(),
                        location: location.to_path_buf(),
                        source: Box::new(e),
                    }));
                    break;
                }
            }
        }
        for record in context.take_records() {
            self.push_record(record);
        }
        if !accepted {
            log::debug!("No deployer accepted {}", location.display());
        }

        let phase = self.run_phase(DeployPhase::PostDeploy, mode);
        outcome?;
        phase
    }

    /// Undeploy everything previously deployed from a location, newest
    /// record first, each record's units in reverse registration order.
    /// Teardown errors are collected, not short-circuited; the first is
    /// reported.
    pub async fn undeploy(&self, location: &Path) -> Result<()> {
        self.undeploy_with_mode(location, PhaseFailureMode::Surface)
            .await
    }

    pub(crate) async fn undeploy_with_mode(
        &self,
        location: &Path,
        mode: PhaseFailureMode,
    ) -> Result<()> {
        let _gate = self.gate.lock().await;

        let matching: Vec<DeploymentRecord> = {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let (matching, remaining): (Vec<_>, Vec<_>) = records
                .drain(..)
                .partition(|r| r.location.as_deref() == Some(location));
            *records = remaining;
            matching
        };
        if matching.is_empty() {
            log::debug!("Nothing deployed from {}", location.display());
            return match mode {
                PhaseFailureMode::Surface => Err(Error::Deployment(
                    DeploymentError::NoMatchingRecord(location.to_path_buf()),
                )),
                PhaseFailureMode::LogOnly => Ok(()),
            };
        }

        let phase_pre = self.run_phase(DeployPhase::PreUndeploy, mode);
        let mut first_error: Option<Error> = phase_pre.err();

        for record in matching.iter().rev() {
            log::info!(
                "Undeploying {} unit(s) from {} via '{}'",
                record.units.len(),
                location.display(),
                record.deployer
            );
            if let Some(e) = self.tear_down_record(record) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        let phase_post = self.run_phase(DeployPhase::PostUndeploy, mode);
        if first_error.is_none() {
            first_error = phase_post.err();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Programmatic deployment: activate descriptors directly against the
    /// kernel baseline. Whatever started is registered under a
    /// location-less record; the caller gets the aggregated batch result.
    pub async fn deploy_units(&self, descriptors: Vec<UnitDescriptor>) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.run_phase(DeployPhase::PreDeploy, PhaseFailureMode::Surface)?;

        let report = self.engine.activate(descriptors, self.baseline_node).await;
        let started = report.started_units();
        let failed = report.failed_claimed();
        if !started.is_empty() || !failed.is_empty() {
            self.push_record(DeploymentRecord {
                location: None,
                deployer: constants::PROGRAMMATIC_DEPLOYER.to_string(),
                units: started,
                failed,
            });
        }
        let outcome = report.into_result().map_err(Error::from);

        let phase = self.run_phase(DeployPhase::PostDeploy, PhaseFailureMode::Surface);
        outcome?;
        phase
    }

    /// Undeploy all location-less (programmatic) records.
    pub async fn undeploy_units(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        let matching: Vec<DeploymentRecord> = {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let (matching, remaining): (Vec<_>, Vec<_>) =
                records.drain(..).partition(|r| r.location.is_none());
            *records = remaining;
            matching
        };
        let phase_pre = self.run_phase(DeployPhase::PreUndeploy, PhaseFailureMode::Surface);
        let mut first_error: Option<Error> = phase_pre.err();
        for record in matching.iter().rev() {
            if let Some(e) = self.tear_down_record(record) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        let phase_post = self.run_phase(DeployPhase::PostUndeploy, PhaseFailureMode::Surface);
        if first_error.is_none() {
            first_error = phase_post.err();
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deploy several locations in order. A failure for one location is
    /// remembered but does not stop the remaining locations.
    pub async fn deploy_all(&self, locations: &[PathBuf]) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for location in locations {
            if let Err(e) = self
                .deploy_with_mode(location, PhaseFailureMode::Surface)
                .await
            {
                log::error!("Deployment of {} failed: {e}", location.display());
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Shutdown sweep: undeploy every remaining record in reverse
    /// registration order, best-effort, reporting the first error.
    pub async fn shutdown_sweep(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        let all: Vec<DeploymentRecord> = {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records.drain(..).collect()
        };
        if all.is_empty() {
            return Ok(());
        }
        log::info!("Shutdown: undeploying {} deployment(s)", all.len());
        let _ = self.run_phase(DeployPhase::PreUndeploy, PhaseFailureMode::LogOnly);
        let mut first_error: Option<Error> = None;
        for record in all.iter().rev() {
            if let Some(e) = self.tear_down_record(record) {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        let _ = self.run_phase(DeployPhase::PostUndeploy, PhaseFailureMode::LogOnly);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reverse one record: retire its units newest-first, then discard
    /// claimed-but-failed names. Returns the first teardown error.
    fn tear_down_record(&self, record: &DeploymentRecord) -> Option<Error> {
        let mut first_error: Option<Error> = None;
        for unit in record.units.iter().rev() {
            for e in self.registry.retire(unit) {
                log::error!("Teardown of unit '{unit}' reported: {e}");
                if first_error.is_none() {
                    first_error = Some(e.into());
                }
            }
        }
        for name in &record.failed {
            self.registry.discard(name);
        }
        first_error
    }

    /// Run one phase hook on every registered unit that implements the
    /// phase-listener capability. Failures are logged; in `Surface` mode
    /// the first is also returned.
    fn run_phase(&self, phase: DeployPhase, mode: PhaseFailureMode) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for name in self.registry.names() {
            let Some(factory) = self.registry.factory_of(&name) else {
                continue;
            };
            let Some(instance) = self.registry.lookup(&name) else {
                continue;
            };
            let Some(listener) = factory.phase_listener_of(&instance) else {
                continue;
            };
            if let Err(e) = phase.invoke(&*listener) {
                log::warn!("{phase} hook failed for unit '{name}': {e}");
                if first_error.is_none() {
                    first_error = Some(Error::Deployment(DeploymentError::PhaseHook {
                        unit: name.clone(),
                        phase: phase.to_string(),
                        message: e.to_string(),
                    }));
                }
            }
        }
        match (mode, first_error) {
            (PhaseFailureMode::Surface, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for DeploymentCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentCoordinator")
            .field("deployers", &self.deployer_names())
            .field("records", &self.records().len())
            .finish_non_exhaustive()
    }
}
