use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::kernel::error::DynError;
use crate::units::factory::UnitInstance;

/// Identifier of a registered capability callback
pub type CallbackId = u64;

/// Callback fired with the unit name and its instance handle.
pub type CapabilityCallback = Arc<dyn Fn(&str, &UnitInstance) -> Result<(), DynError> + Send + Sync>;

/// Deployment phase hooks a unit may opt into. All default to no-ops so
/// implementors override only the phases they care about.
pub trait PhaseListener: Send + Sync {
    fn pre_deploy(&self) -> Result<(), DynError> {
        Ok(())
    }
    fn post_deploy(&self) -> Result<(), DynError> {
        Ok(())
    }
    fn pre_undeploy(&self) -> Result<(), DynError> {
        Ok(())
    }
    fn post_undeploy(&self) -> Result<(), DynError> {
        Ok(())
    }
}

/// The four deployment phases around deploy/undeploy calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPhase {
    PreDeploy,
    PostDeploy,
    PreUndeploy,
    PostUndeploy,
}

impl DeployPhase {
    pub fn invoke(&self, listener: &dyn PhaseListener) -> Result<(), DynError> {
        match self {
            DeployPhase::PreDeploy => listener.pre_deploy(),
            DeployPhase::PostDeploy => listener.post_deploy(),
            DeployPhase::PreUndeploy => listener.pre_undeploy(),
            DeployPhase::PostUndeploy => listener.post_undeploy(),
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployPhase::PreDeploy => "pre-deploy",
            DeployPhase::PostDeploy => "post-deploy",
            DeployPhase::PreUndeploy => "pre-undeploy",
            DeployPhase::PostUndeploy => "post-undeploy",
        };
        f.write_str(name)
    }
}

struct CallbackTable {
    next_id: CallbackId,
    on_register: HashMap<TypeId, Vec<(CallbackId, CapabilityCallback)>>,
    on_unregister: HashMap<TypeId, Vec<(CallbackId, CapabilityCallback)>>,
    // (unit name, callback id) pairs already fired, per direction. This is
    // what keeps repeated scans idempotent.
    fired_register: HashSet<(String, CallbackId)>,
    fired_unregister: HashSet<(String, CallbackId)>,
}

/// Registration/unregistration notifications for units whose concrete
/// instance type matches a capability type of interest.
pub struct CapabilityCallbacks {
    inner: Mutex<CallbackTable>,
}

fn instance_type_id(instance: &UnitInstance) -> TypeId {
    (**instance).type_id()
}

impl CapabilityCallbacks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CallbackTable {
                next_id: 1,
                on_register: HashMap::new(),
                on_unregister: HashMap::new(),
                fired_register: HashSet::new(),
                fired_unregister: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CallbackTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an on-register callback and immediately fire it for every
    /// already-matching unit in `existing`.
    pub fn add_on_register(
        &self,
        capability: TypeId,
        callback: CapabilityCallback,
        existing: &[(String, UnitInstance)],
    ) -> CallbackId {
        let (id, pending) = {
            let mut table = self.lock();
            let id = table.next_id;
            table.next_id += 1;
            table
                .on_register
                .entry(capability)
                .or_default()
                .push((id, callback.clone()));
            let mut pending = Vec::new();
            for (name, instance) in existing {
                if instance_type_id(instance) == capability
                    && table.fired_register.insert((name.clone(), id))
                {
                    pending.push((name.clone(), instance.clone()));
                }
            }
            (id, pending)
        };
        // Invoke outside the table lock so callbacks may use the registry.
        for (name, instance) in pending {
            if let Err(e) = callback(&name, &instance) {
                log::warn!("On-register callback {id} failed for unit '{name}': {e}");
            }
        }
        id
    }

    pub fn add_on_unregister(&self, capability: TypeId, callback: CapabilityCallback) -> CallbackId {
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        table
            .on_unregister
            .entry(capability)
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a callback from both directions. Returns whether it existed.
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut table = self.lock();
        let mut found = false;
        for callbacks in table.on_register.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(cb_id, _)| *cb_id != id);
            found |= callbacks.len() < before;
        }
        for callbacks in table.on_unregister.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(cb_id, _)| *cb_id != id);
            found |= callbacks.len() < before;
        }
        found
    }

    /// Fire on-register callbacks matching this instance, at most once per
    /// (unit, callback) pair.
    pub fn notify_registered(&self, name: &str, instance: &UnitInstance) {
        let ty = instance_type_id(instance);
        let pending: Vec<(CallbackId, CapabilityCallback)> = {
            let mut table = self.lock();
            let matching: Vec<(CallbackId, CapabilityCallback)> = table
                .on_register
                .get(&ty)
                .map(|cbs| cbs.clone())
                .unwrap_or_default();
            matching
                .into_iter()
                .filter(|(id, _)| table.fired_register.insert((name.to_string(), *id)))
                .collect()
        };
        for (id, callback) in pending {
            if let Err(e) = callback(name, instance) {
                log::warn!("On-register callback {id} failed for unit '{name}': {e}");
            }
        }
    }

    /// Fire on-unregister callbacks matching this instance, then forget the
    /// unit's fired pairs so a future re-registration notifies again.
    pub fn notify_removed(&self, name: &str, instance: &UnitInstance) {
        let ty = instance_type_id(instance);
        let pending: Vec<(CallbackId, CapabilityCallback)> = {
            let mut table = self.lock();
            let matching: Vec<(CallbackId, CapabilityCallback)> = table
                .on_unregister
                .get(&ty)
                .map(|cbs| cbs.clone())
                .unwrap_or_default();
            matching
                .into_iter()
                .filter(|(id, _)| table.fired_unregister.insert((name.to_string(), *id)))
                .collect()
        };
        for (id, callback) in pending {
            if let Err(e) = callback(name, instance) {
                log::warn!("On-unregister callback {id} failed for unit '{name}': {e}");
            }
        }
        let mut table = self.lock();
        table.fired_register.retain(|(unit, _)| unit != name);
        table.fired_unregister.retain(|(unit, _)| unit != name);
    }
}

impl Default for CapabilityCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CapabilityCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.lock();
        let register_count: usize = table.on_register.values().map(|v| v.len()).sum();
        let unregister_count: usize = table.on_unregister.values().map(|v| v.len()).sum();
        f.debug_struct("CapabilityCallbacks")
            .field("on_register_count", &register_count)
            .field("on_unregister_count", &unregister_count)
            .finish()
    }
}
