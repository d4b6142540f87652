use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::watch;

use crate::units::capability::{CallbackId, CapabilityCallback, CapabilityCallbacks};
use crate::units::error::UnitSystemError;
use crate::units::factory::{UnitFactory, UnitInstance};

/// Lifecycle state of one registered unit name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// The descriptor was accepted; no instance exists yet
    NotStarted,
    /// An activation task is building the instance
    Starting,
    /// The instance is registered and fully started
    Started,
    /// The activation attempt failed
    Error,
}

impl UnitState {
    /// Terminal for the activation attempt: dependents stop waiting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Started | UnitState::Error)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::NotStarted => "NOT_STARTED",
            UnitState::Starting => "STARTING",
            UnitState::Started => "STARTED",
            UnitState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// A recorded uninstall hook invocation, replayed in reverse at teardown.
#[derive(Debug, Clone)]
pub struct RecordedHookCall {
    pub target: Option<String>,
    pub method: String,
}

/// Everything needed to tear a unit down without re-reading its
/// descriptor: resolved stop/destroy hook names (absent when suppressed)
/// and the uninstall hook list.
#[derive(Debug, Clone, Default)]
pub struct TeardownSpec {
    pub stop: Option<String>,
    pub destroy: Option<String>,
    pub uninstalls: Vec<RecordedHookCall>,
}

struct UnitEntry {
    instance: UnitInstance,
    factory: Arc<UnitFactory>,
    teardown: TeardownSpec,
}

/// Concurrent name→instance map plus per-unit lifecycle state; the single
/// source of truth the rest of the kernel queries.
///
/// Entry and state tables use short synchronous critical sections that are
/// never held across an await; dependency blocking happens on the per-name
/// `watch` channels handed out by [`subscribe`](UnitRegistry::subscribe).
pub struct UnitRegistry {
    entries: RwLock<HashMap<String, UnitEntry>>,
    states: Mutex<HashMap<String, watch::Sender<UnitState>>>,
    callbacks: CapabilityCallbacks,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            callbacks: CapabilityCallbacks::new(),
        }
    }

    fn states_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<UnitState>>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, UnitEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, UnitEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a name for an accepted descriptor, installing its
    /// `NotStarted` placeholder. The first registrant wins: a name with a
    /// live state channel is rejected with `DuplicateUnit` and stays
    /// untouched.
    pub fn begin_registration(&self, name: &str) -> Result<(), UnitSystemError> {
        let mut states = self.states_lock();
        if states.contains_key(name) {
            return Err(UnitSystemError::DuplicateUnit {
                name: name.to_string(),
            });
        }
        let (tx, _rx) = watch::channel(UnitState::NotStarted);
        states.insert(name.to_string(), tx);
        log::debug!("Unit '{name}' entered state {}", UnitState::NotStarted);
        Ok(())
    }

    /// Set a unit's lifecycle state, waking every subscriber when the
    /// transition is terminal. A `NotStarted` transition lazily creates the
    /// state channel. A `Started` unit never moves back to `Starting`.
    pub fn set_state(&self, name: &str, state: UnitState) {
        let mut states = self.states_lock();
        match states.get(name) {
            Some(tx) => {
                let current = *tx.borrow();
                if current == UnitState::Started && state == UnitState::Starting {
                    log::warn!("Ignoring {current} -> {state} transition for unit '{name}'");
                    return;
                }
                tx.send_replace(state);
                log::debug!("Unit '{name}' transitioned {current} -> {state}");
            }
            None => {
                let (tx, _rx) = watch::channel(state);
                states.insert(name.to_string(), tx);
                log::debug!("Unit '{name}' entered state {state}");
            }
        }
    }

    pub fn state_of(&self, name: &str) -> Option<UnitState> {
        self.states_lock().get(name).map(|tx| *tx.borrow())
    }

    /// Subscribe to a unit's state transitions. The receiver always
    /// observes the latest value, so subscribing then re-reading closes the
    /// check-then-wait race against `set_state`.
    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<UnitState>> {
        self.states_lock().get(name).map(|tx| tx.subscribe())
    }

    /// Register a started instance with its teardown data. Fails with
    /// `DuplicateUnit` if an instance is already registered under `name`;
    /// the existing registration wins.
    pub fn register(
        &self,
        name: &str,
        instance: UnitInstance,
        factory: Arc<UnitFactory>,
        teardown: TeardownSpec,
    ) -> Result<(), UnitSystemError> {
        {
            let mut entries = self.entries_write();
            if entries.contains_key(name) {
                log::warn!("Rejecting duplicate registration of unit '{name}'");
                return Err(UnitSystemError::DuplicateUnit {
                    name: name.to_string(),
                });
            }
            entries.insert(
                name.to_string(),
                UnitEntry {
                    instance: instance.clone(),
                    factory,
                    teardown,
                },
            );
        }
        self.callbacks.notify_registered(name, &instance);
        Ok(())
    }

    /// Look up a unit instance handle.
    pub fn lookup(&self, name: &str) -> Option<UnitInstance> {
        self.entries_read().get(name).map(|e| e.instance.clone())
    }

    /// Look up a unit instance and downcast it to its concrete type.
    pub fn lookup_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.lookup(name).and_then(|i| i.downcast::<T>().ok())
    }

    pub fn factory_of(&self, name: &str) -> Option<Arc<UnitFactory>> {
        self.entries_read().get(name).map(|e| e.factory.clone())
    }

    pub fn teardown_of(&self, name: &str) -> Option<TeardownSpec> {
        self.entries_read().get(name).map(|e| e.teardown.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries_read().contains_key(name)
    }

    /// Names of all registered instances, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries_read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a unit: fires matching on-unregister capability callbacks,
    /// then erases the entry and frees the name. Stop/destroy and
    /// uninstall hooks are the caller's business; see [`retire`](Self::retire).
    pub fn remove(&self, name: &str) -> Result<(), UnitSystemError> {
        let instance = self
            .lookup(name)
            .ok_or_else(|| UnitSystemError::NotFound {
                name: name.to_string(),
            })?;
        self.callbacks.notify_removed(name, &instance);
        self.entries_write().remove(name);
        self.states_lock().remove(name);
        log::info!("Unit '{name}' removed");
        Ok(())
    }

    /// Discard a claimed name that never registered an instance (a failed
    /// or abandoned activation), returning it to availability. A name with
    /// a live instance is left alone.
    pub fn discard(&self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        let removed = self.states_lock().remove(name).is_some();
        if removed {
            log::debug!("Unit name '{name}' discarded");
        }
        removed
    }

    /// Full teardown of one unit: uninstall hooks in reverse order, then
    /// the stop and destroy hooks unless suppressed, then removal. Errors
    /// are collected, not short-circuited, so sibling teardown proceeds.
    pub fn retire(&self, name: &str) -> Vec<UnitSystemError> {
        let (instance, factory, teardown) = {
            let entries = self.entries_read();
            match entries.get(name) {
                Some(e) => (e.instance.clone(), e.factory.clone(), e.teardown.clone()),
                None => {
                    return vec![UnitSystemError::NotFound {
                        name: name.to_string(),
                    }];
                }
            }
        };
        let mut errors = Vec::new();

        for call in teardown.uninstalls.iter().rev() {
            if let Err(e) = self.run_uninstall(name, &instance, &factory, call) {
                log::warn!("Uninstall hook failed for unit '{name}': {e}");
                errors.push(e);
            }
        }
        for hook in [&teardown.stop, &teardown.destroy].into_iter().flatten() {
            if let Some(hook_fn) = factory.find_hook(hook) {
                if let Err(source) = hook_fn(&instance) {
                    log::warn!("Hook '{hook}' failed for unit '{name}': {source}");
                    errors.push(UnitSystemError::HookFailure {
                        unit: name.to_string(),
                        hook: hook.clone(),
                        source,
                    });
                }
            }
        }
        if let Err(e) = self.remove(name) {
            errors.push(e);
        }
        errors
    }

    fn run_uninstall(
        &self,
        name: &str,
        instance: &UnitInstance,
        factory: &UnitFactory,
        call: &RecordedHookCall,
    ) -> Result<(), UnitSystemError> {
        let hook_failure = |message: String| UnitSystemError::HookFailure {
            unit: name.to_string(),
            hook: call.method.clone(),
            source: message.into(),
        };
        match &call.target {
            None => match factory.find_hook(&call.method) {
                Some(hook) => hook(instance).map_err(|source| UnitSystemError::HookFailure {
                    unit: name.to_string(),
                    hook: call.method.clone(),
                    source,
                }),
                None => Err(hook_failure(format!(
                    "uninstall hook '{}' not found",
                    call.method
                ))),
            },
            Some(target) => {
                let target_instance = self
                    .lookup(target)
                    .ok_or_else(|| hook_failure(format!("uninstall target '{target}' is not registered")))?;
                let target_factory = self
                    .factory_of(target)
                    .ok_or_else(|| hook_failure(format!("uninstall target '{target}' has no factory")))?;
                let install = target_factory.find_install(&call.method).ok_or_else(|| {
                    hook_failure(format!(
                        "uninstall callback '{}' not found on '{target}'",
                        call.method
                    ))
                })?;
                install(&target_instance, instance).map_err(|source| UnitSystemError::HookFailure {
                    unit: name.to_string(),
                    hook: call.method.clone(),
                    source,
                })
            }
        }
    }

    /// Register an on-register capability callback for concrete type `T`,
    /// firing immediately for every currently matching unit.
    pub fn on_registered<T: Send + Sync + 'static>(
        &self,
        callback: CapabilityCallback,
    ) -> CallbackId {
        let existing: Vec<(String, UnitInstance)> = self
            .entries_read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.instance.clone()))
            .collect();
        self.callbacks
            .add_on_register(TypeId::of::<T>(), callback, &existing)
    }

    /// Register an on-unregister capability callback for concrete type `T`.
    pub fn on_unregistered<T: Send + Sync + 'static>(
        &self,
        callback: CapabilityCallback,
    ) -> CallbackId {
        self.callbacks.add_on_unregister(TypeId::of::<T>(), callback)
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.callbacks.remove(id)
    }

    /// Re-run the on-register capability scan for one unit. Safe to call
    /// repeatedly: the (unit, callback) bookkeeping keeps every callback
    /// at one notification.
    pub fn rescan(&self, name: &str) -> bool {
        match self.lookup(name) {
            Some(instance) => {
                self.callbacks.notify_registered(name, &instance);
                true
            }
            None => false,
        }
    }

    /// Per-unit introspection: every known name with its state and whether
    /// an instance is registered.
    pub fn dump(&self) -> String {
        let states = {
            let guard = self.states_lock();
            let mut list: Vec<(String, UnitState)> =
                guard.iter().map(|(n, tx)| (n.clone(), *tx.borrow())).collect();
            list.sort_by(|a, b| a.0.cmp(&b.0));
            list
        };
        let entries = self.entries_read();
        let mut out = String::new();
        for (name, state) in states {
            let registered = if entries.contains_key(&name) {
                "registered"
            } else {
                "no instance"
            };
            out.push_str(&format!("{name}: {state} ({registered})\n"));
        }
        out
    }
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("units", &self.names())
            .finish_non_exhaustive()
    }
}
