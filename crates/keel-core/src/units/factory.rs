use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::kernel::error::DynError;
use crate::units::capability::PhaseListener;

/// A constructed unit instance. The registry owns the instance for the
/// unit's lifetime; everything handed out is a shared handle.
pub type UnitInstance = Arc<dyn Any + Send + Sync>;

/// A constructor argument or property value after reference resolution.
#[derive(Clone)]
pub enum ResolvedValue {
    Literal(serde_json::Value),
    Null,
    /// A resolved unit reference (another unit, or the unit itself)
    Unit(UnitInstance),
    List(Vec<ResolvedValue>),
    Set(Vec<ResolvedValue>),
    Map(Vec<(ResolvedValue, ResolvedValue)>),
}

impl ResolvedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::Literal(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ResolvedValue::Literal(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResolvedValue::Literal(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_unit(&self) -> Option<&UnitInstance> {
        match self {
            ResolvedValue::Unit(instance) => Some(instance),
            _ => None,
        }
    }

    /// Downcast a resolved unit reference to its concrete type.
    pub fn unit_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.as_unit().and_then(|i| i.clone().downcast::<T>().ok())
    }
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Literal(v) => write!(f, "Literal({v})"),
            ResolvedValue::Null => f.write_str("Null"),
            ResolvedValue::Unit(_) => f.write_str("Unit(..)"),
            ResolvedValue::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
            ResolvedValue::Set(items) => f.debug_tuple("Set").field(&items.len()).finish(),
            ResolvedValue::Map(pairs) => f.debug_tuple("Map").field(&pairs.len()).finish(),
        }
    }
}

pub type ConstructorFn =
    Arc<dyn Fn(&[ResolvedValue]) -> Result<UnitInstance, DynError> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&UnitInstance, ResolvedValue) -> Result<(), DynError> + Send + Sync>;
pub type HookFn = Arc<dyn Fn(&UnitInstance) -> Result<(), DynError> + Send + Sync>;
/// Install callback on a target unit: (target instance, subject instance).
pub type InstallFn =
    Arc<dyn Fn(&UnitInstance, &UnitInstance) -> Result<(), DynError> + Send + Sync>;
/// Derives a value from a unit instance, for `Ref` accessor paths.
pub type AccessorFn = Arc<dyn Fn(&UnitInstance) -> Result<ResolvedValue, DynError> + Send + Sync>;
type PhaseCasterFn = Arc<dyn Fn(&UnitInstance) -> Option<Arc<dyn PhaseListener>> + Send + Sync>;

/// Recipe for building and operating instances of one unit type: a
/// constructor, a table of property setters, tables of named lifecycle
/// and install hooks, and named accessors.
///
/// This is the explicit replacement for reflective construction: unit
/// types register closures up front and descriptors reference the
/// factory by key.
#[derive(Clone)]
pub struct UnitFactory {
    constructor: ConstructorFn,
    setters: HashMap<String, SetterFn>,
    hooks: HashMap<String, HookFn>,
    installs: HashMap<String, InstallFn>,
    accessors: HashMap<String, AccessorFn>,
    phase_caster: Option<PhaseCasterFn>,
}

impl UnitFactory {
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(&[ResolvedValue]) -> Result<UnitInstance, DynError> + Send + Sync + 'static,
    {
        Self {
            constructor: Arc::new(constructor),
            setters: HashMap::new(),
            hooks: HashMap::new(),
            installs: HashMap::new(),
            accessors: HashMap::new(),
            phase_caster: None,
        }
    }

    /// Convenience constructor for unit types that take no arguments.
    pub fn from_fn<T, F>(make: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(move |_args| Ok(Arc::new(make()) as UnitInstance))
    }

    pub fn with_setter<F>(mut self, name: &str, setter: F) -> Self
    where
        F: Fn(&UnitInstance, ResolvedValue) -> Result<(), DynError> + Send + Sync + 'static,
    {
        self.setters.insert(name.to_string(), Arc::new(setter));
        self
    }

    pub fn with_hook<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&UnitInstance) -> Result<(), DynError> + Send + Sync + 'static,
    {
        self.hooks.insert(name.to_string(), Arc::new(hook));
        self
    }

    pub fn with_install<F>(mut self, name: &str, install: F) -> Self
    where
        F: Fn(&UnitInstance, &UnitInstance) -> Result<(), DynError> + Send + Sync + 'static,
    {
        self.installs.insert(name.to_string(), Arc::new(install));
        self
    }

    pub fn with_accessor<F>(mut self, name: &str, accessor: F) -> Self
    where
        F: Fn(&UnitInstance) -> Result<ResolvedValue, DynError> + Send + Sync + 'static,
    {
        self.accessors.insert(name.to_string(), Arc::new(accessor));
        self
    }

    /// Declare that instances of concrete type `T` implement
    /// [`PhaseListener`], making them visible to deployment phase hooks.
    pub fn with_phase_listener<T>(mut self) -> Self
    where
        T: PhaseListener + Send + Sync + 'static,
    {
        self.phase_caster = Some(Arc::new(|instance: &UnitInstance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|arc| arc as Arc<dyn PhaseListener>)
        }));
        self
    }

    pub(crate) fn construct(&self, args: &[ResolvedValue]) -> Result<UnitInstance, DynError> {
        (self.constructor)(args)
    }

    /// Probe for an optional hook. Absence is not an error.
    pub fn find_hook(&self, name: &str) -> Option<&HookFn> {
        self.hooks.get(name)
    }

    pub fn find_setter(&self, name: &str) -> Option<&SetterFn> {
        self.setters.get(name)
    }

    pub fn find_install(&self, name: &str) -> Option<&InstallFn> {
        self.installs.get(name)
    }

    pub fn find_accessor(&self, name: &str) -> Option<&AccessorFn> {
        self.accessors.get(name)
    }

    /// The instance as a phase listener, if this type declared one.
    pub fn phase_listener_of(&self, instance: &UnitInstance) -> Option<Arc<dyn PhaseListener>> {
        self.phase_caster.as_ref().and_then(|cast| cast(instance))
    }
}

impl fmt::Debug for UnitFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitFactory")
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("installs", &self.installs.keys().collect::<Vec<_>>())
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
