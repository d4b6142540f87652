use std::collections::BTreeSet;
use std::fmt;

use semver::VersionReq;

use crate::kernel::constants;

/// A value appearing in a constructor argument or property assignment.
///
/// References by name to other units contribute to the owning unit's
/// dependency set; a self-reference does not.
#[derive(Debug, Clone)]
pub enum ValueSpec {
    /// An inline literal (string, number, bool, or any JSON value)
    Literal(serde_json::Value),
    /// Explicit null
    Null,
    /// The unit under construction itself
    SelfRef,
    /// Another unit by name, optionally narrowed through a named accessor
    Ref {
        unit: String,
        accessor: Option<String>,
    },
    List(Vec<ValueSpec>),
    Set(Vec<ValueSpec>),
    Map(Vec<(ValueSpec, ValueSpec)>),
}

impl ValueSpec {
    /// Shorthand for a by-name reference without an accessor.
    pub fn reference(unit: &str) -> Self {
        ValueSpec::Ref {
            unit: unit.to_string(),
            accessor: None,
        }
    }

    /// Shorthand for a literal built from anything serde_json accepts.
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        ValueSpec::Literal(value.into())
    }

    fn collect_refs(&self, out: &mut BTreeSet<String>) {
        match self {
            ValueSpec::Ref { unit, .. } => {
                out.insert(unit.clone());
            }
            ValueSpec::List(items) | ValueSpec::Set(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            ValueSpec::Map(pairs) => {
                for (k, v) in pairs {
                    k.collect_refs(out);
                    v.collect_refs(out);
                }
            }
            ValueSpec::Literal(_) | ValueSpec::Null | ValueSpec::SelfRef => {}
        }
    }
}

/// A named property assignment applied after construction.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub value: ValueSpec,
}

/// The four conventional lifecycle hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Create,
    Start,
    Stop,
    Destroy,
}

impl HookKind {
    /// The conventional hook name used unless the descriptor overrides it.
    pub fn default_name(&self) -> &'static str {
        match self {
            HookKind::Create => constants::CREATE_HOOK,
            HookKind::Start => constants::START_HOOK,
            HookKind::Stop => constants::STOP_HOOK,
            HookKind::Destroy => constants::DESTROY_HOOK,
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Per-hook configuration: an optional name override and a suppression flag.
#[derive(Debug, Clone, Default)]
pub struct HookSpec {
    pub method: Option<String>,
    pub ignore: bool,
}

impl HookSpec {
    /// The hook name to invoke, or `None` when the hook is suppressed.
    pub fn resolved_name(&self, kind: HookKind) -> Option<&str> {
        if self.ignore {
            return None;
        }
        Some(self.method.as_deref().unwrap_or(kind.default_name()))
    }
}

/// Lifecycle configuration for one unit, each hook individually
/// overridable and suppressible.
#[derive(Debug, Clone, Default)]
pub struct LifecycleSpec {
    pub create: HookSpec,
    pub start: HookSpec,
    pub stop: HookSpec,
    pub destroy: HookSpec,
}

impl LifecycleSpec {
    pub fn hook(&self, kind: HookKind) -> &HookSpec {
        match kind {
            HookKind::Create => &self.create,
            HookKind::Start => &self.start,
            HookKind::Stop => &self.stop,
            HookKind::Destroy => &self.destroy,
        }
    }

    fn hook_mut(&mut self, kind: HookKind) -> &mut HookSpec {
        match kind {
            HookKind::Create => &mut self.create,
            HookKind::Start => &mut self.start,
            HookKind::Stop => &mut self.stop,
            HookKind::Destroy => &mut self.destroy,
        }
    }
}

/// An install or uninstall hook invocation: a named hook on the unit
/// itself (`target: None`), or a named callback on another unit that
/// receives this unit as argument.
#[derive(Debug, Clone)]
pub struct HookCallSpec {
    pub target: Option<String>,
    pub method: String,
}

/// Fully describes one unit: how to construct it, what to inject, which
/// lifecycle hooks to run, and what it depends on. Immutable once built.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// Unique unit name
    pub name: String,
    /// Factory key, resolved through the deployment's loader node
    pub factory: String,
    /// Ordered constructor arguments
    pub constructor_args: Vec<ValueSpec>,
    /// Property assignments applied after construction
    pub properties: Vec<PropertySpec>,
    /// Lifecycle hook configuration
    pub lifecycle: LifecycleSpec,
    /// Install hook invocations, run after the start hook
    pub installs: Vec<HookCallSpec>,
    /// Uninstall hook invocations, run in reverse at teardown
    pub uninstalls: Vec<HookCallSpec>,
    /// Explicit dependencies beyond those implied by references
    pub depends: Vec<String>,
    /// Kernel API requirement checked at batch admission
    pub kernel_requirement: Option<VersionReq>,
}

impl UnitDescriptor {
    /// Start building a descriptor for `name` constructed by `factory`.
    pub fn builder(name: &str, factory: &str) -> UnitDescriptorBuilder {
        UnitDescriptorBuilder {
            descriptor: UnitDescriptor {
                name: name.to_string(),
                factory: factory.to_string(),
                constructor_args: Vec::new(),
                properties: Vec::new(),
                lifecycle: LifecycleSpec::default(),
                installs: Vec::new(),
                uninstalls: Vec::new(),
                depends: Vec::new(),
                kernel_requirement: None,
            },
        }
    }

    /// The unit's full dependency set: explicit `depends` entries plus
    /// every by-name reference reachable in constructor arguments and
    /// property values. Self-references are excluded.
    pub fn dependency_names(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.depends.iter().cloned().collect();
        for arg in &self.constructor_args {
            arg.collect_refs(&mut out);
        }
        for prop in &self.properties {
            prop.value.collect_refs(&mut out);
        }
        out
    }
}

impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit '{}' (factory '{}')", self.name, self.factory)
    }
}

/// Builder for [`UnitDescriptor`]
pub struct UnitDescriptorBuilder {
    descriptor: UnitDescriptor,
}

impl UnitDescriptorBuilder {
    /// Append a constructor argument.
    pub fn constructor_arg(mut self, value: ValueSpec) -> Self {
        self.descriptor.constructor_args.push(value);
        self
    }

    /// Append a property assignment.
    pub fn property(mut self, name: &str, value: ValueSpec) -> Self {
        self.descriptor.properties.push(PropertySpec {
            name: name.to_string(),
            value,
        });
        self
    }

    /// Add an explicit dependency.
    pub fn depends_on(mut self, unit: &str) -> Self {
        self.descriptor.depends.push(unit.to_string());
        self
    }

    /// Override the method name for one lifecycle hook.
    pub fn hook_method(mut self, kind: HookKind, method: &str) -> Self {
        self.descriptor.lifecycle.hook_mut(kind).method = Some(method.to_string());
        self
    }

    /// Suppress one lifecycle hook.
    pub fn suppress_hook(mut self, kind: HookKind) -> Self {
        self.descriptor.lifecycle.hook_mut(kind).ignore = true;
        self
    }

    /// Add an install hook invocation.
    pub fn install(mut self, target: Option<&str>, method: &str) -> Self {
        self.descriptor.installs.push(HookCallSpec {
            target: target.map(str::to_string),
            method: method.to_string(),
        });
        self
    }

    /// Add an uninstall hook invocation.
    pub fn uninstall(mut self, target: Option<&str>, method: &str) -> Self {
        self.descriptor.uninstalls.push(HookCallSpec {
            target: target.map(str::to_string),
            method: method.to_string(),
        });
        self
    }

    /// Require a compatible kernel API version.
    pub fn requires_kernel(mut self, requirement: VersionReq) -> Self {
        self.descriptor.kernel_requirement = Some(requirement);
        self
    }

    pub fn build(self) -> UnitDescriptor {
        self.descriptor
    }
}
