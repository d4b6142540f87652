use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::kernel::error::Result;

/// Core lifecycle trait for the kernel's own components. The kernel
/// initializes and starts them in registration order and stops them in
/// reverse.
#[async_trait]
pub trait KernelComponent: Any + Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Component instances keyed by their concrete type.
#[derive(Default, Debug)]
pub struct ComponentRegistry {
    instances: HashMap<TypeId, Arc<dyn KernelComponent>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Register a component instance, keyed by the concrete type `V`.
    pub fn register_instance<V>(&mut self, instance: Arc<V>)
    where
        V: KernelComponent + 'static,
    {
        self.instances.insert(TypeId::of::<V>(), instance);
    }

    pub fn get_by_id(&self, type_id: &TypeId) -> Option<Arc<dyn KernelComponent>> {
        self.instances.get(type_id).cloned()
    }

    /// Get a component by concrete type.
    pub fn get_concrete<T: KernelComponent + 'static>(&self) -> Option<Arc<T>> {
        self.instances.get(&TypeId::of::<T>()).and_then(|component| {
            let as_any: Arc<dyn Any + Send + Sync> = component.clone();
            Arc::downcast::<T>(as_any).ok()
        })
    }

    pub fn registered_ids(&self) -> Vec<TypeId> {
        self.instances.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
