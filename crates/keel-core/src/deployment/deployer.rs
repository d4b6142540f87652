use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::activation::engine::ActivationEngine;
use crate::kernel::error::Result;
use crate::loader::arena::NodeId;
use crate::loader::dylib::DylibSource;

/// Default priority for deployers that do not declare one.
pub const DEFAULT_DEPLOYER_ORDER: i32 = 50;

/// The reversible record of what one deploy call introduced.
///
/// `location` is `None` for programmatic registration. The hook data
/// needed to reverse each unit lives in its registry entry, so undeploy
/// never consults the original descriptor again.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub location: Option<PathBuf>,
    pub deployer: String,
    /// Unit names this deployment introduced, in registration order
    pub units: Vec<String>,
    /// Names the deployment claimed but failed to start; undeploy
    /// discards them so they become available again
    pub failed: Vec<String>,
}

/// Working context scoped to a single deploy call: created for the call,
/// discarded afterwards, never retained. Deployers share it within the
/// call to exchange scratch data and to register partial records.
pub struct DeployContext {
    engine: Arc<ActivationEngine>,
    node: NodeId,
    records: Vec<DeploymentRecord>,
    shared_data: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl DeployContext {
    pub(crate) fn new(engine: Arc<ActivationEngine>, node: NodeId) -> Self {
        Self {
            engine,
            node,
            records: Vec::new(),
            shared_data: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<ActivationEngine> {
        &self.engine
    }

    /// The loader node assigned to this deployment.
    pub fn loader_node(&self) -> NodeId {
        self.node
    }

    /// Register a record even when the deployer reports an error, so
    /// partially started units stay reversible.
    pub fn add_record(&mut self, record: DeploymentRecord) {
        self.records.push(record);
    }

    pub(crate) fn take_records(&mut self) -> Vec<DeploymentRecord> {
        std::mem::take(&mut self.records)
    }

    /// Set a shared data value for later deployers in the same call.
    pub fn set_data<T: 'static + Send + Sync>(&mut self, key: &str, value: T) {
        self.shared_data.insert(key.to_string(), Box::new(value));
    }

    /// Get a shared data value.
    pub fn get_data<T: 'static + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.shared_data.get(key).and_then(|data| data.downcast_ref::<T>())
    }
}

impl fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployContext")
            .field("node", &self.node)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}

/// A pluggable deployment strategy. The coordinator runs every accepting
/// deployer against a location in ascending `order()`.
#[async_trait]
pub trait Deployer: Send + Sync {
    fn name(&self) -> &str;

    /// Priority; smaller runs earlier. Ties are resolved by name.
    fn order(&self) -> i32 {
        DEFAULT_DEPLOYER_ORDER
    }

    fn accepts(&self, location: &Path) -> bool;

    async fn deploy(
        &self,
        location: &Path,
        context: &mut DeployContext,
    ) -> Result<Option<DeploymentRecord>>;
}

/// Deploys compiled unit libraries: loads the library, publishes it into
/// the shared export pool (replacing a previous export of the same id on
/// redeploy), and adds it to the deployment's local search path.
pub struct DylibDeployer;

const DYLIB_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

#[async_trait]
impl Deployer for DylibDeployer {
    fn name(&self) -> &str {
        "dylib"
    }

    fn order(&self) -> i32 {
        40
    }

    fn accepts(&self, location: &Path) -> bool {
        location
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DYLIB_EXTENSIONS.contains(&e))
            .unwrap_or(false)
    }

    async fn deploy(
        &self,
        location: &Path,
        context: &mut DeployContext,
    ) -> Result<Option<DeploymentRecord>> {
        let id = location
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("library")
            .to_string();
        let source = Arc::new(DylibSource::load(&id, location)?);
        let arena = context.engine().arena();
        arena.replace_export(source.clone());
        arena.add_local_source(context.loader_node(), source)?;
        Ok(Some(DeploymentRecord {
            location: Some(location.to_path_buf()),
            deployer: self.name().to_string(),
            units: Vec::new(),
            failed: Vec::new(),
        }))
    }
}
