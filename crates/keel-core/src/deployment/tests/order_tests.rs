use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::deployment::deployer::{DeployContext, Deployer, DeploymentRecord};
use crate::deployment::order::{ExtensionOrder, sort_deployers};
use crate::kernel::error::Result;

struct NamedDeployer {
    name: &'static str,
    order: i32,
}

#[async_trait]
impl Deployer for NamedDeployer {
    fn name(&self) -> &str {
        self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn accepts(&self, _location: &Path) -> bool {
        true
    }

    async fn deploy(
        &self,
        _location: &Path,
        _context: &mut DeployContext,
    ) -> Result<Option<DeploymentRecord>> {
        Ok(None)
    }
}

fn named(name: &'static str, order: i32) -> Arc<dyn Deployer> {
    Arc::new(NamedDeployer { name, order })
}

#[test]
fn deployers_sort_by_priority_then_name() {
    let mut deployers = vec![named("zeta", 10), named("alpha", 50), named("beta", 10)];
    sort_deployers(&mut deployers);
    let names: Vec<&str> = deployers.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["beta", "zeta", "alpha"]);
}

#[test]
fn descriptor_extensions_sort_before_code_bundles() {
    let order = ExtensionOrder::default();
    let mut files = vec![
        PathBuf::from("deploy/libcore.so"),
        PathBuf::from("deploy/b.unit"),
        PathBuf::from("deploy/a.unit"),
        PathBuf::from("deploy/readme.txt"),
    ];
    order.sort(&mut files);
    assert_eq!(
        files,
        vec![
            PathBuf::from("deploy/a.unit"),
            PathBuf::from("deploy/b.unit"),
            PathBuf::from("deploy/libcore.so"),
            PathBuf::from("deploy/readme.txt"),
        ]
    );
}

#[test]
fn unlisted_extensions_sort_last_lexically() {
    let order = ExtensionOrder::new(vec!["unit".to_string()]);
    let mut files = vec![
        PathBuf::from("z.conf"),
        PathBuf::from("a.conf"),
        PathBuf::from("m.unit"),
    ];
    order.sort(&mut files);
    assert_eq!(
        files,
        vec![
            PathBuf::from("m.unit"),
            PathBuf::from("a.conf"),
            PathBuf::from("z.conf"),
        ]
    );
}
