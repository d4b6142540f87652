use std::fs;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::deployment::manager::DeploymentManager;
use crate::kernel::bootstrap::Kernel;
use crate::kernel::config::KernelConfig;
use crate::units::factory::{UnitFactory, UnitInstance};
use crate::units::registry::UnitState;
use crate::watcher::manager::WatchManager;

struct Probe {
    name: Mutex<String>,
}

fn probe_factory() -> UnitFactory {
    UnitFactory::new(|_| {
        Ok(Arc::new(Probe {
            name: Mutex::new(String::new()),
        }) as UnitInstance)
    })
    .with_setter("name", |instance, value| {
        let probe = instance.clone().downcast::<Probe>().map_err(|_| "not a Probe")?;
        *probe.name.lock().unwrap() = value.as_str().ok_or("name must be a string")?.to_string();
        Ok(())
    })
}

fn home_with_system_units(units: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let system = tmp.path().join("system");
    fs::create_dir(&system).unwrap();
    for (file, content) in units {
        fs::write(system.join(file), content).unwrap();
    }
    tmp
}

fn test_config(home: &TempDir) -> KernelConfig {
    let mut config = KernelConfig::with_home(home.path());
    // Keep bootstrap tests deterministic: no background watch loop.
    config.watch = false;
    config
}

#[tokio::test]
async fn boot_deploys_the_system_directory() {
    let home = home_with_system_units(&[(
        "core.unit",
        r#"{"units": [
            {"name": "base", "factory": "probe", "properties": {"name": {"literal": "base"}}},
            {"name": "app", "factory": "probe", "properties": {"name": {"literal": "app"}}, "depends": ["base"]}
        ]}"#,
    )]);
    let mut kernel = Kernel::new(test_config(&home)).unwrap();
    kernel.register_factory("probe", probe_factory()).unwrap();

    kernel.boot().await.unwrap();
    assert!(kernel.is_booted());
    assert_eq!(kernel.registry().state_of("base"), Some(UnitState::Started));
    assert_eq!(kernel.registry().state_of("app"), Some(UnitState::Started));

    kernel.shutdown().await.unwrap();
    assert!(!kernel.is_booted());
    assert!(kernel.registry().names().is_empty());
}

#[tokio::test]
async fn booting_twice_is_an_error() {
    let home = TempDir::new().unwrap();
    let mut kernel = Kernel::new(test_config(&home)).unwrap();
    kernel.boot().await.unwrap();
    assert!(kernel.boot().await.is_err());
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn boot_works_without_optional_directories() {
    let home = TempDir::new().unwrap();
    let mut kernel = Kernel::new(test_config(&home)).unwrap();
    kernel.boot().await.unwrap();
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn components_are_reachable_by_concrete_type() {
    let home = TempDir::new().unwrap();
    let kernel = Kernel::new(test_config(&home)).unwrap();
    assert!(kernel.component::<DeploymentManager>().is_some());
    assert!(kernel.component::<WatchManager>().is_some());
}

#[tokio::test]
async fn deploy_and_undeploy_pass_through_the_kernel() {
    let home = TempDir::new().unwrap();
    let mut kernel = Kernel::new(test_config(&home)).unwrap();
    kernel.register_factory("probe", probe_factory()).unwrap();
    kernel.boot().await.unwrap();

    let path = home.path().join("extra.unit");
    fs::write(
        &path,
        r#"{"units": [{"name": "extra", "factory": "probe", "properties": {"name": {"literal": "extra"}}}]}"#,
    )
    .unwrap();
    kernel.deploy(&path).await.unwrap();
    assert!(kernel.registry().contains("extra"));

    kernel.undeploy(&path).await.unwrap();
    assert!(!kernel.registry().contains("extra"));
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn a_failing_system_unit_fails_the_boot() {
    let home = home_with_system_units(&[(
        "broken.unit",
        r#"{"units": [{"name": "nope", "factory": "missing"}]}"#,
    )]);
    let mut kernel = Kernel::new(test_config(&home)).unwrap();
    kernel.register_factory("probe", probe_factory()).unwrap();

    assert!(kernel.boot().await.is_err());
    // Best-effort teardown still works afterwards.
    let _ = kernel.shutdown().await;
}
