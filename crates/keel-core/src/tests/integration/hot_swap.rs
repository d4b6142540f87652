use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use super::common::{EventLog, probe_factory, probe_unit_json};
use crate::kernel::bootstrap::Kernel;
use crate::kernel::config::KernelConfig;

fn count(log: &EventLog, entry: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == entry).count()
}

/// End-to-end hot swap: a unit file appears, changes, and disappears
/// under a booted kernel, driven deterministically via scan_once.
#[tokio::test]
async fn deploy_directory_changes_flow_through_the_kernel() {
    let home = TempDir::new().unwrap();
    let deploy = home.path().join("deploy");
    fs::create_dir(&deploy).unwrap();

    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut config = KernelConfig::with_home(home.path());
    config.watch = false;
    let mut kernel = Kernel::new(config).unwrap();
    kernel
        .register_factory("probe", probe_factory(log.clone()))
        .unwrap();
    kernel.boot().await.unwrap();

    // A new file deploys.
    let path = deploy.join("service.unit");
    fs::write(
        &path,
        format!(r#"{{"units": [{}]}}"#, probe_unit_json("service", &[])),
    )
    .unwrap();
    kernel.watcher().scan_once().await.unwrap();
    assert!(kernel.registry().contains("service"));
    assert_eq!(count(&log, "service.start"), 1);

    // A timestamp change redeploys: one teardown, one fresh startup.
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5))
        .unwrap();
    drop(file);
    kernel.watcher().scan_once().await.unwrap();
    assert!(kernel.registry().contains("service"));
    assert_eq!(count(&log, "service.stop"), 1);
    assert_eq!(count(&log, "service.start"), 2);

    // Removal undeploys.
    fs::remove_file(&path).unwrap();
    kernel.watcher().scan_once().await.unwrap();
    assert!(!kernel.registry().contains("service"));
    assert_eq!(count(&log, "service.stop"), 2);

    kernel.shutdown().await.unwrap();
}
