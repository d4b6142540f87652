use std::fs;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use super::common::{EventLog, probe_factory, probe_unit_json};
use crate::kernel::bootstrap::Kernel;
use crate::kernel::config::KernelConfig;
use crate::units::registry::UnitState;

/// Full boot/shutdown round trip: two system files with dependencies
/// across them, ordered startup, exact-reverse teardown.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn system_units_boot_in_dependency_order_and_unwind() {
    let home = TempDir::new().unwrap();
    let system = home.path().join("system");
    fs::create_dir(&system).unwrap();
    fs::write(
        system.join("10-base.unit"),
        format!(r#"{{"units": [{}]}}"#, probe_unit_json("base", &[])),
    )
    .unwrap();
    fs::write(
        system.join("20-app.unit"),
        format!(
            r#"{{"units": [{}, {}]}}"#,
            probe_unit_json("service", &["base"]),
            probe_unit_json("frontend", &["service", "base"])
        ),
    )
    .unwrap();

    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut config = KernelConfig::with_home(home.path());
    config.watch = false;
    let mut kernel = Kernel::new(config).unwrap();
    kernel
        .register_factory("probe", probe_factory(log.clone()))
        .unwrap();

    kernel.boot().await.unwrap();
    for unit in ["base", "service", "frontend"] {
        assert_eq!(kernel.registry().state_of(unit), Some(UnitState::Started));
    }

    {
        let events = log.lock().unwrap();
        let pos = |entry: &str| {
            events
                .iter()
                .position(|e| e == entry)
                .unwrap_or_else(|| panic!("'{entry}' missing from {events:?}"))
        };
        assert!(pos("base.start") < pos("service.create"));
        assert!(pos("service.start") < pos("frontend.create"));
    }

    kernel.shutdown().await.unwrap();
    assert!(kernel.registry().names().is_empty());

    let events = log.lock().unwrap();
    let pos = |entry: &str| events.iter().position(|e| e == entry).unwrap();
    // Teardown unwinds newest-first.
    assert!(pos("frontend.stop") < pos("service.stop"));
    assert!(pos("service.stop") < pos("base.stop"));
    assert!(pos("frontend.destroy") < pos("service.destroy"));
}

/// The registry after deploy + undeploy equals the registry before:
/// the symmetric difference of the name sets is empty.
#[tokio::test]
async fn deploy_undeploy_round_trip_is_symmetric() {
    let home = TempDir::new().unwrap();
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut config = KernelConfig::with_home(home.path());
    config.watch = false;
    let mut kernel = Kernel::new(config).unwrap();
    kernel
        .register_factory("probe", probe_factory(log.clone()))
        .unwrap();
    kernel.boot().await.unwrap();

    let before = kernel.registry().names();
    let path = home.path().join("batch.unit");
    fs::write(
        &path,
        format!(
            r#"{{"units": [{}, {}]}}"#,
            probe_unit_json("one", &[]),
            probe_unit_json("two", &["one"])
        ),
    )
    .unwrap();

    kernel.deploy(&path).await.unwrap();
    assert_eq!(kernel.registry().names().len(), before.len() + 2);
    kernel.undeploy(&path).await.unwrap();
    assert_eq!(kernel.registry().names(), before);

    kernel.shutdown().await.unwrap();
}
