use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::activation::engine::ActivationEngine;
use crate::deployment::coordinator::DeploymentCoordinator;
use crate::deployment::unit_file::UnitFileDeployer;
use crate::kernel::error::DynError;
use crate::loader::arena::{LoadPolicy, LoaderArena};
use crate::loader::source::{CodeSource, StaticSource};
use crate::units::factory::{UnitFactory, UnitInstance};
use crate::units::registry::UnitRegistry;
use crate::watcher::HotReloadWatcher;

struct Probe {
    name: Mutex<String>,
    log: Arc<Mutex<Vec<String>>>,
}

fn as_probe(instance: &UnitInstance) -> std::result::Result<Arc<Probe>, DynError> {
    instance
        .clone()
        .downcast::<Probe>()
        .map_err(|_| "not a Probe".into())
}

fn probe_factory(log: Arc<Mutex<Vec<String>>>) -> UnitFactory {
    let mut factory = UnitFactory::new(move |_| {
        Ok(Arc::new(Probe {
            name: Mutex::new(String::new()),
            log: log.clone(),
        }) as UnitInstance)
    })
    .with_setter("name", |instance, value| {
        let probe = as_probe(instance)?;
        *probe.name.lock().unwrap() = value.as_str().ok_or("name must be a string")?.to_string();
        Ok(())
    });
    for hook in ["create", "start", "stop", "destroy"] {
        factory = factory.with_hook(hook, move |instance| {
            let probe = as_probe(instance)?;
            let name = probe.name.lock().unwrap().clone();
            probe.log.lock().unwrap().push(format!("{name}.{hook}"));
            Ok(())
        });
    }
    factory
}

struct Harness {
    registry: Arc<UnitRegistry>,
    watcher: HotReloadWatcher,
    log: Arc<Mutex<Vec<String>>>,
    _dir: TempDir,
    dir: PathBuf,
}

fn harness() -> Harness {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(UnitRegistry::new());
    let arena = Arc::new(LoaderArena::new());
    let source = Arc::new(StaticSource::new("kernel"));
    source
        .register_factory("probe", probe_factory(log.clone()))
        .unwrap();
    let baseline = arena.add_node(
        "kernel",
        LoadPolicy::ParentFirst,
        None,
        vec![source as Arc<dyn CodeSource>],
    );
    let engine = Arc::new(ActivationEngine::new(registry.clone(), arena.clone()).unwrap());
    let coordinator = Arc::new(DeploymentCoordinator::new(
        registry.clone(),
        engine,
        arena,
        baseline,
        LoadPolicy::ParentFirst,
    ));
    coordinator.add_deployer(Arc::new(UnitFileDeployer));

    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().to_path_buf();
    let watcher = HotReloadWatcher::new(
        coordinator,
        dir.clone(),
        Duration::from_millis(50),
        Duration::from_millis(10),
    );
    Harness {
        registry,
        watcher,
        log,
        _dir: tmp,
        dir,
    }
}

fn unit_json(name: &str) -> String {
    format!(
        r#"{{"units": [{{"name": "{name}", "factory": "probe", "properties": {{"name": {{"literal": "{name}"}}}}}}]}}"#
    )
}

fn count(log: &[String], entry: &str) -> usize {
    log.iter().filter(|e| *e == entry).count()
}

fn bump_mtime(path: &Path, ahead: Duration) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + ahead).unwrap();
}

#[tokio::test]
async fn new_files_deploy_on_the_next_scan() {
    let h = harness();
    fs::write(h.dir.join("x.unit"), unit_json("x")).unwrap();

    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.deployed, 1);
    assert_eq!(summary.failures, 0);
    assert!(h.registry.contains("x"));

    // A second scan with nothing changed is a no-op.
    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.deployed, 0);
    assert_eq!(summary.undeployed, 0);
}

#[tokio::test]
async fn changed_files_are_undeployed_then_redeployed() {
    let h = harness();
    let path = h.dir.join("x.unit");
    fs::write(&path, unit_json("x")).unwrap();
    h.watcher.scan_once().await.unwrap();
    assert!(h.registry.contains("x"));

    bump_mtime(&path, Duration::from_secs(5));
    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.undeployed, 1);
    assert_eq!(summary.deployed, 1);
    assert!(h.registry.contains("x"));

    let log = h.log.lock().unwrap().clone();
    // Exactly one teardown between the two startups.
    assert_eq!(count(&log, "x.stop"), 1);
    assert_eq!(count(&log, "x.create"), 2);
    let stop = log.iter().position(|e| e == "x.stop").unwrap();
    let second_create = log.iter().rposition(|e| e == "x.create").unwrap();
    assert!(stop < second_create);

    // The snapshot caught up: nothing further happens.
    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.undeployed + summary.deployed, 0);
}

#[tokio::test]
async fn removed_files_are_undeployed() {
    let h = harness();
    let path = h.dir.join("x.unit");
    fs::write(&path, unit_json("x")).unwrap();
    h.watcher.scan_once().await.unwrap();

    fs::remove_file(&path).unwrap();
    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.undeployed, 1);
    assert!(!h.registry.contains("x"));
}

#[tokio::test]
async fn one_failing_path_does_not_stop_the_others() {
    let h = harness();
    fs::write(h.dir.join("good.unit"), unit_json("good")).unwrap();
    fs::write(h.dir.join("bad.unit"), "{broken").unwrap();

    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.deployed, 1);
    assert_eq!(summary.failures, 1);
    assert!(h.registry.contains("good"));
}

#[tokio::test]
async fn failed_deployments_retry_on_later_scans() {
    let h = harness();
    let path = h.dir.join("x.unit");
    fs::write(&path, "{broken").unwrap();

    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.failures, 1);
    assert!(!h.registry.contains("x"));

    // Fix the file; the snapshot never recorded the broken attempt, so the
    // next scan picks it up again.
    fs::write(&path, unit_json("x")).unwrap();
    let summary = h.watcher.scan_once().await.unwrap();
    assert_eq!(summary.deployed, 1);
    assert!(h.registry.contains("x"));
}

#[tokio::test]
async fn start_and_stop_transition_the_state_machine() {
    let h = harness();
    assert!(!h.watcher.is_running());
    h.watcher.start().unwrap();
    assert!(h.watcher.is_running());
    assert!(h.watcher.start().is_err());

    h.watcher.stop().await.unwrap();
    assert!(!h.watcher.is_running());
    assert!(h.watcher.stop().await.is_err());
}

#[tokio::test]
async fn the_running_loop_picks_up_files() {
    let h = harness();
    h.watcher.start().unwrap();
    fs::write(h.dir.join("x.unit"), unit_json("x")).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !h.registry.contains("x") {
        assert!(
            tokio::time::Instant::now() < deadline,
            "watcher never deployed the file"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    h.watcher.stop().await.unwrap();
}
