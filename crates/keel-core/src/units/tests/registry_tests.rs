use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::kernel::error::DynError;
use crate::units::error::UnitSystemError;
use crate::units::factory::{UnitFactory, UnitInstance};
use crate::units::registry::{RecordedHookCall, TeardownSpec, UnitRegistry, UnitState};

fn recording_hook(
    log: Arc<Mutex<Vec<String>>>,
    entry: String,
) -> impl Fn(&UnitInstance) -> Result<(), DynError> + Send + Sync + 'static {
    move |_| {
        log.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

fn tracker_factory(log: Arc<Mutex<Vec<String>>>, tag: &str) -> UnitFactory {
    UnitFactory::from_fn(|| ())
        .with_hook("stop", recording_hook(log.clone(), format!("{tag}.stop")))
        .with_hook("destroy", recording_hook(log.clone(), format!("{tag}.destroy")))
        .with_hook("unhook", recording_hook(log, format!("{tag}.unhook")))
}

fn register_simple(registry: &UnitRegistry, name: &str) {
    let factory = Arc::new(UnitFactory::from_fn(|| ()));
    registry
        .register(name, Arc::new(()) as UnitInstance, factory, TeardownSpec::default())
        .unwrap();
}

#[test]
fn begin_registration_claims_the_name_once() {
    let registry = UnitRegistry::new();
    registry.begin_registration("alpha").unwrap();
    assert_eq!(registry.state_of("alpha"), Some(UnitState::NotStarted));

    let second = registry.begin_registration("alpha");
    assert!(matches!(
        second,
        Err(UnitSystemError::DuplicateUnit { name }) if name == "alpha"
    ));
}

#[test]
fn register_rejects_duplicates_and_keeps_the_first() {
    let registry = UnitRegistry::new();
    let first: UnitInstance = Arc::new(1i64);
    let second: UnitInstance = Arc::new(2i64);
    let factory = Arc::new(UnitFactory::from_fn(|| 0i64));

    registry
        .register("value", first, factory.clone(), TeardownSpec::default())
        .unwrap();
    let rejected = registry.register("value", second, factory, TeardownSpec::default());
    assert!(matches!(
        rejected,
        Err(UnitSystemError::DuplicateUnit { .. })
    ));

    let held = registry.lookup_as::<i64>("value").unwrap();
    assert_eq!(*held, 1);
}

#[test]
fn started_never_regresses_to_starting() {
    let registry = UnitRegistry::new();
    registry.begin_registration("alpha").unwrap();
    registry.set_state("alpha", UnitState::Started);
    registry.set_state("alpha", UnitState::Starting);
    assert_eq!(registry.state_of("alpha"), Some(UnitState::Started));
}

#[tokio::test]
async fn terminal_transitions_wake_subscribers() {
    let registry = Arc::new(UnitRegistry::new());
    registry.begin_registration("slow").unwrap();

    let mut rx = registry.subscribe("slow").unwrap();
    let waiter = tokio::spawn(async move {
        rx.wait_for(|state| state.is_terminal()).await.map(|s| *s)
    });

    registry.set_state("slow", UnitState::Starting);
    registry.set_state("slow", UnitState::Started);

    let observed = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("subscriber timed out")
        .unwrap()
        .unwrap();
    assert_eq!(observed, UnitState::Started);
}

#[test]
fn remove_frees_the_name_for_reuse() {
    let registry = UnitRegistry::new();
    registry.begin_registration("cycled").unwrap();
    registry.set_state("cycled", UnitState::Started);
    register_simple(&registry, "cycled");

    registry.remove("cycled").unwrap();
    assert!(registry.lookup("cycled").is_none());
    assert_eq!(registry.state_of("cycled"), None);

    // The name is available again.
    registry.begin_registration("cycled").unwrap();
}

#[test]
fn remove_of_unknown_unit_reports_not_found() {
    let registry = UnitRegistry::new();
    assert!(matches!(
        registry.remove("ghost"),
        Err(UnitSystemError::NotFound { .. })
    ));
}

#[test]
fn retire_runs_uninstalls_then_stop_then_destroy() {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let registry = UnitRegistry::new();
    let factory = Arc::new(tracker_factory(log.clone(), "unit"));
    let teardown = TeardownSpec {
        stop: Some("stop".to_string()),
        destroy: Some("destroy".to_string()),
        uninstalls: vec![RecordedHookCall {
            target: None,
            method: "unhook".to_string(),
        }],
    };
    registry
        .register("unit", Arc::new(()) as UnitInstance, factory, teardown)
        .unwrap();

    let errors = registry.retire("unit");
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["unit.unhook", "unit.stop", "unit.destroy"]
    );
    assert!(!registry.contains("unit"));
}

#[test]
fn retire_honors_suppressed_hooks() {
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let registry = UnitRegistry::new();
    let factory = Arc::new(tracker_factory(log.clone(), "quiet"));
    let teardown = TeardownSpec {
        stop: None,
        destroy: Some("destroy".to_string()),
        uninstalls: Vec::new(),
    };
    registry
        .register("quiet", Arc::new(()) as UnitInstance, factory, teardown)
        .unwrap();

    let errors = registry.retire("quiet");
    assert!(errors.is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["quiet.destroy"]);
}

#[test]
fn retire_collects_hook_failures_without_stopping() {
    let registry = UnitRegistry::new();
    let factory = Arc::new(
        UnitFactory::from_fn(|| ()).with_hook("stop", |_| Err("stop is broken".into())),
    );
    let teardown = TeardownSpec {
        stop: Some("stop".to_string()),
        destroy: None,
        uninstalls: Vec::new(),
    };
    registry
        .register("broken", Arc::new(()) as UnitInstance, factory, teardown)
        .unwrap();

    let errors = registry.retire("broken");
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], UnitSystemError::HookFailure { hook, .. } if hook == "stop"));
    // The unit is gone despite the failing hook.
    assert!(!registry.contains("broken"));
}

#[test]
fn dump_lists_every_known_name() {
    let registry = UnitRegistry::new();
    registry.begin_registration("pending").unwrap();
    registry.begin_registration("live").unwrap();
    registry.set_state("live", UnitState::Started);
    register_simple(&registry, "live");

    let dump = registry.dump();
    assert!(dump.contains("pending: NOT_STARTED (no instance)"));
    assert!(dump.contains("live: STARTED (registered)"));
}
