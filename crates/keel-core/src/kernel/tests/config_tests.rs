use std::fs;

use tempfile::TempDir;

use crate::kernel::config::{ConfigError, KernelConfig};
use crate::kernel::constants;
use crate::loader::arena::LoadPolicy;

#[test]
fn defaults_derive_directories_from_home() {
    let config = KernelConfig::with_home("/opt/keel");
    assert_eq!(config.lib_dir(), std::path::PathBuf::from("/opt/keel/lib"));
    assert_eq!(config.system_dir(), std::path::PathBuf::from("/opt/keel/system"));
    assert_eq!(config.deploy_dir(), std::path::PathBuf::from("/opt/keel/deploy"));
    assert!(config.watch);
    assert_eq!(
        config.watch_interval().as_millis() as u64,
        constants::DEFAULT_WATCH_INTERVAL_MS
    );
    assert_eq!(config.policy(), LoadPolicy::ParentFirst);
}

#[test]
fn json_files_load_and_override_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("keel.json");
    fs::write(
        &path,
        r#"{
            "watch": false,
            "watch_interval_ms": 750,
            "load_policy": "parent-last",
            "extension_priorities": ["unit"]
        }"#,
    )
    .unwrap();

    let config = KernelConfig::load(&path).unwrap();
    assert!(!config.watch);
    assert_eq!(config.watch_interval_ms, 750);
    assert_eq!(config.policy(), LoadPolicy::ParentLast);
    assert_eq!(config.extension_priorities, vec!["unit".to_string()]);
}

#[cfg(feature = "toml-config")]
#[test]
fn toml_files_load() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("keel.toml");
    fs::write(
        &path,
        "watch = false\nwatch_interval_ms = 300\nload_policy = \"parent-last\"\n",
    )
    .unwrap();

    let config = KernelConfig::load(&path).unwrap();
    assert!(!config.watch);
    assert_eq!(config.watch_interval_ms, 300);
    assert_eq!(config.policy(), LoadPolicy::ParentLast);
}

#[test]
fn unknown_extensions_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("keel.ini");
    fs::write(&path, "watch = false").unwrap();
    assert!(matches!(
        KernelConfig::load(&path),
        Err(ConfigError::UnsupportedFormat(_))
    ));
}

#[test]
fn malformed_files_report_a_parse_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("keel.json");
    fs::write(&path, "{nope").unwrap();
    assert!(matches!(
        KernelConfig::load(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn discover_without_a_file_yields_defaults_rooted_at_home() {
    let tmp = TempDir::new().unwrap();
    let config = KernelConfig::discover(tmp.path()).unwrap();
    assert_eq!(config.home, tmp.path());
    assert_eq!(config.deploy_dir(), tmp.path().join("deploy"));
}

#[test]
fn discover_picks_up_the_config_directory() {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    fs::create_dir(&config_dir).unwrap();
    fs::write(config_dir.join("keel.json"), r#"{"watch": false}"#).unwrap();

    let config = KernelConfig::discover(tmp.path()).unwrap();
    assert!(!config.watch);
    assert_eq!(config.home, tmp.path());
}

#[test]
fn bad_policy_strings_fall_back_to_parent_first() {
    let mut config = KernelConfig::default();
    config.load_policy = "sideways".to_string();
    assert_eq!(config.policy(), LoadPolicy::ParentFirst);
}
