/// Application name
pub const APP_NAME: &str = "Keel";

/// Application version
pub const APP_VERSION: &str = "0.1.0";

/// Kernel API version checked against descriptor requirements
pub const KERNEL_API_VERSION: &str = "0.1.0";

/// Configuration directory name under the kernel home
pub const CONFIG_DIR_NAME: &str = "config";

/// Configuration file stem (`keel.toml` / `keel.json`)
pub const CONFIG_FILE_STEM: &str = "keel";

/// Library directory name under the kernel home
pub const LIB_DIR_NAME: &str = "lib";

/// System deployment directory name under the kernel home
pub const SYSTEM_DIR_NAME: &str = "system";

/// Hot deployment directory name under the kernel home
pub const DEPLOY_DIR_NAME: &str = "deploy";

/// Extension of unit descriptor files
pub const UNIT_FILE_EXTENSION: &str = "unit";

/// Identifier of the kernel's baseline code source
pub const BASELINE_SOURCE_ID: &str = "kernel";

/// Deployer name recorded for programmatic unit registration
pub const PROGRAMMATIC_DEPLOYER: &str = "programmatic";

/// Default hot-reload poll interval in milliseconds
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 2000;

/// Minimum sleep between hot-reload scans in milliseconds
pub const DEFAULT_WATCH_FLOOR_MS: u64 = 200;

/// Conventional lifecycle hook names, used unless a descriptor overrides them
pub const CREATE_HOOK: &str = "create";
pub const START_HOOK: &str = "start";
pub const STOP_HOOK: &str = "stop";
pub const DESTROY_HOOK: &str = "destroy";
