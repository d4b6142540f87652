//! The built-in `.unit` descriptor-file deployer.
//!
//! A unit file is a JSON document listing unit descriptors. Raw
//! deserialization structs are converted into the typed descriptor model
//! before anything reaches the activation engine.
use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use semver::VersionReq;
use serde::Deserialize;

use crate::deployment::deployer::{DeployContext, Deployer, DeploymentRecord};
use crate::deployment::error::DeploymentError;
use crate::kernel::constants;
use crate::kernel::error::{Error, Result};
use crate::units::descriptor::{HookKind, UnitDescriptor, ValueSpec};

// --- Intermediate structs for deserialization ---

#[derive(Deserialize, Debug)]
struct RawUnitFile {
    #[serde(default)]
    units: Vec<RawUnitDescriptor>,
}

#[derive(Deserialize, Debug)]
struct RawUnitDescriptor {
    name: String,
    factory: String,
    #[serde(default)]
    constructor: Vec<RawValue>,
    #[serde(default)]
    properties: BTreeMap<String, RawValue>,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    lifecycle: RawLifecycle,
    #[serde(default)]
    installs: Vec<RawHookCall>,
    #[serde(default)]
    uninstalls: Vec<RawHookCall>,
    #[serde(default)]
    requires_kernel: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct RawLifecycle {
    #[serde(default)]
    create: RawHook,
    #[serde(default)]
    start: RawHook,
    #[serde(default)]
    stop: RawHook,
    #[serde(default)]
    destroy: RawHook,
}

#[derive(Deserialize, Debug, Default)]
struct RawHook {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    ignore: bool,
}

#[derive(Deserialize, Debug)]
struct RawHookCall {
    #[serde(default)]
    target: Option<String>,
    method: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
enum RawValue {
    Literal(serde_json::Value),
    Null,
    #[serde(rename = "self")]
    SelfRef,
    #[serde(rename = "ref")]
    Reference {
        unit: String,
        #[serde(default)]
        accessor: Option<String>,
    },
    List(Vec<RawValue>),
    Set(Vec<RawValue>),
    Map(Vec<(RawValue, RawValue)>),
}

// --- End intermediate structs ---

fn convert_value(raw: RawValue) -> ValueSpec {
    match raw {
        RawValue::Literal(value) => ValueSpec::Literal(value),
        RawValue::Null => ValueSpec::Null,
        RawValue::SelfRef => ValueSpec::SelfRef,
        RawValue::Reference { unit, accessor } => ValueSpec::Ref { unit, accessor },
        RawValue::List(items) => ValueSpec::List(items.into_iter().map(convert_value).collect()),
        RawValue::Set(items) => ValueSpec::Set(items.into_iter().map(convert_value).collect()),
        RawValue::Map(pairs) => ValueSpec::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (convert_value(k), convert_value(v)))
                .collect(),
        ),
    }
}

fn convert_descriptor(
    path: &Path,
    raw: RawUnitDescriptor,
) -> std::result::Result<UnitDescriptor, DeploymentError> {
    let mut builder = UnitDescriptor::builder(&raw.name, &raw.factory);
    for arg in raw.constructor {
        builder = builder.constructor_arg(convert_value(arg));
    }
    for (name, value) in raw.properties {
        builder = builder.property(&name, convert_value(value));
    }
    for dep in &raw.depends {
        builder = builder.depends_on(dep);
    }
    for (kind, hook) in [
        (HookKind::Create, &raw.lifecycle.create),
        (HookKind::Start, &raw.lifecycle.start),
        (HookKind::Stop, &raw.lifecycle.stop),
        (HookKind::Destroy, &raw.lifecycle.destroy),
    ] {
        if let Some(method) = &hook.method {
            builder = builder.hook_method(kind, method);
        }
        if hook.ignore {
            builder = builder.suppress_hook(kind);
        }
    }
    for call in raw.installs {
        builder = builder.install(call.target.as_deref(), &call.method);
    }
    for call in raw.uninstalls {
        builder = builder.uninstall(call.target.as_deref(), &call.method);
    }
    if let Some(requirement) = raw.requires_kernel {
        let requirement = VersionReq::parse(&requirement).map_err(|e| {
            DeploymentError::InvalidDescriptor {
                path: path.to_path_buf(),
                message: format!(
                    "unit '{}': bad kernel requirement '{requirement}': {e}",
                    raw.name
                ),
            }
        })?;
        builder = builder.requires_kernel(requirement);
    }
    Ok(builder.build())
}

/// Parse the unit descriptors contained in a `.unit` file.
pub fn parse_unit_file(
    path: &Path,
    bytes: &[u8],
) -> std::result::Result<Vec<UnitDescriptor>, DeploymentError> {
    let raw: RawUnitFile =
        serde_json::from_slice(bytes).map_err(|e| DeploymentError::DescriptorParse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
    raw.units
        .into_iter()
        .map(|unit| convert_descriptor(path, unit))
        .collect()
}

/// Deploys `.unit` descriptor files through the activation engine.
pub struct UnitFileDeployer;

#[async_trait]
impl Deployer for UnitFileDeployer {
    fn name(&self) -> &str {
        "unit-file"
    }

    fn order(&self) -> i32 {
        10
    }

    fn accepts(&self, location: &Path) -> bool {
        location
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == constants::UNIT_FILE_EXTENSION)
            .unwrap_or(false)
    }

    async fn deploy(
        &self,
        location: &Path,
        context: &mut DeployContext,
    ) -> Result<Option<DeploymentRecord>> {
        let bytes = tokio::fs::read(location)
            .await
            .map_err(|e| DeploymentError::DescriptorParse {
                path: location.to_path_buf(),
                source: Box::new(e),
            })?;
        let descriptors = parse_unit_file(location, &bytes)?;
        log::info!(
            "Deploying {} unit(s) from {}",
            descriptors.len(),
            location.display()
        );
        let report = context
            .engine()
            .activate(descriptors, context.loader_node())
            .await;
        let record = DeploymentRecord {
            location: Some(location.to_path_buf()),
            deployer: self.name().to_string(),
            units: report.started_units(),
            failed: report.failed_claimed(),
        };
        match report.into_result() {
            Ok(()) => Ok(Some(record)),
            Err(e) => {
                // Units that did start stay registered; keep them (and the
                // claimed-but-failed names) reversible even though the
                // deployment is reported failed.
                if !record.units.is_empty() || !record.failed.is_empty() {
                    context.add_record(record);
                }
                Err(Error::from(e))
            }
        }
    }
}
