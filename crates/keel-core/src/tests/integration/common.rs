use std::sync::{Arc, Mutex};

use crate::kernel::error::DynError;
use crate::units::factory::{UnitFactory, UnitInstance};

/// Shared lifecycle log used by the integration scenarios.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub struct Probe {
    pub name: Mutex<String>,
    pub log: EventLog,
}

fn as_probe(instance: &UnitInstance) -> Result<Arc<Probe>, DynError> {
    instance
        .clone()
        .downcast::<Probe>()
        .map_err(|_| "not a Probe".into())
}

pub fn probe_factory(log: EventLog) -> UnitFactory {
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

pub fn probe_unit_json(name: &str, deps: &[&str]) -> String {
    let deps_json: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
    format!(
        r#"{{"name": "{name}", "factory": "probe", "properties": {{"name": {{"literal": "{name}"}}}}, "depends": [{}]}}"#,
        deps_json.join(", ")
    )
}
