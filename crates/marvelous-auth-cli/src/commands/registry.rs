//! Registry command - print the inter-service trust table.

use anyhow::Result;
use marvelous_auth_core::Microservice;
use marvelous_auth_gateway::auth::ServiceRegistry;

use crate::ui;

/// Print every registered service, or only `service`.
pub fn run_registry(service: Option<&str>) -> Result<()> {
    let registry = ServiceRegistry::new();

    let selected: Vec<Microservice> = match service {
        Some(name) => vec![name.parse()?],
        None => Microservice::ALL.to_vec(),
    };

    for id in selected {
        let Some(descriptor) = registry.lookup(id) else {
            ui::warning(&format!("{id} is not registered"));
            continue;
        };
        ui::header(id.as_str());
        ui::kv("Allowed callers", &descriptor.allowed_callers.to_string());
        ui::kv("Frontend", descriptor.frontend.as_str());
    }
    Ok(())
}
