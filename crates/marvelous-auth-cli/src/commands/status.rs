//! Status command - probe a running hub.

use std::time::Duration;

use anyhow::Result;
use marvelous_auth_core::Config;

use crate::ui;

/// Query `/health` of the hub on the configured port.
pub async fn run_status(config: &Config) -> Result<()> {
    ui::header("Marvelous Auth Status");

    let port = config.server.port;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    match client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            ui::success(&format!("Hub is running on port {port}"));
            let body: serde_json::Value = resp.json().await?;
            ui::readiness(
                "Configuration",
                body["configReady"].as_bool().unwrap_or(false),
            );
            ui::readiness(
                "Credentials",
                body["credentialsReady"].as_bool().unwrap_or(false),
            );
            if let Some(state) = body["bootstrap"]["state"].as_str() {
                ui::kv("Bootstrap", state);
            }
            if let Some(cycles) = body["bootstrap"]["credentialCycles"].as_u64() {
                ui::kv("Credential cycles", &cycles.to_string());
            }
        }
        Ok(resp) => {
            ui::warning(&format!("Health check returned {}", resp.status()));
        }
        Err(_) => {
            ui::warning(&format!("Hub is not running on port {port}"));
            ui::info("Start with: marvelous-auth serve");
        }
    }

    Ok(())
}
