//! Config show/validate command.

use std::path::Path;

use anyhow::Result;
use marvelous_auth_core::{Config, LiveConfig};

use crate::ui;

/// Config actions.
#[derive(Debug, Clone, Copy, Default)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets redacted.
    #[default]
    Show,
    /// Load and validate, reporting the first problem.
    Validate,
}

/// Run the config command.
pub fn run_config(path: Option<&Path>, action: ConfigAction) -> Result<()> {
    let config_path = path.map_or_else(Config::default_path, Path::to_path_buf);

    match action {
        ConfigAction::Show => show_config(path, &config_path),
        ConfigAction::Validate => validate_config(path, &config_path),
    }
}

fn show_config(path: Option<&Path>, config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        ui::warning(&format!(
            "Config file not found: {}, showing defaults",
            config_path.display()
        ));
    }
    let config = super::load_config(path)?;

    ui::header("Server");
    ui::kv("Port", &config.server.port.to_string());
    ui::kv("Bind", config.server.mode.host());
    ui::kv("Trusted gateway", &config.server.trusted_gateway);

    ui::header("Auth");
    ui::kv(
        "Token lifetime",
        &format!("{} min", config.auth.token_lifetime_minutes),
    );
    ui::kv(
        "Retry interval",
        &format!("{} s", config.auth.retry_interval_secs),
    );

    ui::header("Live keys");
    for (key, value) in LiveConfig::from_config(&config).redacted_snapshot() {
        ui::kv(&key, &value);
    }
    Ok(())
}

fn validate_config(path: Option<&Path>, config_path: &Path) -> Result<()> {
    match super::load_config(path) {
        Ok(_) if config_path.exists() => {
            ui::success(&format!("Configuration valid: {}", config_path.display()));
        }
        Ok(_) => {
            ui::warning(&format!(
                "Config file not found: {}, defaults are valid",
                config_path.display()
            ));
        }
        Err(e) => {
            ui::error(&format!("Configuration invalid: {e}"));
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::commands::load_config;
    use tempfile::tempdir;

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(
            &path,
            r#"{
                // JSON5 comments are allowed
                server: { port: 6001 },
                auth: { secretKey: "file-secret" },
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 6001);
        assert!(config.auth.secret_key.is_some());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "{ server: { port: 0 } }").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }
}
