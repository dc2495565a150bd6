//! Serve command - run the auth hub.

use anyhow::Result;
use marvelous_auth_core::Config;
use marvelous_auth_core::config::BindMode;
use tokio_util::sync::CancellationToken;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Port override.
    pub port: Option<u16>,
    /// Bind override: `local`, `public`, or an address.
    pub bind: Option<String>,
}

/// Run the hub until Ctrl+C.
pub async fn run_serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.mode = parse_bind(&bind);
    }
    config.validate()?;

    ui::header("Starting Marvelous Auth");
    ui::kv(
        "Address",
        &format!("{}:{}", config.server.mode.host(), config.server.port),
    );
    ui::kv("Trusted gateway", &config.server.trusted_gateway);
    if config.auth.secret_key.is_none() {
        ui::warning("No signing secret configured, waiting for remote configuration");
    }
    ui::info("Press Ctrl+C to stop");
    println!();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        on_signal.cancel();
    });

    marvelous_auth_gateway::start(config, cancel).await?;
    Ok(())
}

fn parse_bind(bind: &str) -> BindMode {
    match bind {
        "local" | "loopback" => BindMode::Local,
        "public" | "lan" => BindMode::Public,
        address => BindMode::Custom(address.to_string()),
    }
}
