// # tunsyncd - Tunnel Sync Daemon
//
// The tunsyncd daemon is a THIN integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Wiring the Cloudflare gateway and Docker event source into the engine
// 4. Restarting the whole cycle when it fails
//
// All reconciliation logic lives in tunsync-core. Do not add DNS or routing
// logic here.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `CF_API_TOKEN`: Cloudflare API token (required)
// - `CF_ACCOUNT_ID`: Cloudflare account id (required)
// - `CF_ZONE_ID`: DNS zone id (required)
// - `TUNNEL_TOKEN`: Tunnel identity token (required)
// - `DOMAIN`: Base domain suffix for all managed records (required)
// - `HOST_IP`: Host the services are reachable on (default: localhost)
// - `TUNSYNC_LOG_LEVEL`: trace|debug|info|warn|error (default: info)
//
// ## Example
//
// ```bash
// export CF_API_TOKEN=your_token
// export CF_ACCOUNT_ID=your_account
// export CF_ZONE_ID=your_zone
// export TUNNEL_TOKEN=your_tunnel_token
// export DOMAIN=example.com
//
// tunsyncd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use tunsync_core::{SyncConfig, SyncEngine};
use tunsync_events_docker::DockerEventSource;
use tunsync_gateway_cloudflare::CloudflareGateway;

/// Delay before restarting after a failed cycle
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum TunsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<TunsyncExitCode> for ExitCode {
    fn from(code: TunsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    sync: SyncConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            sync: SyncConfig {
                api_token: require("CF_API_TOKEN")?,
                account_id: require("CF_ACCOUNT_ID")?,
                zone_id: require("CF_ZONE_ID")?,
                tunnel_token: require("TUNNEL_TOKEN")?,
                domain: require("DOMAIN")?,
                origin_host: env::var("HOST_IP").unwrap_or_else(|_| "localhost".to_string()),
            },
            log_level: env::var("TUNSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.sync.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower.contains("example")
            || token_lower == "token"
        {
            anyhow::bail!(
                "CF_API_TOKEN appears to be a placeholder. \
                Use an actual API token from Cloudflare."
            );
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "TUNSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

fn require(name: &'static str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{name} is required. Set it via: export {name}=..."))
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return TunsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {e}");
        return TunsyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return TunsyncExitCode::ConfigError.into();
    }

    info!("Starting tunsyncd daemon");
    info!(domain = %config.sync.domain, origin = %config.sync.origin_host, "Configuration loaded");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            return TunsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        if let Err(e) = run_daemon(&config.sync).await {
            error!("Daemon error: {e}");
            TunsyncExitCode::RuntimeError
        } else {
            TunsyncExitCode::CleanShutdown
        }
    })
    .into()
}

/// Run sync cycles until a clean shutdown
///
/// A failed cycle (startup failure or a lost event subscription) is logged
/// and retried from scratch after a short delay; the caches are rebuilt from
/// the remote state on every restart, which is the only recovery mechanism.
async fn run_daemon(config: &SyncConfig) -> Result<()> {
    loop {
        info!("Starting sync cycle");
        match run_cycle(config).await {
            Ok(()) => {
                info!("Shutting down daemon");
                return Ok(());
            }
            Err(e) => {
                error!("Sync cycle failed: {e}");
                info!("Restarting in {}s...", RESTART_DELAY.as_secs());
                tokio::time::sleep(RESTART_DELAY).await;
            }
        }
    }
}

/// Wire the collaborators into an engine and run it to completion
async fn run_cycle(config: &SyncConfig) -> Result<()> {
    let gateway = CloudflareGateway::new(
        &config.api_token,
        &config.account_id,
        &config.zone_id,
        &config.tunnel_token,
    )?;
    let events = DockerEventSource::new()?;

    let mut engine = SyncEngine::new(Box::new(gateway), Box::new(events), config)?;
    engine.run().await?;
    Ok(())
}
