use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use provider_lifecycle::config::default_manifest_path;
use provider_lifecycle::lifecycle::signals::wait_for_signal;
use provider_lifecycle::{AppConfig, AppContext, Application, PriorityTier, Provider};
use tokio::time::Instant;

#[derive(Parser)]
#[command(name = "provider-lifecycle")]
#[command(about = "Boots a set of service providers and shuts them down gracefully on signal")]
struct Cli {
    #[arg(long, env = "SHUTDOWN_TIMEOUT_MS", default_value = "30000")]
    shutdown_timeout_ms: u64,

    #[arg(long, env = "DRAIN_TIMEOUT_MS", default_value = "5000")]
    drain_timeout_ms: u64,

    #[arg(long, env, default_value_os_t = default_manifest_path())]
    manifest_path: PathBuf,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Shut down right after boot instead of waiting for a signal.
    #[arg(long)]
    once: bool,
}

/// Demo provider that only logs its hooks.
struct LoggingProvider {
    id: &'static str,
    priority: PriorityTier,
    provides: &'static [&'static str],
    when: &'static [&'static str],
    terminable: bool,
}

#[async_trait]
impl Provider for LoggingProvider {
    fn identity(&self) -> &str {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority.value()
    }

    fn is_deferred(&self) -> bool {
        !self.provides.is_empty()
    }

    fn provides(&self) -> Vec<String> {
        self.provides.iter().map(|s| s.to_string()).collect()
    }

    fn when(&self) -> Vec<String> {
        self.when.iter().map(|s| s.to_string()).collect()
    }

    fn terminable(&self) -> bool {
        self.terminable
    }

    async fn register(&self, _app: &AppContext) -> anyhow::Result<()> {
        tracing::info!(provider = self.id, "register");
        Ok(())
    }

    async fn boot(&self, _app: &AppContext) -> anyhow::Result<()> {
        tracing::info!(provider = self.id, "boot");
        Ok(())
    }

    async fn terminate(&self, deadline: Instant, _app: &AppContext) -> anyhow::Result<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tracing::info!(provider = self.id, remaining_ms = remaining.as_millis() as u64, "terminate");
        Ok(())
    }
}

fn demo_providers() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(LoggingProvider {
            id: "config",
            priority: PriorityTier::Core,
            provides: &[],
            when: &[],
            terminable: false,
        }) as Arc<dyn Provider>,
        Arc::new(LoggingProvider {
            id: "http",
            priority: PriorityTier::Framework,
            provides: &[],
            when: &[],
            terminable: true,
        }),
        Arc::new(LoggingProvider {
            id: "cache",
            priority: PriorityTier::Infrastructure,
            provides: &["cache"],
            when: &[],
            terminable: true,
        }),
        Arc::new(LoggingProvider {
            id: "mail",
            priority: PriorityTier::Extensions,
            provides: &[],
            when: &["mail.sending"],
            terminable: false,
        }),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig {
        log_level: cli.log_level.clone(),
        ..AppConfig::default()
    }
    .with_timeouts(
        Duration::from_millis(cli.shutdown_timeout_ms),
        Duration::from_millis(cli.drain_timeout_ms),
    )
    .with_manifest_path(cli.manifest_path);

    let app = Application::new(config);
    app.register_providers(demo_providers()).await;

    if let Err(e) = app.boot_all().await {
        tracing::error!("Startup failed: {}", e);
        app.force_shutdown();
    }

    app.register_shutdown_callback("log-summary", |deadline: Instant| async move {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tracing::info!(remaining_ms = remaining.as_millis() as u64, "Shutdown started");
        Ok::<(), anyhow::Error>(())
    });

    tracing::info!("Providers booted, waiting for signals...");

    let reason = if cli.once {
        app.resolve("cache").await?;
        app.fire("mail.sending").await?;
        "once"
    } else {
        wait_for_signal().await?
    };

    tracing::info!(reason, "Shutting down...");

    match app.graceful_shutdown().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            for err in e.aggregated() {
                tracing::warn!("{}", err);
            }
            tracing::error!("{}", e);
            app.force_shutdown();
        }
    }
}
