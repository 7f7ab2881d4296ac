use std::sync::Arc;

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use waygate_transport::{TransportProvider, memory::MemoryTransport};

#[derive(Parser)]
#[command(name = "waygate", about = "Waygate — messaging network REST gateway")]
struct Cli {
    /// Bind address; overrides the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Listen port; overrides the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let mut config = waygate_config::discover_and_load();
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "waygate starting");

    // The wire-level network adapter is an external integration point; the
    // built-in loopback transport pairs instantly and acknowledges sends
    // locally, which is what development and CI want.
    let provider: Arc<dyn TransportProvider> = Arc::new(MemoryTransport::new());

    waygate_gateway::start_gateway(config, provider).await
}
