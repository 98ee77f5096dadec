use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use biz_engine::finance::DEFAULT_BASE_URL;
use biz_engine::server::{self, AppState};
use biz_engine::{DEFAULT_ENGINE_VERSION, EngineConfig, build_dispatcher};

/// Tool-dispatch engine serving business data tools over HTTP.
#[derive(Debug, Parser)]
#[command(name = "biz-engine", version, about)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "BIZ_ENGINE_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "BIZ_ENGINE_PORT", default_value_t = 8080)]
    port: u16,

    /// Base URL of the exchange-rate provider
    #[arg(long, env = "BIZ_ENGINE_PUBLIC_API_URL", default_value = DEFAULT_BASE_URL)]
    rate_api_url: String,

    /// Deployment label, e.g. dev or prod
    #[arg(long, env = "BIZ_ENGINE_ENV", default_value = "dev")]
    env: String,

    /// Version string echoed in every response
    #[arg(long, env = "BIZ_ENGINE_VERSION", default_value = DEFAULT_ENGINE_VERSION)]
    engine_version: String,

    /// Log filter, e.g. `info,biz_engine=debug` (falls back to RUST_LOG)
    #[arg(long, env = "BIZ_ENGINE_LOG")]
    log: Option<String>,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_engine_version(self.engine_version.clone())
            .with_env(self.env.clone())
            .with_rate_api_url(self.rate_api_url.clone())
    }
}

fn init_tracing(directives: Option<&str>) {
    let filter = directives
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let config = cli.engine_config();
    let dispatcher = build_dispatcher(&config).context("build dispatcher")?;

    info!(
        version = %config.engine_version,
        env = %config.env,
        rate_api_url = %config.rate_api_url,
        tools = dispatcher.registry().len(),
        "Starting biz-engine"
    );

    let addr = SocketAddr::new(cli.bind, cli.port);
    server::run(AppState::new(dispatcher, config), addr).await
}
