//! pg-tls-proxy command line

use anyhow::{Context, Result};
use clap::Parser;
use pg_tls_proxy::config::{self, ProxyConfig};
use pg_tls_proxy::connection::BackendTlsMode;
use pg_tls_proxy::Listener;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// TLS-terminating proxy for Postgres-protocol databases
#[derive(Debug, Parser)]
#[command(name = "pg-tls-proxy", version, about)]
struct Args {
    /// Address to accept client connections on
    #[arg(long, env = "PG_TLS_PROXY_LISTEN", default_value = config::DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// PEM certificate chain presented to clients
    #[arg(long, env = "PG_TLS_PROXY_CERT_FILE", default_value = config::DEFAULT_CERT_FILE)]
    cert_file: PathBuf,

    /// PEM private key for the certificate
    #[arg(long, env = "PG_TLS_PROXY_KEY_FILE", default_value = config::DEFAULT_KEY_FILE)]
    key_file: PathBuf,

    /// Backend address for every connection
    #[arg(long, env = "PG_TLS_PROXY_TARGET", default_value = config::DEFAULT_TARGET_ADDR)]
    target: String,

    /// JSON route table mapping database names to backends (overrides --target)
    #[arg(long, env = "PG_TLS_PROXY_ROUTES")]
    routes: Option<PathBuf>,

    /// Backend certificate policy: verify or skip-verify
    #[arg(long, env = "PG_TLS_PROXY_BACKEND_TLS", default_value = "verify")]
    backend_tls: BackendTlsMode,

    /// CA bundle for verifying backend certificates (default: system roots)
    #[arg(long, env = "PG_TLS_PROXY_BACKEND_CA_FILE")]
    backend_ca_file: Option<PathBuf>,

    /// Name to verify backend certificates against (default: the backend host)
    #[arg(long, env = "PG_TLS_PROXY_BACKEND_SERVER_NAME")]
    backend_server_name: Option<String>,

    /// Hint attached to fatal errors sent to clients
    #[arg(long, env = "PG_TLS_PROXY_ERROR_HINT")]
    error_hint: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "PG_TLS_PROXY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "PG_TLS_PROXY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            listen_addr: self.listen,
            cert_file: self.cert_file,
            key_file: self.key_file,
            target_addr: self.target,
            routes_file: self.routes,
            backend_tls_mode: self.backend_tls,
            backend_ca_file: self.backend_ca_file,
            backend_server_name: self.backend_server_name,
            error_hint: self.error_hint,
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    let config = args.into_config();
    tracing::info!(
        listen = %config.listen_addr,
        target = %config.target_addr,
        routes = ?config.routes_file,
        backend_tls = %config.backend_tls_mode,
        "starting pg-tls-proxy"
    );

    let listen_addr = config.listen_addr.clone();
    let options = config
        .into_options()
        .context("failed to load proxy configuration")?;
    let listener = Listener::bind(&listen_addr, options)
        .await
        .with_context(|| format!("failed to listen on {}", listen_addr))?;

    listener
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("stopped");
    Ok(())
}
