use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use context_handler::config::{self, Config};
use context_handler::observability::init_observability;
use context_handler::store::{InMemoryIdentityStore, NewUser};
use context_handler::transport::run_http;
use context_handler::{ContextHandler, OrgRole, SharedClock, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "context-handler")]
#[command(about = "HTTP service resolving per-request authentication context", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP bind host
    #[arg(long)]
    host: Option<IpAddr>,

    /// HTTP bind port
    #[arg(long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    /// Allow anonymous access to the configured organization
    #[arg(long)]
    anonymous: bool,

    /// Password for the seeded `admin` user; no admin is created when unset
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // env > file > defaults, then explicit CLI flags on top
    let mut builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path)?
    } else {
        config::load_config()?
    };

    if let Some(host) = args.host {
        builder = builder.http_host(host);
    }
    if let Some(port) = args.port {
        builder = builder.http_port(port);
    }
    if args.verbose {
        builder = builder.log_level("debug".to_string());
    }
    if args.json_logs {
        builder = builder.json_logs(true);
    }
    if args.anonymous {
        builder = builder.anonymous_enabled(true);
    }

    let config = builder.build()?;
    init_observability(&config.telemetry)?;

    let clock: SharedClock = Arc::new(SystemClock);
    let store = Arc::new(seed_store(&config, clock.clone(), args.admin_password)?);

    tracing::info!("Starting context handler");
    tracing::info!(
        basic = config.basic_auth_enabled,
        anonymous = config.anonymous.enabled,
        auth_proxy = config.auth_proxy.enabled,
        cache = ?config.cache.backend,
        "Authentication methods"
    );

    let server = config.server.clone();
    let handler = ContextHandler::builder(config, store).clock(clock).build();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    run_http(Arc::new(handler), &server, shutdown).await?;
    Ok(())
}

/// In-memory store holding the anonymous org and, optionally, an admin
fn seed_store(
    config: &Config,
    clock: SharedClock,
    admin_password: Option<String>,
) -> anyhow::Result<InMemoryIdentityStore> {
    let store =
        InMemoryIdentityStore::new(clock).with_token_settings(config.session.token_settings());
    let org = store.create_org(&config.anonymous.org_name)?;

    if let Some(password) = admin_password {
        let admin = store.create_user(
            NewUser {
                login: "admin".into(),
                email: "admin@localhost".into(),
                name: "Administrator".into(),
                password: Some(password),
                is_admin: true,
            },
            org.id,
            OrgRole::Admin,
        )?;
        tracing::info!(user_id = admin.id, org = %org.name, "Seeded admin user");
    }

    Ok(store)
}
