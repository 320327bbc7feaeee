use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use switchyard_dispatch::{Agent, AuditTrail, Coordinator, HookChain};
use switchyard_gateway::GatewayServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchyard", about = "Switchyard — capacity-aware agent dispatch")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dispatch gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Check the config file and print what it resolves to
    Validate,
}

#[derive(Debug, Deserialize)]
struct SwitchyardConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    dispatch: DispatchConfig,
    #[serde(default)]
    agents: Vec<AgentSeed>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DispatchConfig {
    #[serde(default = "default_queue_on_busy")]
    queue_on_busy: bool,
    #[serde(default = "default_drain_interval")]
    drain_interval_secs: u64,
    #[serde(default = "default_sweep_interval")]
    sweep_interval_secs: u64,
    #[serde(default = "default_stale_after")]
    stale_after_secs: u64,
    #[serde(default = "default_audit_capacity")]
    audit_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_on_busy: default_queue_on_busy(),
            drain_interval_secs: default_drain_interval(),
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
            audit_capacity: default_audit_capacity(),
        }
    }
}

/// An agent registered at startup, before any HTTP traffic arrives.
#[derive(Debug, Deserialize)]
struct AgentSeed {
    id: String,
    capabilities: Vec<String>,
    capacity: u32,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_queue_on_busy() -> bool {
    true
}
fn default_drain_interval() -> u64 {
    1
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_stale_after() -> u64 {
    300
}
fn default_audit_capacity() -> usize {
    256
}

async fn load_config(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    let config_str = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
    let config: SwitchyardConfig = toml::from_str(&config_str)?;
    check_seeds(&config.agents)?;
    Ok(config)
}

fn check_seeds(seeds: &[AgentSeed]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for seed in seeds {
        if !seen.insert(seed.id.as_str()) {
            anyhow::bail!("duplicate agent id '{}' in [[agents]]", seed.id);
        }
        if seed.capacity == 0 {
            anyhow::bail!("agent '{}' has zero capacity and can never take work", seed.id);
        }
        if seed.capabilities.is_empty() {
            anyhow::bail!("agent '{}' lists no capabilities", seed.id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            info!("Starting Switchyard gateway on {host}:{port}");

            let trail = AuditTrail::new(config.dispatch.audit_capacity);
            let mut hooks = HookChain::new();
            hooks.add(trail);
            let coordinator = Arc::new(Coordinator::with_hooks(hooks));

            for seed in &config.agents {
                let capabilities: HashSet<String> = seed.capabilities.iter().cloned().collect();
                coordinator
                    .register_agent(Agent::new(seed.id.clone(), capabilities, seed.capacity))
                    .await?;
            }
            if !config.agents.is_empty() {
                info!(count = config.agents.len(), "Seed agents registered");
            }

            let _drain_loop = coordinator
                .start_drain_loop(Duration::from_secs(config.dispatch.drain_interval_secs));
            let _sweeper = coordinator.start_stale_sweeper(
                Duration::from_secs(config.dispatch.sweep_interval_secs),
                Duration::from_secs(config.dispatch.stale_after_secs),
            );

            let app = GatewayServer::build(coordinator, config.dispatch.queue_on_busy);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Switchyard gateway listening on {addr}");
            axum::serve(listener, app).await?;
        }
        Commands::Validate => {
            println!("Config OK: {}", cli.config.display());
            println!("  server: {}:{}", config.server.host, config.server.port);
            println!("  queue_on_busy: {}", config.dispatch.queue_on_busy);
            println!(
                "  drain every {}s, sweep every {}s, stale after {}s",
                config.dispatch.drain_interval_secs,
                config.dispatch.sweep_interval_secs,
                config.dispatch.stale_after_secs
            );
            if config.agents.is_empty() {
                println!("  no seed agents; register over HTTP via POST /agents");
            } else {
                println!("  seed agents:");
                for seed in &config.agents {
                    println!(
                        "    {} [{}] capacity {}",
                        seed.id,
                        seed.capabilities.join(", "),
                        seed.capacity
                    );
                }
            }
        }
    }

    Ok(())
}
