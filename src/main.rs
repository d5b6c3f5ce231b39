use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portunus_orchestrator::config::{self, Settings};
use portunus_orchestrator::crypt::SystemHasher;
use portunus_orchestrator::identity::IdentityMap;
use portunus_orchestrator::slapd::{self, ServiceAccount};
use portunus_orchestrator::{runtime_tree, supervisor};

/// All configuration is read from `PORTUNUS_*` environment variables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {}

fn main() {
    if let Err(err) = run() {
        eprintln!("portunus-orchestrator error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let _cli = Cli::parse();

    let settings = Settings::from_process_env()?;
    // SAFETY: still single-threaded; the async runtime is only started below.
    unsafe { config::scrub_process_env(&settings) };
    let leftover = config::leftover_keys(&settings, std::env::vars_os());
    if !leftover.is_empty() {
        anyhow::bail!(
            "Failed to remove from environment: {}",
            leftover.join(", ")
        );
    }

    init_tracing(&settings);
    info!("Starting portunus-orchestrator");

    let ids = IdentityMap::resolve(&settings)?;
    let hasher = SystemHasher::new()?;
    info!("Using libcrypt method {}", hasher.preferred_method());
    let account = ServiceAccount::generate(&hasher)?;
    let files = slapd::render_files(&settings, &account)?;

    let runtime =
        tokio::runtime::Runtime::new().context("Failed to initialize async runtime")?;
    runtime.block_on(async {
        runtime_tree::prepare(&settings, &ids, &files).await?;
        supervisor::supervise(&settings, &ids, &account).await
    })
}

fn init_tracing(settings: &Settings) {
    let default_level = if settings.debug() { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
