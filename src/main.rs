mod checker;
mod config;
mod fleet;
mod migrate;
mod notify;
mod scheduler;
mod signals;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::fleet::FleetRegistry;
use crate::notify::NotifierGateway;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut probe_dir: Option<PathBuf> = None;
    let mut debug = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" | "-V" => {
                println!("sitewatch {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "migrate" => {
                let (Some(src), Some(dest)) = (args.get(i + 1), args.get(i + 2)) else {
                    eprintln!("Usage: sitewatch migrate <legacy-dir> <dest-dir>");
                    std::process::exit(1);
                };
                let written = migrate::run(Path::new(src), Path::new(dest))?;
                println!("migrated {} legacy definitions into {}", written, dest);
                return Ok(());
            }
            "-d" => {
                let Some(dir) = args.get(i + 1) else {
                    eprintln!("-d requires a directory argument");
                    std::process::exit(1);
                };
                probe_dir = Some(PathBuf::from(dir));
                i += 1;
            }
            "--debug" => debug = true,
            other => {
                eprintln!("unknown argument: {}", other);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(probe_dir) = probe_dir else {
        print_usage();
        std::process::exit(1);
    };

    // Missing notification endpoints are fatal before any scheduling begins.
    let cfg = AppConfig::from_env(debug)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cfg, probe_dir))
}

async fn run(cfg: AppConfig, probe_dir: PathBuf) -> anyhow::Result<()> {
    let registry = Arc::new(FleetRegistry::new());
    let count = registry.load(&probe_dir).await?;
    info!(count, "loaded probe definitions");
    for name in registry.names().await {
        info!(probe = %name, "monitoring");
    }

    let gateway = Arc::new(NotifierGateway::from_config(&cfg));

    #[cfg(unix)]
    signals::spawn(registry.clone());

    tokio::spawn(watch::run(
        registry.clone(),
        gateway.clone(),
        probe_dir,
        cfg.rescan_interval,
    ));

    scheduler::run(registry, gateway, cfg.tick_interval, cfg.stagger_budget).await;
    Ok(())
}

fn print_usage() {
    println!("sitewatch {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: sitewatch -d <probe-dir> [--debug]");
    println!("       sitewatch migrate <legacy-dir> <dest-dir>\n");
    println!("Options:");
    println!("  -d <dir>         Directory of probe definition TOML files");
    println!("  --debug          Shrink tick/stagger/rescan intervals for fast iteration");
    println!("  -h, --help       Print help");
    println!("  -V, --version    Print version\n");
    println!("Environment:");
    println!("  SITEWATCH_SLACK_WEBHOOK_URL  Slack incoming webhook (required)");
    println!("  SITEWATCH_CONSOLE_URL        Ops console endpoint (required)");
    println!("  SITEWATCH_INFLUXDB_URL       InfluxDB write endpoint (required)");
    println!("  SITEWATCH_TICK_INTERVAL      Scheduler tick (default 60s)");
    println!("  SITEWATCH_STAGGER_BUDGET     Per-tick dispatch stagger budget (default 100ms)");
    println!("  SITEWATCH_RESCAN_INTERVAL    Probe directory rescan interval (default 60s)");
}
