mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use svcwatch::config::{AgentConfig, resolve_config_path};
use svcwatch::control::{ServiceControl, SystemServiceControl};
use svcwatch::events::SystemEventSource;
use svcwatch::manager::{self, Agent};
use svcwatch::transport::{LogTransport, Transport, XmlFileTransport};
use svcwatch::watcher::WatchContext;

fn main() {
    // Initialize logger with custom format for the agent
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    match args.sub.unwrap_or(cli::Cmd::Run {
        config: None,
        system: false,
    }) {
        cli::Cmd::Run { config, system } => run_agent(config, system),
        cli::Cmd::Status { service } => handle_status(&service),
        cli::Cmd::Start { service } => handle_start(&service),
    }
}

fn run_agent(config_path: Option<String>, use_system: bool) -> Result<()> {
    let cfg_path = resolve_config_path(config_path, use_system)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    let cfg = AgentConfig::load_or_create(&cfg_path).context("Failed to load config")?;
    info!("Using config from: {}", cfg_path.display());

    let transport: Arc<dyn Transport> = match &cfg.output_dir {
        Some(dir) => Arc::new(
            XmlFileTransport::new(cfg.agent_name.clone(), dir)
                .context("Failed to prepare output directory")?,
        ),
        None => Arc::new(LogTransport),
    };

    manager::install_signal_handlers()?;
    let agent = Agent::new(
        &cfg,
        WatchContext {
            control: Arc::new(SystemServiceControl),
            events: Arc::new(SystemEventSource::default()),
            transport,
        },
    );

    info!("svcwatch agent started (pid {})", std::process::id());
    agent.run()?;
    info!("svcwatch agent exiting");
    Ok(())
}

/// Handle status command - print the state the agent would report
fn handle_status(service: &str) -> Result<()> {
    let service = service.to_lowercase();
    let running = SystemServiceControl
        .is_running(&service)
        .context("Error checking status")?;
    println!("{}", u8::from(running));
    std::process::exit(if running { 0 } else { 1 });
}

/// Handle start command - start a service through the service manager
fn handle_start(service: &str) -> Result<()> {
    let service = service.to_lowercase();
    SystemServiceControl
        .start(&service)
        .context("Failed to start")?;
    println!("{service} start requested");
    Ok(())
}
