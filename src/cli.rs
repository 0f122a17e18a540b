use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "service state watcher agent")]
pub struct Args {
    /// Sub‑commands (run, status, start)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Watch the configured services (default if no sub‑command)
    Run {
        /// Path to configuration file
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Use system-wide config
        #[arg(long, conflicts_with = "config")]
        system: bool,
    },
    /// Print a service's state as the agent reports it (Exit 0 = running, 1 = stopped)
    Status {
        /// Service name (case-insensitive)
        service: String,
    },
    /// Ask the service manager to start a service
    Start {
        /// Service name (case-insensitive)
        service: String,
    },
}
