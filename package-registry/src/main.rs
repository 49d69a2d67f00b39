//! Package registry server binary.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use package_registry::config::{Config, DEFAULT_CONFIG_FILE};
use package_registry::run_server;

#[derive(Parser, Debug)]
#[command(name = "package-registry")]
#[command(about = "Serves integration packages: search, categories and archive downloads")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(long)]
    address: Option<String>,

    /// Package storage root; repeat for several roots
    #[arg(long = "packages-path")]
    packages_paths: Vec<PathBuf>,

    /// Cache-Control max-age in seconds
    #[arg(long)]
    cache_time: Option<u64>,

    /// Rebuild the index when the package store changes
    #[arg(long)]
    watch: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = Config::load_or_default(&self.config)?;
        if let Some(address) = self.address {
            config.address = address;
        }
        if !self.packages_paths.is_empty() {
            config.package_paths = self.packages_paths;
        }
        if let Some(cache_time) = self.cache_time {
            config.cache_time = cache_time;
        }
        config.watch |= self.watch;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = registry_logging::init_subscriber();

    let config = Cli::parse().into_config()?;
    run_server(config).await
}
