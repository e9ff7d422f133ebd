use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use portfolio_analytics_lib::{
    init_logging,
    monitor::runner::{self, EXIT_CONFIG, EXIT_OK},
    MonitorSettings,
};

#[derive(Parser, Debug)]
#[command(name = "performance-dashboard", version)]
#[command(about = "Renders the monitor histories into a static HTML dashboard")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// HTML file to write (defaults to the configured dashboard path)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = MonitorSettings::resolve(cli.config.as_deref())
        .and_then(|settings| runner::build_dashboard(&settings, cli.output.as_deref(), Utc::now()));

    match result {
        Ok(path) => {
            println!("dashboard written to {}", path.display());
            std::process::exit(EXIT_OK);
        }
        Err(err) => {
            eprintln!("performance-dashboard: {err:#}");
            std::process::exit(EXIT_CONFIG);
        }
    }
}
