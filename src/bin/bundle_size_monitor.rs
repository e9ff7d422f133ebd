use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use portfolio_analytics_lib::{
    init_logging,
    monitor::runner::{self, OutputOptions, EXIT_CONFIG},
    MonitorSettings,
};

#[derive(Parser, Debug)]
#[command(name = "bundle-size-monitor", version)]
#[command(about = "Checks built asset sizes against budgets and recent history")]
struct Cli {
    /// Exit with status 1 when a critical issue is found
    #[arg(long)]
    ci: bool,
    /// Write a JSON snapshot to the reports directory
    #[arg(long)]
    export: bool,
    /// Write JUnit XML to the reports directory
    #[arg(long)]
    junit: bool,
    /// Build output directory (defaults to the configured dist dir)
    #[arg(long)]
    dist: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let settings = match MonitorSettings::resolve(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("bundle-size-monitor: {err:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let report = match runner::run_bundle(&settings, cli.dist.as_deref(), Utc::now()) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("bundle-size-monitor: {err:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    print!("{}", report.to_console());

    let options = OutputOptions {
        export: cli.export,
        junit: cli.junit,
    };
    match runner::write_outputs(&report, &settings, options) {
        Ok(written) => {
            for path in written {
                println!("wrote {}", path.display());
            }
        }
        Err(err) => {
            eprintln!("bundle-size-monitor: {err:#}");
            std::process::exit(EXIT_CONFIG);
        }
    }

    std::process::exit(runner::exit_code(&report, cli.ci));
}
