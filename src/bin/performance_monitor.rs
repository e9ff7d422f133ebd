use std::{path::PathBuf, time::Duration};

use chrono::Utc;
use clap::Parser;
use portfolio_analytics_lib::{
    init_logging,
    monitor::runner::{self, OutputOptions, EXIT_CONFIG},
    MonitorSettings,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "performance-monitor", version)]
#[command(about = "Measures Core Web Vitals and Lighthouse scores against budgets")]
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
    /// Base URL of the site to probe
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Lighthouse JSON report to read instead of probing
    #[arg(long)]
    lighthouse_report: Option<PathBuf>,
    /// Re-run every N seconds until interrupted
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,
}

async fn audit(settings: &MonitorSettings, cli: &Cli) -> anyhow::Result<i32> {
    let report = runner::run_performance(settings, Utc::now()).await?;
    print!("{}", report.to_console());

    let options = OutputOptions {
        export: cli.export,
        junit: cli.junit,
    };
    for path in runner::write_outputs(&report, settings, options)? {
        println!("wrote {}", path.display());
    }
    Ok(runner::exit_code(&report, cli.ci))
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let mut settings = match MonitorSettings::resolve(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("performance-monitor: {err:#}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    if let Some(url) = &cli.url {
        settings.probe.base_url = url.clone();
    }
    if let Some(report) = &cli.lighthouse_report {
        settings.probe.lighthouse_report = Some(report.clone());
    }

    let Some(secs) = cli.watch else {
        let code = match audit(&settings, &cli).await {
            Ok(code) => code,
            Err(err) => {
                eprintln!("performance-monitor: {err:#}");
                EXIT_CONFIG
            }
        };
        std::process::exit(code);
    };

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_code = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match audit(&settings, &cli).await {
                    Ok(code) => last_code = code,
                    Err(err) => {
                        eprintln!("performance-monitor: {err:#}");
                        std::process::exit(EXIT_CONFIG);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log::info!("watch stopped");
                break;
            }
        }
    }
    std::process::exit(last_code);
}
