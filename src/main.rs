mod config;
mod context;
mod error;
mod gaps;
mod inference;
mod orchestrator;
mod providers;
mod scanner;
mod spot;
mod store;
#[cfg(test)]
mod test_support;
mod throttle;
mod writer;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use config::{Config, Credentials};
use context::PipelineContext;
use error::ConfigError;
use gaps::GapKind;

#[derive(Parser, Debug)]
#[command(name = "spotfill")]
#[command(about = "Fills missing images, countries, years, categories and translations on spot records.")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Path to the TOML config file (defaults to the user config directory)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Log intended writes instead of updating the store")]
    dry_run: bool,
    #[arg(long, help = "Process at most this many spots with gaps")]
    max_spots: Option<usize>,
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_gap_kind,
        help = "Restrict the run to these gap kinds (image,country,year,category,locale)"
    )]
    only: Vec<GapKind>,
    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,
}

fn parse_gap_kind(value: &str) -> Result<GapKind, String> {
    GapKind::parse(value).ok_or_else(|| format!("unknown gap kind '{value}'"))
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.run.dry_run = true;
    }
    if cli.max_spots.is_some() {
        config.run.max_spots = cli.max_spots;
    }
    if !cli.only.is_empty() {
        config.run.only = cli.only.clone();
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let context = match load_config(&cli)
        .and_then(|config| PipelineContext::from_config(&config, &Credentials::from_env()))
    {
        Ok(context) => context,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(2);
        }
    };
    if context.run.dry_run {
        info!("Dry run: no records will be modified");
    }

    match orchestrator::run(&context) {
        Ok(summary) => {
            info!(
                "Filled {} fields across {} spots ({} units rate limited out, {} failed)",
                summary.fields_written,
                summary.writes,
                summary.units_exhausted,
                summary.units_failed
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("Run aborted while reading the record store: {}", err);
            ExitCode::FAILURE
        }
    }
}
