mod cli;
mod commands;
mod error_fmt;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};
use tuner_core::Operation;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, json_mode};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if !cli.json {
        let _ = color_eyre::install();
    }

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if json_mode() {
                println!("{}", error_fmt::format_error_json(&e));
            } else {
                eprintln!("{}", error_fmt::humanize(&e));
            }
            error_fmt::exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> eyre::Result<i32> {
    let cfg = load_config(&cli.config)?;
    init_logging(cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match &cli.cmd {
        Commands::Cold(target) => commands::run_landing(&cfg, Operation::ColdLanding, target),
        Commands::Park(target) => commands::run_landing(&cfg, Operation::Park, target),
        Commands::Report { cms, csv } => commands::run_report(&cfg, cms, csv.as_deref()),
        Commands::Import {
            archive,
            start,
            end,
            cms,
        } => commands::run_import(&cfg, archive, *start, *end, cms),
        Commands::MigrateParkSteps { cms } => commands::run_migrate(&cfg, cms),
        Commands::SelfCheck => commands::self_check(&cfg),
    }
}

fn load_config(path: &Path) -> eyre::Result<tuner_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = tuner_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

/// Console logs go to stderr (JSON lines with `--json`); `[logging] file`
/// adds a JSON file sink whose guard lives in `FILE_GUARD`.
fn init_logging(cli: &Cli, logging: &tuner_config::Logging) -> eyre::Result<()> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(&cli.log_level)
            .wrap_err_with(|| format!("invalid --log-level {}", cli.log_level))?,
    };
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if cli.json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file {file:?} has no file name"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let level = logging.level.as_deref().unwrap_or("info");
        let filter = EnvFilter::try_new(level)
            .wrap_err_with(|| format!("invalid logging.level {level}"))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("install logger")?;
    Ok(())
}
