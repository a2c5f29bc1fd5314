mod cli;
mod error_fmt;
mod simulate;
mod watch;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{ConfigError, exit_code_for_error, format_error_json, humanize};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), belays = cfg.belays.len(), "config loaded");

    match cli.cmd {
        Commands::Check => {
            for b in &cfg.belays {
                let sensor = match &b.sensor {
                    belay_config::SensorCfg::SingleSwitch { .. } => "single switch",
                    belay_config::SensorCfg::DualSwitch { .. } => "dual switch",
                    belay_config::SensorCfg::Analog(_) => "analog",
                };
                let extruder = match (b.extruder_type, &b.extruder_stepper_name) {
                    (belay_config::ExtruderType::TradRack, _) => "trad_rack".to_string(),
                    (belay_config::ExtruderType::ExtruderStepper, name) => {
                        format!("extruder_stepper {}", name.as_deref().unwrap_or_default())
                    }
                };
                println!("belay {}: {sensor} sensor driving {extruder}", b.name);
            }
            println!("config ok");
        }
        Commands::Simulate { duration, quiet } => {
            simulate::run(
                &cfg,
                simulate::RunOptions {
                    duration_s: duration,
                    json: cli.json,
                    quiet,
                },
            )?;
        }
        Commands::SelfCheck => {
            let mut rig = simulate::Rig::new(&cfg)?;
            rig.start()?;
            for status in rig.system().status() {
                if cli.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "belay": status.name,
                            "enabled": status.enabled,
                            "state": status.state,
                            "multiplier": status.multiplier,
                        })
                    );
                } else {
                    println!(
                        "{} ({}, multiplier {:.4})",
                        status.summary(),
                        if status.enabled { "enabled" } else { "disabled" },
                        status.multiplier
                    );
                }
            }
            println!("self-check ok");
        }
        Commands::Watch {
            belay,
            seconds,
            hz,
            active_high,
        } => watch::run(&cfg, belay.as_deref(), seconds, hz, active_high)?,
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<belay_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: belay_config::Config =
        toml::from_str(&text).wrap_err_with(|| ConfigError(path.to_path_buf()))?;
    cfg.validate()
        .wrap_err_with(|| ConfigError(path.to_path_buf()))?;
    Ok(cfg)
}

fn init_tracing(json: bool, level: &str, logging: &belay_config::Logging) -> eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    // RUST_LOG wins over --log-level
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let file_layer = match &logging.file {
        Some(file) => {
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
            let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(file_layer);
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .try_init()
    };
    result.wrap_err("install tracing subscriber")
}
