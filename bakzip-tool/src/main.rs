use bakzip_lib::Config;
use clap::{CommandFactory, Parser};
use std::{collections::HashMap, env, fs, path::PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

mod error;
mod fs_utils;
mod naming;
mod packaging;
mod process;
mod spinner;

use error::BackupError;

#[derive(Parser, Debug)]
#[command(
    name = "bakzip",
    author,
    version,
    about = "Backs up a folder into a zip archive with normal compression",
    long_about = None,
    override_usage = "bakzip [OPTIONS] <SOURCE_FOLDER> [DESTINATION_FOLDER]"
)]
pub struct Cli {
    /// What to compress (recursively)
    #[arg(required_unless_present = "generate_yaml_config")]
    pub source_folder: Option<PathBuf>,

    /// Where to put the compressed backup (defaults to the current directory)
    pub destination_folder: Option<PathBuf>,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Archive name template, e.g. "%src%_%date%.zip"
    #[arg(short, long)]
    pub name: Option<String>,

    /// Dry run (just list entries and parameters)
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub dry: bool,

    /// Patterns to skip (can be specified multiple times)
    #[arg(short = 's', long)]
    pub skip: Vec<String>,

    /// Print progress lines without the animated spinner
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_spinner: bool,

    /// Spinner frame interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Generate YAML config to stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub generate_yaml_config: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    if let Err(e) = run(cli) {
        tracing::debug!("Backup failed: {:?}", e);
        let code = match e.downcast_ref::<BackupError>() {
            Some(err) => {
                eprintln!("{err}");
                if err.wants_usage() {
                    eprintln!("\n{}", Cli::command().render_usage());
                }
                err.exit_code()
            }
            None => {
                eprintln!("Error: {e:#}");
                1
            }
        };
        std::process::exit(code);
    }

    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Step 1: Read environment
    let env_config = read_env();

    // Step 2: Read config file (if exists)
    let mut file_config = Config::default();
    if let Some(path) = cli.config.clone().or(env_config.config.clone()) {
        file_config = read_config_file(&path)?;
    }

    // Step 3: Merge configs: env < file < CLI
    let merged = Config::merge(env_config, file_config, cli_to_config(&cli)).with_defaults();

    if cli.generate_yaml_config {
        let yaml = serde_yaml::to_string(&merged)?;
        println!("{yaml}");
        return Ok(());
    }

    let source = cli
        .source_folder
        .ok_or_else(|| anyhow::anyhow!("source_folder is required"))?;

    if let Some(summary) = process::run_within_tokio(merged, source, cli.destination_folder)? {
        tracing::info!(
            "Backup complete: {} ({} entries, {})",
            summary.archive.display(),
            summary.entries,
            fs_utils::encode_size(summary.size)
        );
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Reads environment variables prefixed with BAKZIP_
fn read_env() -> Config {
    config_from_vars(&env::vars().collect())
}

fn config_from_vars(vars: &HashMap<String, String>) -> Config {
    let mut cfg = Config::default();

    macro_rules! get_env {
        ($key:expr) => {
            vars.get(&format!("BAKZIP_{}", $key)).cloned()
        };
    }

    fn truthy(v: &str) -> bool {
        v == "true" || v == "1" || v.eq_ignore_ascii_case("yes")
    }

    cfg.config = get_env!("CONFIG");
    cfg.name = get_env!("NAME");
    cfg.dry = get_env!("DRY").map(|v| truthy(&v));
    cfg.skip = get_env!("SKIP").map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });
    cfg.spinner = get_env!("SPINNER").map(|v| truthy(&v));
    cfg.interval_ms = get_env!("INTERVAL_MS").and_then(|v| v.parse().ok());
    cfg
}

/// Reads YAML or JSON config from file
fn read_config_file(path: &str) -> anyhow::Result<Config> {
    use anyhow::Context;

    let content =
        fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    let lower = path.to_lowercase();
    let cfg = if lower.ends_with(".json") {
        serde_json::from_str(&content).with_context(|| format!("parsing JSON config {path}"))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("parsing YAML config {path}"))?
    };
    Ok(cfg)
}

/// Converts CLI struct into Config. Flags left unset do not override other sources.
fn cli_to_config(cli: &Cli) -> Config {
    Config {
        config: cli.config.clone(),
        name: cli.name.clone(),
        dry: cli.dry.then_some(true),
        skip: if cli.skip.is_empty() {
            None
        } else {
            Some(cli.skip.clone())
        },
        spinner: cli.no_spinner.then_some(false),
        interval_ms: cli.interval_ms,
    }
}
