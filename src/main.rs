use anyhow::{Context, Result, bail};
use clap::Parser;
use flagmap::analyzer::scan::ScanOptions;
use flagmap::analyzer::{Analyzer, CancelFlag};
use flagmap::cli::{self, OutputFormat};
use flagmap::config::EngineConfig;
use flagmap::util;
use serde::Serialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flagmap=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).context("serialize json"),
        OutputFormat::Yaml => serde_yaml_ng::to_string(value).context("serialize yaml"),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Analyze {
            repo,
            config,
            threads,
            format,
            no_ignore,
            fail_fast,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(threads) = threads {
                config.threads = threads;
            }
            config.fail_fast |= fail_fast;
            let analyzer = Analyzer::new(config)?;
            let report = analyzer.analyze_paths(&repo, ScanOptions::new(no_ignore), &CancelFlag::new())?;
            let rendered = match format {
                OutputFormat::Json => report.to_json()?,
                OutputFormat::Yaml => report.to_yaml()?,
            };
            println!("{rendered}");
            Ok(())
        }
        cli::Command::Context {
            repo,
            file,
            offset,
            line,
            column,
            config,
            format,
            no_ignore,
        } => {
            let config = load_config(config.as_deref())?;
            let analyzer = Analyzer::new(config)?;
            let rel_path = util::normalize_path(Path::new(&file));
            let offset = match (offset, line, column) {
                (Some(offset), _, _) => offset,
                (None, Some(line), Some(column)) => {
                    let source = util::read_to_string(&repo.join(&rel_path))?;
                    match util::offset_of(&source, line, column) {
                        Some(offset) => offset as i64,
                        None => bail!("{rel_path} has no position {line}:{column}"),
                    }
                }
                _ => bail!("either --offset or --line with --column is required"),
            };
            let info = analyzer.context_in_repo(&repo, &rel_path, offset, ScanOptions::new(no_ignore))?;
            println!("{}", render(&info, format)?);
            Ok(())
        }
        cli::Command::DefaultConfig { format } => {
            println!("{}", render(&EngineConfig::default(), format)?);
            Ok(())
        }
    }
}
