use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flagmap",
    version,
    about = "Map feature flags to the web endpoints they gate",
    after_help = r#"Examples:
  flagmap analyze --repo .
  flagmap analyze --repo . --config flagmap.yaml --format yaml
  flagmap context --repo . --file src/main/java/com/acme/Api.java --line 42 --column 9
  flagmap default-config > flagmap.yaml
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze every Java source in a repository and print the report.
    Analyze {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Rule file (YAML or JSON); defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Worker threads; overrides the config file and FLAGMAP_THREADS.
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
        /// Stop at the first file that cannot be analyzed.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Print the method, feature and endpoint at a position in a file.
    Context {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// File path relative to the repository root.
        #[arg(long)]
        file: String,
        /// Byte offset in the file.
        #[arg(long, conflicts_with_all = ["line", "column"])]
        offset: Option<i64>,
        /// 1-based line; use with --column.
        #[arg(long, requires = "column")]
        line: Option<usize>,
        /// 1-based column; use with --line.
        #[arg(long, requires = "line")]
        column: Option<usize>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Print the built-in configuration.
    DefaultConfig {
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}
