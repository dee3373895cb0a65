mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// marpack - per-locale partial update generator
#[derive(Parser)]
#[command(name = "marpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Generate partial MARs for a set of locales
  Partials {
    /// Path to the configuration file
    #[arg(short, long, default_value = "marpack.toml")]
    config: PathBuf,

    /// Build id of the current (target) build
    #[arg(long)]
    build_id: String,

    /// Locale to generate (repeatable)
    #[arg(short, long = "locale", value_name = "LOCALE")]
    locales: Vec<String>,

    /// File listing locales, one per line
    #[arg(long)]
    locales_file: Option<PathBuf>,

    /// Which chunk of the locale list to run (1-based)
    #[arg(long, requires = "total_chunks")]
    this_chunk: Option<usize>,

    /// Number of chunks the locale list is split into
    #[arg(long, requires = "this_chunk")]
    total_chunks: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },

  /// Print the artifact names for a locale and build pair
  Names {
    /// Path to the configuration file
    #[arg(short, long, default_value = "marpack.toml")]
    config: PathBuf,

    #[arg(short, long)]
    locale: String,

    /// Build id of the previous build
    #[arg(long)]
    from: String,

    /// Build id of the current build
    #[arg(long)]
    to: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },

  /// Download the MAR tools without generating anything
  Tools {
    /// Path to the configuration file
    #[arg(short, long, default_value = "marpack.toml")]
    config: PathBuf,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Partials {
      config,
      build_id,
      locales,
      locales_file,
      this_chunk,
      total_chunks,
      output,
    } => cmd::cmd_partials(&cmd::PartialsOptions {
      config,
      build_id,
      locales,
      locales_file,
      chunk: this_chunk.zip(total_chunks),
      output,
    }),
    Commands::Names {
      config,
      locale,
      from,
      to,
      output,
    } => cmd::cmd_names(&config, &locale, &from, &to, output).map(|()| true),
    Commands::Tools { config } => cmd::cmd_tools(&config).map(|()| true),
  };

  match result {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::from(1),
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::from(2)
    }
  }
}
