use clap::{Parser, Subcommand};
use nexusrel::cli::{self as prog_cli, Command};
use nexusrel::config::FlattenMode;
use nexusrel::logger;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nexusrel", version, about = "Relational view over document-store models")]
struct Cli {
    /// Datasource settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Flatten mode: auto, manual, none or legacy (overrides config and environment)
    #[arg(long, global = true)]
    flatten_mode: Option<FlattenMode>,

    /// Directory for rolling log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List physical and virtual collections with their columns and relations
    Collections {
        /// Model descriptions (JSON array)
        #[arg(long)]
        models: PathBuf,
    },
    /// Print the native pipeline a JSON request compiles to
    Compile {
        #[arg(long)]
        models: PathBuf,
        /// Request JSON; `@path` reads it from a file
        request: String,
    },
}

fn read_request(arg: String) -> std::io::Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path),
        None => Ok(arg),
    }
}

fn main() {
    let cli = Cli::parse();
    let logging = match &cli.log_dir {
        Some(dir) => logger::configure_logging(Some(dir.as_path()), None, None, false),
        None => logger::configure_from_env(),
    };
    if let Err(e) = logging {
        eprintln!("Warning: logging disabled: {e}");
    }

    let options = match prog_cli::resolve_options(cli.config.as_deref(), cli.flatten_mode) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    let cmd = match cli.command {
        Commands::Collections { models } => Command::Collections { models },
        Commands::Compile { models, request } => match read_request(request) {
            Ok(request) => Command::Compile { models, request },
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(2);
            }
        },
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = prog_cli::run(cmd, &options, &mut stdout) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
