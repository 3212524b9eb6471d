use crate::stores::Registry;
use clap::ValueHint::FilePath;
use clap::{Args, Parser, Subcommand};
use log::debug;
use std::fs::read_to_string;

#[derive(Args, Debug)]
struct BenchArgs {
    #[arg(short = 'f')]
    #[arg(value_hint = FilePath)]
    #[arg(help = "Path to the benchmark's TOML config file")]
    config: String,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run a benchmark")]
    Bench(BenchArgs),
    #[command(about = "List all registered key-value stores")]
    List,
}

fn bench_cli(args: &BenchArgs) {
    let text = match read_to_string(args.config.as_str()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to read {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = crate::bench::run_from_str(&text) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn list_cli() {
    for r in inventory::iter::<Registry> {
        println!("Registered store: {}", r.name);
    }
}

/// The default command line interface.
///
/// This function is public and can be called from a different crate, so that stores registered
/// there are picked up by the same interface.
///
/// ## Usage
///
/// To run a benchmark:
///
/// ```bash
/// kvload bench -f <CONFIG>
/// ```
///
/// where `CONFIG` is the path to a benchmark configuration file; its format is documented in
/// [`crate::bench`] and [`crate::stores`]. To list all registered key-value stores:
///
/// ```bash
/// kvload list
/// ```
pub fn cmdline() {
    env_logger::init();
    let cli = Cli::parse();
    debug!("starting kvload with args: {:?}", cli);
    match cli.command {
        Commands::Bench(args) => bench_cli(&args),
        Commands::List => list_cli(),
    }
}
