#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use birdglass::*;
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;

use commands::lookup::LookupArgs;
use commands::neighbours::NeighboursArgs;
use commands::prefix::PrefixArgs;
use commands::routes::RoutesArgs;
use commands::serve::ServeArgs;
use commands::status::StatusArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.birdglass/birdglass.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table, markdown, json, json-pretty, json-line
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the neighbours store of all route servers fresh until interrupted
    Serve(ServeArgs),

    /// Show the status of a route server
    Status(StatusArgs),

    /// List the neighbours of a route server
    Neighbours(NeighboursArgs),

    /// Show the routes of a neighbour
    Routes(RoutesArgs),

    /// Search neighbours of every route server by description
    Lookup(LookupArgs),

    /// Find a prefix on every route server
    Prefix(PrefixArgs),

    /// Print the loaded configuration
    Config,
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match GlassConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let format = cli.format;
    match cli.command {
        Commands::Serve(args) => commands::serve::run(&config, args),
        Commands::Status(args) => commands::status::run(&config, args, format),
        Commands::Neighbours(args) => commands::neighbours::run(&config, args, format),
        Commands::Routes(args) => commands::routes::run(&config, args, format),
        Commands::Lookup(args) => commands::lookup::run(&config, args, format),
        Commands::Prefix(args) => commands::prefix::run(&config, args, format),
        Commands::Config => println!("{}", config.summary()),
    }
}
