//! CLI argument parsing for the itinerary-planner binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "itinerary-planner", about = "Field-visit route sequencing and scheduling worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the NATS worker (default if no subcommand given)
    Serve,
    /// Optimize a single request read from a JSON file and print the result
    Optimize {
        /// Path to an OptimizeRouteRequest JSON document ("-" for stdin)
        #[arg(long, short)]
        input: PathBuf,
        /// Use the mock geocoder and mock routing instead of external providers
        #[arg(long)]
        offline: bool,
    },
}
