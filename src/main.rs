use std::io::{self, IsTerminal, Read};

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "food-scan-rust",
    version,
    about = "Read food items from a receipt or menu photo and total their nutrients"
)]
struct Cli {
    /// Image to scan (reads stdin when omitted)
    #[arg(short = 'i', long = "image")]
    image: Option<String>,

    /// Food table (JSON array of records); overrides [pipeline] food_db
    #[arg(short = 'f', long = "food-db")]
    food_db: Option<String>,

    /// Minimum match score (0-100) for a row to be auto-accepted
    #[arg(short = 't', long = "threshold", value_parser = clap::value_parser!(u32).range(0..=100))]
    threshold: Option<u32>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Look up a single dish name instead of scanning
    #[arg(long = "lookup")]
    lookup: Option<String>,

    /// Search the food table by substring
    #[arg(long = "search")]
    search: Option<String>,

    /// Estimate nutrients for a dish, e.g. "2x mini dosa" (repeatable)
    #[arg(short = 'e', long = "estimate")]
    estimate: Vec<String>,

    /// Pretty-print the JSON output
    #[arg(long = "pretty")]
    pretty: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    food_scan_rust::logging::init(cli.verbose)?;

    let needs_image = cli.lookup.is_none() && cli.search.is_none() && cli.estimate.is_empty();
    let needs_stdin = needs_image && cli.image.is_none() && !io::stdin().is_terminal();
    let input = if needs_stdin {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Some(buffer)
    } else {
        None
    };

    let output = food_scan_rust::run(
        food_scan_rust::Config {
            image_path: cli.image,
            food_db: cli.food_db,
            threshold: cli.threshold,
            settings_path: cli.read_settings,
            lookup: cli.lookup,
            search: cli.search,
            estimate: cli.estimate,
            pretty: cli.pretty,
        },
        input,
    )?;

    println!("{}", output);
    Ok(())
}
