mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            path,
            options,
            mech_point,
            format,
        } => {
            let passed = commands::analyze_film(&path, &options, mech_point, &format)?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Profile {
            path,
            pixel_size,
            radius,
            center,
            samples,
            invert,
            format,
        } => {
            commands::dump_profile(&path, pixel_size, radius, center, samples, invert, &format)?;
        }
    }

    Ok(())
}
