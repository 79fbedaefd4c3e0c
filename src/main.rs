//! shellray command-line entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use shellray::medium::SyntheticMedium;
use shellray::transport::ElectronScattering;
use shellray::{LineInteractionType, Medium, TransportConfig, run_batch};

#[derive(Parser)]
#[command(name = "shellray")]
#[command(about = "Monte Carlo packet transport through an expanding shell medium")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transport a batch of packets and print a summary
    Run {
        /// JSON run configuration (defaults used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON medium; a synthetic medium is generated when omitted
        #[arg(short, long)]
        medium: Option<PathBuf>,

        /// Override the number of packets
        #[arg(short, long)]
        packets: Option<usize>,

        /// Override the run seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the line interaction mode (scatter, downbranch, macroatom)
        #[arg(short, long, value_parser = parse_line_interaction)]
        line_interaction: Option<LineInteractionType>,

        /// Write the full report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    DemoConfig,
}

fn parse_line_interaction(s: &str) -> Result<LineInteractionType, String> {
    LineInteractionType::from_str(s)
        .ok_or_else(|| format!("unknown line interaction '{s}', expected scatter, downbranch or macroatom"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            medium,
            packets,
            seed,
            line_interaction,
            report,
        } => {
            let mut config = match config {
                Some(path) => TransportConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => TransportConfig::default(),
            };
            if let Some(packets) = packets {
                config.no_of_packets = packets;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(mode) = line_interaction {
                config.line_interaction_type = mode;
            }

            let medium = match medium {
                Some(path) => {
                    Medium::load(&path).with_context(|| format!("loading medium {}", path.display()))?
                }
                None => {
                    log::info!("No medium given, using a synthetic one");
                    Medium::synthetic(&SyntheticMedium::default())
                }
            };

            let batch = run_batch(&medium, &config, &ElectronScattering).context("packet batch failed")?;
            println!("{}", batch.summary());

            if let Some(path) = report {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("creating report {}", path.display()))?;
                serde_json::to_writer_pretty(std::io::BufWriter::new(file), &batch)?;
                log::info!("Report written to {}", path.display());
            }
        }
        Commands::DemoConfig => {
            println!("{}", serde_json::to_string_pretty(&TransportConfig::default())?);
        }
    }
    Ok(())
}
