use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use offercraft_core::reader::read_document;
use offercraft_core::writer::save_document;
use offercraft_core::{IncreaseSource, OfferProcessor, ProcessorConfig, RandomIncrease};
use std::path::{Path, PathBuf};

mod formatter;
mod logger;

#[derive(Parser)]
#[command(name = "offercli")]
#[command(about = "Revise a price offer: raise prices, recompute totals and bump the revision", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the offer workbook (.xlsx or .xlsm)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Maximum price increase in percent (multiple of 0.5)
    #[arg(short, long, default_value_t = 5.0, value_name = "PCT")]
    max_increase: f64,

    /// Output file (defaults to Oferta_<new revision label>.xlsx next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Seed for reproducible increases
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Process the offer without writing the result
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        ProcessorConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("offercraft.toml");
        if default_config_path.exists() {
            ProcessorConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            ProcessorConfig::default()
        }
    };
    config.validate().context("Invalid configuration")?;

    validate_max_increase(cli.max_increase, &config)?;

    let document = read_document(&cli.file)
        .with_context(|| format!("Failed to read file: {}", cli.file.display()))?;

    let mut source: Box<dyn IncreaseSource> = match cli.seed {
        Some(seed) => Box::new(RandomIncrease::seeded(seed)),
        None => Box::new(RandomIncrease::from_entropy()),
    };

    let processor = OfferProcessor::with_config(config);
    let processed = processor
        .process_with(&document, cli.max_increase, source.as_mut())
        .with_context(|| format!("Failed to process offer: {}", cli.file.display()))?;

    let output_path = cli.output.clone().unwrap_or_else(|| {
        default_output_path(&cli.file, &processed.statistics.output_file_name())
    });

    if !cli.dry_run {
        save_document(&output_path, &processed.document)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    }

    match cli.format {
        OutputFormat::Human => {
            formatter::print_human(&cli.file, &output_path, &processed.statistics, cli.dry_run)
        }
        OutputFormat::Json => {
            formatter::print_json(&output_path, &processed.statistics, cli.dry_run)?
        }
    }

    Ok(())
}

/// The maximum increase must lie in the configured range, in steps of 0.5
fn validate_max_increase(max_increase: f64, config: &ProcessorConfig) -> Result<()> {
    if !max_increase.is_finite()
        || max_increase < config.min_increase_percent
        || max_increase > config.max_increase_limit
    {
        anyhow::bail!(
            "--max-increase must be between {} and {}, got {}",
            config.min_increase_percent,
            config.max_increase_limit,
            max_increase
        );
    }
    if (max_increase * 2.0).fract() != 0.0 {
        anyhow::bail!(
            "--max-increase must be a multiple of 0.5, got {}",
            max_increase
        );
    }
    Ok(())
}

/// Output next to the input file
fn default_output_path(input: &Path, file_name: &str) -> PathBuf {
    input.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_increase_range_and_step() {
        let config = ProcessorConfig::default();
        assert!(validate_max_increase(1.0, &config).is_ok());
        assert!(validate_max_increase(7.5, &config).is_ok());
        assert!(validate_max_increase(20.0, &config).is_ok());

        assert!(validate_max_increase(0.5, &config).is_err());
        assert!(validate_max_increase(20.5, &config).is_err());
        assert!(validate_max_increase(3.25, &config).is_err());
        assert!(validate_max_increase(f64::NAN, &config).is_err());
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/tmp/ofertas/cliente.xlsx"), "Oferta_X_R2.xlsx");
        assert_eq!(path, PathBuf::from("/tmp/ofertas/Oferta_X_R2.xlsx"));

        let path = default_output_path(Path::new("cliente.xlsx"), "Oferta_X_R2.xlsx");
        assert_eq!(path, PathBuf::from("Oferta_X_R2.xlsx"));
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "offercli",
            "oferta.xlsx",
            "--max-increase",
            "7.5",
            "--seed",
            "42",
            "-vv",
            "--format",
            "json",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.max_increase, 7.5);
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.verbose, 2);
        assert!(cli.dry_run);
        assert!(matches!(cli.format, OutputFormat::Json));

        let cli = Cli::try_parse_from(["offercli", "oferta.xlsx"]).unwrap();
        assert_eq!(cli.max_increase, 5.0);
        assert!(cli.output.is_none());
    }
}
