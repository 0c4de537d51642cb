//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::forecast::{ForecastConfig, SplitStrategy};
use crate::segment::SegmentationConfig;

/// Sales forecasting and customer segmentation over retail transaction tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the sales table (`;`-delimited CSV)
    #[arg(long, default_value = "data/VENDAS.csv")]
    pub sales: String,

    /// Path to the branches table
    #[arg(long, default_value = "data/FILIAIS.csv")]
    pub branches: String,

    /// Path to the customers table
    #[arg(long, default_value = "data/CLIENTES.csv")]
    pub customers: String,

    /// Number of clusters for customer segmentation
    #[arg(short = 'k', long, default_value_t = 3)]
    pub clusters: usize,

    /// Ridge regularization strength for the forecast model
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,

    /// Seed for the train/test split and k-means initialization
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Train/test split strategy for forecast evaluation
    #[arg(long, value_enum, default_value_t = SplitStrategy::Random)]
    pub split: SplitStrategy,

    /// First year of the forecast projection
    #[arg(long, default_value_t = 2023)]
    pub from_year: i32,

    /// Last year of the forecast projection (inclusive)
    #[arg(long, default_value_t = 2029)]
    pub to_year: i32,

    /// How many regions the top-regions report includes
    #[arg(long, default_value_t = 5)]
    pub top_regions: usize,

    /// Emit results as a JSON object instead of tables
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Forecast parameters derived from the command line.
    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            alpha: self.alpha,
            seed: self.seed,
            split: self.split,
            ..ForecastConfig::default()
        }
    }

    /// Segmentation parameters derived from the command line.
    pub fn segmentation_config(&self) -> SegmentationConfig {
        SegmentationConfig {
            clusters: self.clusters,
            seed: self.seed,
            ..SegmentationConfig::default()
        }
    }
}
