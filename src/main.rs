//! VendaForge pipeline entrypoint: loads the three source tables,
//! prints the aggregate reports, then runs the forecast and the
//! customer segmentation.

use std::time::Instant;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use polars::prelude::{DataFrame, JsonFormat, JsonWriter, SerWriter};
use vendaforge::{aggregate, data, forecast, segment, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    ensure!(
        args.from_year <= args.to_year,
        "projection range is empty: {} > {}",
        args.from_year,
        args.to_year
    );
    ensure!(args.clusters >= 1, "at least one cluster is required");
    ensure!(args.alpha >= 0.0, "regularization strength must be non-negative");

    let start = Instant::now();

    let sales = data::load_sales(&args.sales).with_context(|| format!("loading {}", args.sales))?;
    let branches =
        data::load_branches(&args.branches).with_context(|| format!("loading {}", args.branches))?;
    let customers = data::load_customers(&args.customers)
        .with_context(|| format!("loading {}", args.customers))?;
    log::info!(
        "loaded {} sales, {} branches, {} customers",
        sales.height(),
        branches.height(),
        customers.height()
    );

    let by_region = aggregate::sales_by_region(&sales, &branches)?;
    let top = aggregate::top_regions(&by_region, args.top_regions)?;
    let by_branch = aggregate::sales_by_branch(&sales, &branches)?;
    let by_city = aggregate::customer_count_by(&customers, "CIDADE")?;
    let by_uf = aggregate::customer_count_by(&customers, "UF")?;

    let forecast = forecast::forecast_sales(
        &sales,
        &branches,
        &args.forecast_config(),
        args.from_year,
        args.to_year,
    )?;
    let segmentation = segment::segment_customers(&sales, &customers, &args.segmentation_config())?;

    if args.json {
        let payload = serde_json::json!({
            "sales_by_region": frame_json(&by_region)?,
            "top_regions": frame_json(&top)?,
            "sales_by_branch": frame_json(&by_branch)?,
            "customers_by_city": frame_json(&by_city)?,
            "customers_by_uf": frame_json(&by_uf)?,
            "forecast": frame_json(&forecast.projections)?,
            "rmse": forecast.rmse,
            "segments": frame_json(&segmentation.assignments)?,
            "centroids": segmentation.centroids,
            "spend_rank": segmentation.spend_rank,
        });
        println!("{payload}");
        return Ok(());
    }

    println!("=== Sales by Region (UF) ===");
    println!("{by_region}");
    println!("=== Top {} Regions ===", args.top_regions);
    println!("{top}");
    println!("=== Sales by Branch ===");
    println!("{by_branch}");
    println!("=== Customers by City ===");
    println!("{by_city}");
    println!("=== Customers by UF ===");
    println!("{by_uf}");

    println!("=== Sales Forecast {}-{} ===", args.from_year, args.to_year);
    println!("RMSE on held-out periods: {:.2}", forecast.rmse);
    println!("{}", forecast.projections);

    println!("=== Customer Segmentation (k={}) ===", args.clusters);
    println!("{}", segmentation.assignments);
    let sizes = segmentation.cluster_sizes()?;
    for (label, &size) in sizes.iter().enumerate() {
        println!(
            "cluster {}: {} customers, centroid {}, spend rank {}",
            label,
            size,
            data::format_amount(segmentation.centroids[label]),
            segmentation.spend_rank[label]
        );
    }

    println!("\nPipeline finished in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Render a result frame as a JSON array of row objects.
fn frame_json(df: &DataFrame) -> Result<serde_json::Value> {
    let mut buf = Vec::new();
    JsonWriter::new(&mut buf)
        .with_json_format(JsonFormat::Json)
        .finish(&mut df.clone())?;
    Ok(serde_json::from_slice(&buf)?)
}
