//! End-to-end pipeline tests over generated source tables.

use std::io::Write;

use tempfile::NamedTempFile;
use vendaforge::forecast::{self, ForecastConfig};
use vendaforge::segment::{self, SegmentationConfig};
use vendaforge::{aggregate, data, PipelineError};

/// Two years of monthly sales across two branches and four customers,
/// plus one exact duplicate line and one sale against an unknown
/// branch. Returns the files and the expected post-dedup total for
/// rows whose branch exists.
fn write_fixture() -> (NamedTempFile, NamedTempFile, NamedTempFile, f64) {
    let mut sales = NamedTempFile::new().unwrap();
    writeln!(sales, "ID_VENDA;ID_CLIENTE;ID_FILIAL;VALOR_VENDA;DATA_VENDA").unwrap();

    let mut matched_total = 0.0;
    let mut id = 0;
    for (offset, year) in [2021, 2022].iter().enumerate() {
        for month in 1..=12u32 {
            id += 1;
            let amount = 1_000.0 + 50.0 * month as f64 + 250.0 * offset as f64;
            let customer = (id % 4) + 1;
            let branch = (month % 2) + 1;
            writeln!(
                sales,
                "{id};{customer};{branch};{};15/{month:02}/{year}",
                data::format_amount(amount)
            )
            .unwrap();
            matched_total += amount;
        }
    }
    // Exact duplicate of an earlier line; must collapse to one row.
    writeln!(sales, "1;2;2;{};15/01/2021", data::format_amount(1_050.0)).unwrap();
    // Sale against a branch that is not in the reference table; the
    // inner join drops it from every branch-keyed computation.
    writeln!(sales, "999;1;99;{};20/06/2022", data::format_amount(777.0)).unwrap();

    let mut branches = NamedTempFile::new().unwrap();
    writeln!(branches, "ID_FILIAL;NOME_FILIAL;UF").unwrap();
    writeln!(branches, "1;BATEL;PR").unwrap();
    writeln!(branches, "2;AGUA VERDE;SP").unwrap();

    let mut customers = NamedTempFile::new().unwrap();
    writeln!(customers, "ID_CLIENTE;CIDADE;UF").unwrap();
    writeln!(customers, "1;Curitiba;PR").unwrap();
    writeln!(customers, "2;Londrina;PR").unwrap();
    writeln!(customers, "3;Campinas;SP").unwrap();
    writeln!(customers, "4;Santos;SP").unwrap();
    // Customer with no transactions at all.
    writeln!(customers, "5;Niterói;RJ").unwrap();

    (sales, branches, customers, matched_total)
}

#[test]
fn test_ingestion_dedups_and_types() {
    let (sales_file, _, _, _) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();

    // 24 generated rows + unknown-branch row; the duplicate collapses.
    assert_eq!(sales.height(), 25);
    let amounts = sales.column("VALOR_VENDA").unwrap().f64().unwrap();
    assert!(amounts.into_no_null_iter().all(|v| v >= 0.0));
}

#[test]
fn test_monthly_aggregation_sum_invariant() {
    let (sales_file, branches_file, _, matched_total) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();
    let branches = data::load_branches(branches_file.path()).unwrap();

    let monthly = forecast::monthly_sales(&sales, &branches).unwrap();
    assert_eq!(monthly.height(), 24);

    let grouped_total: f64 = monthly
        .column("VALOR_VENDA")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .sum();
    assert!((grouped_total - matched_total).abs() < 1e-6);
}

#[test]
fn test_region_report() {
    let (sales_file, branches_file, _, matched_total) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();
    let branches = data::load_branches(branches_file.path()).unwrap();

    let by_region = aggregate::sales_by_region(&sales, &branches).unwrap();
    assert_eq!(by_region.height(), 2);
    let region_total: f64 = by_region
        .column("VALOR_VENDA")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .sum();
    assert!((region_total - matched_total).abs() < 1e-6);

    let top = aggregate::top_regions(&by_region, 1).unwrap();
    assert_eq!(top.height(), 1);
}

#[test]
fn test_end_to_end_forecast() {
    let (sales_file, branches_file, _, _) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();
    let branches = data::load_branches(branches_file.path()).unwrap();

    let result =
        forecast::forecast_sales(&sales, &branches, &ForecastConfig::default(), 2023, 2029)
            .unwrap();

    assert!(result.rmse.is_finite());
    assert!(result.rmse >= 0.0);
    // 7 years of monthly projections.
    assert_eq!(result.projections.height(), 84);
    let predicted = result
        .projections
        .column("VALOR_VENDA_PREVISTA")
        .unwrap()
        .f64()
        .unwrap();
    assert!(predicted.into_no_null_iter().all(|v| v >= 0.0));
}

#[test]
fn test_forecast_is_reproducible() {
    let (sales_file, branches_file, _, _) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();
    let branches = data::load_branches(branches_file.path()).unwrap();

    let config = ForecastConfig::default();
    let a = forecast::forecast_sales(&sales, &branches, &config, 2023, 2024).unwrap();
    let b = forecast::forecast_sales(&sales, &branches, &config, 2023, 2024).unwrap();

    assert_eq!(a.rmse, b.rmse);
    assert!(a.projections.equals(&b.projections));
}

#[test]
fn test_end_to_end_segmentation() {
    let (sales_file, _, customers_file, _) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();
    let customers = data::load_customers(customers_file.path()).unwrap();

    let result =
        segment::segment_customers(&sales, &customers, &SegmentationConfig::default()).unwrap();

    // Every customer in the reference table gets a segment, including
    // the one with no transactions.
    assert_eq!(result.assignments.height(), 5);
    let labels = result.assignments.column("cluster").unwrap().u32().unwrap();
    assert!(labels.into_no_null_iter().all(|label| label < 3));

    let ids = result.assignments.column("ID_CLIENTE").unwrap().i64().unwrap();
    let totals = result.assignments.column("total_gasto").unwrap().f64().unwrap();
    let idle = ids
        .into_no_null_iter()
        .position(|id| id == 5)
        .expect("customer 5 present");
    assert_eq!(totals.get(idle), Some(0.0));

    let mut ranks = result.spend_rank.clone();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![0, 1, 2]);
}

#[test]
fn test_segmentation_insufficient_customers() {
    let (sales_file, _, _, _) = write_fixture();
    let sales = data::load_sales(sales_file.path()).unwrap();

    let mut customers_file = NamedTempFile::new().unwrap();
    writeln!(customers_file, "ID_CLIENTE;CIDADE;UF").unwrap();
    writeln!(customers_file, "1;Curitiba;PR").unwrap();
    writeln!(customers_file, "2;Londrina;PR").unwrap();
    let customers = data::load_customers(customers_file.path()).unwrap();

    let err = segment::segment_customers(&sales, &customers, &SegmentationConfig::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData(_)));
}
