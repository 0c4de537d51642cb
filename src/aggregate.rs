//! Group-and-reduce primitives over the typed frames, plus the domain
//! reductions built on them (sales by region, by branch, per customer).
//!
//! Join policy: transaction rows whose branch id has no matching branch
//! are dropped by the inner join. That is deliberate — a sale against
//! an unknown branch carries no region and cannot be reported on.

use polars::prelude::*;

use crate::data::field;

/// How a grouped field is reduced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    /// Sum the field per group.
    Sum,
    /// Count the field's non-null values per group.
    Count,
}

/// Group `df` by the given keys and reduce one field per group.
///
/// Group order is stable: groups appear in order of first occurrence,
/// so identical input always produces identical output. Fails with
/// `UnknownField` if any requested field is absent from the schema.
pub fn aggregate(
    df: &DataFrame,
    group_keys: &[&str],
    reduce_field: &str,
    op: ReduceOp,
) -> crate::Result<DataFrame> {
    for key in group_keys {
        field(df, key)?;
    }
    field(df, reduce_field)?;

    let keys: Vec<Expr> = group_keys.iter().map(|key| col(*key)).collect();
    let reduce = match op {
        ReduceOp::Sum => col(reduce_field).sum(),
        ReduceOp::Count => col(reduce_field).count(),
    };
    Ok(df
        .clone()
        .lazy()
        .group_by_stable(keys)
        .agg([reduce])
        .collect()?)
}

/// Inner join on a shared key column; unmatched left rows are dropped.
pub fn inner_join(left: &DataFrame, right: &DataFrame, on: &str) -> crate::Result<DataFrame> {
    field(left, on)?;
    field(right, on)?;
    Ok(left
        .clone()
        .lazy()
        .join(
            right.clone().lazy(),
            [col(on)],
            [col(on)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?)
}

/// Total sales per region (UF), via the branch table.
pub fn sales_by_region(sales: &DataFrame, branches: &DataFrame) -> crate::Result<DataFrame> {
    let joined = inner_join(sales, branches, "ID_FILIAL")?;
    aggregate(&joined, &["UF"], "VALOR_VENDA", ReduceOp::Sum)
}

/// Total sales per sale date and region, for trend reporting.
pub fn sales_by_region_over_time(
    sales: &DataFrame,
    branches: &DataFrame,
) -> crate::Result<DataFrame> {
    let joined = inner_join(sales, branches, "ID_FILIAL")?;
    aggregate(&joined, &["DATA_VENDA", "UF"], "VALOR_VENDA", ReduceOp::Sum)
}

/// The `n` regions with the highest sales totals, highest first.
pub fn top_regions(by_region: &DataFrame, n: usize) -> crate::Result<DataFrame> {
    field(by_region, "VALOR_VENDA")?;
    Ok(by_region
        .clone()
        .lazy()
        .sort(
            ["VALOR_VENDA"],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .limit(n as u32)
        .collect()?)
}

/// Total sales per branch, labeled with the branch name.
pub fn sales_by_branch(sales: &DataFrame, branches: &DataFrame) -> crate::Result<DataFrame> {
    let totals = aggregate(sales, &["ID_FILIAL"], "VALOR_VENDA", ReduceOp::Sum)?;
    let names = branches.select(["ID_FILIAL", "NOME_FILIAL"])?;
    inner_join(&totals, &names, "ID_FILIAL")
}

/// Customer counts grouped by one reference field (`CIDADE` or `UF`).
pub fn customer_count_by(customers: &DataFrame, key: &str) -> crate::Result<DataFrame> {
    let mut counts = aggregate(customers, &[key], "ID_CLIENTE", ReduceOp::Count)?;
    counts.rename("ID_CLIENTE", "CLIENTES".into())?;
    Ok(counts)
}

/// Cumulative spend per customer over the customer reference table.
///
/// Left join: every customer appears in the result, and customers
/// without a single transaction get a total of 0 rather than being
/// omitted.
pub fn total_spent_per_customer(
    sales: &DataFrame,
    customers: &DataFrame,
) -> crate::Result<DataFrame> {
    field(customers, "ID_CLIENTE")?;
    let mut totals = aggregate(sales, &["ID_CLIENTE"], "VALOR_VENDA", ReduceOp::Sum)?;
    totals.rename("VALOR_VENDA", "total_gasto".into())?;
    Ok(customers
        .clone()
        .lazy()
        .join(
            totals.lazy(),
            [col("ID_CLIENTE")],
            [col("ID_CLIENTE")],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(col("total_gasto").fill_null(lit(0.0)))
        .collect()?)
}
