//! Loading and normalization of the `;`-delimited source tables.
//!
//! Monetary values arrive as locale-formatted strings (`.` for
//! thousands, `,` for decimals) and dates as `DD/MM/YYYY`. Both are
//! normalized into typed columns before anything downstream runs.
//! Exact-duplicate rows are collapsed after typing, keeping the first
//! occurrence.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::PipelineError;

/// Field separator used by all three source tables.
pub const SEPARATOR: u8 = b';';

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Look up a column, mapping a missing name to `UnknownField`.
pub(crate) fn field<'a>(df: &'a DataFrame, name: &str) -> crate::Result<&'a Column> {
    df.column(name)
        .map_err(|_| PipelineError::UnknownField(name.to_string()))
}

/// Parse a locale-formatted decimal such as `"1.234,56"` into `1234.56`.
///
/// Returns `None` if the cleaned string is not a valid finite decimal.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace('.', "").replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format an amount back into the source convention: `1234.56` → `"1.234,56"`.
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let (whole, frac) = (cents / 100, cents % 100);
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped},{frac:02}")
}

/// Replace a locale-formatted string column with its `f64` equivalent.
///
/// Negative amounts are rejected along with unparseable ones: a sale
/// value below zero can only come from a corrupted record.
pub fn normalize_amounts(df: &mut DataFrame, field_name: &str) -> crate::Result<()> {
    let parsed = {
        let raw = field(df, field_name)?.str()?;
        let mut parsed = Vec::with_capacity(raw.len());
        for (row, value) in raw.into_iter().enumerate() {
            let value = value.unwrap_or("");
            let amount = parse_amount(value).filter(|v| *v >= 0.0).ok_or_else(|| {
                PipelineError::MalformedValue {
                    row,
                    field: field_name.to_string(),
                    value: value.to_string(),
                }
            })?;
            parsed.push(amount);
        }
        parsed
    };
    df.with_column(Column::new(field_name.into(), parsed))?;
    Ok(())
}

/// Replace a `DD/MM/YYYY` string column with a typed date column.
pub fn normalize_dates(df: &mut DataFrame, field_name: &str) -> crate::Result<()> {
    let days = {
        let raw = field(df, field_name)?.str()?;
        let mut days = Vec::with_capacity(raw.len());
        for (row, value) in raw.into_iter().enumerate() {
            let value = value.unwrap_or("");
            let date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
                PipelineError::MalformedDate {
                    row,
                    field: field_name.to_string(),
                    value: value.to_string(),
                }
            })?;
            // Days since epoch, the representation a Date column expects.
            days.push(date.signed_duration_since(NaiveDate::default()).num_days() as i32);
        }
        days
    };
    let column = Column::new(field_name.into(), days).cast(&DataType::Date)?;
    df.with_column(column)?;
    Ok(())
}

/// Collapse rows that are identical across every field, keeping the
/// first occurrence in input order.
pub fn drop_exact_duplicates(df: &DataFrame) -> crate::Result<DataFrame> {
    Ok(df.unique_stable(None, UniqueKeepStrategy::First, None)?)
}

fn read_delimited(path: &Path, overwrite: Option<SchemaRef>) -> crate::Result<DataFrame> {
    let mut options = CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|opts| opts.with_separator(SEPARATOR));
    if let Some(schema) = overwrite {
        options = options.with_schema_overwrite(Some(schema));
    }
    let df = options
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    log::debug!("read {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Load the sales table and normalize its amount and date columns.
///
/// Expected schema: `ID_VENDA;ID_CLIENTE;ID_FILIAL;VALOR_VENDA;DATA_VENDA`.
pub fn load_sales(path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    // Amounts and dates must come in as raw strings; schema inference
    // would otherwise mangle partially-numeric values.
    let overwrite = Schema::from_iter([
        Field::new("VALOR_VENDA".into(), DataType::String),
        Field::new("DATA_VENDA".into(), DataType::String),
    ]);
    let mut df = read_delimited(path.as_ref(), Some(Arc::new(overwrite)))?;
    normalize_amounts(&mut df, "VALOR_VENDA")?;
    normalize_dates(&mut df, "DATA_VENDA")?;
    drop_exact_duplicates(&df)
}

/// Load the branches reference table: `ID_FILIAL;NOME_FILIAL;UF`.
pub fn load_branches(path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let df = read_delimited(path.as_ref(), None)?;
    drop_exact_duplicates(&df)
}

/// Load the customers reference table: `ID_CLIENTE;CIDADE;UF`.
pub fn load_customers(path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let df = read_delimited(path.as_ref(), None)?;
    drop_exact_duplicates(&df)
}
