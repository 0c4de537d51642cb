//! Calendar feature derivation, one-hot encoding and schema alignment.
//!
//! The alignment primitive is what lets a model trained on one period
//! range score rows encoded later: the future frame may observe a
//! different set of categorical levels, and its columns are padded,
//! dropped and reordered to match the training schema exactly.

use ndarray::Array2;
use polars::prelude::*;

use crate::data::field;
use crate::error::PipelineError;

/// Derived calendar month column, 1–12.
pub const MONTH: &str = "MÊS";
/// Derived calendar year column.
pub const YEAR: &str = "ANO";

/// Derive `MÊS` and `ANO` numeric columns from a typed date column.
pub fn with_calendar_features(df: &DataFrame, date_field: &str) -> crate::Result<DataFrame> {
    field(df, date_field)?;
    Ok(df
        .clone()
        .lazy()
        .with_columns([
            col(date_field)
                .dt()
                .month()
                .cast(DataType::Int32)
                .alias(MONTH),
            col(date_field)
                .dt()
                .year()
                .cast(DataType::Int32)
                .alias(YEAR),
        ])
        .collect()?)
}

/// Distinct levels of a categorical column, rendered as strings and
/// sorted: numerically when every level parses as a number, otherwise
/// lexicographically.
fn level_names(column: &Column) -> crate::Result<Vec<String>> {
    let rendered = column.cast(&DataType::String)?;
    let rendered = rendered.str()?;
    let mut levels: Vec<String> = Vec::new();
    for value in rendered.into_no_null_iter() {
        if !levels.iter().any(|level| level == value) {
            levels.push(value.to_string());
        }
    }
    levels.sort_by(|a, b| match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
    });
    Ok(levels)
}

/// One-hot encode the given categorical fields.
///
/// Indicator columns are named `FIELD_value` and created from the
/// sorted distinct levels; with `drop_first` the smallest observed
/// level is omitted as the reference, avoiding collinearity with an
/// intercept. Non-encoded columns keep their position ahead of the
/// indicators, and encoding the same input twice is bit-identical.
pub fn one_hot(df: &DataFrame, fields: &[&str], drop_first: bool) -> crate::Result<DataFrame> {
    for name in fields {
        field(df, name)?;
    }
    let mut out = df.drop_many(fields.iter().copied());
    for name in fields {
        let source = field(df, name)?;
        let rendered = source.cast(&DataType::String)?;
        let rendered = rendered.str()?;
        let levels = level_names(source)?;
        let keep = if drop_first && !levels.is_empty() {
            &levels[1..]
        } else {
            &levels[..]
        };
        for level in keep {
            let indicator: Vec<f64> = rendered
                .into_iter()
                .map(|value| match value {
                    Some(v) if v == level.as_str() => 1.0,
                    _ => 0.0,
                })
                .collect();
            out.with_column(Column::new(format!("{name}_{level}").into(), indicator))?;
        }
    }
    Ok(out)
}

/// The ordered column names of a frame, used as a reference schema.
pub fn column_schema(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Align a frame to a reference column schema.
///
/// Columns present in the schema but absent from the frame are filled
/// with 0 for every row; columns not in the schema are dropped; the
/// result has exactly the schema's columns in the schema's order.
/// Aligning an already-aligned frame is a no-op.
pub fn align_to_schema(df: &DataFrame, schema: &[String]) -> crate::Result<DataFrame> {
    let mut padded = df.clone();
    for name in schema {
        let present = padded
            .get_column_names()
            .iter()
            .any(|column| column.as_str() == name.as_str());
        if !present {
            padded.with_column(Column::new(name.as_str().into(), vec![0.0f64; df.height()]))?;
        }
    }
    let aligned = padded.select(schema.iter().map(String::as_str))?;
    if aligned.width() != schema.len() {
        return Err(PipelineError::SchemaMismatch {
            expected: schema.len(),
            actual: aligned.width(),
        });
    }
    Ok(aligned)
}

/// Convert a numeric frame into a row-major `f64` feature matrix.
pub fn to_matrix(df: &DataFrame) -> crate::Result<Array2<f64>> {
    let height = df.height();
    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let cast = column.cast(&DataType::Float64)?;
        let values = cast.f64()?;
        if values.null_count() > 0 {
            let row = values.into_iter().position(|v| v.is_none()).unwrap_or(0);
            return Err(PipelineError::MalformedValue {
                row,
                field: column.name().to_string(),
                value: "<null>".to_string(),
            });
        }
        columns.push(values.into_no_null_iter().collect::<Vec<f64>>());
    }
    let mut data = Vec::with_capacity(height * df.width());
    for row in 0..height {
        for column in &columns {
            data.push(column[row]);
        }
    }
    Ok(Array2::from_shape_vec((height, df.width()), data)?)
}
