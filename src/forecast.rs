//! Monthly sales forecasting with ridge regression.
//!
//! The model is fit on per-month revenue totals encoded with one-hot
//! month indicators. Ridge regularization keeps the fit stable when
//! the design matrix is rank-deficient or the historical window is
//! short, both common with monthly granularity. Projections for future
//! periods go through the same encoding, are aligned to the training
//! schema, and are floored at zero: negative revenue is not a
//! meaningful prediction.

use clap::ValueEnum;
use linfa::dataset::Dataset;
use linfa::traits::{Fit, Predict};
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::aggregate::{self, ReduceOp};
use crate::data::field;
use crate::encode;
use crate::error::PipelineError;

/// How the held-out evaluation split is drawn.
///
/// `Random` reproduces the source behavior: a row-level split that
/// ignores time order, which understates error for genuine future
/// extrapolation. `Chronological` holds out the most recent periods
/// instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SplitStrategy {
    /// Seeded row-level shuffle before splitting.
    Random,
    /// Hold out the latest periods.
    Chronological,
}

/// Fitting parameters for the forecast model.
#[derive(Clone, Debug)]
pub struct ForecastConfig {
    /// Ridge regularization strength.
    pub alpha: f64,
    /// Fraction of periods held out for evaluation.
    pub test_fraction: f64,
    /// Seed for the split shuffle.
    pub seed: u64,
    /// Split strategy for the held-out set.
    pub split: SplitStrategy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            test_fraction: 0.2,
            seed: 42,
            split: SplitStrategy::Random,
        }
    }
}

/// Revenue summed per (month, year) period, chronologically sorted.
pub fn monthly_sales(sales: &DataFrame, branches: &DataFrame) -> crate::Result<DataFrame> {
    let joined = aggregate::inner_join(sales, branches, "ID_FILIAL")?;
    let dated = encode::with_calendar_features(&joined, "DATA_VENDA")?;
    let monthly = aggregate::aggregate(
        &dated,
        &[encode::MONTH, encode::YEAR],
        "VALOR_VENDA",
        ReduceOp::Sum,
    )?;
    Ok(monthly
        .lazy()
        .sort([encode::YEAR, encode::MONTH], SortMultipleOptions::default())
        .collect()?)
}

/// A calendar frame covering every month of `from_year..=to_year`.
pub fn future_periods(from_year: i32, to_year: i32) -> crate::Result<DataFrame> {
    if from_year > to_year {
        return Err(PipelineError::InsufficientData(format!(
            "empty projection range: {from_year} > {to_year}"
        )));
    }
    let mut months = Vec::new();
    let mut years = Vec::new();
    for year in from_year..=to_year {
        for month in 1..=12i32 {
            months.push(month);
            years.push(year);
        }
    }
    Ok(DataFrame::new(vec![
        Column::new(encode::MONTH.into(), months),
        Column::new(encode::YEAR.into(), years),
    ])?)
}

/// Floor raw model output at zero.
pub fn clamp_non_negative(predictions: Array1<f64>) -> Array1<f64> {
    predictions.mapv(|v| v.max(0.0))
}

/// Ridge regression model over encoded monthly periods.
#[derive(Debug)]
pub struct RidgeForecaster {
    model: ElasticNet<f64>,
    schema: Vec<String>,
    rmse: f64,
}

impl RidgeForecaster {
    /// Fit on a monthly frame as produced by [`monthly_sales`].
    ///
    /// Holds out `test_fraction` of the periods (at least one) for
    /// RMSE evaluation. Fails with `InsufficientData` when fewer than
    /// two distinct periods exist.
    pub fn fit(monthly: &DataFrame, config: &ForecastConfig) -> crate::Result<Self> {
        if monthly.height() < 2 {
            return Err(PipelineError::InsufficientData(format!(
                "regression needs at least 2 distinct periods, got {}",
                monthly.height()
            )));
        }

        let encoded = encode::one_hot(monthly, &[encode::MONTH], true)?;
        let targets: Vec<f64> = field(&encoded, "VALOR_VENDA")?
            .f64()?
            .into_no_null_iter()
            .collect();
        let features = encoded.drop("VALOR_VENDA")?;
        let schema = encode::column_schema(&features);
        let x = encode::to_matrix(&features)?;
        let y = Array1::from_vec(targets);

        let n = x.nrows();
        let n_test = ((n as f64) * config.test_fraction).ceil().max(1.0) as usize;
        let n_train = n - n_test;
        if n_train == 0 {
            return Err(PipelineError::InsufficientData(format!(
                "no periods left to train on after holding out {n_test} of {n}"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        if config.split == SplitStrategy::Random {
            let mut rng = Xoshiro256Plus::seed_from_u64(config.seed);
            indices.shuffle(&mut rng);
        }
        let (train_idx, test_idx) = indices.split_at(n_train);

        let train = Dataset::new(x.select(Axis(0), train_idx), y.select(Axis(0), train_idx));
        let x_test = x.select(Axis(0), test_idx);
        let y_test = y.select(Axis(0), test_idx);

        let model = ElasticNet::ridge()
            .penalty(config.alpha)
            .fit(&train)
            .map_err(|e| PipelineError::Model(e.to_string()))?;

        let predicted = model.predict(&x_test);
        let squared = (&predicted - &y_test).mapv(|e| e * e);
        let rmse = squared.mean().map(f64::sqrt).ok_or_else(|| {
            PipelineError::InsufficientData("held-out split is empty".to_string())
        })?;
        log::debug!("ridge fit over {n} periods, held out {n_test}, rmse {rmse:.2}");

        Ok(Self {
            model,
            schema,
            rmse,
        })
    }

    /// Root-mean-squared error on the held-out periods.
    pub fn rmse(&self) -> f64 {
        self.rmse
    }

    /// The training-time feature schema future frames are aligned to.
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Score an encoded frame after aligning it to the training schema.
    ///
    /// Output is clamped to non-negative values.
    pub fn predict_aligned(&self, encoded: &DataFrame) -> crate::Result<Array1<f64>> {
        let aligned = encode::align_to_schema(encoded, &self.schema)?;
        let x = encode::to_matrix(&aligned)?;
        if x.ncols() != self.schema.len() {
            return Err(PipelineError::SchemaMismatch {
                expected: self.schema.len(),
                actual: x.ncols(),
            });
        }
        Ok(clamp_non_negative(self.model.predict(&x)))
    }

    /// Predict revenue for every month of `from_year..=to_year`.
    pub fn project(&self, from_year: i32, to_year: i32) -> crate::Result<DataFrame> {
        let future = future_periods(from_year, to_year)?;
        let encoded = encode::one_hot(&future, &[encode::MONTH], true)?;
        let predicted = self.predict_aligned(&encoded)?;
        let mut out = future;
        out.with_column(Column::new(
            "VALOR_VENDA_PREVISTA".into(),
            predicted.to_vec(),
        ))?;
        Ok(out)
    }
}

/// Forecast output: one row per projected period, plus the evaluation
/// metric of the model that produced it.
pub struct SalesForecast {
    /// `MÊS`, `ANO`, `VALOR_VENDA_PREVISTA` per future period.
    pub projections: DataFrame,
    /// RMSE over the held-out periods.
    pub rmse: f64,
}

/// Full forecast pipeline: aggregate monthly revenue, fit, project.
pub fn forecast_sales(
    sales: &DataFrame,
    branches: &DataFrame,
    config: &ForecastConfig,
    from_year: i32,
    to_year: i32,
) -> crate::Result<SalesForecast> {
    let monthly = monthly_sales(sales, branches)?;
    let forecaster = RidgeForecaster::fit(&monthly, config)?;
    let projections = forecaster.project(from_year, to_year)?;
    Ok(SalesForecast {
        projections,
        rmse: forecaster.rmse(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn monthly_fixture(n_months: usize) -> DataFrame {
        let mut months = Vec::new();
        let mut years = Vec::new();
        let mut totals = Vec::new();
        for i in 0..n_months {
            months.push((i % 12 + 1) as i32);
            years.push(2021 + (i / 12) as i32);
            totals.push(10_000.0 + 500.0 * (i % 12) as f64 + 100.0 * (i / 12) as f64);
        }
        DataFrame::new(vec![
            Column::new(encode::MONTH.into(), months),
            Column::new(encode::YEAR.into(), years),
            Column::new("VALOR_VENDA".into(), totals),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_and_evaluate() {
        let forecaster =
            RidgeForecaster::fit(&monthly_fixture(24), &ForecastConfig::default()).unwrap();
        assert!(forecaster.rmse().is_finite());
        assert!(forecaster.rmse() >= 0.0);
        // ANO plus indicators for months 2..=12.
        assert_eq!(forecaster.schema().len(), 12);
    }

    #[test]
    fn test_single_period_is_insufficient() {
        let err = RidgeForecaster::fit(&monthly_fixture(1), &ForecastConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }

    #[test]
    fn test_projection_covers_range_and_is_non_negative() {
        let forecaster =
            RidgeForecaster::fit(&monthly_fixture(24), &ForecastConfig::default()).unwrap();
        let projections = forecaster.project(2023, 2029).unwrap();

        assert_eq!(projections.height(), 84);
        let predicted = projections
            .column("VALOR_VENDA_PREVISTA")
            .unwrap()
            .f64()
            .unwrap();
        assert!(predicted.into_no_null_iter().all(|v| v >= 0.0));
    }

    #[test]
    fn test_clamp_floors_negative_predictions() {
        let clamped = clamp_non_negative(array![-120.0, 0.0, 35.5]);
        assert_eq!(clamped, array![0.0, 0.0, 35.5]);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let monthly = monthly_fixture(24);
        let config = ForecastConfig::default();
        let a = RidgeForecaster::fit(&monthly, &config).unwrap();
        let b = RidgeForecaster::fit(&monthly, &config).unwrap();

        assert_eq!(a.rmse(), b.rmse());
        let pa = a.project(2023, 2024).unwrap();
        let pb = b.project(2023, 2024).unwrap();
        assert!(pa.equals(&pb));
    }

    #[test]
    fn test_chronological_split() {
        let config = ForecastConfig {
            split: SplitStrategy::Chronological,
            ..ForecastConfig::default()
        };
        let forecaster = RidgeForecaster::fit(&monthly_fixture(24), &config).unwrap();
        assert!(forecaster.rmse().is_finite());
    }

    #[test]
    fn test_empty_projection_range() {
        let err = future_periods(2025, 2024).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));
    }
}
