//! Customer segmentation by cumulative spend, via k-means.
//!
//! Cluster labels carry no inherent meaning: the same data can come
//! back with the labels permuted under a different seed. The result
//! therefore includes a `spend_rank` mapping derived from the sorted
//! centroids, and consumers read spend tiers from that, never from the
//! raw label values.

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::Array2;
use polars::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::aggregate;
use crate::data::field;
use crate::error::PipelineError;

/// Fitting parameters for the segmentation model.
#[derive(Clone, Debug)]
pub struct SegmentationConfig {
    /// Number of clusters.
    pub clusters: usize,
    /// Seed for centroid initialization.
    pub seed: u64,
    /// Iteration cap for convergence.
    pub max_iterations: u64,
    /// Convergence tolerance.
    pub tolerance: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            clusters: 3,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Segmentation output for one pipeline run.
#[derive(Debug)]
pub struct CustomerSegmentation {
    /// The per-customer spend frame with an appended `cluster` column.
    pub assignments: DataFrame,
    /// Centroid spend value per cluster label.
    pub centroids: Vec<f64>,
    /// `spend_rank[label]` is the label's position in ascending
    /// centroid order: 0 is the lowest-spend tier.
    pub spend_rank: Vec<usize>,
}

impl CustomerSegmentation {
    /// Customers assigned to each cluster label.
    pub fn cluster_sizes(&self) -> crate::Result<Vec<usize>> {
        let labels = field(&self.assignments, "cluster")?.u32()?;
        let mut sizes = vec![0; self.centroids.len()];
        for label in labels.into_no_null_iter() {
            sizes[label as usize] += 1;
        }
        Ok(sizes)
    }
}

/// Map each cluster label to its rank in ascending centroid order.
pub fn rank_by_centroid(centroids: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..centroids.len()).collect();
    order.sort_by(|&a, &b| centroids[a].total_cmp(&centroids[b]));
    let mut rank = vec![0; centroids.len()];
    for (position, &label) in order.iter().enumerate() {
        rank[label] = position;
    }
    rank
}

/// Cluster a per-customer spend frame as produced by
/// [`aggregate::total_spent_per_customer`].
///
/// Every row receives a label, aligned positionally with the input.
/// Fails with `InsufficientData` when fewer than `clusters` customers
/// exist; k is never reduced to make the fit go through.
pub fn fit_predict(
    spend: &DataFrame,
    config: &SegmentationConfig,
) -> crate::Result<CustomerSegmentation> {
    let n = spend.height();
    if n < config.clusters {
        return Err(PipelineError::InsufficientData(format!(
            "k-means with k={} needs at least {} customers, got {n}",
            config.clusters, config.clusters
        )));
    }

    let totals: Vec<f64> = field(spend, "total_gasto")?
        .f64()?
        .into_no_null_iter()
        .collect();
    let records = Array2::from_shape_vec((n, 1), totals)?;

    let rng = Xoshiro256Plus::seed_from_u64(config.seed);
    let model = KMeans::params_with(config.clusters, rng, L2Dist)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .fit(&DatasetBase::from(records.clone()))
        .map_err(|e| PipelineError::Model(e.to_string()))?;

    let labels = model.predict(&records);
    let centroids: Vec<f64> = model.centroids().column(0).to_vec();
    let spend_rank = rank_by_centroid(&centroids);
    log::debug!(
        "k-means over {n} customers, k={}, centroids {:?}",
        config.clusters,
        centroids
    );

    let mut assignments = spend.clone();
    let label_column: Vec<u32> = labels.iter().map(|&label| label as u32).collect();
    assignments.with_column(Column::new("cluster".into(), label_column))?;

    Ok(CustomerSegmentation {
        assignments,
        centroids,
        spend_rank,
    })
}

/// Full segmentation pipeline: per-customer totals, then clustering.
pub fn segment_customers(
    sales: &DataFrame,
    customers: &DataFrame,
    config: &SegmentationConfig,
) -> crate::Result<CustomerSegmentation> {
    let spend = aggregate::total_spent_per_customer(sales, customers)?;
    fit_predict(&spend, config)
}
