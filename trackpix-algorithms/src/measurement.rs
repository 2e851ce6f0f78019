//! Measurement creation from clustered cells.
//!
//! 1. Local cell position: `(channel + 0.5) * pitch` per axis
//! 2. Centroid: activation-weighted mean, cells at or below threshold carry
//!    no weight; arithmetic mean if no cell is above threshold
//! 3. Variance: weighted spread + `pitch²/12` + `smearing²`, floored
//! 4. Representative time: time of the cell with the highest activation
//!
//! Strip modules measure only local x; local y is fixed at zero with the
//! variance of a uniform distribution over the strip length.

use trackpix_core::{CellBatch, DigitizationParams, Measurement, ModuleId, ModuleKind};

/// Builds one measurement from the cells of a cluster.
///
/// `cells` holds batch indices in canonical order and must not be empty.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn create_measurement(
    batch: &CellBatch,
    cells: &[usize],
    module: ModuleId,
    kind: &ModuleKind,
    params: &DigitizationParams,
    min_variance: f64,
) -> Measurement {
    let positions: Vec<[f64; 2]> = cells
        .iter()
        .map(|&i| {
            [
                (f64::from(batch.channel0[i]) + 0.5) * params.pitch[0],
                (f64::from(batch.channel1[i]) + 0.5) * params.pitch[1],
            ]
        })
        .collect();

    let mut weights: Vec<f64> = cells
        .iter()
        .map(|&i| {
            let activation = batch.activation[i];
            if activation > params.threshold {
                f64::from(activation)
            } else {
                0.0
            }
        })
        .collect();
    let mut weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 || !weight_sum.is_finite() {
        weights.fill(1.0);
        weight_sum = weights.len() as f64;
    }

    let mut local = [0.0; 2];
    for (p, w) in positions.iter().zip(&weights) {
        local[0] += p[0] * w;
        local[1] += p[1] * w;
    }
    local[0] /= weight_sum;
    local[1] /= weight_sum;

    let mut spread = [0.0; 2];
    for (p, w) in positions.iter().zip(&weights) {
        spread[0] += w * (p[0] - local[0]).powi(2);
        spread[1] += w * (p[1] - local[1]).powi(2);
    }

    let axis_variance = |axis: usize| {
        let v = spread[axis] / weight_sum
            + params.pitch[axis] * params.pitch[axis] / 12.0
            + params.smearing[axis] * params.smearing[axis];
        v.max(min_variance)
    };

    let mut variance = [axis_variance(0), axis_variance(1)];
    if let ModuleKind::Strip { length, .. } = kind {
        local[1] = 0.0;
        variance[1] = (length * length / 12.0).max(min_variance);
    }

    // Representative time from the cell with the highest activation
    let mut best = cells[0];
    for &i in &cells[1..] {
        if batch.activation[i] > batch.activation[best] {
            best = i;
        }
    }

    Measurement {
        local,
        variance,
        module,
        cluster_size: cells.len() as u32,
        total_activation: cells.iter().map(|&i| f64::from(batch.activation[i])).sum(),
        time: f64::from(batch.time[best]),
        dimension: kind.dimension(),
    }
}
