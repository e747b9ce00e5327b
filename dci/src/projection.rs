//! Projection bank: random unit directions and bulk projection.
//!
//! See spec §4.1. A bank owns a dense `D x (m*L_s)` matrix whose columns are
//! i.i.d. uniform samples from the unit `(D-1)`-sphere — drawn as independent
//! standard-normal coordinates, then normalized, which is the standard way to
//! get a rotationally-symmetric sample without rejection sampling.

use ndarray::{Array2, Axis};

use crate::rng::IndexRng;

/// A dense bank of unit projection directions, shape `D x num_directions`.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectionBank {
    directions: Array2<f32>,
}

impl ProjectionBank {
    /// Sample a fresh bank: `D` ambient dimensions, `num_directions = m * L_s`
    /// projection directions, each an independent unit vector.
    pub fn sample(d: usize, num_directions: usize, rng: &mut IndexRng) -> Self {
        let mut directions = Array2::<f32>::zeros((d, num_directions));
        for mut column in directions.axis_iter_mut(Axis(1)) {
            for entry in column.iter_mut() {
                *entry = rng.standard_normal();
            }
            let norm = column.dot(&column).sqrt();
            // A column of all-zero Gaussian draws has probability zero; guard
            // against it anyway so a single degenerate draw can't poison a query.
            let norm = if norm > 0.0 { norm } else { 1.0 };
            column.mapv_inplace(|v| v / norm);
        }
        Self { directions }
    }

    pub fn ambient_dim(&self) -> usize {
        self.directions.nrows()
    }

    pub fn num_directions(&self) -> usize {
        self.directions.ncols()
    }

    /// Project a dense, column-major `D x P` point batch onto every
    /// direction in the bank, returning a `num_directions x P` matrix of
    /// projected coordinates. This is the one place the projection bank
    /// calls out to the dense linear-algebra provider: `C = A^T B`.
    pub fn project(&self, points: &Array2<f32>) -> Array2<f32> {
        debug_assert_eq!(points.nrows(), self.ambient_dim());
        self.directions.t().dot(points)
    }

    /// Like [`ProjectionBank::project_one`], but writes into a caller-owned
    /// buffer instead of allocating a fresh `Vec` — the hook
    /// [`crate::query::ScratchPool`] uses so a query batch reuses one buffer
    /// per in-flight query rather than allocating one per level per query.
    pub fn project_one_into(&self, point: &[f32], out: &mut Vec<f32>) {
        debug_assert_eq!(point.len(), self.ambient_dim());
        out.clear();
        let point = ndarray::ArrayView1::from(point);
        out.extend(self.directions.axis_iter(Axis(1)).map(|column| column.dot(&point)));
    }

    /// Project a single point (a length-`D` slice) onto every direction,
    /// returning a length-`num_directions` vector of projected coordinates.
    pub fn project_one(&self, point: &[f32]) -> Vec<f32> {
        debug_assert_eq!(point.len(), self.ambient_dim());
        let point = ndarray::ArrayView1::from(point);
        self.directions
            .axis_iter(Axis(1))
            .map(|column| column.dot(&point))
            .collect()
    }

    /// L2 norm of every column; exposed for the unit-norm test property.
    #[cfg(test)]
    pub(crate) fn column_norms(&self) -> Vec<f32> {
        self.directions
            .axis_iter(Axis(1))
            .map(|column| column.dot(&column).sqrt())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_unit_norm() {
        // The reference tolerance of 1e-12 is unreachable for an f32 bank
        // (machine epsilon is ~1.2e-7); see SPEC_FULL.md's note on this
        // deviation. 1e-6 is the tightest bound an f32 normalization can
        // actually meet.
        let mut rng = IndexRng::from_seed(0);
        let bank = ProjectionBank::sample(16, 9, &mut rng);
        for norm in bank.column_norms() {
            assert!((norm - 1.0).abs() < 1e-6, "norm was {norm}");
        }
    }

    #[test]
    fn project_one_matches_bulk_project() {
        let mut rng = IndexRng::from_seed(7);
        let bank = ProjectionBank::sample(4, 3, &mut rng);
        let point = [1.0f32, -2.0, 0.5, 3.0];
        let single = bank.project_one(&point);

        let batch = Array2::from_shape_vec((4, 1), point.to_vec()).unwrap();
        let projected = bank.project(&batch);
        let bulk: Vec<f32> = projected.column(0).to_vec();

        for (a, b) in single.iter().zip(bulk.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
