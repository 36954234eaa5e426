//! # Return Alignment
//!
//! $$
//! T = \min_i |r_i|,\qquad R_{i,\cdot} = (r_{i,|r_i|-T}, \dots, r_{i,|r_i|-1})
//! $$
//!
//! Series are truncated to their most recent `T` observations. Nothing is padded,
//! interpolated or repeated.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

use crate::error::PortfolioError;
use crate::error::Result;

/// `A x T` matrix of periodic returns; rows are assets, columns are periods in
/// chronological order.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedReturns {
  data: Array2<f64>,
}

impl AlignedReturns {
  /// Wrap an already aligned `assets x periods` matrix.
  pub fn new(data: Array2<f64>) -> Result<Self> {
    let (n_assets, horizon) = data.dim();
    if n_assets < 2 {
      return Err(PortfolioError::insufficient(format!(
        "a portfolio needs at least 2 assets, got {n_assets}"
      )));
    }
    if horizon < 2 {
      return Err(PortfolioError::insufficient(format!(
        "aligned horizon must be at least 2 periods, got {horizon}"
      )));
    }
    if let Some(((i, t), v)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(PortfolioError::invalid(format!(
        "return for asset {i} at period {t} is not finite ({v})"
      )));
    }

    Ok(Self { data })
  }

  /// Build from equal-length rows.
  pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
    let horizon = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != horizon) {
      return Err(PortfolioError::invalid(
        "rows of an aligned return matrix must have identical length",
      ));
    }
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    let data = Array2::from_shape_vec((rows.len(), horizon), flat)
      .map_err(|e| PortfolioError::invalid(e.to_string()))?;
    Self::new(data)
  }

  pub fn n_assets(&self) -> usize {
    self.data.nrows()
  }

  /// Common horizon `T`.
  pub fn horizon(&self) -> usize {
    self.data.ncols()
  }

  pub fn row(&self, asset: usize) -> ArrayView1<'_, f64> {
    self.data.row(asset)
  }

  /// Cross-asset return vector observed at period `t`.
  pub fn period(&self, t: usize) -> ArrayView1<'_, f64> {
    self.data.column(t)
  }

  pub fn as_array(&self) -> &Array2<f64> {
    &self.data
  }

  /// Historical mean return of each asset.
  pub fn mean_returns(&self) -> Array1<f64> {
    self.data.sum_axis(Axis(1)) / self.horizon() as f64
  }
}

/// Align return series of differing lengths to their common most recent tail.
pub fn align_return_series(all_returns: &[Vec<f64>]) -> Result<AlignedReturns> {
  if all_returns.len() < 2 {
    return Err(PortfolioError::insufficient(format!(
      "a portfolio needs at least 2 assets, got {}",
      all_returns.len()
    )));
  }

  let min_len = all_returns.iter().map(|r| r.len()).min().unwrap_or(0);
  if min_len < 2 {
    return Err(PortfolioError::insufficient(format!(
      "shortest return series has {min_len} observations, need at least 2"
    )));
  }

  let rows: Vec<Vec<f64>> = all_returns
    .iter()
    .map(|r| r[r.len() - min_len..].to_vec())
    .collect();
  AlignedReturns::from_rows(&rows)
}
