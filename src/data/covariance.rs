//! # Covariance Estimation
//!
//! $$
//! \hat\Sigma = \frac{1}{T-1}(R-\bar R)(R-\bar R)^\top
//! $$
//!

use nalgebra::DMatrix;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;

use super::align::AlignedReturns;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::OptimizerMethod;

const CHOLESKY_ATTEMPTS: usize = 8;

/// Symmetric `A x A` sample covariance of aligned returns.
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceMatrix {
  data: Array2<f64>,
}

impl CovarianceMatrix {
  /// Unbiased sample covariance (divides by `T - 1`).
  pub fn estimate(returns: &AlignedReturns) -> Result<Self> {
    let horizon = returns.horizon();
    if horizon < 2 {
      return Err(PortfolioError::insufficient(format!(
        "covariance needs at least 2 periods, got {horizon}"
      )));
    }

    let mean = returns.mean_returns();
    let centered = returns.as_array() - &mean.insert_axis(Axis(1));
    let mut data = centered.dot(&centered.t()) / (horizon - 1) as f64;

    // Exact symmetry and non-negative diagonal regardless of rounding.
    let n = data.nrows();
    for i in 0..n {
      data[(i, i)] = data[(i, i)].max(0.0);
      for j in (i + 1)..n {
        let v = 0.5 * (data[(i, j)] + data[(j, i)]);
        data[(i, j)] = v;
        data[(j, i)] = v;
      }
    }

    Ok(Self { data })
  }

  /// Wrap a caller-supplied covariance matrix.
  pub fn from_array(data: Array2<f64>) -> Result<Self> {
    let (rows, cols) = data.dim();
    if rows != cols || rows == 0 {
      return Err(PortfolioError::invalid(format!(
        "covariance matrix must be square and non-empty, got {rows}x{cols}"
      )));
    }
    if data.iter().any(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid("covariance matrix contains non-finite entries"));
    }
    for i in 0..rows {
      if data[(i, i)] < 0.0 {
        return Err(PortfolioError::invalid(format!(
          "covariance diagonal entry {i} is negative"
        )));
      }
      for j in (i + 1)..rows {
        if (data[(i, j)] - data[(j, i)]).abs() > 1e-12 * (1.0 + data[(i, j)].abs()) {
          return Err(PortfolioError::invalid("covariance matrix must be symmetric"));
        }
      }
    }
    Ok(Self { data })
  }

  pub fn dim(&self) -> usize {
    self.data.nrows()
  }

  pub fn as_array(&self) -> &Array2<f64> {
    &self.data
  }

  /// Diagonal of the matrix, one variance per asset.
  pub fn variances(&self) -> Array1<f64> {
    self.data.diag().to_owned()
  }

  /// `w' S w`, clamped at zero so rounding never yields a negative variance.
  pub fn portfolio_variance(&self, w: &[f64]) -> f64 {
    let n = self.dim();
    let mut acc = 0.0;
    for i in 0..n {
      let wi = w[i];
      if wi == 0.0 {
        continue;
      }
      let mut row = 0.0;
      for j in 0..n {
        row += self.data[(i, j)] * w[j];
      }
      acc += wi * row;
    }
    acc.max(0.0)
  }

  pub fn portfolio_volatility(&self, w: &[f64]) -> f64 {
    self.portfolio_variance(w).sqrt()
  }

  /// Pearson correlation implied by the covariance. Zero-variance assets are
  /// uncorrelated with everything else.
  pub fn correlation(&self) -> Array2<f64> {
    let n = self.dim();
    let sd = self.variances().mapv(|v| v.max(0.0).sqrt());
    Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        1.0
      } else {
        let denom = sd[i] * sd[j];
        if denom > 1e-15 {
          (self.data[(i, j)] / denom).clamp(-1.0, 1.0)
        } else {
          0.0
        }
      }
    })
  }

  /// Lower Cholesky factor `L` with `L L' = S`, adding escalating diagonal
  /// jitter for semi-definite inputs.
  pub fn cholesky_lower(&self, strategy: OptimizerMethod) -> Result<DMatrix<f64>> {
    let n = self.dim();
    let mut sigma = DMatrix::from_fn(n, n, |i, j| self.data[(i, j)]);
    let scale = (0..n).map(|i| sigma[(i, i)]).fold(0.0_f64, f64::max).max(1e-300);
    let mut jitter = 1e-12 * scale;

    for _ in 0..CHOLESKY_ATTEMPTS {
      if let Some(chol) = sigma.clone().cholesky() {
        return Ok(chol.l());
      }
      for i in 0..n {
        sigma[(i, i)] += jitter;
      }
      jitter *= 10.0;
    }

    Err(PortfolioError::optimization(
      strategy,
      "covariance matrix is not positive semi-definite (Cholesky factorization failed)",
    ))
  }
}
