//! # Portfolio Optimizers
//!
//! $$
//! \mathbf w^\* = \arg\min_{\mathbf w \in \mathcal W} \mathcal L(\mathbf w;\ R, \Sigma)
//! $$
//!
//! Interchangeable long-only allocation strategies sharing one contract:
//! aligned returns and their covariance in, a weight vector summing to one out.

pub mod local_search;
pub mod max_sharpe;
pub mod mean_variance;
pub mod monte_carlo;
pub mod simplex;

use crate::data::AlignedReturns;
use crate::data::CovarianceMatrix;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::OptimizationResult;
use crate::types::OptimizerMethod;

pub use local_search::LocalSearchConfig;
pub use local_search::LocalSearchOptimizer;
pub use max_sharpe::MaxSharpeConfig;
pub use max_sharpe::MaxSharpeOptimizer;
pub use mean_variance::MeanVarianceConfig;
pub use mean_variance::MeanVarianceOptimizer;
pub use monte_carlo::MonteCarloConfig;
pub use monte_carlo::MonteCarloOptimizer;
pub use simplex::project_to_bounds;

/// Portfolio variance at or below this is treated as degenerate.
pub(crate) const MIN_VARIANCE: f64 = 1e-18;
/// Cost assigned to degenerate candidates by Sharpe-style objectives.
pub(crate) const DEGENERATE_COST: f64 = 1e10;

/// Common capability of every allocation strategy.
pub trait PortfolioOptimizer {
  fn method(&self) -> OptimizerMethod;

  fn optimize(
    &self,
    returns: &AlignedReturns,
    cov: &CovarianceMatrix,
  ) -> Result<OptimizationResult>;
}

pub(crate) fn check_dimensions(
  returns: &AlignedReturns,
  cov: &CovarianceMatrix,
) -> Result<usize> {
  let n = returns.n_assets();
  if cov.dim() != n {
    return Err(PortfolioError::invalid(format!(
      "covariance is {}x{} but returns cover {n} assets",
      cov.dim(),
      cov.dim()
    )));
  }
  Ok(n)
}

pub(crate) fn sharpe(expected_return: f64, risk_free: f64, volatility: f64) -> f64 {
  if volatility > 1e-15 {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  }
}
