//! # Maximum Sharpe Optimizer
//!
//! $$
//! \mathbf w^\* = \arg\max_{\mathbf w \in \mathcal W}
//!   \frac{\bar{\mathbf r}^\top\mathbf w - r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! $$
//!
//! Deterministic tangency portfolio on the historical mean and sample
//! covariance, solved from the equal-weight allocation.

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::check_dimensions;
use super::sharpe;
use super::simplex::dot;
use super::simplex::minimize_on_simplex;
use super::simplex::SolverSettings;
use super::PortfolioOptimizer;
use super::DEGENERATE_COST;
use super::MIN_VARIANCE;
use crate::data::AlignedReturns;
use crate::data::CovarianceMatrix;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::equal_weights;
use crate::types::Diagnostics;
use crate::types::OptimizationResult;
use crate::types::OptimizerMethod;
use crate::types::RunStatus;
use crate::types::WeightBounds;

#[derive(Clone, Debug)]
pub struct MaxSharpeConfig {
  pub risk_free_rate: f64,
  pub bounds: WeightBounds,
  pub max_iters: u64,
  pub tolerance: f64,
}

impl Default for MaxSharpeConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.0,
      bounds: WeightBounds::default(),
      max_iters: 5000,
      tolerance: 1e-12,
    }
  }
}

#[derive(Clone, Debug, Default)]
pub struct MaxSharpeOptimizer {
  config: MaxSharpeConfig,
}

impl MaxSharpeOptimizer {
  pub fn new(config: MaxSharpeConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &MaxSharpeConfig {
    &self.config
  }
}

impl PortfolioOptimizer for MaxSharpeOptimizer {
  fn method(&self) -> OptimizerMethod {
    OptimizerMethod::MaxSharpe
  }

  fn optimize(
    &self,
    returns: &AlignedReturns,
    cov: &CovarianceMatrix,
  ) -> Result<OptimizationResult> {
    let n = check_dimensions(returns, cov)?;
    let cfg = &self.config;
    cfg.bounds.check_feasible(n)?;
    if !cfg.risk_free_rate.is_finite() {
      return Err(PortfolioError::invalid("risk_free_rate must be finite"));
    }

    let mu = returns.mean_returns().to_vec();
    let rf = cfg.risk_free_rate;
    debug!(assets = n, risk_free_rate = rf, "starting max-Sharpe solve");

    let objective = |w: &[f64]| {
      let var = cov.portfolio_variance(w);
      if var <= MIN_VARIANCE {
        return DEGENERATE_COST;
      }
      -(dot(&mu, w) - rf) / var.sqrt()
    };

    // softmax(0) is the equal-weight allocation
    let outcome = minimize_on_simplex(
      objective,
      vec![0.0; n],
      SolverSettings {
        bounds: cfg.bounds,
        max_iters: cfg.max_iters,
        tolerance: cfg.tolerance,
      },
      self.method(),
    )?;

    let w = outcome.weights;
    let volatility = cov.portfolio_volatility(&w);
    if volatility * volatility <= MIN_VARIANCE {
      return Err(PortfolioError::optimization(
        self.method(),
        "every feasible allocation has zero variance, the Sharpe ratio is undefined",
      ));
    }
    if !outcome.converged {
      warn!(
        iterations = outcome.iterations,
        objective = outcome.cost,
        "max-Sharpe solver stopped at its iteration budget without converging"
      );
    }

    let expected_return = dot(&mu, &w);
    let ratio = sharpe(expected_return, rf, volatility);
    info!(
      iterations = outcome.iterations,
      converged = outcome.converged,
      sharpe = ratio,
      "max-Sharpe optimization finished"
    );

    Ok(OptimizationResult {
      weights: w,
      strategy: self.method(),
      status: if outcome.converged {
        RunStatus::Converged
      } else {
        RunStatus::BudgetExhausted
      },
      diagnostics: Diagnostics {
        objective: Some(outcome.cost),
        converged: outcome.converged,
        predicted_returns: Some(mu),
        equal_weights: Some(equal_weights(n)),
        expected_return,
        volatility,
        sharpe: ratio,
        iterations: outcome.iterations,
        ..Default::default()
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;

  fn two_assets() -> (AlignedReturns, CovarianceMatrix) {
    let r = AlignedReturns::from_rows(&[
      vec![0.01, 0.02, -0.01, 0.03],
      vec![0.02, 0.01, 0.00, 0.01],
    ])
    .unwrap();
    let cov = CovarianceMatrix::estimate(&r).unwrap();
    (r, cov)
  }

  #[test]
  fn finds_the_tangency_portfolio() {
    let (r, cov) = two_assets();
    let res = MaxSharpeOptimizer::default().optimize(&r, &cov).unwrap();

    // w ~ inv(S) mu = [1.6667e-7, 2.0833e-6], normalized
    assert_abs_diff_eq!(res.weights[0], 2.0 / 27.0, epsilon = 1e-3);
    assert_abs_diff_eq!(res.weights[1], 25.0 / 27.0, epsilon = 1e-3);
    assert_abs_diff_eq!(res.diagnostics.sharpe, 1.236_033, epsilon = 1e-5);
    assert_eq!(res.strategy, OptimizerMethod::MaxSharpe);
  }

  #[test]
  fn beats_equal_weights_and_is_deterministic() {
    let r = AlignedReturns::from_rows(&[
      vec![0.012, -0.004, 0.018, 0.002, 0.009, -0.001],
      vec![0.003, 0.004, 0.002, 0.005, 0.003, 0.004],
      vec![-0.020, 0.030, -0.010, 0.025, -0.015, 0.020],
    ])
    .unwrap();
    let cov = CovarianceMatrix::estimate(&r).unwrap();
    let opt = MaxSharpeOptimizer::default();
    let a = opt.optimize(&r, &cov).unwrap();
    let b = opt.optimize(&r, &cov).unwrap();
    assert_eq!(a.weights, b.weights);

    let mu = r.mean_returns().to_vec();
    let eq = equal_weights(3);
    let eq_sharpe = dot(&mu, &eq) / cov.portfolio_volatility(&eq);
    assert!(a.diagnostics.sharpe >= eq_sharpe - 1e-12);
    assert_abs_diff_eq!(a.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    assert!(a.weights.iter().all(|&w| w >= 0.0));
  }

  #[test]
  fn respects_custom_bounds() {
    let (r, cov) = two_assets();
    let config = MaxSharpeConfig {
      bounds: WeightBounds::new(0.2, 0.8).unwrap(),
      ..Default::default()
    };
    let res = MaxSharpeOptimizer::new(config).optimize(&r, &cov).unwrap();
    // The unconstrained optimum puts 7% in asset 0, so the floor binds.
    assert_abs_diff_eq!(res.weights[0], 0.2, epsilon = 1e-3);
    assert_abs_diff_eq!(res.weights[1], 0.8, epsilon = 1e-3);
  }

  #[test]
  fn zero_covariance_is_an_optimization_error() {
    let r = AlignedReturns::from_rows(&[vec![0.01, 0.01, 0.01], vec![0.02, 0.02, 0.02]]).unwrap();
    let cov = CovarianceMatrix::from_array(Array2::zeros((2, 2))).unwrap();
    let err = MaxSharpeOptimizer::default().optimize(&r, &cov).unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::Optimization {
        strategy: OptimizerMethod::MaxSharpe,
        ..
      }
    ));
  }

  #[test]
  #[traced_test]
  fn reports_non_convergence_without_failing() {
    let (r, cov) = two_assets();
    let config = MaxSharpeConfig {
      max_iters: 2,
      ..Default::default()
    };
    let res = MaxSharpeOptimizer::new(config).optimize(&r, &cov).unwrap();
    assert_eq!(res.status, RunStatus::BudgetExhausted);
    assert!(logs_contain("without converging"));
  }
}
