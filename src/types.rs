//! # Portfolio Types
//!
//! $$
//! \mathcal W = \{\mathbf w \in \mathbb R^A : \textstyle\sum_i w_i = 1,\ \ell \le w_i \le u\}
//! $$
//!
//! Strategy selector, weight bounds and result containers shared by all optimizers.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::PortfolioError;
use crate::error::Result;

/// Tolerance used when checking that weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Supported portfolio optimization strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum OptimizerMethod {
  /// Predicted return traded against volatility in a constrained solve.
  #[default]
  MeanVariance,
  /// Deterministic tangency portfolio on the historical mean and covariance.
  MaxSharpe,
  /// Average of per-scenario Sharpe-maximizing weights.
  MonteCarlo,
  /// Annealing-style stochastic search minimizing portfolio variance.
  LocalSearch,
}

impl OptimizerMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::MeanVariance => "mean_variance",
      Self::MaxSharpe => "max_sharpe",
      Self::MonteCarlo => "monte_carlo",
      Self::LocalSearch => "local_search",
    }
  }
}

impl Display for OptimizerMethod {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OptimizerMethod {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().replace('-', "_").as_str() {
      "mean_variance" | "meanvariance" | "mv" | "markowitz" => Ok(Self::MeanVariance),
      "max_sharpe" | "maxsharpe" | "sharpe" | "robust" => Ok(Self::MaxSharpe),
      "monte_carlo" | "montecarlo" | "mc" => Ok(Self::MonteCarlo),
      "local_search" | "localsearch" | "annealing" | "quantum" | "quantum_annealing" => {
        Ok(Self::LocalSearch)
      }
      other => Err(PortfolioError::invalid(format!(
        "unknown optimization strategy '{other}'"
      ))),
    }
  }
}

/// Box constraint applied to every individual weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightBounds {
  pub min: f64,
  pub max: f64,
}

impl Default for WeightBounds {
  fn default() -> Self {
    Self { min: 0.0, max: 1.0 }
  }
}

impl WeightBounds {
  pub fn new(min: f64, max: f64) -> Result<Self> {
    let bounds = Self { min, max };
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max > 1.0 || min > max {
      return Err(PortfolioError::invalid(format!(
        "weight bounds must satisfy 0 <= min <= max <= 1, got [{min}, {max}]"
      )));
    }
    Ok(bounds)
  }

  /// Check that `n` weights inside the box can sum to one.
  pub fn check_feasible(&self, n: usize) -> Result<()> {
    let n_f = n as f64;
    let too_low = n_f * self.max < 1.0 - WEIGHT_SUM_TOLERANCE;
    let too_high = n_f * self.min > 1.0 + WEIGHT_SUM_TOLERANCE;
    if n == 0 || too_low || too_high {
      return Err(PortfolioError::invalid(format!(
        "weight bounds [{}, {}] are infeasible for {n} assets",
        self.min, self.max
      )));
    }
    Ok(())
  }
}

/// Terminal state of a successful optimization run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunStatus {
  /// The solver met its stopping tolerance.
  Converged,
  /// The iteration or time budget ran out; the best solution found is returned.
  #[default]
  BudgetExhausted,
}

/// Optional diagnostics attached to an [`OptimizationResult`].
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
  /// Final value of the strategy objective.
  pub objective: Option<f64>,
  /// `false` signals a convergence warning: the result is the best iterate found.
  pub converged: bool,
  /// Return forecast consumed by the mean-variance strategy.
  pub predicted_returns: Option<Vec<f64>>,
  /// Naive `1/A` allocation returned alongside mean-variance results.
  pub equal_weights: Option<Vec<f64>>,
  /// Expected per-period portfolio return under the strategy's return estimate.
  pub expected_return: f64,
  /// Portfolio volatility `sqrt(w' S w)`.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`, zero when volatility is zero.
  pub sharpe: f64,
  /// Solver or search iterations performed.
  pub iterations: u64,
  /// Monte Carlo scenarios that contributed to the mean.
  pub samples_used: usize,
  /// Monte Carlo scenarios dropped as degenerate or unconverged.
  pub samples_skipped: usize,
}

/// Output of a portfolio optimization run.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Final portfolio weights, in input asset order.
  pub weights: Vec<f64>,
  pub strategy: OptimizerMethod,
  pub status: RunStatus,
  pub diagnostics: Diagnostics,
}

impl OptimizationResult {
  pub fn converged(&self) -> bool {
    self.diagnostics.converged
  }
}

/// Equal-weight baseline `[1/A, ..., 1/A]`.
pub fn equal_weights(n: usize) -> Vec<f64> {
  if n == 0 {
    return Vec::new();
  }
  vec![1.0 / n as f64; n]
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn equal_weights_for_four_assets() {
    let w = equal_weights(4);
    assert_eq!(w.len(), 4);
    for wi in &w {
      assert_abs_diff_eq!(*wi, 0.25, epsilon = 1e-15);
    }
  }

  #[test]
  fn method_parses_aliases_and_rejects_unknown() {
    assert_eq!("monte-carlo".parse::<OptimizerMethod>().unwrap(), OptimizerMethod::MonteCarlo);
    assert_eq!("Annealing".parse::<OptimizerMethod>().unwrap(), OptimizerMethod::LocalSearch);
    assert_eq!("mv".parse::<OptimizerMethod>().unwrap(), OptimizerMethod::MeanVariance);
    assert_eq!("Max-Sharpe".parse::<OptimizerMethod>().unwrap(), OptimizerMethod::MaxSharpe);
    assert_eq!(OptimizerMethod::MaxSharpe.to_string(), "max_sharpe");
    assert!(matches!(
      "hrp".parse::<OptimizerMethod>(),
      Err(PortfolioError::InvalidInput { .. })
    ));
  }

  #[test]
  fn bounds_feasibility() {
    let b = WeightBounds::new(0.01, 0.5).unwrap();
    assert!(b.check_feasible(2).is_ok());
    assert!(b.check_feasible(1).is_err());
    assert!(WeightBounds::new(0.6, 0.5).is_err());
    assert!(WeightBounds::new(0.3, 1.0).unwrap().check_feasible(4).is_err());
  }
}
