//! # Monte Carlo Sharpe Optimizer
//!
//! $$
//! \mathbf r^{(k)} \sim \mathcal N(\bar{\mathbf r}, \Sigma),\quad
//! \mathbf w^{(k)} = \arg\max_{\mathbf w \in \mathcal W}
//!   \frac{\mathbf r^{(k)\top}\mathbf w - r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//!   - \gamma\lVert\mathbf w\rVert^2,\quad
//! \mathbf w^\* = \frac1K\sum_k \mathbf w^{(k)}
//! $$
//!
//! Each scenario owns an RNG stream derived from the base seed and its index, and
//! results are reduced in index order, so parallel and sequential runs agree bit
//! for bit.

use std::time::Duration;
use std::time::Instant;

use nalgebra::DMatrix;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::check_dimensions;
use super::sharpe;
use super::simplex::dot;
use super::simplex::minimize_on_simplex;
use super::simplex::random_start;
use super::simplex::SolverSettings;
use super::PortfolioOptimizer;
use super::DEGENERATE_COST;
use super::MIN_VARIANCE;
use crate::data::AlignedReturns;
use crate::data::CovarianceMatrix;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::Diagnostics;
use crate::types::OptimizationResult;
use crate::types::OptimizerMethod;
use crate::types::RunStatus;
use crate::types::WeightBounds;

#[derive(Clone, Debug)]
pub struct MonteCarloConfig {
  pub num_simulations: usize,
  pub risk_free_rate: f64,
  /// L2 penalty `gamma` on the weights; zero disables it.
  pub l2_regularization: f64,
  pub bounds: WeightBounds,
  /// Nelder-Mead iteration cap for each scenario.
  pub max_iters: u64,
  pub tolerance: f64,
  pub random_seed: Option<u64>,
  /// Drop scenarios whose solver hit `max_iters`.
  pub discard_unconverged: bool,
  pub parallel: bool,
  /// Scenarios not started before the deadline are skipped.
  pub deadline: Option<Duration>,
}

impl Default for MonteCarloConfig {
  fn default() -> Self {
    Self {
      num_simulations: 2500,
      risk_free_rate: 0.0,
      l2_regularization: 0.0,
      bounds: WeightBounds::default(),
      max_iters: 1000,
      tolerance: 1e-10,
      random_seed: None,
      discard_unconverged: false,
      parallel: true,
      deadline: None,
    }
  }
}

enum Scenario {
  Solved {
    weights: Vec<f64>,
    sharpe: f64,
    converged: bool,
    iterations: u64,
  },
  Degenerate,
  Unconverged,
  Failed,
  Cancelled,
}

/// Derive an independent seed for scenario `index` (splitmix64 finalizer).
fn scenario_seed(base: u64, index: usize) -> u64 {
  let mut z = base ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
  z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
  z ^ (z >> 31)
}

#[derive(Clone, Debug)]
pub struct MonteCarloOptimizer {
  config: MonteCarloConfig,
}

impl MonteCarloOptimizer {
  pub fn new(config: MonteCarloConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &MonteCarloConfig {
    &self.config
  }

  fn run_scenario(
    &self,
    index: usize,
    base_seed: u64,
    mean: &[f64],
    chol: &DMatrix<f64>,
    cov: &CovarianceMatrix,
    started: Instant,
  ) -> Scenario {
    let cfg = &self.config;
    if cfg.deadline.is_some_and(|d| started.elapsed() >= d) {
      return Scenario::Cancelled;
    }

    let n = mean.len();
    let mut rng = StdRng::seed_from_u64(scenario_seed(base_seed, index));
    let z = DVector::from_iterator(n, (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)));
    let shock = chol * z;
    let sampled: Vec<f64> = (0..n).map(|i| mean[i] + shock[i]).collect();

    let rf = cfg.risk_free_rate;
    let gamma = cfg.l2_regularization;
    let objective = |w: &[f64]| {
      let var = cov.portfolio_variance(w);
      if var <= MIN_VARIANCE {
        return DEGENERATE_COST;
      }
      let penalty = gamma * w.iter().map(|x| x * x).sum::<f64>();
      -(dot(&sampled, w) - rf) / var.sqrt() + penalty
    };

    let outcome = match minimize_on_simplex(
      objective,
      random_start(n, &mut rng),
      SolverSettings {
        bounds: cfg.bounds,
        max_iters: cfg.max_iters,
        tolerance: cfg.tolerance,
      },
      self.method(),
    ) {
      Ok(outcome) => outcome,
      Err(_) => return Scenario::Failed,
    };

    let var = cov.portfolio_variance(&outcome.weights);
    if var <= MIN_VARIANCE {
      return Scenario::Degenerate;
    }
    if cfg.discard_unconverged && !outcome.converged {
      return Scenario::Unconverged;
    }

    Scenario::Solved {
      sharpe: (dot(&sampled, &outcome.weights) - rf) / var.sqrt(),
      weights: outcome.weights,
      converged: outcome.converged,
      iterations: outcome.iterations,
    }
  }
}

impl PortfolioOptimizer for MonteCarloOptimizer {
  fn method(&self) -> OptimizerMethod {
    OptimizerMethod::MonteCarlo
  }

  fn optimize(
    &self,
    returns: &AlignedReturns,
    cov: &CovarianceMatrix,
  ) -> Result<OptimizationResult> {
    let n = check_dimensions(returns, cov)?;
    let cfg = &self.config;
    cfg.bounds.check_feasible(n)?;
    if cfg.num_simulations == 0 {
      return Err(PortfolioError::optimization(
        self.method(),
        "num_simulations is zero, no scenario can be solved",
      ));
    }

    let mean = returns.mean_returns().to_vec();
    let chol = cov.cholesky_lower(self.method())?;
    let base_seed = cfg
      .random_seed
      .unwrap_or_else(|| rand::thread_rng().gen::<u64>());
    debug!(
      assets = n,
      simulations = cfg.num_simulations,
      parallel = cfg.parallel,
      "starting Monte Carlo optimization"
    );

    let started = Instant::now();
    let run = |k: usize| self.run_scenario(k, base_seed, &mean, &chol, cov, started);
    let scenarios: Vec<Scenario> = if cfg.parallel {
      (0..cfg.num_simulations).into_par_iter().map(run).collect()
    } else {
      (0..cfg.num_simulations).map(run).collect()
    };

    let mut sum = vec![0.0; n];
    let mut sharpe_sum = 0.0;
    let mut used = 0usize;
    let mut all_converged = true;
    let mut iterations = 0u64;
    let mut degenerate = 0usize;
    let mut unconverged = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;

    for scenario in &scenarios {
      match scenario {
        Scenario::Solved {
          weights,
          sharpe,
          converged,
          iterations: it,
        } => {
          for (acc, w) in sum.iter_mut().zip(weights) {
            *acc += w;
          }
          sharpe_sum += sharpe;
          used += 1;
          all_converged &= *converged;
          iterations += it;
        }
        Scenario::Degenerate => degenerate += 1,
        Scenario::Unconverged => unconverged += 1,
        Scenario::Failed => failed += 1,
        Scenario::Cancelled => cancelled += 1,
      }
    }

    let skipped = degenerate + unconverged + failed + cancelled;
    if used == 0 {
      return Err(PortfolioError::optimization(
        self.method(),
        format!(
          "no scenario produced a usable allocation ({degenerate} degenerate, \
           {unconverged} unconverged, {failed} failed, {cancelled} cancelled)"
        ),
      ));
    }
    if skipped > 0 {
      warn!(
        degenerate,
        unconverged, failed, cancelled, used, "skipped Monte Carlo scenarios"
      );
    }

    let weights: Vec<f64> = sum.iter().map(|s| s / used as f64).collect();
    let converged = all_converged && cancelled == 0;
    if !converged {
      warn!(
        used,
        cancelled, "Monte Carlo run exhausted its budget before every scenario converged"
      );
    }

    let expected_return = dot(&mean, &weights);
    let volatility = cov.portfolio_volatility(&weights);
    info!(
      used,
      skipped,
      expected_return,
      volatility,
      "Monte Carlo optimization finished"
    );

    Ok(OptimizationResult {
      weights,
      strategy: self.method(),
      status: if converged {
        RunStatus::Converged
      } else {
        RunStatus::BudgetExhausted
      },
      diagnostics: Diagnostics {
        objective: Some(sharpe_sum / used as f64),
        converged,
        expected_return,
        volatility,
        sharpe: sharpe(expected_return, cfg.risk_free_rate, volatility),
        iterations,
        samples_used: used,
        samples_skipped: skipped,
        ..Default::default()
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;

  use super::*;

  fn three_assets() -> (AlignedReturns, CovarianceMatrix) {
    let r = AlignedReturns::from_rows(&[
      vec![0.010, -0.004, 0.012, 0.003, -0.006, 0.009, 0.004, 0.001],
      vec![0.002, 0.003, 0.001, 0.002, 0.004, 0.001, 0.003, 0.002],
      vec![-0.015, 0.020, -0.010, 0.025, -0.020, 0.018, 0.005, -0.008],
    ])
    .unwrap();
    let cov = CovarianceMatrix::estimate(&r).unwrap();
    (r, cov)
  }

  fn config(seed: u64, sims: usize) -> MonteCarloConfig {
    MonteCarloConfig {
      num_simulations: sims,
      random_seed: Some(seed),
      ..Default::default()
    }
  }

  #[test]
  fn weights_lie_on_simplex() {
    let (r, cov) = three_assets();
    let res = MonteCarloOptimizer::new(config(42, 64)).optimize(&r, &cov).unwrap();

    assert_eq!(res.weights.len(), 3);
    assert_abs_diff_eq!(res.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    assert!(res.weights.iter().all(|&w| w >= 0.0));
    assert_eq!(res.diagnostics.samples_used + res.diagnostics.samples_skipped, 64);
  }

  #[test]
  fn low_volatility_asset_dominates() {
    let (r, cov) = three_assets();
    let res = MonteCarloOptimizer::new(config(1, 128)).optimize(&r, &cov).unwrap();
    assert!(res.weights[1] > res.weights[2], "weights = {:?}", res.weights);
  }

  #[test]
  fn seeded_runs_are_bit_identical_across_parallelism() {
    let (r, cov) = three_assets();
    let par = MonteCarloOptimizer::new(config(17, 48)).optimize(&r, &cov).unwrap();
    let again = MonteCarloOptimizer::new(config(17, 48)).optimize(&r, &cov).unwrap();
    let seq = MonteCarloOptimizer::new(MonteCarloConfig {
      parallel: false,
      ..config(17, 48)
    })
    .optimize(&r, &cov)
    .unwrap();

    assert_eq!(par.weights, again.weights);
    assert_eq!(par.weights, seq.weights);
  }

  #[test]
  fn different_seeds_differ() {
    let (r, cov) = three_assets();
    let a = MonteCarloOptimizer::new(config(1, 16)).optimize(&r, &cov).unwrap();
    let b = MonteCarloOptimizer::new(config(2, 16)).optimize(&r, &cov).unwrap();
    assert_ne!(a.weights, b.weights);
  }

  #[test]
  fn zero_simulations_is_an_error() {
    let (r, cov) = three_assets();
    let err = MonteCarloOptimizer::new(config(1, 0)).optimize(&r, &cov).unwrap_err();
    assert!(matches!(
      err,
      PortfolioError::Optimization {
        strategy: OptimizerMethod::MonteCarlo,
        ..
      }
    ));
  }

  #[test]
  fn all_degenerate_samples_is_an_error() {
    let r = AlignedReturns::from_rows(&[vec![0.0625; 5], vec![0.125; 5]]).unwrap();
    let cov = CovarianceMatrix::estimate(&r).unwrap();
    assert_eq!(cov.as_array(), &Array2::<f64>::zeros((2, 2)));

    let err = MonteCarloOptimizer::new(config(3, 8)).optimize(&r, &cov).unwrap_err();
    assert!(matches!(err, PortfolioError::Optimization { .. }));
  }

  #[test]
  fn regularization_and_bounds_are_honored() {
    let (r, cov) = three_assets();
    let res = MonteCarloOptimizer::new(MonteCarloConfig {
      l2_regularization: 0.1,
      bounds: WeightBounds::new(0.01, 0.5).unwrap(),
      ..config(5, 32)
    })
    .optimize(&r, &cov)
    .unwrap();

    for &w in &res.weights {
      assert!((0.01 - 1e-9..=0.5 + 1e-9).contains(&w), "weights = {:?}", res.weights);
    }
    assert_abs_diff_eq!(res.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn expired_deadline_cancels_everything() {
    let (r, cov) = three_assets();
    let err = MonteCarloOptimizer::new(MonteCarloConfig {
      deadline: Some(Duration::ZERO),
      ..config(5, 16)
    })
    .optimize(&r, &cov)
    .unwrap_err();
    assert!(err.to_string().contains("16 cancelled"));
  }

  #[test]
  fn scenario_seeds_are_distinct() {
    let seeds: std::collections::HashSet<u64> = (0..1000).map(|i| scenario_seed(7, i)).collect();
    assert_eq!(seeds.len(), 1000);
  }
}
