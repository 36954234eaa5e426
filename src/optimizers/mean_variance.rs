//! # Mean-Variance Optimizer
//!
//! $$
//! \min_{\mathbf w \in \mathcal W}\ -\hat{\boldsymbol\mu}^\top \mathbf w
//!   + \tfrac12 \lambda \sqrt{\mathbf w^\top \Sigma \mathbf w}
//! $$
//!
//! `mu_hat` comes from a [`ReturnPredictor`]; the naive `1/A` allocation is
//! returned alongside as a baseline.

use rand::rngs::StdRng;
use rand::SeedableRng;
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
use crate::data::AlignedReturns;
use crate::data::CovarianceMatrix;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::predictor::HistoricalMean;
use crate::predictor::ReturnPredictor;
use crate::types::equal_weights;
use crate::types::Diagnostics;
use crate::types::OptimizationResult;
use crate::types::OptimizerMethod;
use crate::types::RunStatus;
use crate::types::WeightBounds;

#[derive(Clone, Debug)]
pub struct MeanVarianceConfig {
  /// Multiplier `lambda` on the volatility term.
  pub risk_penalty: f64,
  /// Risk-free rate used for the reported Sharpe ratio.
  pub risk_free_rate: f64,
  pub bounds: WeightBounds,
  pub max_iters: u64,
  /// Nelder-Mead standard-deviation stopping tolerance.
  pub tolerance: f64,
  /// Seed for the random initial guess; `None` draws from entropy.
  pub random_seed: Option<u64>,
}

impl Default for MeanVarianceConfig {
  fn default() -> Self {
    Self {
      risk_penalty: 1.0,
      risk_free_rate: 0.0,
      bounds: WeightBounds::default(),
      max_iters: 5000,
      tolerance: 1e-12,
      random_seed: None,
    }
  }
}

/// Mean-variance allocation driven by a pluggable return forecast.
#[derive(Clone, Debug)]
pub struct MeanVarianceOptimizer<P = HistoricalMean> {
  config: MeanVarianceConfig,
  predictor: P,
}

impl MeanVarianceOptimizer<HistoricalMean> {
  pub fn new(config: MeanVarianceConfig) -> Self {
    Self {
      config,
      predictor: HistoricalMean,
    }
  }
}

impl<P: ReturnPredictor> MeanVarianceOptimizer<P> {
  pub fn with_predictor(config: MeanVarianceConfig, predictor: P) -> Self {
    Self { config, predictor }
  }

  pub fn config(&self) -> &MeanVarianceConfig {
    &self.config
  }

  pub fn predictor(&self) -> &P {
    &self.predictor
  }
}

impl<P: ReturnPredictor> PortfolioOptimizer for MeanVarianceOptimizer<P> {
  fn method(&self) -> OptimizerMethod {
    OptimizerMethod::MeanVariance
  }

  fn optimize(
    &self,
    returns: &AlignedReturns,
    cov: &CovarianceMatrix,
  ) -> Result<OptimizationResult> {
    let n = check_dimensions(returns, cov)?;
    let cfg = &self.config;
    cfg.bounds.check_feasible(n)?;
    if !cfg.risk_penalty.is_finite() || cfg.risk_penalty < 0.0 {
      return Err(PortfolioError::invalid("risk_penalty must be finite and non-negative"));
    }

    let mu = self.predictor.predict(returns)?.to_vec();
    if mu.len() != n {
      return Err(PortfolioError::optimization(
        self.method(),
        format!(
          "{} predicted {} returns for {n} assets",
          self.predictor.name(),
          mu.len()
        ),
      ));
    }
    debug!(
      assets = n,
      predictor = self.predictor.name(),
      risk_penalty = cfg.risk_penalty,
      "starting mean-variance solve"
    );

    let half_penalty = 0.5 * cfg.risk_penalty;
    let objective = |w: &[f64]| -dot(&mu, w) + half_penalty * cov.portfolio_volatility(w);

    let mut rng = match cfg.random_seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    let outcome = minimize_on_simplex(
      objective,
      random_start(n, &mut rng),
      SolverSettings {
        bounds: cfg.bounds,
        max_iters: cfg.max_iters,
        tolerance: cfg.tolerance,
      },
      self.method(),
    )?;

    if !outcome.converged {
      warn!(
        iterations = outcome.iterations,
        objective = outcome.cost,
        "mean-variance solver stopped at its iteration budget without converging"
      );
    }

    let w = outcome.weights;
    let expected_return = dot(&mu, &w);
    let volatility = cov.portfolio_volatility(&w);
    info!(
      iterations = outcome.iterations,
      converged = outcome.converged,
      expected_return,
      volatility,
      "mean-variance optimization finished"
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
        sharpe: sharpe(expected_return, cfg.risk_free_rate, volatility),
        iterations: outcome.iterations,
        ..Default::default()
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use tracing_test::traced_test;

  use super::*;

  fn seeded(seed: u64) -> MeanVarianceConfig {
    MeanVarianceConfig {
      random_seed: Some(seed),
      ..Default::default()
    }
  }

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
  fn two_asset_scenario_prefers_better_risk_adjusted_asset() {
    let (r, cov) = two_assets();
    let res = MeanVarianceOptimizer::new(seeded(7)).optimize(&r, &cov).unwrap();

    assert_abs_diff_eq!(res.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    assert!(res.weights.iter().all(|&w| w >= 0.0));
    // Asset 1: mean 0.01, sd 0.0082. Asset 0: mean 0.0125, sd 0.0171.
    assert!(res.weights[1] > res.weights[0], "weights = {:?}", res.weights);

    let eq = res.diagnostics.equal_weights.as_ref().unwrap();
    assert_eq!(eq, &vec![0.5, 0.5]);
    let mu = res.diagnostics.predicted_returns.as_ref().unwrap();
    assert_abs_diff_eq!(mu[0], 0.0125, epsilon = 1e-12);
  }

  #[test]
  fn objective_beats_equal_weights() {
    let (r, cov) = two_assets();
    let res = MeanVarianceOptimizer::new(seeded(3)).optimize(&r, &cov).unwrap();

    let mu = r.mean_returns().to_vec();
    let f = |w: &[f64]| -dot(&mu, w) + 0.5 * cov.portfolio_volatility(w);
    assert!(f(&res.weights) <= f(&[0.5, 0.5]) + 1e-12);
  }

  #[test]
  fn zero_variance_asset_does_not_produce_nan() {
    let r = AlignedReturns::from_rows(&[
      vec![0.01, 0.02, -0.01, 0.03],
      vec![0.0625, 0.0625, 0.0625, 0.0625],
    ])
    .unwrap();
    let cov = CovarianceMatrix::estimate(&r).unwrap();
    let res = MeanVarianceOptimizer::new(seeded(11)).optimize(&r, &cov).unwrap();

    assert!(res.weights.iter().all(|w| w.is_finite()));
    assert!(res.diagnostics.objective.unwrap().is_finite());
    // The riskless asset also has the higher mean, so it takes (almost) everything.
    assert!(res.weights[1] > 0.99, "weights = {:?}", res.weights);
  }

  #[test]
  fn respects_custom_bounds() {
    let (r, cov) = two_assets();
    let config = MeanVarianceConfig {
      bounds: WeightBounds::new(0.3, 0.7).unwrap(),
      ..seeded(5)
    };
    let res = MeanVarianceOptimizer::new(config).optimize(&r, &cov).unwrap();
    for &w in &res.weights {
      assert!((0.3 - 1e-9..=0.7 + 1e-9).contains(&w), "weights = {:?}", res.weights);
    }
    assert_abs_diff_eq!(res.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn seeded_runs_are_identical() {
    let (r, cov) = two_assets();
    let a = MeanVarianceOptimizer::new(seeded(9)).optimize(&r, &cov).unwrap();
    let b = MeanVarianceOptimizer::new(seeded(9)).optimize(&r, &cov).unwrap();
    assert_eq!(a.weights, b.weights);
  }

  #[test]
  #[traced_test]
  fn reports_non_convergence_without_failing() {
    let (r, cov) = two_assets();
    let config = MeanVarianceConfig {
      max_iters: 2,
      ..seeded(1)
    };
    let res = MeanVarianceOptimizer::new(config).optimize(&r, &cov).unwrap();

    assert!(!res.converged());
    assert_eq!(res.status, RunStatus::BudgetExhausted);
    assert_abs_diff_eq!(res.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    assert!(logs_contain("without converging"));
  }

  #[cfg(feature = "ai")]
  #[test]
  fn accepts_neural_net_predictor() {
    use crate::predictor::NeuralNetConfig;
    use crate::predictor::NeuralNetPredictor;

    let r = AlignedReturns::from_rows(&[
      (0..30).map(|t| 0.01 * ((t % 3) as f64 - 1.0)).collect(),
      (0..30).map(|t| 0.004 * ((t % 4) as f64 - 1.5)).collect(),
      (0..30).map(|t| 0.002 * ((t % 2) as f64)).collect(),
    ])
    .unwrap();
    let cov = CovarianceMatrix::estimate(&r).unwrap();
    let predictor = NeuralNetPredictor::new(NeuralNetConfig {
      epochs: 80,
      ..Default::default()
    });
    let res = MeanVarianceOptimizer::with_predictor(seeded(2), predictor)
      .optimize(&r, &cov)
      .unwrap();

    assert_eq!(res.weights.len(), 3);
    assert_abs_diff_eq!(res.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    assert_eq!(res.diagnostics.predicted_returns.as_ref().unwrap().len(), 3);
  }

  #[test]
  fn rejects_mismatched_covariance() {
    let (r, _) = two_assets();
    let cov = CovarianceMatrix::from_array(ndarray::Array2::eye(3)).unwrap();
    let err = MeanVarianceOptimizer::new(seeded(1)).optimize(&r, &cov).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput { .. }));
  }
}
