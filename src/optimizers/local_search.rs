//! # Local Search Optimizer
//!
//! $$
//! \mathbf w' = \frac{(\mathbf w + \boldsymbol\varepsilon)^+}
//!   {\lVert(\mathbf w + \boldsymbol\varepsilon)^+\rVert_1},\quad
//! \varepsilon_i \sim \mathcal U(-s, s),\quad
//! P(\text{accept}) = \min\!\left(1, e^{-\Delta / T_k}\right),\quad
//! T_0 = \tau\,\mathbf w_{eq}^\top\Sigma\mathbf w_{eq},\quad T_{k+1} = c\,T_k
//! $$
//!
//! Annealing-style stochastic search minimizing `w' S w` over the weight simplex.
//! Runs for a fixed number of iterations and returns the best vector visited.
//! The temperature is measured in units of the starting portfolio's variance,
//! so the acceptance schedule does not depend on the scale of the returns.

use std::time::Duration;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::check_dimensions;
use super::sharpe;
use super::simplex::dot;
use super::simplex::project_to_bounds;
use super::PortfolioOptimizer;
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
pub struct LocalSearchConfig {
  pub iterations: u64,
  /// Half-width `s` of the uniform perturbation.
  pub step: f64,
  /// `tau`, relative to the variance of the equal-weight start.
  pub initial_temperature: f64,
  /// Geometric decay factor `c` in `(0, 1]`.
  pub cooling_rate: f64,
  pub risk_free_rate: f64,
  pub bounds: WeightBounds,
  pub random_seed: Option<u64>,
  pub deadline: Option<Duration>,
}

impl Default for LocalSearchConfig {
  fn default() -> Self {
    Self {
      iterations: 5000,
      step: 0.05,
      initial_temperature: 1.0,
      cooling_rate: 0.999,
      risk_free_rate: 0.0,
      bounds: WeightBounds::default(),
      random_seed: None,
      deadline: None,
    }
  }
}

impl LocalSearchConfig {
  fn validate(&self) -> Result<()> {
    if !(self.step > 0.0) || !self.step.is_finite() {
      return Err(PortfolioError::invalid("local search step must be positive"));
    }
    if !(self.initial_temperature > 0.0) || !self.initial_temperature.is_finite() {
      return Err(PortfolioError::invalid("initial temperature must be positive"));
    }
    if !(self.cooling_rate > 0.0 && self.cooling_rate <= 1.0) {
      return Err(PortfolioError::invalid("cooling rate must lie in (0, 1]"));
    }
    Ok(())
  }
}

/// Smallest starting temperature, used when the start has zero variance.
const MIN_TEMPERATURE: f64 = 1e-300;

fn starting_temperature(cfg: &LocalSearchConfig, start_variance: f64) -> f64 {
  cfg.initial_temperature * start_variance.max(MIN_TEMPERATURE)
}

/// Metropolis rule: downhill always, uphill with probability `exp(-delta / T)`.
fn accept<R: Rng + ?Sized>(delta: f64, temperature: f64, rng: &mut R) -> bool {
  delta <= 0.0 || rng.gen::<f64>() < (-delta / temperature).exp()
}

#[derive(Clone, Debug)]
pub struct LocalSearchOptimizer {
  config: LocalSearchConfig,
}

impl LocalSearchOptimizer {
  pub fn new(config: LocalSearchConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &LocalSearchConfig {
    &self.config
  }

  /// Perturb, clip to long-only and renormalize. `None` when every weight
  /// was clipped away.
  fn propose<R: Rng + ?Sized>(&self, w: &[f64], rng: &mut R) -> Option<Vec<f64>> {
    let step = self.config.step;
    let mut candidate: Vec<f64> = w
      .iter()
      .map(|&wi| (wi + rng.gen_range(-step..=step)).max(0.0))
      .collect();
    let total: f64 = candidate.iter().sum();
    if !(total > 1e-12) {
      return None;
    }
    candidate.iter_mut().for_each(|c| *c /= total);

    if self.config.bounds != WeightBounds::default() {
      candidate = project_to_bounds(&candidate, self.config.bounds);
    }
    Some(candidate)
  }
}

impl PortfolioOptimizer for LocalSearchOptimizer {
  fn method(&self) -> OptimizerMethod {
    OptimizerMethod::LocalSearch
  }

  fn optimize(
    &self,
    returns: &AlignedReturns,
    cov: &CovarianceMatrix,
  ) -> Result<OptimizationResult> {
    let n = check_dimensions(returns, cov)?;
    let cfg = &self.config;
    cfg.bounds.check_feasible(n)?;
    cfg.validate()?;

    let mut rng = match cfg.random_seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    debug!(
      assets = n,
      iterations = cfg.iterations,
      step = cfg.step,
      "starting local search"
    );

    let mut current = equal_weights(n);
    if cfg.bounds != WeightBounds::default() {
      current = project_to_bounds(&current, cfg.bounds);
    }
    let mut current_risk = cov.portfolio_variance(&current);
    let mut best = current.clone();
    let mut best_risk = current_risk;
    let mut temperature = starting_temperature(cfg, current_risk);

    let started = Instant::now();
    let mut performed = 0u64;
    let mut rejected_collapsed = 0u64;
    let mut cut_short = false;

    for _ in 0..cfg.iterations {
      if cfg.deadline.is_some_and(|d| started.elapsed() >= d) {
        cut_short = true;
        break;
      }
      performed += 1;

      if let Some(candidate) = self.propose(&current, &mut rng) {
        let risk = cov.portfolio_variance(&candidate);
        let delta = risk - current_risk;
        if accept(delta, temperature, &mut rng) {
          current = candidate;
          current_risk = risk;
          if current_risk < best_risk {
            best.clone_from(&current);
            best_risk = current_risk;
          }
        }
      } else {
        rejected_collapsed += 1;
      }

      temperature *= cfg.cooling_rate;
    }

    if cut_short {
      warn!(
        performed,
        budget = cfg.iterations,
        "local search stopped at its deadline before finishing the iteration budget"
      );
    }

    let mean = returns.mean_returns().to_vec();
    let expected_return = dot(&mean, &best);
    let volatility = best_risk.max(0.0).sqrt();
    info!(
      iterations = performed,
      rejected_collapsed,
      variance = best_risk,
      "local search finished"
    );

    Ok(OptimizationResult {
      weights: best,
      strategy: self.method(),
      status: RunStatus::BudgetExhausted,
      diagnostics: Diagnostics {
        objective: Some(best_risk),
        converged: !cut_short,
        equal_weights: Some(equal_weights(n)),
        expected_return,
        volatility,
        sharpe: sharpe(expected_return, cfg.risk_free_rate, volatility),
        iterations: performed,
        ..Default::default()
      },
    })
  }
}
