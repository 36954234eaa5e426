//! # Portfolio Engine
//!
//! $$
//! (\text{ids}, P) \xrightarrow{\ r\ } R \xrightarrow{\ \text{align}\ } R_{A\times T}
//! \xrightarrow{\ \hat\Sigma\ } \operatorname{Optimize}_m(R, \hat\Sigma) \to \mathbf w^\*
//! $$
//!
//! High-level orchestration: request validation, return derivation, alignment,
//! covariance estimation and dispatch on [`OptimizerMethod`].

use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;
use tracing::info;

use crate::data::align_return_series;
use crate::data::simple_returns_series;
use crate::data::AlignedReturns;
use crate::data::CovarianceMatrix;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::optimizers::LocalSearchConfig;
use crate::optimizers::LocalSearchOptimizer;
use crate::optimizers::MaxSharpeConfig;
use crate::optimizers::MaxSharpeOptimizer;
use crate::optimizers::MeanVarianceConfig;
use crate::optimizers::MeanVarianceOptimizer;
use crate::optimizers::MonteCarloConfig;
use crate::optimizers::MonteCarloOptimizer;
use crate::optimizers::PortfolioOptimizer;
use crate::predictor::PredictorKind;
use crate::types::OptimizationResult;
use crate::types::OptimizerMethod;
use crate::types::WeightBounds;
use crate::types::WEIGHT_SUM_TOLERANCE;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Risk-free rate used by the Monte Carlo objective and Sharpe diagnostics.
  pub risk_free_rate: f64,
  /// Volatility multiplier of the mean-variance objective.
  pub risk_penalty: f64,
  pub num_simulations: usize,
  /// `None` seeds every strategy from entropy.
  pub random_seed: Option<u64>,
  /// Iteration cap for the mean-variance and max-Sharpe solvers and the local search.
  pub iteration_budget: u64,
  pub bounds: WeightBounds,
  /// Return forecast used by the mean-variance strategy.
  pub predictor: PredictorKind,
  pub local_search_step: f64,
  pub initial_temperature: f64,
  pub cooling_rate: f64,
  /// Nelder-Mead iteration cap inside each Monte Carlo scenario.
  pub scenario_max_iters: u64,
  pub l2_regularization: f64,
  pub discard_unconverged: bool,
  /// Run Monte Carlo scenarios on the rayon pool.
  pub parallel: bool,
  pub deadline: Option<Duration>,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.0,
      risk_penalty: 1.0,
      num_simulations: 2500,
      random_seed: None,
      iteration_budget: 5000,
      bounds: WeightBounds::default(),
      predictor: PredictorKind::default(),
      local_search_step: 0.05,
      initial_temperature: 1.0,
      cooling_rate: 0.999,
      scenario_max_iters: 1000,
      l2_regularization: 0.0,
      discard_unconverged: false,
      parallel: true,
      deadline: None,
    }
  }
}

impl PortfolioEngineConfig {
  pub fn mean_variance(&self) -> MeanVarianceConfig {
    MeanVarianceConfig {
      risk_penalty: self.risk_penalty,
      risk_free_rate: self.risk_free_rate,
      bounds: self.bounds,
      max_iters: self.iteration_budget,
      random_seed: self.random_seed,
      ..Default::default()
    }
  }

  pub fn max_sharpe(&self) -> MaxSharpeConfig {
    MaxSharpeConfig {
      risk_free_rate: self.risk_free_rate,
      bounds: self.bounds,
      max_iters: self.iteration_budget,
      ..Default::default()
    }
  }

  pub fn monte_carlo(&self) -> MonteCarloConfig {
    MonteCarloConfig {
      num_simulations: self.num_simulations,
      risk_free_rate: self.risk_free_rate,
      l2_regularization: self.l2_regularization,
      bounds: self.bounds,
      max_iters: self.scenario_max_iters,
      random_seed: self.random_seed.map(|s| s ^ 0x4D43_5F53_4545_4421),
      discard_unconverged: self.discard_unconverged,
      parallel: self.parallel,
      deadline: self.deadline,
      ..Default::default()
    }
  }

  pub fn local_search(&self) -> LocalSearchConfig {
    LocalSearchConfig {
      iterations: self.iteration_budget,
      step: self.local_search_step,
      initial_temperature: self.initial_temperature,
      cooling_rate: self.cooling_rate,
      risk_free_rate: self.risk_free_rate,
      bounds: self.bounds,
      random_seed: self.random_seed.map(|s| s ^ 0x4C53_5F53_4545_4421),
      deadline: self.deadline,
    }
  }
}

/// How the per-asset series of a request are to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SeriesKind {
  /// Chronological prices; returns are derived with `(p_t - p_{t-1}) / p_{t-1}`.
  #[default]
  Prices,
  /// Periodic simple returns, used as given.
  Returns,
}

/// Ordered assets with their series and the strategy to run.
#[derive(Clone, Debug)]
pub struct OptimizationRequest {
  assets: Vec<String>,
  series: Vec<Vec<f64>>,
  kind: SeriesKind,
  method: OptimizerMethod,
}

impl OptimizationRequest {
  pub fn new(
    assets: Vec<String>,
    series: Vec<Vec<f64>>,
    kind: SeriesKind,
    method: OptimizerMethod,
  ) -> Result<Self> {
    if assets.len() != series.len() {
      return Err(PortfolioError::invalid(format!(
        "{} asset ids but {} series",
        assets.len(),
        series.len()
      )));
    }
    let mut seen = HashSet::with_capacity(assets.len());
    for id in &assets {
      if id.trim().is_empty() {
        return Err(PortfolioError::invalid("asset ids must be non-empty"));
      }
      if !seen.insert(id.as_str()) {
        return Err(PortfolioError::invalid(format!("duplicate asset id '{id}'")));
      }
    }

    Ok(Self {
      assets,
      series,
      kind,
      method,
    })
  }

  /// Build from `(id, prices)` pairs.
  pub fn from_prices<I, S>(pairs: I, method: OptimizerMethod) -> Result<Self>
  where
    I: IntoIterator<Item = (S, Vec<f64>)>,
    S: Into<String>,
  {
    let (assets, series): (Vec<String>, Vec<Vec<f64>>) =
      pairs.into_iter().map(|(id, s)| (id.into(), s)).unzip();
    Self::new(assets, series, SeriesKind::Prices, method)
  }

  /// Build from `(id, returns)` pairs.
  pub fn from_returns<I, S>(pairs: I, method: OptimizerMethod) -> Result<Self>
  where
    I: IntoIterator<Item = (S, Vec<f64>)>,
    S: Into<String>,
  {
    let (assets, series): (Vec<String>, Vec<Vec<f64>>) =
      pairs.into_iter().map(|(id, s)| (id.into(), s)).unzip();
    Self::new(assets, series, SeriesKind::Returns, method)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn kind(&self) -> SeriesKind {
    self.kind
  }

  pub fn method(&self) -> OptimizerMethod {
    self.method
  }

  /// Periodic returns of every asset, in request order.
  pub fn returns(&self) -> Result<Vec<Vec<f64>>> {
    match self.kind {
      SeriesKind::Returns => Ok(self.series.clone()),
      SeriesKind::Prices => self
        .assets
        .iter()
        .zip(&self.series)
        .map(|(id, prices)| {
          simple_returns_series(prices).map_err(|e| match e {
            PortfolioError::InvalidInput { reason } => {
              PortfolioError::invalid(format!("asset '{id}': {reason}"))
            }
            other => other,
          })
        })
        .collect(),
    }
  }
}

/// Weights keyed by asset id, in request order.
#[derive(Clone, Debug)]
pub struct Allocation {
  assets: Vec<String>,
  result: OptimizationResult,
}

impl Allocation {
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn weights(&self) -> &[f64] {
    &self.result.weights
  }

  pub fn result(&self) -> &OptimizationResult {
    &self.result
  }

  pub fn into_result(self) -> OptimizationResult {
    self.result
  }

  /// Fractional weight of `asset`, if present.
  pub fn weight(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.result.weights[i])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .assets
      .iter()
      .map(String::as_str)
      .zip(self.result.weights.iter().copied())
  }

  /// Percent view of the allocation; values sum to 100.
  pub fn as_percentages(&self) -> Vec<(String, f64)> {
    self
      .iter()
      .map(|(id, w)| (id.to_string(), 100.0 * w))
      .collect()
  }
}

/// Single entry point from raw series to an allocation.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Derive returns, align, estimate covariance and run the requested strategy.
  pub fn optimize(&self, request: &OptimizationRequest) -> Result<Allocation> {
    let returns = request.returns()?;
    let aligned = align_return_series(&returns)?;
    debug!(
      assets = aligned.n_assets(),
      horizon = aligned.horizon(),
      kind = ?request.kind(),
      method = %request.method(),
      "aligned request series"
    );

    let result = self.optimize_aligned(&aligned, request.method())?;
    Ok(Allocation {
      assets: request.assets().to_vec(),
      result,
    })
  }

  /// Run `method` on an already aligned return matrix.
  pub fn optimize_aligned(
    &self,
    returns: &AlignedReturns,
    method: OptimizerMethod,
  ) -> Result<OptimizationResult> {
    let cov = CovarianceMatrix::estimate(returns)?;
    let result = match method {
      OptimizerMethod::MeanVariance => MeanVarianceOptimizer::with_predictor(
        self.config.mean_variance(),
        self.config.predictor.build(),
      )
      .optimize(returns, &cov)?,
      OptimizerMethod::MaxSharpe => {
        MaxSharpeOptimizer::new(self.config.max_sharpe()).optimize(returns, &cov)?
      }
      OptimizerMethod::MonteCarlo => {
        MonteCarloOptimizer::new(self.config.monte_carlo()).optimize(returns, &cov)?
      }
      OptimizerMethod::LocalSearch => {
        LocalSearchOptimizer::new(self.config.local_search()).optimize(returns, &cov)?
      }
    };

    check_weights(&result)?;
    info!(
      method = %method,
      status = ?result.status,
      converged = result.converged(),
      "portfolio optimized"
    );
    Ok(result)
  }
}

fn check_weights(result: &OptimizationResult) -> Result<()> {
  let sum: f64 = result.weights.iter().sum();
  let valid = result.weights.iter().all(|w| w.is_finite() && *w >= -WEIGHT_SUM_TOLERANCE)
    && (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE;
  if !valid {
    return Err(PortfolioError::optimization(
      result.strategy,
      format!("weights {:?} do not form a long-only allocation", result.weights),
    ));
  }
  Ok(())
}
