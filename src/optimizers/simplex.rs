//! # Simplex Parameterization
//!
//! $$
//! \mathbf w = \Pi_{\mathcal W}\big(\operatorname{softmax}(\mathbf x)\big),\qquad
//! \Pi_{\mathcal W}(\mathbf v)_i = \operatorname{clamp}(v_i - \tau, \ell, u)
//! $$
//!
//! Maps an unconstrained Nelder-Mead parameter onto the box-constrained weight
//! simplex so the solver never proposes an infeasible allocation.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use rand::Rng;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::OptimizerMethod;
use crate::types::WeightBounds;

const PROJECTION_ITERS: usize = 200;

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
  a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if !(sum > 1e-15) || !sum.is_finite() {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

/// Euclidean projection onto `{w : sum w = 1, min <= w_i <= max}` by bisection
/// on the shift `tau`. Bounds must be feasible for `v.len()` assets.
pub fn project_to_bounds(v: &[f64], bounds: WeightBounds) -> Vec<f64> {
  let n = v.len();
  if n == 0 {
    return Vec::new();
  }

  let total = |tau: f64| -> f64 {
    v.iter()
      .map(|&x| (x - tau).clamp(bounds.min, bounds.max))
      .sum()
  };
  let v_min = v.iter().cloned().fold(f64::INFINITY, f64::min);
  let v_max = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

  // total(lo) = n * max >= 1 and total(hi) = n * min <= 1
  let mut lo = v_min - bounds.max;
  let mut hi = v_max - bounds.min;
  for _ in 0..PROJECTION_ITERS {
    let mid = 0.5 * (lo + hi);
    if total(mid) > 1.0 {
      lo = mid;
    } else {
      hi = mid;
    }
    if hi - lo <= f64::EPSILON * (1.0 + hi.abs()) {
      break;
    }
  }

  let tau = 0.5 * (lo + hi);
  v.iter()
    .map(|&x| (x - tau).clamp(bounds.min, bounds.max))
    .collect()
}

/// Map a solver parameter to feasible weights.
pub(crate) fn to_weights(x: &[f64], bounds: WeightBounds) -> Vec<f64> {
  let w = softmax(x);
  if bounds == WeightBounds::default() {
    w
  } else {
    project_to_bounds(&w, bounds)
  }
}

/// Random starting parameter whose softmax is a normalized uniform draw.
pub(crate) fn random_start<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
  (0..n).map(|_| rng.gen_range(1e-6..1.0_f64).ln()).collect()
}

struct SimplexObjective<F> {
  objective: F,
  bounds: WeightBounds,
}

impl<F> CostFunction for SimplexObjective<F>
where
  F: Fn(&[f64]) -> f64,
{
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = to_weights(x, self.bounds);
    Ok((self.objective)(&w))
  }
}

#[derive(Clone, Debug)]
pub(crate) struct SolveOutcome {
  pub weights: Vec<f64>,
  pub cost: f64,
  pub converged: bool,
  pub iterations: u64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverSettings {
  pub bounds: WeightBounds,
  pub max_iters: u64,
  pub tolerance: f64,
}

/// Minimize `objective(w)` over the bounded simplex with Nelder-Mead started at `x0`.
pub(crate) fn minimize_on_simplex<F>(
  objective: F,
  x0: Vec<f64>,
  settings: SolverSettings,
  strategy: OptimizerMethod,
) -> Result<SolveOutcome>
where
  F: Fn(&[f64]) -> f64,
{
  let n = x0.len();
  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(x0.clone());
  for i in 0..n {
    let mut point = x0.clone();
    point[i] += 1.0;
    simplex.push(point);
  }

  let cost = SimplexObjective {
    objective,
    bounds: settings.bounds,
  };

  let solver = NelderMead::new(simplex)
    .with_sd_tolerance(settings.tolerance)
    .map_err(|e| PortfolioError::optimization(strategy, e.to_string()))?;

  let res = Executor::new(cost, solver)
    .configure(|state| state.max_iters(settings.max_iters))
    .run()
    .map_err(|e| PortfolioError::optimization(strategy, e.to_string()))?;

  let converged = matches!(
    res.state.get_termination_reason(),
    Some(TerminationReason::SolverConverged)
  );
  let iterations = res.state.get_iter();
  let best_cost = res.state.get_best_cost();
  let best_x = res
    .state
    .best_param
    .ok_or_else(|| PortfolioError::optimization(strategy, "solver returned no iterate"))?;

  Ok(SolveOutcome {
    weights: to_weights(&best_x, settings.bounds),
    cost: best_cost,
    converged,
    iterations,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  use super::*;

  #[test]
  fn softmax_is_on_simplex() {
    let w = softmax(&[1000.0, 0.0, -1000.0]);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert!(w.iter().all(|&x| x >= 0.0));
  }

  #[test]
  fn projection_respects_bounds_and_sum() {
    let bounds = WeightBounds::new(0.01, 0.5).unwrap();
    let w = project_to_bounds(&[0.9, 0.1, 0.0], bounds);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(w.iter().all(|&x| (0.01..=0.5).contains(&x)));
    assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-9);
  }

  #[test]
  fn projection_is_identity_inside_region() {
    let w = project_to_bounds(&[0.2, 0.3, 0.5], WeightBounds::default());
    assert_abs_diff_eq!(w[0], 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(w[2], 0.5, epsilon = 1e-12);
  }

  #[test]
  fn minimizes_quadratic_on_simplex() {
    // min (w0 - 0.7)^2 + (w1 - 0.3)^2 has its optimum on the simplex.
    let settings = SolverSettings {
      bounds: WeightBounds::default(),
      max_iters: 2000,
      tolerance: 1e-14,
    };
    let mut rng = StdRng::seed_from_u64(1);
    let out = minimize_on_simplex(
      |w| (w[0] - 0.7).powi(2) + (w[1] - 0.3).powi(2),
      random_start(2, &mut rng),
      settings,
      OptimizerMethod::MeanVariance,
    )
    .unwrap();
    assert_abs_diff_eq!(out.weights[0], 0.7, epsilon = 1e-4);
    assert_abs_diff_eq!(out.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
  }
}
