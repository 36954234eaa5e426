//! # Performance Metrics
//!
//! $$
//! r^p_t = \mathbf w^\top \mathbf r_t,\qquad
//! \mathrm{SR} = \frac{\bar r^p - r_f}{\sigma_p},\qquad
//! \mathrm{MDD} = \max_t \left(1 - \frac{V_t}{\max_{s \le t} V_s}\right),\
//! V_t = \prod_{s \le t}(1 + r^p_s),\qquad
//! \beta = \frac{\mathrm{Cov}(r^p, r^m)}{\mathrm{Var}(r^m)}
//! $$
//!
//! Backward-looking diagnostics of a weight vector over the aligned history.

use ndarray::Array1;
use ndarray::Axis;
use ndarray_stats::SummaryStatisticsExt;

use crate::data::AlignedReturns;
use crate::error::PortfolioError;
use crate::error::Result;

/// Per-period portfolio returns `w' r_t`.
pub fn portfolio_returns(weights: &[f64], returns: &AlignedReturns) -> Result<Array1<f64>> {
  if weights.len() != returns.n_assets() {
    return Err(PortfolioError::invalid(format!(
      "{} weights for {} assets",
      weights.len(),
      returns.n_assets()
    )));
  }
  let w = Array1::from(weights.to_vec());
  Ok(returns.as_array().t().dot(&w))
}

/// Largest peak-to-trough loss of the compounded wealth curve, as a fraction.
pub fn max_drawdown(period_returns: &[f64]) -> f64 {
  let mut wealth = 1.0_f64;
  let mut peak = 1.0_f64;
  let mut worst = 0.0_f64;
  for r in period_returns {
    wealth *= 1.0 + r;
    peak = peak.max(wealth);
    if peak > 0.0 {
      worst = worst.max(1.0 - wealth / peak);
    }
  }
  worst
}

/// Sample covariance of the portfolio with the market over sample market
/// variance. Both series are aligned on their most recent common periods.
pub fn beta(portfolio: &[f64], market: &[f64]) -> Result<f64> {
  let t = portfolio.len().min(market.len());
  if t < 2 {
    return Err(PortfolioError::insufficient(format!(
      "beta needs at least 2 common periods, got {t}"
    )));
  }
  let p = &portfolio[portfolio.len() - t..];
  let m = &market[market.len() - t..];
  if p.iter().chain(m).any(|v| !v.is_finite()) {
    return Err(PortfolioError::invalid("beta inputs contain non-finite returns"));
  }

  let p_mean = p.iter().sum::<f64>() / t as f64;
  let m_mean = m.iter().sum::<f64>() / t as f64;
  let (mut cov, mut var) = (0.0, 0.0);
  for (x, y) in p.iter().zip(m) {
    cov += (x - p_mean) * (y - m_mean);
    var += (y - m_mean) * (y - m_mean);
  }
  if var <= 1e-30 {
    return Err(PortfolioError::invalid("market returns have zero variance"));
  }
  // the T - 1 normalizers cancel
  Ok(cov / var)
}

#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceSummary {
  /// Per-period portfolio returns the summary was computed from.
  pub period_returns: Vec<f64>,
  pub mean_return: f64,
  /// Sample standard deviation of the per-period portfolio return.
  pub volatility: f64,
  /// Sum of per-period returns.
  pub cumulative_return: f64,
  /// `prod (1 + r_t) - 1`.
  pub compounded_return: f64,
  pub sharpe: f64,
  pub max_drawdown: f64,
  pub skewness: f64,
  /// Non-excess kurtosis (3 for a normal distribution).
  pub kurtosis: f64,
  /// Mean squared gap between the portfolio return and the cross-sectional mean return.
  pub mse_vs_mean: f64,
}

impl PerformanceSummary {
  pub fn compute(weights: &[f64], returns: &AlignedReturns, risk_free_rate: f64) -> Result<Self> {
    let rp = portfolio_returns(weights, returns)?;
    let t = rp.len() as f64;

    let mean_return = rp.sum() / t;
    let volatility = rp.std(1.0);
    let sharpe = if volatility > 1e-15 {
      (mean_return - risk_free_rate) / volatility
    } else {
      0.0
    };

    // Central-moment ratios are undefined for a flat series.
    let (skewness, kurtosis) = if volatility > 1e-15 {
      let skew = rp
        .skewness()
        .map_err(|e| PortfolioError::insufficient(e.to_string()))?;
      let kurt = rp
        .kurtosis()
        .map_err(|e| PortfolioError::insufficient(e.to_string()))?;
      (skew, kurt)
    } else {
      (0.0, 0.0)
    };

    let cross_mean = returns.as_array().mean_axis(Axis(0)).ok_or_else(|| {
      PortfolioError::insufficient("aligned return matrix has no assets")
    })?;
    let mse_vs_mean = (&rp - &cross_mean).mapv(|d| d * d).sum() / t;

    let period_returns = rp.to_vec();
    let drawdown = max_drawdown(&period_returns);
    Ok(Self {
      period_returns,
      mean_return,
      volatility,
      cumulative_return: rp.sum(),
      compounded_return: rp.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0,
      sharpe,
      max_drawdown: drawdown,
      skewness,
      kurtosis,
      mse_vs_mean,
    })
  }

  /// Beta of the summarized portfolio against `market` returns.
  pub fn beta(&self, market: &[f64]) -> Result<f64> {
    beta(&self.period_returns, market)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn two_assets() -> AlignedReturns {
    AlignedReturns::from_rows(&[vec![0.10, -0.20, 0.05, 0.01], vec![0.00, 0.02, 0.01, 0.03]])
      .unwrap()
  }

  #[test]
  fn portfolio_returns_are_weighted_sums() {
    let rp = portfolio_returns(&[0.5, 0.5], &two_assets()).unwrap();
    assert_abs_diff_eq!(rp[0], 0.05, epsilon = 1e-15);
    assert_abs_diff_eq!(rp[1], -0.09, epsilon = 1e-15);
    assert!(portfolio_returns(&[1.0], &two_assets()).is_err());
  }

  #[test]
  fn drawdown_of_a_known_path() {
    // 1.0 -> 1.1 -> 0.88 -> 0.924
    assert_abs_diff_eq!(max_drawdown(&[0.1, -0.2, 0.05]), 0.2, epsilon = 1e-12);
    assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
  }

  #[test]
  fn summary_of_single_asset_portfolio() {
    let s = PerformanceSummary::compute(&[1.0, 0.0], &two_assets(), 0.0).unwrap();
    assert_abs_diff_eq!(s.mean_return, -0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(s.cumulative_return, -0.04, epsilon = 1e-12);
    assert_abs_diff_eq!(
      s.compounded_return,
      1.1 * 0.8 * 1.05 * 1.01 - 1.0,
      epsilon = 1e-12
    );
    assert_abs_diff_eq!(s.max_drawdown, 0.2, epsilon = 1e-12);
    assert!(s.sharpe < 0.0);
    assert!(s.skewness.is_finite() && s.kurtosis > 0.0);
  }

  #[test]
  fn beta_against_scaled_and_longer_markets() {
    let p = [0.01, 0.03, -0.02, 0.02];
    assert_abs_diff_eq!(beta(&p, &p).unwrap(), 1.0, epsilon = 1e-12);

    let doubled: Vec<f64> = p.iter().map(|x| 2.0 * x).collect();
    assert_abs_diff_eq!(beta(&p, &doubled).unwrap(), 0.5, epsilon = 1e-12);

    // Extra leading market history is ignored.
    let longer = [0.5, -0.4, 0.01, 0.03, -0.02, 0.02];
    assert_abs_diff_eq!(beta(&p, &longer).unwrap(), 1.0, epsilon = 1e-12);

    let s = PerformanceSummary::compute(&[0.0, 1.0], &two_assets(), 0.0).unwrap();
    assert_eq!(s.period_returns, vec![0.00, 0.02, 0.01, 0.03]);
    assert_abs_diff_eq!(s.beta(&[0.00, 0.02, 0.01, 0.03]).unwrap(), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn beta_rejects_flat_or_short_markets() {
    let p = [0.01, 0.03, -0.02];
    assert!(matches!(
      beta(&p, &[0.01, 0.01, 0.01]),
      Err(PortfolioError::InvalidInput { .. })
    ));
    assert!(matches!(
      beta(&p, &[0.01]),
      Err(PortfolioError::InsufficientData { .. })
    ));
    assert!(beta(&p, &[0.01, f64::NAN, 0.02]).is_err());
  }

  #[test]
  fn flat_portfolio_has_zero_sharpe() {
    let r = AlignedReturns::from_rows(&[vec![0.0625; 4], vec![0.0625; 4]]).unwrap();
    let s = PerformanceSummary::compute(&[0.5, 0.5], &r, 0.0).unwrap();
    assert_eq!(s.volatility, 0.0);
    assert_eq!(s.sharpe, 0.0);
    assert_eq!(s.skewness, 0.0);
    assert_eq!(s.mse_vs_mean, 0.0);
  }
}
