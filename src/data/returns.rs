//! # Return Series
//!
//! $$
//! r_t = \frac{p_t}{p_{t-1}} - 1
//! $$
//!

use crate::error::PortfolioError;
use crate::error::Result;

fn check_prices(closes: &[f64]) -> Result<()> {
  if let Some((i, p)) = closes
    .iter()
    .enumerate()
    .find(|(_, p)| !p.is_finite() || **p <= 0.0)
  {
    return Err(PortfolioError::invalid(format!(
      "price at index {i} must be finite and positive, got {p}"
    )));
  }
  Ok(())
}

/// Convert close prices to simple (percentage-change) returns.
///
/// The first, undefined element is dropped, so `n` prices yield `n - 1` returns.
pub fn simple_returns_series(closes: &[f64]) -> Result<Vec<f64>> {
  check_prices(closes)?;
  Ok(closes.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect())
}

/// Convert close prices to log returns.
pub fn log_returns_series(closes: &[f64]) -> Result<Vec<f64>> {
  check_prices(closes)?;
  Ok(closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}
