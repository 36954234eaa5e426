//! # Historical Mean Predictor
//!
//! $$
//! \hat r_{i,T+1} = \frac1T \sum_{t=1}^{T} r_{i,t}
//! $$
//!

use ndarray::Array1;

use super::ReturnPredictor;
use crate::data::AlignedReturns;
use crate::error::Result;

/// Forecasts each asset's next return as its historical mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct HistoricalMean;

impl ReturnPredictor for HistoricalMean {
  fn name(&self) -> &'static str {
    "historical_mean"
  }

  fn predict(&self, returns: &AlignedReturns) -> Result<Array1<f64>> {
    Ok(returns.mean_returns())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn predicts_row_means() {
    let r = AlignedReturns::from_rows(&[vec![0.01, 0.03, 0.02], vec![0.0, -0.03, 0.0]]).unwrap();
    let mu = HistoricalMean.predict(&r).unwrap();
    assert!((mu[0] - 0.02).abs() < 1e-15);
    assert!((mu[1] + 0.01).abs() < 1e-15);
  }
}
