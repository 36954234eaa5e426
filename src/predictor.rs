//! # Return Predictors
//!
//! $$
//! \hat{\mathbf r}_{T+1} = f(R)
//! $$
//!
//! Point forecasts of next-period returns consumed by the mean-variance optimizer.
//! The optimizer only sees the [`ReturnPredictor`] contract, never the model.

pub mod historical_mean;
#[cfg(feature = "ai")]
pub mod neural_net;

use ndarray::Array1;

use crate::data::AlignedReturns;
use crate::error::Result;

pub use historical_mean::HistoricalMean;
#[cfg(feature = "ai")]
pub use neural_net::NeuralNetConfig;
#[cfg(feature = "ai")]
pub use neural_net::NeuralNetPredictor;

/// Produces one predicted next-period return per asset.
pub trait ReturnPredictor: Send + Sync {
  fn name(&self) -> &'static str;

  fn predict(&self, returns: &AlignedReturns) -> Result<Array1<f64>>;
}

/// Predictor selection carried by the engine configuration.
#[derive(Clone, Debug, Default)]
pub enum PredictorKind {
  #[default]
  HistoricalMean,
  /// Feed-forward network on candle, available with the `ai` feature.
  #[cfg(feature = "ai")]
  NeuralNet(NeuralNetConfig),
}

impl PredictorKind {
  pub fn build(&self) -> Box<dyn ReturnPredictor> {
    match self {
      Self::HistoricalMean => Box::new(HistoricalMean),
      #[cfg(feature = "ai")]
      Self::NeuralNet(config) => Box::new(NeuralNetPredictor::new(config.clone())),
    }
  }
}

impl<P: ReturnPredictor + ?Sized> ReturnPredictor for Box<P> {
  fn name(&self) -> &'static str {
    (**self).name()
  }

  fn predict(&self, returns: &AlignedReturns) -> Result<Array1<f64>> {
    (**self).predict(returns)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_kind_builds_historical_mean() {
    let predictor = PredictorKind::default().build();
    assert_eq!(predictor.name(), "historical_mean");

    let r = AlignedReturns::from_rows(&[vec![0.01, 0.03], vec![0.0, 0.02]]).unwrap();
    assert_eq!(predictor.predict(&r).unwrap(), r.mean_returns());
  }
}
