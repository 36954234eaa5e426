//! # Errors
//!
//! $$
//! \text{run} \to \{\text{Converged},\ \text{BudgetExhausted}\} \cup \{\text{Failed}(e)\}
//! $$
//!
//! Failure taxonomy shared by every stage of the optimization pipeline.
//! Non-convergence is not an error: it is reported through
//! [`crate::types::Diagnostics::converged`] and a `tracing` warning.

use thiserror::Error;

use crate::types::OptimizerMethod;

/// Errors surfaced by alignment, estimation, prediction and optimization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  /// Fewer than two assets, or a horizon too short for the requested statistic.
  #[error("insufficient data: {reason}")]
  InsufficientData { reason: String },

  /// The strategy could not produce a single candidate weight vector.
  #[error("{strategy} optimization failed: {reason}")]
  Optimization {
    strategy: OptimizerMethod,
    reason: String,
  },

  /// Malformed request or parameter.
  #[error("invalid input: {reason}")]
  InvalidInput { reason: String },
}

impl PortfolioError {
  pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
    Self::InsufficientData {
      reason: reason.into(),
    }
  }

  pub(crate) fn optimization(strategy: OptimizerMethod, reason: impl Into<String>) -> Self {
    Self::Optimization {
      strategy,
      reason: reason.into(),
    }
  }

  pub(crate) fn invalid(reason: impl Into<String>) -> Self {
    Self::InvalidInput {
      reason: reason.into(),
    }
  }
}

pub type Result<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn optimization_error_names_the_strategy() {
    let err = PortfolioError::optimization(OptimizerMethod::MonteCarlo, "no samples");
    assert_eq!(err.to_string(), "monte_carlo optimization failed: no samples");
  }
}
