//! # portfolio-rs
//!
//! $$
//! \mathbf w^\* \in \Delta^{A-1} = \{\mathbf w \ge 0 : \textstyle\sum_i w_i = 1\}
//! $$
//!
//! Long-only portfolio weight optimization over aligned historical returns.
//!
//! | Strategy | Objective |
//! |---|---|
//! | [`OptimizerMethod::MeanVariance`] | predicted return against volatility |
//! | [`OptimizerMethod::MaxSharpe`] | historical tangency portfolio |
//! | [`OptimizerMethod::MonteCarlo`] | mean of per-scenario max-Sharpe weights |
//! | [`OptimizerMethod::LocalSearch`] | annealing-style minimum variance |
//!
//! Start from [`PortfolioEngine`] for the full request pipeline, or use the
//! optimizers in [`optimizers`] directly on an [`AlignedReturns`] matrix.
//! The `ai` feature adds a candle-based neural return predictor.

pub mod data;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod optimizers;
pub mod predictor;
pub mod types;

pub use data::AlignedReturns;
pub use data::CovarianceMatrix;
pub use data::PriceTable;
pub use engine::Allocation;
pub use engine::OptimizationRequest;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::SeriesKind;
pub use error::PortfolioError;
pub use error::Result;
pub use metrics::PerformanceSummary;
pub use optimizers::PortfolioOptimizer;
pub use predictor::PredictorKind;
pub use predictor::ReturnPredictor;
pub use types::OptimizationResult;
pub use types::OptimizerMethod;
pub use types::RunStatus;
pub use types::WeightBounds;
