//! # Portfolio Data
//!
//! $$
//! r_t = \frac{p_t - p_{t-1}}{p_{t-1}},\qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{it}-\bar r_i)(r_{jt}-\bar r_j)
//! $$
//!
//! Price table loading, return derivation, tail alignment and covariance
//! estimation.

pub mod align;
pub mod covariance;
pub mod prices;
pub mod returns;

pub use align::align_return_series;
pub use align::AlignedReturns;
pub use covariance::CovarianceMatrix;
pub use prices::PriceTable;
pub use returns::log_returns_series;
pub use returns::simple_returns_series;
