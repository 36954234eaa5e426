use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use portfolio_rs::data::align_return_series;
use portfolio_rs::data::simple_returns_series;
use portfolio_rs::data::PriceTable;
use portfolio_rs::types::equal_weights;
use portfolio_rs::OptimizationRequest;
use portfolio_rs::OptimizerMethod;
use portfolio_rs::PerformanceSummary;
use portfolio_rs::PortfolioEngine;
use portfolio_rs::PortfolioEngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
  author,
  version,
  about = "Long-only portfolio weight optimization over a CSV of prices",
  after_help = "EXAMPLES:
    # Mean-variance weights for every column of prices.csv
    portfolio-rs prices.csv

    # Seeded Monte Carlo with 500 scenarios, reporting beta against SPY
    portfolio-rs prices.csv --strategy monte_carlo --simulations 500 --seed 7 --benchmark SPY"
)]
struct Args {
  /// CSV with a header row of asset ids and one row of prices per period
  prices: PathBuf,

  /// mean_variance | max_sharpe | monte_carlo | local_search
  #[arg(short, long, default_value = "mean_variance")]
  strategy: OptimizerMethod,

  /// Seed for every randomized strategy (entropy when omitted)
  #[arg(long)]
  seed: Option<u64>,

  /// Monte Carlo scenario count
  #[arg(long, default_value_t = 2500)]
  simulations: usize,

  /// Per-period risk-free rate
  #[arg(long, default_value_t = 0.0)]
  risk_free_rate: f64,

  /// Iteration budget of the solvers and the local search
  #[arg(long, default_value_t = 5000)]
  iterations: u64,

  /// Column held out of the allocation and used as the market for beta
  #[arg(long)]
  benchmark: Option<String>,
}

fn main() -> anyhow::Result<()> {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portfolio_rs=info"));
  tracing_subscriber::fmt().with_env_filter(env_filter).init();

  let args = Args::parse();

  let mut table = PriceTable::from_path(&args.prices)?;
  let benchmark = match &args.benchmark {
    Some(name) => {
      let prices = table
        .remove(name)
        .with_context(|| format!("benchmark column '{name}' not found"))?;
      Some(simple_returns_series(&prices).with_context(|| format!("benchmark '{name}'"))?)
    }
    None => None,
  };
  info!(
    assets = table.assets().len(),
    periods = table.periods(),
    method = %args.strategy,
    "loaded prices"
  );

  let request = OptimizationRequest::from_prices(table.into_series(), args.strategy)?;
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    random_seed: args.seed,
    num_simulations: args.simulations,
    risk_free_rate: args.risk_free_rate,
    iteration_budget: args.iterations,
    ..Default::default()
  });
  let allocation = engine.optimize(&request)?;

  println!("Strategy: {} ({:?})", args.strategy, allocation.result().status);
  println!("{:<12} {:>10} {:>10}", "asset", "weight %", "equal %");
  let baseline = equal_weights(allocation.assets().len());
  for ((id, pct), eq) in allocation.as_percentages().iter().zip(&baseline) {
    println!("{id:<12} {pct:>10.2} {:>10.2}", 100.0 * eq);
  }

  let aligned = align_return_series(&request.returns()?)?;
  let rf = engine.config().risk_free_rate;
  let summary = PerformanceSummary::compute(allocation.weights(), &aligned, rf)?;
  let eq_summary = PerformanceSummary::compute(&baseline, &aligned, rf)?;

  println!();
  println!("{:<20} {:>12} {:>12}", "metric", "optimized", "equal");
  for (name, a, b) in [
    ("mean return", summary.mean_return, eq_summary.mean_return),
    ("volatility", summary.volatility, eq_summary.volatility),
    ("cumulative return", summary.cumulative_return, eq_summary.cumulative_return),
    ("compounded return", summary.compounded_return, eq_summary.compounded_return),
    ("sharpe", summary.sharpe, eq_summary.sharpe),
    ("max drawdown", summary.max_drawdown, eq_summary.max_drawdown),
    ("skewness", summary.skewness, eq_summary.skewness),
    ("kurtosis", summary.kurtosis, eq_summary.kurtosis),
    ("mse vs mean", summary.mse_vs_mean, eq_summary.mse_vs_mean),
  ] {
    println!("{name:<20} {a:>12.6} {b:>12.6}");
  }
  if let Some(market) = benchmark {
    println!(
      "{:<20} {:>12.6} {:>12.6}",
      "beta",
      summary.beta(&market)?,
      eq_summary.beta(&market)?
    );
  }

  Ok(())
}
