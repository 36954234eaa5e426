//! # Neural Network Return Predictor
//!
//! $$
//! \hat{\mathbf r}_{t+1} = W_2\,\mathrm{ReLU}(W_1 \mathbf r_t + b_1) + b_2
//! $$
//!
//! One-hidden-layer feed-forward network trained with full-batch AdamW on the
//! `T - 1` consecutive pairs `(r_t, r_{t+1})` of the aligned matrix. Inputs and
//! targets are standardized per asset.

use candle_core::DType;
use candle_core::Device;
use candle_core::Tensor;
use candle_nn::linear;
use candle_nn::AdamW;
use candle_nn::Linear;
use candle_nn::Module;
use candle_nn::Optimizer;
use candle_nn::ParamsAdamW;
use candle_nn::VarBuilder;
use candle_nn::VarMap;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Uniform;
use tracing::debug;

use super::ReturnPredictor;
use crate::data::AlignedReturns;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::types::OptimizerMethod;

#[derive(Clone, Debug)]
pub struct NeuralNetConfig {
  pub hidden_dim: usize,
  pub epochs: usize,
  pub learning_rate: f64,
  pub random_seed: u64,
}

impl Default for NeuralNetConfig {
  fn default() -> Self {
    Self {
      hidden_dim: 32,
      epochs: 250,
      learning_rate: 5e-3,
      random_seed: 42,
    }
  }
}

/// Per-column standardization fitted on training data.
struct StandardScaler {
  mean: Array1<f64>,
  std: Array1<f64>,
}

impl StandardScaler {
  fn fit(x: &Array2<f64>) -> Self {
    let n = x.nrows() as f64;
    let mean = x.sum_axis(Axis(0)) / n;
    let std = x
      .axis_iter(Axis(1))
      .zip(mean.iter())
      .map(|(col, &m)| {
        let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        let sd = var.sqrt();
        if sd > 1e-12 {
          sd
        } else {
          1.0
        }
      })
      .collect::<Array1<f64>>();
    Self { mean, std }
  }

  fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
    (x - &self.mean) / &self.std
  }

  fn inverse_transform(&self, x: &Array2<f64>) -> Array2<f64> {
    x * &self.std + &self.mean
  }
}

struct ReturnNet {
  hidden: Linear,
  out: Linear,
}

impl ReturnNet {
  fn new(vs: VarBuilder, n_assets: usize, hidden_dim: usize) -> candle_core::Result<Self> {
    let hidden = linear(n_assets, hidden_dim, vs.pp("hidden"))?;
    let out = linear(hidden_dim, n_assets, vs.pp("out"))?;
    Ok(Self { hidden, out })
  }
}

impl Module for ReturnNet {
  fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
    let x = self.hidden.forward(xs)?.relu()?;
    self.out.forward(&x)
  }
}

fn array2_to_tensor(arr: &Array2<f64>, device: &Device) -> candle_core::Result<Tensor> {
  let arr = arr.as_standard_layout();
  let slice = arr
    .as_slice()
    .ok_or_else(|| candle_core::Error::Msg("array must be contiguous".to_string()))?;
  Tensor::from_slice(slice, (arr.nrows(), arr.ncols()), device)
}

/// Overwrite the layer parameters with Xavier-uniform draws from a seeded RNG,
/// so training is reproducible regardless of the device RNG.
fn seed_parameters(
  varmap: &mut VarMap,
  layers: &[(&str, usize, usize)],
  seed: u64,
  device: &Device,
) -> candle_core::Result<()> {
  let mut rng = StdRng::seed_from_u64(seed ^ 0x5EED_1234_ABCD_0F0F);
  for &(name, n_in, n_out) in layers {
    let lim = (6.0 / (n_in + n_out) as f64).sqrt();
    let w = Array2::random_using((n_out, n_in), Uniform::new(-lim, lim), &mut rng);
    varmap.set_one(format!("{name}.weight"), array2_to_tensor(&w, device)?)?;
    varmap.set_one(format!("{name}.bias"), Tensor::zeros(n_out, DType::F64, device)?)?;
  }
  Ok(())
}

/// Feed-forward regressor from `r_t` to `r_{t+1}`.
#[derive(Clone, Debug, Default)]
pub struct NeuralNetPredictor {
  config: NeuralNetConfig,
}

impl NeuralNetPredictor {
  pub fn new(config: NeuralNetConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &NeuralNetConfig {
    &self.config
  }

  /// Fit on `(x, y)` in standardized units and return the standardized forecast
  /// for `latest`, along with the final training loss.
  fn fit_and_forecast(
    &self,
    x: &Array2<f64>,
    y: &Array2<f64>,
    latest: &Array2<f64>,
  ) -> candle_core::Result<(Vec<f64>, f64)> {
    let cfg = &self.config;
    let n_assets = x.ncols();
    let device = Device::Cpu;

    let mut varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F64, &device);
    let model = ReturnNet::new(vs, n_assets, cfg.hidden_dim)?;
    seed_parameters(
      &mut varmap,
      &[("hidden", n_assets, cfg.hidden_dim), ("out", cfg.hidden_dim, n_assets)],
      cfg.random_seed,
      &device,
    )?;

    let optimizer_params = ParamsAdamW {
      lr: cfg.learning_rate,
      beta1: 0.9,
      beta2: 0.999,
      eps: 1e-8,
      weight_decay: 0.0,
    };
    let mut opt = AdamW::new(varmap.all_vars(), optimizer_params)?;

    let xt = array2_to_tensor(x, &device)?;
    let yt = array2_to_tensor(y, &device)?;
    for _ in 0..cfg.epochs {
      let pred = model.forward(&xt)?;
      let loss = candle_nn::loss::mse(&pred, &yt)?;
      opt.backward_step(&loss)?;
    }
    let loss = candle_nn::loss::mse(&model.forward(&xt)?, &yt)?.to_scalar::<f64>()?;

    let y_hat = model.forward(&array2_to_tensor(latest, &device)?)?;
    let forecast = y_hat.to_vec2::<f64>()?.into_iter().flatten().collect();
    Ok((forecast, loss))
  }
}

impl ReturnPredictor for NeuralNetPredictor {
  fn name(&self) -> &'static str {
    "neural_net"
  }

  fn predict(&self, returns: &AlignedReturns) -> Result<Array1<f64>> {
    let horizon = returns.horizon();
    if horizon < 3 {
      return Err(PortfolioError::insufficient(format!(
        "neural net predictor needs at least 3 periods (2 training pairs), got {horizon}"
      )));
    }
    if self.config.hidden_dim == 0 || !(self.config.learning_rate > 0.0) {
      return Err(PortfolioError::invalid(
        "neural net needs hidden_dim > 0 and a positive learning rate",
      ));
    }

    // periods x assets
    let series = returns.as_array().t().to_owned();
    let x_raw = series.slice(s![..horizon - 1, ..]).to_owned();
    let y_raw = series.slice(s![1.., ..]).to_owned();

    let x_scaler = StandardScaler::fit(&x_raw);
    let y_scaler = StandardScaler::fit(&y_raw);
    let latest = series.slice(s![horizon - 1..horizon, ..]).to_owned();

    let (forecast, loss) = self
      .fit_and_forecast(
        &x_scaler.transform(&x_raw),
        &y_scaler.transform(&y_raw),
        &x_scaler.transform(&latest),
      )
      .map_err(|e| PortfolioError::optimization(OptimizerMethod::MeanVariance, e.to_string()))?;
    debug!(
      epochs = self.config.epochs,
      train_pairs = horizon - 1,
      loss,
      "trained return predictor"
    );

    let n_assets = returns.n_assets();
    let scaled = Array2::from_shape_vec((1, n_assets), forecast)
      .map_err(|e| PortfolioError::optimization(OptimizerMethod::MeanVariance, e.to_string()))?;
    let prediction = y_scaler.inverse_transform(&scaled).row(0).to_owned();

    if prediction.iter().any(|v| !v.is_finite()) {
      return Err(PortfolioError::optimization(
        OptimizerMethod::MeanVariance,
        "neural net produced a non-finite return forecast",
      ));
    }
    Ok(prediction)
  }
}
