//! # Price Tables
//!
//! $$
//! P \in \mathbb R^{T \times A},\qquad \text{header} = (\text{id}_1, \dots, \text{id}_A)
//! $$
//!
//! CSV input for the request pipeline: one header row of asset ids, then one
//! row of prices per period. A leading `date` (or unnamed) column is treated as
//! the row index and skipped.

use std::io;
use std::path::Path;

use csv::StringRecord;
use csv::Trim;

use crate::error::PortfolioError;
use crate::error::Result;

/// Column-major price table read from CSV.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
  assets: Vec<String>,
  prices: Vec<Vec<f64>>,
}

impl PriceTable {
  pub fn from_path(path: &Path) -> Result<Self> {
    let rdr = csv::ReaderBuilder::new()
      .has_headers(true)
      .trim(Trim::All)
      .from_path(path)
      .map_err(|e| PortfolioError::invalid(format!("failed to open {}: {e}", path.display())))?;
    Self::from_csv(rdr, &path.display().to_string())
  }

  pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
    let rdr = csv::ReaderBuilder::new()
      .has_headers(true)
      .trim(Trim::All)
      .from_reader(reader);
    Self::from_csv(rdr, "<reader>")
  }

  fn from_csv<R: io::Read>(mut rdr: csv::Reader<R>, source: &str) -> Result<Self> {
    let headers = rdr
      .headers()
      .map_err(|e| PortfolioError::invalid(format!("failed to read headers of {source}: {e}")))?
      .clone();

    let columns = header_names(&headers);
    let skip = usize::from(columns.first().is_some_and(|c| is_index_column(c)));
    let assets = columns[skip..].to_vec();
    if assets.is_empty() {
      return Err(PortfolioError::invalid(format!("{source} has no asset columns")));
    }

    let mut prices = vec![Vec::new(); assets.len()];
    for (row, rec) in rdr.records().enumerate() {
      let record = rec
        .map_err(|e| PortfolioError::invalid(format!("failed to read record of {source}: {e}")))?;
      // header is line 1
      let line = row + 2;
      for (series, cell) in prices.iter_mut().zip(record.iter().skip(skip)) {
        let value = cell.parse::<f64>().map_err(|_| {
          PortfolioError::invalid(format!("{source} line {line}: invalid price '{cell}'"))
        })?;
        series.push(value);
      }
    }

    Ok(Self { assets, prices })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn periods(&self) -> usize {
    self.prices.first().map_or(0, Vec::len)
  }

  /// Price column of one asset.
  pub fn column(&self, asset: &str) -> Option<&[f64]> {
    let idx = self.assets.iter().position(|a| a == asset)?;
    Some(&self.prices[idx])
  }

  /// Remove a column, e.g. a benchmark that should not be allocated to.
  pub fn remove(&mut self, asset: &str) -> Option<Vec<f64>> {
    let idx = self.assets.iter().position(|a| a == asset)?;
    self.assets.remove(idx);
    Some(self.prices.remove(idx))
  }

  /// `(asset id, price series)` pairs in header order.
  pub fn into_series(self) -> impl Iterator<Item = (String, Vec<f64>)> {
    self.assets.into_iter().zip(self.prices)
  }
}

fn header_names(headers: &StringRecord) -> Vec<String> {
  headers
    .iter()
    .enumerate()
    .map(|(i, h)| {
      let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
      h.trim().to_string()
    })
    .collect()
}

fn is_index_column(name: &str) -> bool {
  name.is_empty() || name.eq_ignore_ascii_case("date")
}
