//! Single-pass numeric aggregates over one column of a row stream.

use crate::{error::StreamError, stream::stream_rows};
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use connectors::{connection::Connector, sql::base::requests::FetchRowsRequest};
use futures::StreamExt;
use model::records::row::Row;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Numeric view of `column` in `row`; `None` for SQL NULL.
fn numeric_cell(row: &Row, column: &str) -> Result<Option<BigDecimal>, StreamError> {
    let Some(value) = row.get(column) else {
        return Err(StreamError::InvalidArgument(format!(
            "column '{column}' is not present in the result"
        )));
    };
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_decimal()
        .map(Some)
        .ok_or_else(|| StreamError::NonNumeric {
            column: column.to_string(),
            value: value.as_string().unwrap_or_default(),
        })
}

/// Feeds every non-NULL value of `column` to `visit`, one row at a time.
async fn for_each_value<F>(
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    column: &str,
    mut visit: F,
) -> Result<(), StreamError>
where
    F: FnMut(BigDecimal),
{
    let mut rows = stream_rows(connector, request);
    while let Some(row) = rows.next().await {
        if let Some(value) = numeric_cell(&row?, column)? {
            visit(value);
        }
    }
    Ok(())
}

/// Arithmetic mean of `column`, keeping only a running sum and count.
/// NULLs are skipped; no rows gives `0.0`.
pub async fn stream_average(
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    column: &str,
) -> Result<f64, StreamError> {
    let mut sum = BigDecimal::zero();
    let mut count = 0u64;

    for_each_value(connector, request, column, |value| {
        sum += value;
        count += 1;
    })
    .await?;

    debug!(column, count, "Computed streaming average");
    if count == 0 {
        return Ok(0.0);
    }
    Ok((sum / BigDecimal::from(count)).to_f64().unwrap_or(f64::NAN))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: u64,
    pub sum: BigDecimal,
    pub min: Option<BigDecimal>,
    pub max: Option<BigDecimal>,
    pub mean: f64,
}

/// Count, sum, min, max and mean of `column` in one pass.
pub async fn stream_column_stats(
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    column: &str,
) -> Result<ColumnStats, StreamError> {
    let mut stats = ColumnStats {
        count: 0,
        sum: BigDecimal::zero(),
        min: None,
        max: None,
        mean: 0.0,
    };

    for_each_value(connector, request, column, |value| {
        stats.count += 1;
        stats.sum += &value;
        if stats.min.as_ref().is_none_or(|min| value < *min) {
            stats.min = Some(value.clone());
        }
        if stats.max.as_ref().is_none_or(|max| value > *max) {
            stats.max = Some(value);
        }
    })
    .await?;

    if stats.count > 0 {
        stats.mean = (stats.sum.clone() / BigDecimal::from(stats.count))
            .to_f64()
            .unwrap_or(f64::NAN);
    }
    Ok(stats)
}

/// Estimated percentiles of `column` from a uniform reservoir sample of at
/// most `sample_size` values. Each requested percentile (0 to 100) maps to
/// the sample value at `floor(p / 100 * (len - 1))` after sorting. Returns
/// an empty vector when the column holds no values.
pub async fn stream_percentiles(
    connector: Arc<dyn Connector>,
    request: FetchRowsRequest,
    column: &str,
    percentiles: &[f64],
    sample_size: usize,
) -> Result<Vec<(f64, BigDecimal)>, StreamError> {
    if sample_size == 0 {
        return Err(StreamError::InvalidArgument(
            "sample_size must be greater than zero".to_string(),
        ));
    }
    if let Some(p) = percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(StreamError::InvalidArgument(format!(
            "percentile {p} is outside 0..=100"
        )));
    }

    let mut sample: Vec<BigDecimal> = Vec::with_capacity(sample_size);
    let mut seen = 0u64;
    let mut rng = StdRng::from_entropy();

    for_each_value(connector, request, column, |value| {
        seen += 1;
        if sample.len() < sample_size {
            sample.push(value);
        } else {
            let slot = rng.gen_range(0..seen);
            if let Ok(slot) = usize::try_from(slot) {
                if slot < sample_size {
                    sample[slot] = value;
                }
            }
        }
    })
    .await?;

    if sample.is_empty() {
        return Ok(Vec::new());
    }

    sample.sort();
    debug!(column, seen, sampled = sample.len(), "Computed percentiles");

    let last = (sample.len() - 1) as f64;
    Ok(percentiles
        .iter()
        .map(|&p| {
            let index = ((p / 100.0) * last) as usize;
            (p, sample[index.min(sample.len() - 1)].clone())
        })
        .collect())
}
