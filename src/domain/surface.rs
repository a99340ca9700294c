use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::errors::MlError;

/// Days of daily aggregates fed to the sequence model per window.
pub const DEFAULT_WINDOW_LEN: usize = 10;

/// One quote row of a volatility surface table, as produced by the upstream
/// chain fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRow {
    pub date: NaiveDate,
    pub strike: f64,
    pub implied_vol: f64,
    pub volume: f64,
    #[serde(default)]
    pub moneyness: Option<f64>,
}

/// Per-day aggregate of a surface: mean implied vol across strikes and
/// total traded volume. NaN volume contributes zero to the sum, the same
/// liquidity default the classifier features use.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyIv {
    pub date: NaiveDate,
    pub mean_iv: f64,
    pub total_volume: f64,
}

pub fn aggregate_daily(rows: &[SurfaceRow]) -> Vec<DailyIv> {
    let mut days: BTreeMap<NaiveDate, (f64, usize, f64)> = BTreeMap::new();
    for row in rows {
        let entry = days.entry(row.date).or_insert((0.0, 0, 0.0));
        entry.0 += row.implied_vol;
        entry.1 += 1;
        if !row.volume.is_nan() {
            entry.2 += row.volume;
        }
    }
    days.into_iter()
        .map(|(date, (iv_sum, count, total_volume))| DailyIv {
            date,
            mean_iv: iv_sum / count as f64,
            total_volume,
        })
        .collect()
}

/// Mean implied vol over every row of the surface (not the per-day means).
/// This is the "current" level a forecast is compared against.
pub fn surface_mean_iv(rows: &[SurfaceRow]) -> Result<f64, MlError> {
    if rows.is_empty() {
        return Err(MlError::Data {
            reason: "empty surface table".to_string(),
        });
    }
    Ok(rows.iter().map(|r| r.implied_vol).sum::<f64>() / rows.len() as f64)
}

/// Overlapping training windows over a daily-aggregated surface.
///
/// Each feature vector interleaves `(mean_iv, total_volume)` for
/// `window_len` consecutive days; the target is the mean implied vol of the
/// day after the window. A surface spanning `d` distinct dates yields
/// `max(0, d - window_len - 1)` windows: the final date is never used as a
/// target so that every produced window has a full successor day behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct VolWindows {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub window_len: usize,
}

pub fn window_sequences(rows: &[SurfaceRow], window_len: usize) -> Result<VolWindows, MlError> {
    let daily = aggregate_daily(rows);
    if daily.len() < window_len + 1 {
        return Err(MlError::Data {
            reason: format!(
                "{} distinct dates in surface, need at least {} for window length {}",
                daily.len(),
                window_len + 1,
                window_len
            ),
        });
    }

    let count = daily.len().saturating_sub(window_len + 1);
    let mut features = Vec::with_capacity(count);
    let mut targets = Vec::with_capacity(count);
    for i in 0..count {
        let mut seq = Vec::with_capacity(2 * window_len);
        for day in &daily[i..i + window_len] {
            seq.push(day.mean_iv);
            seq.push(day.total_volume);
        }
        features.push(seq);
        targets.push(daily[i + window_len].mean_iv);
    }

    Ok(VolWindows {
        features,
        targets,
        window_len,
    })
}

/// Forecast direction relative to the current surface level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolDirection {
    Up,
    Down,
}

impl fmt::Display for VolDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolDirection::Up => write!(f, "UP"),
            VolDirection::Down => write!(f, "DOWN"),
        }
    }
}

/// Forecaster output. Field order here is the wire order of the canonical
/// JSON result line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolForecast {
    pub current_avg_iv: f64,
    pub predicted_avg_iv: f64,
    pub change_percent: f64,
    pub direction: VolDirection,
}

impl VolForecast {
    pub fn from_prediction(current_avg_iv: f64, predicted_avg_iv: f64) -> Self {
        Self {
            current_avg_iv,
            predicted_avg_iv,
            change_percent: (predicted_avg_iv - current_avg_iv) / current_avg_iv * 100.0,
            direction: if predicted_avg_iv > current_avg_iv {
                VolDirection::Up
            } else {
                VolDirection::Down
            },
        }
    }
}
