use serde::{Deserialize, Serialize};

use crate::domain::errors::MlError;

/// Per-column z-score transform, fitted once on the training split.
///
/// The fitted parameters are persisted next to the model they were fitted
/// for and are never refit at inference time. Zero-variance columns keep a
/// unit scale so they pass through centered instead of blowing up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, MlError> {
        let n_cols = check_rectangular(rows)?;
        let n = rows.len() as f64;

        let mut means = vec![0.0; n_cols];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; n_cols];
        for row in rows {
            for (s, (v, m)) in stds.iter_mut().zip(row.iter().zip(&means)) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            if !s.is_finite() || *s <= 0.0 {
                *s = 1.0;
            }
        }

        Ok(Self { means, stds })
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }
}

/// Per-column min-max transform to [0, 1], fitted once.
/// Zero-range columns map to 0 so constant inputs stay constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, MlError> {
        let n_cols = check_rectangular(rows)?;

        let mut mins = vec![f64::INFINITY; n_cols];
        let mut maxs = vec![f64::NEG_INFINITY; n_cols];
        for row in rows {
            for ((lo, hi), v) in mins.iter_mut().zip(&mut maxs).zip(row) {
                *lo = lo.min(*v);
                *hi = hi.max(*v);
            }
        }

        Ok(Self { mins, maxs })
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mins.iter().zip(&self.maxs))
            .map(|(v, (lo, hi))| {
                let span = hi - lo;
                if span > 0.0 { (v - lo) / span } else { 0.0 }
            })
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn n_features(&self) -> usize {
        self.mins.len()
    }
}

fn check_rectangular(rows: &[Vec<f64>]) -> Result<usize, MlError> {
    let first = rows.first().ok_or_else(|| MlError::Data {
        reason: "cannot fit a transform on an empty feature matrix".to_string(),
    })?;
    let n_cols = first.len();
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(MlError::Data {
            reason: "ragged feature matrix".to_string(),
        });
    }
    Ok(n_cols)
}
