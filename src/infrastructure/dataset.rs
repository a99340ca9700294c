use serde::Deserialize;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

use crate::domain::errors::MlError;
use crate::domain::signal::{LabeledSignal, SignalFeatures};
use crate::domain::surface::SurfaceRow;

/// Loads a volatility surface table and sorts it by date then strike, the
/// order the windower expects.
pub fn load_surface_csv(path: &Path) -> Result<Vec<SurfaceRow>, MlError> {
    let file = File::open(path).map_err(|e| MlError::Data {
        reason: format!("{}: {e}", path.display()),
    })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: SurfaceRow = record.map_err(|e| MlError::Schema {
            field: format!("{}: {e}", path.display()),
        })?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(MlError::Data {
            reason: format!("{}: no surface rows", path.display()),
        });
    }

    rows.sort_by(|a, b| {
        a.date.cmp(&b.date).then(
            a.strike
                .partial_cmp(&b.strike)
                .unwrap_or(Ordering::Equal),
        )
    });
    info!("loaded {} surface rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Persists a surface table, creating parent directories as needed. Used to
/// keep the synthetic bootstrap surface around for later predict runs.
pub fn save_surface_csv(path: &Path, rows: &[SurfaceRow]) -> Result<(), MlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MlError::Data {
            reason: format!("{}: {e}", parent.display()),
        })?;
    }
    let file = File::create(path).map_err(|e| MlError::Data {
        reason: format!("{}: {e}", path.display()),
    })?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in rows {
        writer.serialize(row).map_err(|e| MlError::Data {
            reason: format!("{}: {e}", path.display()),
        })?;
    }
    writer.flush().map_err(|e| MlError::Data {
        reason: format!("{}: {e}", path.display()),
    })?;
    Ok(())
}

/// Flat CSV layout for a labeled training corpus: the eight feature columns
/// in schema order plus a 0/1 `is_profitable` label.
#[derive(Debug, Deserialize)]
struct LabeledRecord {
    edge_percent: f64,
    delta: f64,
    gamma: f64,
    vega: f64,
    theta: f64,
    volume: f64,
    open_interest: f64,
    days_to_expiry: f64,
    is_profitable: u8,
}

pub fn load_signal_csv(path: &Path) -> Result<Vec<LabeledSignal>, MlError> {
    let file = File::open(path).map_err(|e| MlError::Data {
        reason: format!("{}: {e}", path.display()),
    })?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut corpus = Vec::new();
    for record in reader.deserialize() {
        let r: LabeledRecord = record.map_err(|e| MlError::Schema {
            field: format!("{}: {e}", path.display()),
        })?;
        corpus.push(LabeledSignal {
            features: SignalFeatures {
                edge_percent: r.edge_percent,
                delta: r.delta,
                gamma: r.gamma,
                vega: r.vega,
                theta: r.theta,
                volume: r.volume,
                open_interest: r.open_interest,
                days_to_expiry: r.days_to_expiry,
            },
            is_profitable: r.is_profitable != 0,
        });
    }
    if corpus.is_empty() {
        return Err(MlError::Data {
            reason: format!("{}: no labeled rows", path.display()),
        });
    }
    info!(
        "loaded {} labeled signals from {}",
        corpus.len(),
        path.display()
    );
    Ok(corpus)
}
