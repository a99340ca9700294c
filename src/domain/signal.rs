use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::errors::MlError;

/// Ordered list of classifier feature names.
/// This order MUST match between training and inference: vectors are built
/// positionally from it, so reordering silently corrupts every persisted
/// model. Any change here is a breaking change for saved artifacts.
pub const FEATURE_NAMES: &[&str] = &[
    "edge_percent",
    "delta",
    "gamma",
    "vega",
    "theta",
    "volume",
    "open_interest",
    "days_to_expiry",
];

/// Confidence above which a signal is worth routing to execution.
/// The comparison is strict: exactly 0.7 is still AVOID.
pub const TRADE_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Candidate-trade features handed over by the pricing engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalFeatures {
    pub edge_percent: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub volume: f64,
    pub open_interest: f64,
    pub days_to_expiry: f64,
}

impl SignalFeatures {
    /// Binds a loosely-typed JSON record to the schema by field name.
    ///
    /// Every field is required. Null or NaN liquidity fields (`volume`,
    /// `open_interest`) collapse to zero; upstream chain snapshots report
    /// NaN for strikes that never traded, and that is data, not an error.
    pub fn from_json(record: &Value) -> Result<Self, MlError> {
        let map = record.as_object().ok_or_else(|| MlError::Schema {
            field: "expected a JSON object".to_string(),
        })?;

        let required = |field: &'static str| -> Result<f64, MlError> {
            map.get(field)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
                .ok_or_else(|| MlError::Schema {
                    field: format!("field '{field}' is missing or not numeric"),
                })
        };

        let liquidity = |field: &'static str| -> Result<f64, MlError> {
            match map.get(field) {
                None => Err(MlError::Schema {
                    field: format!("field '{field}' is missing"),
                }),
                Some(Value::Null) => Ok(0.0),
                Some(v) => {
                    let x = v.as_f64().ok_or_else(|| MlError::Schema {
                        field: format!("field '{field}' is not numeric"),
                    })?;
                    Ok(if x.is_nan() { 0.0 } else { x })
                }
            }
        };

        Ok(Self {
            edge_percent: required("edge_percent")?,
            delta: required("delta")?,
            gamma: required("gamma")?,
            vega: required("vega")?,
            theta: required("theta")?,
            volume: liquidity("volume")?,
            open_interest: liquidity("open_interest")?,
            days_to_expiry: required("days_to_expiry")?,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, MlError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| MlError::Schema {
            field: format!("malformed JSON: {e}"),
        })?;
        Self::from_json(&value)
    }

    /// Emits the numeric vector in `FEATURE_NAMES` order.
    /// NaN liquidity values are zeroed here so the default applies on every
    /// path into a model, CSV-loaded training rows included.
    pub fn to_vector(&self) -> Vec<f64> {
        let zero_nan = |v: f64| if v.is_nan() { 0.0 } else { v };
        vec![
            self.edge_percent,
            self.delta,
            self.gamma,
            self.vega,
            self.theta,
            zero_nan(self.volume),
            zero_nan(self.open_interest),
            self.days_to_expiry,
        ]
    }
}

/// One labeled training example for the profitability classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSignal {
    pub features: SignalFeatures,
    pub is_profitable: bool,
}

/// Trade gate applied to the reported confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Trade,
    Avoid,
}

impl Recommendation {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > TRADE_CONFIDENCE_THRESHOLD {
            Recommendation::Trade
        } else {
            Recommendation::Avoid
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Trade => write!(f, "TRADE"),
            Recommendation::Avoid => write!(f, "AVOID"),
        }
    }
}

/// Classifier output for one scored signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalPrediction {
    pub is_profitable: bool,
    pub confidence: f64,
    pub recommendation: Recommendation,
}
