//! The subprocess wire contract.
//!
//! The calling engine launches a binary, ignores everything but the LAST
//! stdout line, and parses that line positionally. These two formatters are
//! the entire grammar; treat any change as a breaking protocol change to be
//! coordinated with the caller.

use crate::domain::surface::VolForecast;

/// Classifier result line: the confidence at exactly three decimal places,
/// nothing else.
pub fn confidence_line(confidence: f64) -> String {
    format!("{confidence:.3}")
}

/// Forecaster result line: one compact JSON object with exactly the keys
/// `current_avg_iv`, `predicted_avg_iv`, `change_percent`, `direction`.
pub fn forecast_line(forecast: &VolForecast) -> String {
    serde_json::to_string(forecast).expect("forecast serializes to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::surface::VolDirection;

    #[test]
    fn test_confidence_line_grammar() {
        assert_eq!(confidence_line(0.734), "0.734");
        assert_eq!(confidence_line(0.7), "0.700");
        assert_eq!(confidence_line(1.0), "1.000");
        assert_eq!(confidence_line(0.0004), "0.000");

        let line = confidence_line(0.123456);
        let (integral, decimals) = line.split_once('.').expect("decimal point");
        assert_eq!(integral, "0");
        assert_eq!(decimals.len(), 3);
    }

    #[test]
    fn test_forecast_line_key_set_and_values() {
        let forecast = VolForecast {
            current_avg_iv: 0.32,
            predicted_avg_iv: 0.36,
            change_percent: 12.5,
            direction: VolDirection::Up,
        };
        let line = forecast_line(&forecast);

        // Compact: single line, no pretty-printing whitespace.
        assert!(!line.contains('\n'));
        assert!(!line.contains(": "));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        for key in [
            "current_avg_iv",
            "predicted_avg_iv",
            "change_percent",
            "direction",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert_eq!(object["direction"], "UP");
        assert_eq!(object["current_avg_iv"], 0.32);

        // Wire order is the struct declaration order, checked on the raw
        // line because parsed maps re-sort keys.
        let pos = |k: &str| line.find(k).unwrap();
        assert!(pos("current_avg_iv") < pos("predicted_avg_iv"));
        assert!(pos("predicted_avg_iv") < pos("change_percent"));
        assert!(pos("change_percent") < pos("direction"));
    }

    #[test]
    fn test_forecast_line_round_trips() {
        let forecast = VolForecast::from_prediction(0.30, 0.27);
        let line = forecast_line(&forecast);
        let parsed: VolForecast = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, forecast);
    }
}
