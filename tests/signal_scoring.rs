use signalbridge::application::classifier::{ClassifierConfig, SignalClassifier};
use signalbridge::application::synthetic;
use signalbridge::domain::errors::MlError;
use signalbridge::domain::signal::{Recommendation, SignalFeatures};
use signalbridge::interfaces::protocol;
use tempfile::TempDir;

fn scenario_features() -> SignalFeatures {
    SignalFeatures::from_json_str(
        r#"{"edge_percent": 15.5, "delta": 0.65, "gamma": 0.004, "vega": 45.2,
            "theta": -8.5, "volume": 1200, "open_interest": 8500, "days_to_expiry": 45}"#,
    )
    .expect("scenario record is valid")
}

#[test]
fn test_default_corpus_training_scoring_and_persistence() {
    let dir = TempDir::new().unwrap();
    let mut classifier =
        SignalClassifier::open(dir.path(), ClassifierConfig::default()).unwrap();
    assert!(!classifier.is_trained());

    let corpus =
        synthetic::signal_corpus(synthetic::DEFAULT_CORPUS_SIZE, synthetic::DEFAULT_SEED);
    let summary = classifier.train(&corpus).unwrap();

    // The bootstrap rule is noisy but learnable; anything close to coin
    // flipping means the pipeline is broken.
    assert!(
        summary.accuracy > 0.6,
        "held-out accuracy {} too low",
        summary.accuracy
    );
    assert_eq!(summary.per_class[0].label, "not profitable");
    assert_eq!(summary.per_class[1].label, "profitable");
    let support: usize = summary.per_class.iter().map(|c| c.support).sum();
    assert_eq!(support, summary.test_samples);

    let prediction = classifier.predict(&scenario_features()).unwrap();
    assert!(
        prediction.confidence > 0.0 && prediction.confidence < 1.0,
        "confidence must be strictly interior, got {}",
        prediction.confidence
    );
    assert_eq!(
        prediction.recommendation == Recommendation::Trade,
        prediction.confidence > 0.7,
        "recommendation must follow the strict 0.7 rule"
    );
    assert_eq!(prediction.is_profitable, prediction.confidence > 0.5);

    // Round-trip persistence law: a fresh service reloading the artifact
    // reproduces the prediction bit for bit.
    let reloaded = SignalClassifier::open(dir.path(), ClassifierConfig::default()).unwrap();
    assert!(reloaded.is_trained());
    let replay = reloaded.predict(&scenario_features()).unwrap();
    assert_eq!(
        prediction.confidence.to_bits(),
        replay.confidence.to_bits()
    );
    assert_eq!(prediction.recommendation, replay.recommendation);

    // The canonical line for this prediction parses back to 3 decimals.
    let line = protocol::confidence_line(prediction.confidence);
    let parsed: f64 = line.parse().unwrap();
    assert!((parsed - prediction.confidence).abs() < 5e-4);
}

#[test]
fn test_predict_with_training_disabled_is_not_trained_error() {
    let dir = TempDir::new().unwrap();
    let classifier = SignalClassifier::open(dir.path(), ClassifierConfig::default()).unwrap();

    let err = classifier.predict(&scenario_features()).unwrap_err();
    assert!(matches!(err, MlError::NotTrained { .. }));
}
