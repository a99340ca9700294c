// Domain-specific error types
pub mod errors;

// Fitted normalization transforms
pub mod normalize;

// Classifier feature schema and prediction types
pub mod signal;

// Volatility surface aggregation and windowing
pub mod surface;
