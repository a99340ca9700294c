// Profitability classifier service
pub mod classifier;

// Volatility forecaster service
pub mod forecaster;

// Recurrent sequence model
pub mod net;

// Bootstrap data generators
pub mod synthetic;
