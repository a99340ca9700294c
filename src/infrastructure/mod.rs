// Versioned model artifact persistence
pub mod artifact;

// CSV dataset loading and saving
pub mod dataset;
