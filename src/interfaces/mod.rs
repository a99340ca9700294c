// Subprocess wire contract
pub mod protocol;
