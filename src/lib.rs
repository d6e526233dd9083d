pub mod campaign;
pub mod configuration;
pub mod domain;
pub mod progress;
pub mod render;
pub mod source;
pub mod telemetry;
pub mod transport;
