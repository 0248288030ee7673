pub mod config;
pub mod error;
pub mod framings;
pub mod lines;
pub mod model;
pub mod relay;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod upstream;
