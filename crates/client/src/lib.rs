pub mod app;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod metrics;
