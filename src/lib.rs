pub mod cancel;
pub mod clock;
pub mod config;
pub mod errors;
pub mod launcher;
pub mod logging;
pub mod metrics;
pub mod pacer;
pub mod payload;
pub mod percentiles;
pub mod provider;
pub mod report;
pub mod runner;
pub mod utils;
pub mod window;
