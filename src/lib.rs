pub mod app;
pub mod config;
pub mod error;
pub mod fetch;
pub mod goal;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod records;
pub mod server;
pub mod stats;
pub mod utils;

pub use error::{AppError, Result};
