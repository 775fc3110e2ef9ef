pub mod bootstrap;

pub use bootstrap::{check_once, report_stats, run_server};
