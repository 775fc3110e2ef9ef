pub mod time;

pub use time::{chrono_duration, current_epoch_millis, epoch_millis};
