use crate::error::Result;

pub mod decode;
pub mod request;
pub mod upstream;

pub use decode::{decode_progress, RawSnapshot};
pub use upstream::{ProgressSource, UpstreamClient};

pub type FetchResult<T> = Result<T>;
