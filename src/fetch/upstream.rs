use futures::future::BoxFuture;
use reqwest::{redirect::Policy, Client, StatusCode};

use crate::config::UpstreamConfig;
use crate::error::{AppError, Context};

use super::{decode_progress, request::build_headers, FetchResult, RawSnapshot};

/// Anything that can report the current signature progress.
pub trait ProgressSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, FetchResult<RawSnapshot>>;
}

/// HTTP client for the external progress API.
pub struct UpstreamClient {
    url: String,
    client: Client,
}

impl UpstreamClient {
    pub fn from_config(config: &UpstreamConfig) -> FetchResult<Self> {
        let headers = build_headers(&config.headers)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .default_headers(headers)
            .build()
            .context("Failed to construct upstream HTTP client")?;

        Ok(Self {
            url: config.url.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch_progress(&self) -> FetchResult<RawSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Progress request to {} failed", self.url))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(AppError::upstream(format!(
                "Progress request to {} was redirected",
                self.url
            )));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::upstream("Progress endpoint is rate limiting us"));
        }
        if !status.is_success() {
            return Err(AppError::upstream(format!(
                "Progress request failed with status {}",
                status
            )));
        }

        let text = response
            .text()
            .await
            .context("Failed to read progress response body")?;

        decode_progress(&text)
    }
}

impl ProgressSource for UpstreamClient {
    fn fetch(&self) -> BoxFuture<'_, FetchResult<RawSnapshot>> {
        Box::pin(self.fetch_progress())
    }
}
