//! HTTP client for the external bulletin-board store.

use async_trait::async_trait;
use murmur_core::metrics;
use murmur_core::{MessageStore, StoreError};
use murmur_protocol::Post;
use reqwest::Client;
use std::time::Instant;

use crate::config::StoreConfig;

/// Header carrying the address the client reported for itself.
pub const ORIGINAL_CLIENT_IP_HEADER: &str = "X-Original-Client-IP";

/// Client for the bulletin-board API.
#[derive(Debug, Clone)]
pub struct BbsClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash (e.g., "https://detabase.vercel.app").
    base_url: String,
}

impl BbsClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_posts(&self) -> Result<Vec<Post>, StoreError> {
        let response = self
            .client
            .get(self.url("/posts"))
            .send()
            .await
            .map_err(map_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }

        response.json().await.map_err(map_error)
    }

    async fn post(&self, origin_address: &str, post: &Post) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("/post"))
            .header(ORIGINAL_CLIENT_IP_HEADER, origin_address)
            .json(post)
            .send()
            .await
            .map_err(map_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for BbsClient {
    async fn fetch_posts(&self) -> Result<Vec<Post>, StoreError> {
        let start = Instant::now();
        let result = self.get_posts().await;
        metrics::record_store_request("fetch_posts", outcome(&result), start.elapsed().as_secs_f64());
        result
    }

    async fn persist(&self, origin_address: &str, post: &Post) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.post(origin_address, post).await;
        metrics::record_store_request("persist", outcome(&result), start.elapsed().as_secs_f64());
        result
    }
}

fn outcome<T>(result: &Result<T, StoreError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(StoreError::Timeout) => "timeout",
        Err(StoreError::Status(_)) => "status",
        Err(StoreError::Request(_)) => "request",
        Err(StoreError::Decode(_)) => "decode",
    }
}

fn map_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else if err.is_decode() {
        StoreError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        StoreError::Status(status.as_u16())
    } else {
        StoreError::Request(err.to_string())
    }
}
