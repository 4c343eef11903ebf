//! The external message store.
//!
//! Durable history lives in a bulletin-board service outside this process.
//! The relay only needs two operations from it, expressed by [`MessageStore`].

use async_trait::async_trait;
use murmur_protocol::Post;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store did not answer within the configured timeout.
    #[error("Store request timed out")]
    Timeout,

    /// The store answered with a non-success status.
    #[error("Store returned status {0}")]
    Status(u16),

    /// The request could not be completed.
    #[error("Store request failed: {0}")]
    Request(String),

    /// The response body could not be decoded.
    #[error("Failed to decode store response: {0}")]
    Decode(String),
}

/// The bulletin-board store that keeps message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch every stored post, in the store's order.
    async fn fetch_posts(&self) -> Result<Vec<Post>, StoreError>;

    /// Persist a post on behalf of a client at `origin_address`.
    async fn persist(&self, origin_address: &str, post: &Post) -> Result<(), StoreError>;
}
