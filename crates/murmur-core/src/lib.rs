//! # murmur-core
//!
//! Connection registry and message relay for the Murmur chat relay.
//!
//! This crate provides the building blocks of the server:
//!
//! - **Registry** - The set of live sessions, with admit/evict and fan-out broadcast
//! - **Relay** - Per-connection receive loop: classify, persist, broadcast
//! - **MessageStore** - The external bulletin-board store the relay persists to
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Session   │────▶│    Relay    │────▶│ MessageStore │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        ▲                   │
//!        │                   ▼
//!        │            ┌─────────────┐
//!        └────────────│  Registry   │
//!                     └─────────────┘
//! ```

pub mod metrics;
pub mod registry;
pub mod relay;
pub mod session;
pub mod store;

pub use registry::{BroadcastReport, Broadcaster, Registry, RegistryConfig, RegistryError};
pub use relay::{Dispatched, ErrorPolicy, Relay, RelayConfig, RelayError};
pub use session::SessionId;
pub use store::{MessageStore, StoreError};
