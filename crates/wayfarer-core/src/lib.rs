//! Wayfarer Core - resilient API transport for the Wayfarer client
//!
//! Every call leaves through an ordered pipeline that attaches credentials,
//! suppresses browser login prompts and normalizes replies into a uniform
//! [`ResponseEnvelope`]. Listing and media calls that hit a misrouted
//! gateway are replayed against alternate addresses until one serves real
//! data.
//!
//! # Main Components
//!
//! - **Pipeline**: [`http::Pipeline`] of [`http::Stage`]s over a [`http::Transport`]
//! - **Envelope**: [`ResponseEnvelope`], [`Page`] and the [`http::ErrorKind`] taxonomy
//! - **Discovery**: [`discovery::EndpointDiscovery`] with a persistent [`discovery::EndpointCache`]
//! - **Identity**: canonical owner fields on every [`Resource`]
//! - **Media**: [`media::MediaResolver`] handing out RAII [`media::MediaHandle`]s
//!
//! # Example
//!
//! ```no_run
//! use wayfarer_core::{ApiClient, TransportConfig};
//!
//! async fn example() -> wayfarer_core::Result<()> {
//!     let client = ApiClient::new(TransportConfig::load(None)?)?;
//!     let listing = client.list_resources(0, 20).await;
//!     if let Some(page) = listing.data {
//!         println!("{} posts", page.total_elements);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod http;
pub mod identity;
pub mod logging;
pub mod media;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use client::ApiClient;
pub use config::{StorageConfig, TransportConfig};
pub use credentials::{CredentialStore, Credentials};
pub use envelope::{JsonEnvelope, Page, PaginationInfo, ResponseEnvelope};
pub use error::{Error, Result};
pub use http::{ApiError, ErrorKind};
pub use identity::{owner_identity, OwnerIdentity, Resource};
pub use logging::{init_logging, LoggingConfig};
pub use media::{MediaHandle, MediaResolver};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
