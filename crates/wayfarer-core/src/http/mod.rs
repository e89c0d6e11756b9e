//! HTTP pipeline between callers and the network
//!
//! This module provides:
//! - Request/reply descriptors and the transport seam
//! - An ordered stage pipeline (credentials, prompt suppression, envelope)
//! - Endpoint classification for credential attachment
//! - Error taxonomy, body sniffing and bounded retry

pub mod auth;
pub mod classifier;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod popup;
pub mod request;
pub mod retry;
pub mod sniff;
pub mod transport;

pub use auth::{AuthStage, Prepared, NO_SESSION_MESSAGE};
pub use classifier::{ClassifierConfig, EndpointClassifier, Visibility};
pub use error::{ApiError, ErrorKind, ERROR_PAGE_MESSAGE};
pub use normalizer::{normalize_failure, normalize_reply, EnvelopeStage, DISGUISED_FAILURE_MESSAGE};
pub use pipeline::{Next, Pipeline, Stage};
pub use popup::PopupSuppressionStage;
pub use request::{ApiRequest, Body, Failure, NetworkFailure, Outcome, Reply, ResponseMode};
pub use retry::{execute_with_retry, RetryDecision, RetryPolicy};
pub use sniff::{sniff, Sniffed};
pub use transport::{join_url, ReqwestTransport, Transport};

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
