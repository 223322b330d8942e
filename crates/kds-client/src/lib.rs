//! kds-client
//!
//! Resilient request client for the upstream order-management API.
//!
//! Layers, bottom-up:
//! - [`transport`]: one attempt over HTTP (`reqwest`), behind [`HttpTransport`]
//! - [`policy`]: retry classification and exponential backoff with jitter
//! - [`payload`]: business-code success classification
//! - [`client`]: the retry loop, token injection, timeouts, cancellation

pub mod client;
pub mod credentials;
pub mod payload;
pub mod policy;
pub mod scripted;
pub mod transport;

pub use client::{RequestClient, RequestOptions, RequestOutcome, TOKEN_HEADER};
pub use credentials::{CredentialProvider, SharedToken, StaticToken};
pub use payload::{business_code, is_success_payload, response_message};
pub use policy::RetryPolicy;
pub use scripted::ScriptedTransport;
pub use transport::{HttpTransport, Method, OutboundRequest, RawResponse, ReqwestTransport, TransportError};

pub use tokio_util::sync::CancellationToken;
