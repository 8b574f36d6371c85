//! REST API Provider
//!
//! A provider plugin for an infrastructure-as-code host. It exposes a single
//! managed resource, `<provider>_apiresource`, whose create action performs
//! one outbound HTTP request against a configured REST endpoint and records
//! the response body in host-managed state.
//!
//! # Overview
//!
//! - **Provider** ([`RestApiProvider`]): declares `base_url` and the
//!   sensitive `auth_token`, receives them from the host on Configure, and
//!   shares them read-only with every resource instance.
//! - **API resource** ([`ApiResource`]): joins `base_url` and
//!   `endpoint_path`, sends `payload` with bearer authentication, and turns
//!   the HTTP outcome into state or diagnostics.
//! - **Server** ([`serve`]): the gRPC boundary the host talks to.
//!
//! # Handshake Protocol
//!
//! When the plugin starts via [`serve`], it prints a handshake line to stdout:
//!
//! ```text
//! REST_API_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `REST_API_PROVIDER|<protocol_version>|<address>`. Logs go to
//! stderr so they never corrupt the handshake.
//!
//! # Example
//!
//! ```ignore
//! use rest_api_provider::{init_logging, serve, RestApiProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(RestApiProvider::default()).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api_resource;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

/// Generated protobuf types for the host plugin protocol.
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod proto {
    tonic::include_proto!("restapi.provider.v1");
}

pub use api_resource::{ApiResource, ApiResourceModel};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{ProviderConfig, RestApiProvider, PROVIDER_TYPE_NAME};
pub use resource::{ProviderData, Resource, ResourceFactory};
pub use schema::{Diagnostic, ProviderSchema};
pub use server::{handshake_line, serve, serve_with_options, ProviderService, ServeOptions};
pub use types::{PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};

pub use async_trait::async_trait;
