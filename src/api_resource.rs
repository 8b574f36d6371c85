//! The `apiresource` managed resource.
//!
//! Creating an instance performs exactly one HTTP request against the
//! provider's `base_url` and stores the response body in state. The resource
//! is create-only: Read, Update, and Delete terminate the plugin process.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::ProviderError;
use crate::provider::ProviderConfig;
use crate::resource::{decode, ProviderData, Resource};
use crate::schema::{Attribute, Schema};

/// Suffix appended to the provider type name to form the resource type name.
pub const RESOURCE_SUFFIX: &str = "apiresource";

/// Prefix of every synthesized resource id.
pub const ID_PREFIX: &str = "req-";

/// State of a single `apiresource` instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResourceModel {
    /// Synthetic id, set on create.
    #[serde(default)]
    pub id: Option<String>,
    /// Path appended to the provider's base URL.
    pub endpoint_path: String,
    /// Request body, sent verbatim.
    pub payload: String,
    /// Response body captured on create.
    #[serde(default)]
    pub response: Option<String>,
}

/// Resource that performs one REST call when created.
#[derive(Debug, Default)]
pub struct ApiResource {
    provider_config: Option<Arc<ProviderConfig>>,
}

impl ApiResource {
    /// Factory registered with the provider.
    pub fn factory() -> Box<dyn Resource> {
        Box::new(Self::default())
    }

    fn config(&self) -> Result<&ProviderConfig, ProviderError> {
        self.provider_config
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration("provider not configured".to_string()))
    }
}

/// Join the base URL and endpoint path with exactly one `/`.
///
/// A single trailing slash on `base_url` and a single leading slash on
/// `endpoint_path` are dropped before joining.
pub fn join_url(base_url: &str, endpoint_path: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    let path = endpoint_path.strip_prefix('/').unwrap_or(endpoint_path);
    format!("{}/{}", base, path)
}

/// Build the outbound request for a create.
///
/// The method is GET with the payload as body; the content type is always
/// JSON and the bearer header is only set when a token is configured.
pub fn build_request(
    client: &reqwest::Client,
    config: &ProviderConfig,
    model: &ApiResourceModel,
) -> Result<reqwest::Request, ProviderError> {
    let url = join_url(&config.base_url, &model.endpoint_path);
    debug!(url = %url, "api resource full url");

    let mut builder = client
        .get(&url)
        .header(CONTENT_TYPE, "application/json")
        .body(model.payload.clone().into_bytes());
    if let Some(token) = &config.auth_token {
        builder = builder.bearer_auth(token);
    }

    builder
        .build()
        .map_err(|e| ProviderError::Request(e.to_string()))
}

/// Synthesize the resource id from a wall-clock instant.
///
/// Two creates within the same second get the same id.
pub fn request_id(now: SystemTime) -> String {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{}{}", ID_PREFIX, secs)
}

/// Read the response body until it ends or the first read error.
///
/// A read error is not reported; the bytes received before it are kept.
pub async fn read_body(mut response: reqwest::Response) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, received = body.len(), "response body read stopped early");
                break;
            },
        }
    }
    body
}

fn unsupported(operation: &str) -> ! {
    error!(operation, "apiresource {} unimplemented", operation);
    std::process::abort()
}

#[async_trait::async_trait]
impl Resource for ApiResource {
    fn type_name(&self, provider_type_name: &str) -> String {
        debug!("resource Metadata func called");
        format!("{}_{}", provider_type_name, RESOURCE_SUFFIX)
    }

    fn schema(&self) -> Schema {
        debug!("resource Schema func called");
        Schema::v0()
            .with_description("Performs one REST call against the provider's base URL on create")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "endpoint_path",
                Attribute::required_string().with_description("Path appended to the base URL"),
            )
            .with_attribute(
                "payload",
                Attribute::required_string().with_description("Request body, sent as-is"),
            )
            .with_attribute(
                "response",
                Attribute::computed_string().with_description("Response body of the create call"),
            )
    }

    fn configure(&mut self, provider_data: Option<ProviderData>) -> Result<(), ProviderError> {
        let Some(data) = provider_data else {
            return Ok(());
        };

        let config = data.downcast::<ProviderConfig>().map_err(|_| {
            ProviderError::ConfigureType(
                "Expected ProviderConfig as provider data, got another type".to_string(),
            )
        })?;
        self.provider_config = Some(config);
        Ok(())
    }

    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        debug!("resource Create func called");

        let mut data: ApiResourceModel = decode(&self.schema(), planned_state)
            .inspect_err(|e| error!(error = %e, "error in planned values"))?;
        let config = self.config()?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let request = build_request(&client, config, &data)?;
        let response = client.execute(request).await?;

        let status = response.status();
        let body = read_body(response).await;
        let body = String::from_utf8_lossy(&body).into_owned();

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.to_string(),
                body,
            });
        }

        data.id = Some(request_id(SystemTime::now()));
        debug!(response = %body, "resource Create func finished");
        data.response = Some(body);

        Ok(serde_json::to_value(&data)?)
    }

    async fn read(&self, _current_state: Value) -> Result<Value, ProviderError> {
        unsupported("Read")
    }

    async fn update(
        &self,
        _prior_state: Value,
        _planned_state: Value,
    ) -> Result<Value, ProviderError> {
        unsupported("Update")
    }

    async fn delete(&self, _current_state: Value) -> Result<(), ProviderError> {
        unsupported("Delete")
    }
}
