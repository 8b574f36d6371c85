//! The `nttdata-rest-api` provider.
//!
//! Declares the provider configuration, publishes it once to every resource,
//! and routes host lifecycle calls to freshly instantiated resources.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api_resource::ApiResource;
use crate::error::ProviderError;
use crate::resource::{ProviderData, Resource, ResourceFactory};
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::PlanResult;
use crate::validation;

/// Type name announced to the host.
pub const PROVIDER_TYPE_NAME: &str = "nttdata-rest-api";

/// Provider-level configuration delivered by the host at Configure.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Scheme, host and optional path prefix prepended to each request.
    pub base_url: String,
    /// Bearer credential. Sent only when present.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Provider exposing the `apiresource` resource.
pub struct RestApiProvider {
    version: String,
    config: OnceLock<ProviderData>,
}

impl RestApiProvider {
    /// Create a provider announcing the given version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            config: OnceLock::new(),
        }
    }

    /// Schema of the provider configuration block.
    pub fn config_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "base_url",
                Attribute::required_string().with_description("Base URL of the API"),
            )
            .with_attribute(
                "auth_token",
                Attribute::required_string()
                    .sensitive()
                    .with_description("Authentication token for the API"),
            )
    }

    /// Resource factories served by this provider.
    pub fn resources(&self) -> Vec<ResourceFactory> {
        vec![ApiResource::factory]
    }

    /// The published configuration, if Configure has succeeded.
    pub fn config(&self) -> Option<&ProviderConfig> {
        self.config.get().and_then(|data| data.downcast_ref::<ProviderConfig>())
    }

    /// Instantiate and configure the resource registered under `resource_type`.
    fn resource(&self, resource_type: &str) -> Result<Box<dyn Resource>, ProviderError> {
        let mut resource = self
            .resources()
            .into_iter()
            .map(|factory| factory())
            .find(|r| r.type_name(PROVIDER_TYPE_NAME) == resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;

        resource.configure(self.config.get().cloned())?;
        Ok(resource)
    }
}

impl Default for RestApiProvider {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait::async_trait]
impl ProviderService for RestApiProvider {
    fn type_name(&self) -> &str {
        PROVIDER_TYPE_NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn schema(&self) -> ProviderSchema {
        self.resources().into_iter().map(|factory| factory()).fold(
            ProviderSchema::new().with_provider_config(Self::config_schema()),
            |schema, resource| {
                schema.with_resource(resource.type_name(PROVIDER_TYPE_NAME), resource.schema())
            },
        )
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&Self::config_schema(), &config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        // Required-ness is enforced by ValidateProviderConfig; here only
        // undecodable values are rejected, so a null token is tolerated.
        let diagnostics = validation::validate_types(&Self::config_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        let config: ProviderConfig = match serde_json::from_value(config) {
            Ok(config) => config,
            Err(e) => return Ok(ProviderError::from(e).into_diagnostics()),
        };
        debug!(config = ?config, "decoded provider configuration");

        let data: ProviderData = Arc::new(config);
        if self.config.set(data).is_err() {
            warn!("provider configured more than once; keeping first configuration");
            return Ok(vec![Diagnostic::error("Provider already configured")
                .with_detail("Configure may only be called once per plugin session")]);
        }

        info!("provider configuration published");
        Ok(vec![])
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let diagnostics = validation::validate(&resource.schema(), &config);
        if has_errors(&diagnostics) {
            debug!(resource_type, "resource config rejected");
        }
        Ok(diagnostics)
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.resource(resource_type)?
            .plan(prior_state, proposed_state)
            .await
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.create(planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.resource(resource_type)?.read(current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)?
            .update(prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.resource(resource_type)?.delete(current_state).await
    }
}
