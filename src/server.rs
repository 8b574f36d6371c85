//! Server helpers for running the provider plugin.
//!
//! This module defines the [`ProviderService`] trait the provider
//! implements, the adapter that exposes it over the host's gRPC protocol,
//! and [`serve`], which binds a port, prints the handshake, and runs until
//! the host signals shutdown.
//!
//! # Signal Handling
//!
//! On SIGTERM or SIGINT the server stops accepting connections and gives
//! in-flight requests up to [`ServeOptions::shutdown_timeout`] to finish
//! before calling [`ProviderService::stop`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::proto;
use crate::schema::{has_errors, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{
    ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// The provider contract the host drives.
///
/// Values are plain `serde_json::Value`s; the adapter takes care of the
/// wire encoding.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Type name announced to the host.
    fn type_name(&self) -> &str;

    /// Version announced to the host.
    fn version(&self) -> &str;

    /// Provider configuration schema plus every resource and data source schema.
    fn schema(&self) -> ProviderSchema;

    /// Identity and inventory. Derived from [`schema`](Self::schema) by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            type_name: self.type_name().to_string(),
            version: self.version().to_string(),
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Receive the provider configuration from the host.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Release resources before the process exits.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Upgrade resource state from an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for resource type: {}",
            resource_type
        )))
    }

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "data source {}",
            data_source_type
        )))
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "data source {}",
            data_source_type
        )))
    }
}

impl From<Diagnostic> for proto::Diagnostic {
    fn from(d: Diagnostic) -> Self {
        let severity = match d.severity {
            DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
            DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
        };
        Self {
            severity: severity as i32,
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        }
    }
}

impl From<&Schema> for proto::Schema {
    fn from(schema: &Schema) -> Self {
        let attributes = schema
            .block
            .attributes
            .iter()
            .map(|(name, attr)| proto::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            version: schema.version as i64,
            block: Some(proto::Block {
                attributes,
                description: schema.block.description.clone().unwrap_or_default(),
            }),
        }
    }
}

fn decode_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn encode_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics.into_iter().map(Into::into).collect()
}

/// Log the outcome of a validation-style call and convert it for the wire.
fn report(operation: &str, result: Result<Vec<Diagnostic>, ProviderError>) -> Vec<proto::Diagnostic> {
    match result {
        Ok(diagnostics) => {
            if has_errors(&diagnostics) {
                warn!(operation, diagnostics = diagnostics.len(), "completed with errors");
            } else {
                info!(operation, "completed successfully");
            }
            to_proto(diagnostics)
        },
        Err(e) => {
            error!(operation, error = %e, "failed");
            to_proto(e.into_diagnostics())
        },
    }
}

/// Log the outcome of a state-returning call and split it into state bytes
/// and diagnostics. Failures never carry state.
fn state_or_diagnostics(
    operation: &str,
    resource_type: &str,
    result: Result<Value, ProviderError>,
) -> (Vec<u8>, Vec<proto::Diagnostic>) {
    match result {
        Ok(state) => {
            info!(operation, resource_type, "completed successfully");
            (encode_json(&state), vec![])
        },
        Err(e) => {
            error!(operation, resource_type, error = %e, "failed");
            (vec![], to_proto(e.into_diagnostics()))
        },
    }
}

/// Adapter from the generated gRPC trait to [`ProviderService`].
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

#[tonic::async_trait]
impl<P: ProviderService> proto::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<proto::GetMetadataRequest>,
    ) -> Result<Response<proto::GetMetadataResponse>, Status> {
        let metadata = self.provider.metadata();
        debug!(type_name = %metadata.type_name, version = %metadata.version, "GetMetadata called");
        Ok(Response::new(proto::GetMetadataResponse {
            type_name: metadata.type_name,
            version: metadata.version,
            server_capabilities: Some(proto::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<proto::GetSchemaRequest>,
    ) -> Result<Response<proto::GetSchemaResponse>, Status> {
        let schema = self.provider.schema();
        debug!(resources = schema.resources.len(), "GetSchema called");
        Ok(Response::new(proto::GetSchemaResponse {
            provider: Some((&schema.provider).into()),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), v.into()))
                .collect(),
            data_sources: schema
                .data_sources
                .iter()
                .map(|(k, v)| (k.clone(), v.into()))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<proto::ValidateProviderConfigRequest>,
    ) -> Result<Response<proto::ValidateProviderConfigResponse>, Status> {
        let config = decode_json(&request.into_inner().config);
        let result = self.provider.validate_provider_config(config).await;
        Ok(Response::new(proto::ValidateProviderConfigResponse {
            diagnostics: report("ValidateProviderConfig", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<proto::ConfigureRequest>,
    ) -> Result<Response<proto::ConfigureResponse>, Status> {
        let config = decode_json(&request.into_inner().config);
        let result = self.provider.configure(config).await;
        Ok(Response::new(proto::ConfigureResponse {
            diagnostics: report("Configure", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: Request<proto::StopRequest>,
    ) -> Result<Response<proto::StopResponse>, Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(Response::new(proto::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: Request<proto::ValidateResourceConfigRequest>,
    ) -> Result<Response<proto::ValidateResourceConfigResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "ValidateResourceConfig called");
        let result = self
            .provider
            .validate_resource_config(&req.resource_type, decode_json(&req.config))
            .await;
        Ok(Response::new(proto::ValidateResourceConfigResponse {
            diagnostics: report("ValidateResourceConfig", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state")]
    async fn upgrade_resource_state(
        &self,
        request: Request<proto::UpgradeResourceStateRequest>,
    ) -> Result<Response<proto::UpgradeResourceStateResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .upgrade_resource_state(&req.resource_type, req.version, decode_json(&req.raw_state))
            .await;
        let (upgraded_state, diagnostics) =
            state_or_diagnostics("UpgradeResourceState", &req.resource_type, result);
        Ok(Response::new(proto::UpgradeResourceStateResponse {
            upgraded_state,
            diagnostics,
        }))
    }

    #[instrument(skip_all, name = "grpc.plan")]
    async fn plan(
        &self,
        request: Request<proto::PlanRequest>,
    ) -> Result<Response<proto::PlanResponse>, Status> {
        let req = request.into_inner();
        let prior_state = (!req.prior_state.is_empty()).then(|| decode_json(&req.prior_state));
        debug!(resource_type = %req.resource_type, is_create = prior_state.is_none(), "Plan called");

        let result = self
            .provider
            .plan(
                &req.resource_type,
                prior_state,
                decode_json(&req.proposed_state),
                decode_json(&req.config),
            )
            .await;

        let response = match result {
            Ok(plan) => {
                info!(resource_type = %req.resource_type, changes = plan.changes.len(), "Plan completed");
                proto::PlanResponse {
                    planned_state: encode_json(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics: vec![],
                }
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, error = %e, "Plan failed");
                proto::PlanResponse {
                    diagnostics: to_proto(e.into_diagnostics()),
                    ..Default::default()
                }
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create")]
    async fn create(
        &self,
        request: Request<proto::CreateRequest>,
    ) -> Result<Response<proto::CreateResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Create called");
        let result = self
            .provider
            .create(&req.resource_type, decode_json(&req.planned_state))
            .await;
        let (state, diagnostics) = state_or_diagnostics("Create", &req.resource_type, result);
        Ok(Response::new(proto::CreateResponse { state, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.read")]
    async fn read(
        &self,
        request: Request<proto::ReadRequest>,
    ) -> Result<Response<proto::ReadResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Read called");
        let result = self
            .provider
            .read(&req.resource_type, decode_json(&req.current_state))
            .await;
        let (state, diagnostics) = state_or_diagnostics("Read", &req.resource_type, result);
        Ok(Response::new(proto::ReadResponse { state, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.update")]
    async fn update(
        &self,
        request: Request<proto::UpdateRequest>,
    ) -> Result<Response<proto::UpdateResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Update called");
        let result = self
            .provider
            .update(
                &req.resource_type,
                decode_json(&req.prior_state),
                decode_json(&req.planned_state),
            )
            .await;
        let (state, diagnostics) = state_or_diagnostics("Update", &req.resource_type, result);
        Ok(Response::new(proto::UpdateResponse { state, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.delete")]
    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "Delete called");
        let result = self
            .provider
            .delete(&req.resource_type, decode_json(&req.current_state))
            .await
            .map(|()| Value::Null);
        let (_, diagnostics) = state_or_diagnostics("Delete", &req.resource_type, result);
        Ok(Response::new(proto::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state")]
    async fn import_resource_state(
        &self,
        request: Request<proto::ImportResourceStateRequest>,
    ) -> Result<Response<proto::ImportResourceStateResponse>, Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, id = %req.id, "ImportResourceState called");

        let response = match self.provider.import_resource(&req.resource_type, &req.id).await {
            Ok(imported) => proto::ImportResourceStateResponse {
                imported: imported
                    .into_iter()
                    .map(|r| proto::ImportedResource {
                        resource_type: r.resource_type,
                        state: encode_json(&r.state),
                    })
                    .collect(),
                diagnostics: vec![],
            },
            Err(e) => {
                warn!(resource_type = %req.resource_type, error = %e, "ImportResourceState failed");
                proto::ImportResourceStateResponse {
                    imported: vec![],
                    diagnostics: to_proto(e.into_diagnostics()),
                }
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        request: Request<proto::ValidateDataSourceConfigRequest>,
    ) -> Result<Response<proto::ValidateDataSourceConfigResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .validate_data_source_config(&req.data_source_type, decode_json(&req.config))
            .await;
        Ok(Response::new(proto::ValidateDataSourceConfigResponse {
            diagnostics: report("ValidateDataSourceConfig", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.read_data_source")]
    async fn read_data_source(
        &self,
        request: Request<proto::ReadDataSourceRequest>,
    ) -> Result<Response<proto::ReadDataSourceResponse>, Status> {
        let req = request.into_inner();
        let result = self
            .provider
            .read_data_source(&req.data_source_type, decode_json(&req.config))
            .await;
        let (state, diagnostics) =
            state_or_diagnostics("ReadDataSource", &req.data_source_type, result);
        Ok(Response::new(proto::ReadDataSourceResponse { state, diagnostics }))
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may keep running after a shutdown
    /// signal. Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C off Unix).
///
/// If the handlers cannot be installed this never resolves; the host can
/// still terminate the plugin by killing the process.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = signal(SignalKind::terminate())
            .and_then(|term| signal(SignalKind::interrupt()).map(|int| (term, int)));
        let (mut sigterm, mut sigint) = match handlers {
            Ok(handlers) => handlers,
            Err(e) => {
                warn!(error = %e, "Failed to install signal handlers");
                return std::future::pending().await;
            },
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C handler");
            return std::future::pending().await;
        }
        info!("Received CTRL+C, initiating graceful shutdown");
    }
}

/// Serve a provider as a gRPC server on an ephemeral localhost port.
///
/// Prints `REST_API_PROVIDER|<version>|<address>` to stdout once bound and
/// returns after a shutdown signal has been handled.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options. See [`serve`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    serve_on_listener(provider, listener, addr, options).await
}

/// Format the handshake line printed on stdout.
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", handshake_line(addr));
    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let service = proto::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = Server::builder().add_service(service).serve_with_incoming_shutdown(
        tokio_stream::wrappers::TcpListenerStream::new(listener),
        async move {
            wait_for_shutdown_signal().await;
            let _ = signalled_tx.send(());
        },
    );
    tokio::pin!(server);

    // The drain deadline only starts once a signal has arrived.
    tokio::select! {
        biased;
        result = &mut server => result?,
        _ = signalled_rx => match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
            Ok(result) => result?,
            Err(_) => warn!(timeout = ?options.shutdown_timeout, "Shutdown timeout exceeded, forcing shutdown"),
        },
    }
    info!("Server shutdown complete");

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RestApiProvider;
    use proto::provider_server::Provider as _;
    use serde_json::json;

    const RESOURCE: &str = "nttdata-rest-api_apiresource";

    fn service() -> ProviderGrpcService<RestApiProvider> {
        ProviderGrpcService {
            provider: Arc::new(RestApiProvider::new("test")),
        }
    }

    #[tokio::test]
    async fn test_get_metadata() {
        let response = service()
            .get_metadata(Request::new(proto::GetMetadataRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.type_name, "nttdata-rest-api");
        assert_eq!(response.version, "test");
        assert_eq!(response.resources, vec![RESOURCE.to_string()]);
        assert!(response.data_sources.is_empty());
    }

    #[tokio::test]
    async fn test_get_schema_marks_token_sensitive() {
        let response = service()
            .get_schema(Request::new(proto::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();

        let provider_block = response.provider.unwrap().block.unwrap();
        let token = provider_block
            .attributes
            .iter()
            .find(|a| a.name == "auth_token")
            .unwrap();
        assert!(token.required);
        assert!(token.sensitive);
        assert_eq!(token.r#type, br#""string""#.to_vec());

        let resource = &response.resources[RESOURCE];
        assert_eq!(resource.block.as_ref().unwrap().attributes.len(), 4);
    }

    #[tokio::test]
    async fn test_configure_reports_diagnostics_in_band() {
        let response = service()
            .configure(Request::new(proto::ConfigureRequest {
                config: encode_json(&json!({"base_url": 1, "auth_token": "tok"})),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].severity,
            proto::diagnostic::Severity::Error as i32
        );
        assert_eq!(response.diagnostics[0].attribute, "base_url");
    }

    #[tokio::test]
    async fn test_create_failure_carries_no_state() {
        let response = service()
            .create(Request::new(proto::CreateRequest {
                resource_type: RESOURCE.to_string(),
                planned_state: encode_json(&json!({"endpoint_path": "/x", "payload": "{}"})),
            }))
            .await
            .unwrap()
            .into_inner();

        // Not configured yet.
        assert!(response.state.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].summary.contains("provider not configured"));
    }

    async fn configured_service(base_url: &str) -> ProviderGrpcService<RestApiProvider> {
        let service = service();
        let response = service
            .configure(Request::new(proto::ConfigureRequest {
                config: encode_json(&json!({"base_url": base_url, "auth_token": "tok"})),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(response.diagnostics.is_empty());
        service
    }

    async fn create_items(service: &ProviderGrpcService<RestApiProvider>) -> proto::CreateResponse {
        service
            .create(Request::new(proto::CreateRequest {
                resource_type: RESOURCE.to_string(),
                planned_state: encode_json(&json!({"endpoint_path": "/items", "payload": "{}"})),
            }))
            .await
            .unwrap()
            .into_inner()
    }

    fn assert_single_error(diagnostics: &[proto::Diagnostic], needles: &[&str]) {
        assert_eq!(diagnostics.len(), 1, "{:?}", diagnostics);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.severity, proto::diagnostic::Severity::Error as i32);
        let text = format!("{} {}", diagnostic.summary, diagnostic.detail);
        for needle in needles {
            assert!(text.contains(needle), "'{}' not in: {}", needle, text);
        }
    }

    #[tokio::test]
    async fn test_create_error_status_carries_no_state() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.path("/items");
            then.status(500).body("boom");
        });

        let service = configured_service(&server.base_url()).await;
        let response = create_items(&service).await;

        mock.assert_calls(1);
        assert!(response.state.is_empty());
        assert_single_error(&response.diagnostics, &["500", "boom"]);
    }

    #[tokio::test]
    async fn test_create_unreachable_carries_no_state() {
        // Nothing listens on port 1.
        let service = configured_service("http://127.0.0.1:1").await;
        let response = create_items(&service).await;

        assert!(response.state.is_empty());
        assert_single_error(&response.diagnostics, &["error sending request"]);
    }

    #[tokio::test]
    async fn test_create_success_carries_state() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.path("/items");
            then.status(200).body("OK");
        });

        let service = configured_service(&server.base_url()).await;
        let response = create_items(&service).await;

        assert!(response.diagnostics.is_empty());
        let state = decode_json(&response.state);
        assert_eq!(state["response"], "OK");
    }

    #[tokio::test]
    async fn test_plan_create_over_the_wire() {
        let response = service()
            .plan(Request::new(proto::PlanRequest {
                resource_type: RESOURCE.to_string(),
                prior_state: vec![],
                proposed_state: encode_json(&json!({"endpoint_path": "/x", "payload": "{}"})),
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.diagnostics.is_empty());
        let planned: Value = serde_json::from_slice(&response.planned_state).unwrap();
        assert!(planned["id"].is_null());
        assert_eq!(planned["endpoint_path"], "/x");
    }

    #[tokio::test]
    async fn test_import_is_unsupported() {
        let response = service()
            .import_resource_state(Request::new(proto::ImportResourceStateRequest {
                resource_type: RESOURCE.to_string(),
                id: "req-1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.imported.is_empty());
        assert_eq!(response.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_read_data_source_unknown() {
        let response = service()
            .read_data_source(Request::new(proto::ReadDataSourceRequest {
                data_source_type: "nttdata-rest-api_anything".to_string(),
                config: vec![],
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(response.state.is_empty());
        assert!(response.diagnostics[0].summary.contains("Unknown resource type"));
    }

    #[test]
    fn test_diagnostic_to_proto() {
        let proto: proto::Diagnostic = Diagnostic::warning("careful").with_detail("why").into();
        assert_eq!(proto.severity, proto::diagnostic::Severity::Warning as i32);
        assert_eq!(proto.detail, "why");
        assert!(proto.attribute.is_empty());
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        assert_eq!(handshake_line(addr), "REST_API_PROVIDER|1|127.0.0.1:50051");
    }

    #[test]
    fn test_serve_options() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }
}
