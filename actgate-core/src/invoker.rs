//! # Dynamic RPC Invoker
//!
//! Performs a unary gRPC call on a component whose schema only exists at runtime.
//!
//! ## How a call proceeds
//!
//! 1. **Resolving**: the component's bundle comes from the [`SchemaCache`], the method from the
//!    graph declaring the service.
//! 2. **Converting**: the JSON payload becomes a [`DynamicMessage`] of the method's input type.
//!    When that type declares the correlation field, it receives the caller's identifier.
//! 3. **Connecting**: the component's address comes from the [`EndpointDirectory`] and a fresh
//!    connection is opened through the [`Connector`].
//! 4. **Calling**: a single unary request on `/<package.Service>/<Method>`.
//! 5. **Validating**: the response is searched for a status field carrying the failure value
//!    (see [`validation`]).
//! 6. **Converting back**: the response is rendered as JSON, default-valued fields included.
//!
//! Connecting and calling share one deadline. The connection is owned by the call and dropped
//! with it, so it is closed on success, on failure and when the deadline cancels the call.
pub mod events;
pub mod validation;

use crate::BoxError;
use crate::directory::{DirectoryError, EndpointDirectory};
use crate::error::ErrorKind;
use crate::grpc::client::{GrpcClient, GrpcRequestError};
use crate::grpc::connector::{ChannelConnector, ConnectError, Connector};
use crate::schema::cache::{BuildError, SchemaCache};
use crate::schema::graph::{ConversionError, json_to_message, message_to_json};
use crate::schema::{InvalidServiceKey, ServiceKey};
use crate::settings::InvokerSettings;
use events::{CallRecord, CallStatus, EventSink, TracingEventSink};
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, Kind, MethodDescriptor, ReflectMessage, Value};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::client::GrpcService;
use tracing::{debug, info, warn};
use validation::StatusCheck;

/// Why a call could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Request(#[from] GrpcRequestError),
    #[error("Server answered with status {}: '{}'", .0.code(), .0.message())]
    Status(#[from] tonic::Status),
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    InvalidKey(#[from] InvalidServiceKey),
    #[error(transparent)]
    Schema(#[from] BuildError),
    #[error("Method '{method}' is not declared by service '{service}'")]
    MethodNotFound { service: ServiceKey, method: String },
    #[error(transparent)]
    Endpoint(#[from] DirectoryError),
    #[error("Invalid request payload: {source}")]
    InvalidInput {
        source: ConversionError,
        payload: serde_json::Value,
    },
    #[error("Call to '{path}' failed: {source}")]
    Transport {
        path: String,
        source: TransportFailure,
        request: serde_json::Value,
    },
    #[error("Call to '{path}' timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        path: String,
        elapsed: Duration,
        request: serde_json::Value,
    },
    #[error("Call to '{path}' was rejected: field '{field}' reports a failure status")]
    Application {
        path: String,
        field: String,
        response: serde_json::Value,
        request: serde_json::Value,
    },
    #[error("Failed to render the response of '{path}': {source}")]
    Render {
        path: String,
        source: ConversionError,
    },
}

impl InvokeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvokeError::InvalidKey(_) | InvokeError::InvalidInput { .. } => {
                ErrorKind::InvalidInput
            }
            InvokeError::Schema(err) => err.kind(),
            InvokeError::MethodNotFound { .. } => ErrorKind::NotFound,
            InvokeError::Endpoint(err) => err.kind(),
            InvokeError::Transport { .. }
            | InvokeError::Timeout { .. }
            | InvokeError::Render { .. } => ErrorKind::Transport,
            InvokeError::Application { .. } => ErrorKind::Application,
        }
    }

    /// The outbound request, or the payload that could not become one.
    pub fn request(&self) -> Option<&serde_json::Value> {
        match self {
            InvokeError::InvalidInput { payload, .. } => Some(payload),
            InvokeError::Transport { request, .. }
            | InvokeError::Timeout { request, .. }
            | InvokeError::Application { request, .. } => Some(request),
            _ => None,
        }
    }
}

/// Invokes unary methods of dynamically loaded schemas.
pub struct DynamicInvoker<C = ChannelConnector> {
    cache: Arc<SchemaCache>,
    directory: Arc<dyn EndpointDirectory>,
    connector: C,
    events: Arc<dyn EventSink>,
    settings: InvokerSettings,
    status_check: StatusCheck,
}

impl DynamicInvoker<ChannelConnector> {
    pub fn new(
        cache: Arc<SchemaCache>,
        directory: Arc<dyn EndpointDirectory>,
        settings: InvokerSettings,
    ) -> Self {
        Self::with_connector(cache, directory, ChannelConnector, settings)
    }
}

impl<C: Connector> DynamicInvoker<C> {
    pub fn with_connector(
        cache: Arc<SchemaCache>,
        directory: Arc<dyn EndpointDirectory>,
        connector: C,
        settings: InvokerSettings,
    ) -> Self {
        let status_check = StatusCheck::new(&settings.status_marker, &settings.error_status);
        Self {
            cache,
            directory,
            connector,
            events: Arc::new(TracingEventSink),
            settings,
            status_check,
        }
    }

    /// Replaces the default (log only) call record sink.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn publish(&self, record: CallRecord) {
        if let Err(err) = self.events.publish(record).await {
            warn!(error = %err, "failed to publish call record");
        }
    }
}

impl<C> DynamicInvoker<C>
where
    C: Connector,
    C::Service: GrpcService<tonic::body::Body>,
    <C::Service as GrpcService<tonic::body::Body>>::Error: Into<BoxError>,
    <C::Service as GrpcService<tonic::body::Body>>::ResponseBody:
        HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <<C::Service as GrpcService<tonic::body::Body>>::ResponseBody as HttpBody>::Error:
        Into<BoxError> + Send,
{
    /// Like [`DynamicInvoker::invoke`], with the service given as `"component:service"`.
    pub async fn invoke_by_name(
        &self,
        service: &str,
        method: &str,
        payload: serde_json::Value,
        correlation_id: &str,
    ) -> Result<serde_json::Value, InvokeError> {
        let key: ServiceKey = service.parse()?;
        self.invoke(&key, method, payload, correlation_id).await
    }

    /// Calls `method` of `key` with `payload` and returns the JSON response.
    ///
    /// `correlation_id` is written into the request's correlation field, when its type has one,
    /// and is the parent of the call records emitted for this call.
    pub async fn invoke(
        &self,
        key: &ServiceKey,
        method: &str,
        payload: serde_json::Value,
        correlation_id: &str,
    ) -> Result<serde_json::Value, InvokeError> {
        let name = format!("{key} method {method} call");
        self.publish(CallRecord::started(correlation_id, &name, payload.clone()))
            .await;

        let started = Instant::now();
        let result = self.call(key, method, &payload, correlation_id).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let record = match &result {
            Ok(response) => {
                info!(service = %key, method, elapsed_ms, "call succeeded");
                CallRecord::finished(
                    correlation_id,
                    &name,
                    CallStatus::Passed,
                    elapsed_ms,
                    response.clone(),
                )
            }
            Err(err) => {
                warn!(service = %key, method, elapsed_ms, kind = %err.kind(), error = %err, "call failed");
                CallRecord::finished(
                    correlation_id,
                    &name,
                    CallStatus::Failed,
                    elapsed_ms,
                    json!({ "kind": err.kind().to_string(), "error": err.to_string() }),
                )
            }
        };
        self.publish(record).await;

        result
    }

    async fn call(
        &self,
        key: &ServiceKey,
        method: &str,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<serde_json::Value, InvokeError> {
        let bundle = self.cache.get_bundle(&key.component).await?;
        let graph = bundle.graph(key).map_err(BuildError::from)?;
        let method_desc =
            graph
                .method(&key.service, method)
                .ok_or_else(|| InvokeError::MethodNotFound {
                    service: key.clone(),
                    method: method.to_string(),
                })?;
        let path = format!(
            "{}/{}",
            method_desc.parent_service().full_name(),
            method_desc.name()
        );

        let mut request = json_to_message(payload, &method_desc.input()).map_err(|source| {
            InvokeError::InvalidInput {
                source,
                payload: payload.clone(),
            }
        })?;
        set_correlation_id(&mut request, &self.settings.correlation_field, correlation_id);
        let request_json = message_to_json(&request).unwrap_or_else(|_| payload.clone());

        let address = self.directory.resolve(&key.component).await?;
        let deadline = self.settings.response_timeout();
        debug!(%address, %path, ?deadline, "calling");

        let response =
            match tokio::time::timeout(deadline, self.exchange(&address, &method_desc, request))
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(source)) => {
                    return Err(InvokeError::Transport {
                        path,
                        source,
                        request: request_json,
                    });
                }
                Err(_) => {
                    return Err(InvokeError::Timeout {
                        path,
                        elapsed: deadline,
                        request: request_json,
                    });
                }
            };

        let rendered = message_to_json(&response).map_err(|source| InvokeError::Render {
            path: path.clone(),
            source,
        })?;

        if let Some(field) = self.status_check.find_failure(&response) {
            return Err(InvokeError::Application {
                path,
                field,
                response: rendered,
                request: request_json,
            });
        }

        Ok(rendered)
    }

    /// Opens a connection, performs the call and closes the connection.
    async fn exchange(
        &self,
        address: &str,
        method: &MethodDescriptor,
        request: DynamicMessage,
    ) -> Result<DynamicMessage, TransportFailure> {
        let service = self.connector.connect(address).await?;
        let mut client = GrpcClient::new(service);
        let response = client.unary(method, request).await??;
        Ok(response)
    }
}

/// Writes `id` into the message's correlation field.
///
/// A string field takes the identifier as is; a message field with a string `id` gets a message
/// carrying it. Anything else is left alone.
fn set_correlation_id(message: &mut DynamicMessage, field_name: &str, id: &str) {
    let Some(field) = message.descriptor().get_field_by_name(field_name) else {
        return;
    };
    if field.is_list() || field.is_map() {
        debug!(field = field_name, "correlation field is not singular, skipping");
        return;
    }

    match field.kind() {
        Kind::String => message.set_field(&field, Value::String(id.to_string())),
        Kind::Message(desc) => {
            let Some(id_field) = desc
                .get_field_by_name("id")
                .filter(|f| f.kind() == Kind::String && !f.is_list())
            else {
                debug!(field = field_name, "correlation message has no string id, skipping");
                return;
            };
            let mut event_id = DynamicMessage::new(desc);
            event_id.set_field(&id_field, Value::String(id.to_string()));
            message.set_field(&field, Value::Message(event_id));
        }
        _ => debug!(field = field_name, "correlation field has an unsupported type, skipping"),
    }
}
