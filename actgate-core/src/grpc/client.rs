//! # Generic gRPC Client
//!
//! Wraps a standard `tonic` client to issue unary calls without a generated stub. The client
//! does not know the messages it carries: the [`MethodDescriptor`] supplies the HTTP/2 path
//! (`/package.Service/Method`) and the response type handed to the codec.
use super::codec::DynamicMessageCodec;
use crate::BoxError;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use tonic::{client::GrpcService, transport::Channel};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Method '{path}' does not form a valid gRPC path: '{source}'")]
    InvalidPath {
        path: String,
        source: http::uri::InvalidUri,
    },
}

/// A generic unary gRPC client over any `tonic` transport.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        payload: DynamicMessage,
    ) -> Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicMessageCodec::new(method.output());
        let path = http_path(method)?;
        let request = tonic::Request::new(payload);

        match self.client.unary(request, path, codec).await {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }
}

/// `/<fully qualified service>/<method>`
pub fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path)
        .map_err(|source| GrpcRequestError::InvalidPath { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_service::fixtures;

    #[test]
    fn path_uses_the_fully_qualified_service_name() {
        let pool = fixtures::descriptor_pool().unwrap();
        let method = pool
            .get_service_by_name("router.legacy.Desk")
            .and_then(|s| s.methods().find(|m| m.name() == "Open"))
            .unwrap();

        assert_eq!(http_path(&method).unwrap().as_str(), "/router.legacy.Desk/Open");
    }
}
