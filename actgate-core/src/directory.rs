//! # Service Endpoint Directory
//!
//! Maps a producing component to the address its gRPC server listens on.
use crate::error::ErrorKind;
use crate::settings::EndpointSettings;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("No endpoint is published for component '{0}'")]
    NotFound(String),
}

impl DirectoryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotFound
    }
}

/// Resolves the address (`scheme://host:port`) of a producing component.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    async fn resolve(&self, component: &str) -> Result<String, DirectoryError>;
}

/// A directory backed by configuration: one host, one published port per component.
#[derive(Debug, Clone, Default)]
pub struct StaticEndpointDirectory {
    settings: EndpointSettings,
}

impl StaticEndpointDirectory {
    pub fn new(settings: EndpointSettings) -> Self {
        Self { settings }
    }

    pub fn with_port(mut self, component: impl Into<String>, port: u16) -> Self {
        self.settings.ports.insert(component.into(), port);
        self
    }
}

#[async_trait]
impl EndpointDirectory for StaticEndpointDirectory {
    async fn resolve(&self, component: &str) -> Result<String, DirectoryError> {
        let port = self
            .settings
            .ports
            .get(component)
            .ok_or_else(|| DirectoryError::NotFound(component.to_string()))?;

        Ok(format!(
            "{}://{}:{}",
            self.settings.scheme, self.settings.host, port
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_published_ports() {
        let directory = StaticEndpointDirectory::default().with_port("router", 50051);

        assert_eq!(
            directory.resolve("router").await,
            Ok("http://localhost:50051".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_component_is_not_found() {
        let directory = StaticEndpointDirectory::default();

        let err = directory.resolve("ghost").await.unwrap_err();

        assert_eq!(err, DirectoryError::NotFound("ghost".to_string()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
