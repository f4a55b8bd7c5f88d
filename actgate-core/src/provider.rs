//! # Schema Source Providers
//!
//! Where the raw `.proto` sources of a producing component come from. The cache only sees the
//! [`SchemaSourceProvider`] trait; three implementations ship with the crate:
//!
//! * [`DirectorySchemaProvider`]: one sub-directory of `.proto` files per component.
//! * [`HttpSchemaProvider`]: the upstream schema service, answering `GET <url>/<component>`
//!   with a base64 bundle (see [`crate::schema::source::unpack_bundle`]).
//! * [`StaticSchemaProvider`]: an in-memory map, handy in tests and embedded setups.
use crate::error::ErrorKind;
use crate::schema::source::{SchemaSource, SourceError, unpack_bundle};
use crate::settings::SourceSettings;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

const PROTO_EXTENSION: &str = "proto";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("No schema is published for component '{0}'")]
    NotFound(String),
    #[error("Failed to read schema sources of '{component}': '{source}'")]
    Io {
        component: String,
        source: std::io::Error,
    },
    #[error("Failed to list schema sources of '{component}': '{source}'")]
    Walk {
        component: String,
        source: walkdir::Error,
    },
    #[error("Failed to fetch schema of '{component}' after {attempts} attempts: '{source}'")]
    Http {
        component: String,
        attempts: u32,
        source: reqwest::Error,
    },
    #[error("Schema service answered {status} for '{component}' after {attempts} attempts")]
    Status {
        component: String,
        attempts: u32,
        status: reqwest::StatusCode,
    },
    #[error(transparent)]
    Malformed(#[from] SourceError),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Malformed(_) => ErrorKind::InvalidInput,
            ProviderError::Http { .. } | ProviderError::Status { .. } => ErrorKind::Transport,
            ProviderError::Io { .. } | ProviderError::Walk { .. } => ErrorKind::Compilation,
        }
    }
}

/// Fetches the schema sources published by a producing component.
#[async_trait]
pub trait SchemaSourceProvider: Send + Sync {
    async fn fetch(&self, component: &str) -> Result<Vec<SchemaSource>, ProviderError>;
}

/// Reads `<root>/<component>/**/*.proto`.
#[derive(Debug, Clone)]
pub struct DirectorySchemaProvider {
    root: PathBuf,
}

impl DirectorySchemaProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(root: PathBuf, component: String) -> Result<Vec<SchemaSource>, ProviderError> {
        let dir = root.join(&component);
        if !dir.is_dir() {
            return Err(ProviderError::NotFound(component));
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|source| ProviderError::Walk {
                component: component.clone(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(PROTO_EXTENSION)
            {
                continue;
            }

            let Ok(relative) = path.strip_prefix(&dir) else {
                continue;
            };
            let file_name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let content = std::fs::read(path).map_err(|source| ProviderError::Io {
                component: component.clone(),
                source,
            })?;

            sources.push(SchemaSource::new(&component, file_name, content));
        }

        if sources.is_empty() {
            return Err(ProviderError::NotFound(component));
        }
        Ok(sources)
    }
}

#[async_trait]
impl SchemaSourceProvider for DirectorySchemaProvider {
    async fn fetch(&self, component: &str) -> Result<Vec<SchemaSource>, ProviderError> {
        let root = self.root.clone();
        let owned = component.to_string();
        let sources = tokio::task::spawn_blocking(move || Self::read(root, owned))
            .await
            .map_err(|e| ProviderError::Io {
                component: component.to_string(),
                source: std::io::Error::other(e),
            })??;

        debug!(component, files = sources.len(), "read schema sources from disk");
        Ok(sources)
    }
}

/// Serves a fixed set of sources per component.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
    sources: HashMap<String, Vec<SchemaSource>>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(
        mut self,
        component: &str,
        file_name: &str,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.sources
            .entry(component.to_string())
            .or_default()
            .push(SchemaSource::new(component, file_name, content));
        self
    }
}

#[async_trait]
impl SchemaSourceProvider for StaticSchemaProvider {
    async fn fetch(&self, component: &str) -> Result<Vec<SchemaSource>, ProviderError> {
        self.sources
            .get(component)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(component.to_string()))
    }
}

/// Fetches base64 bundles from the upstream schema service.
///
/// A failed request or a non-success status is retried `retry_count` times, pausing
/// `retry_delay` between attempts. A `404` is final.
#[derive(Debug, Clone)]
pub struct HttpSchemaProvider {
    client: reqwest::Client,
    base_url: String,
    settings: SourceSettings,
}

impl HttpSchemaProvider {
    pub fn new(base_url: impl Into<String>, settings: SourceSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
        }
    }

    fn url(&self, component: &str) -> String {
        format!("{}/{}", self.base_url, component)
    }
}

#[async_trait]
impl SchemaSourceProvider for HttpSchemaProvider {
    async fn fetch(&self, component: &str) -> Result<Vec<SchemaSource>, ProviderError> {
        let url = self.url(component);
        let attempts = self.settings.retry_count + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.client.get(&url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Err(ProviderError::NotFound(component.to_string()));
                }
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(body) => {
                            let sources = unpack_bundle(component, &body)?;
                            debug!(component, files = sources.len(), "fetched schema bundle");
                            return Ok(sources);
                        }
                        Err(source) => ProviderError::Http {
                            component: component.to_string(),
                            attempts: attempt,
                            source,
                        },
                    }
                }
                Ok(response) => ProviderError::Status {
                    component: component.to_string(),
                    attempts: attempt,
                    status: response.status(),
                },
                Err(source) => ProviderError::Http {
                    component: component.to_string(),
                    attempts: attempt,
                    source,
                },
            };

            if attempt >= attempts {
                return Err(failure);
            }
            warn!(component, attempt, error = %failure, "schema fetch failed, retrying");
            tokio::time::sleep(self.settings.retry_delay()).await;
        }
    }
}
