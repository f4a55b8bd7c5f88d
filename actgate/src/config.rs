//! Configuration file loading for actgate.
//!
//! Reads the TOML settings file and wires the engine collaborators it describes.

use actgate_core::directory::StaticEndpointDirectory;
use actgate_core::invoker::DynamicInvoker;
use actgate_core::provider::{DirectorySchemaProvider, HttpSchemaProvider, SchemaSourceProvider};
use actgate_core::schema::cache::SchemaCache;
use actgate_core::schema::compiler::ProtocCompiler;
use actgate_core::settings::{Settings, SourceSettings};
use anyhow::{Context, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Load and parse a settings file.
pub fn load_config(path: &Path) -> anyhow::Result<Settings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path.display()))
}

pub fn parse_config(contents: &str) -> anyhow::Result<Settings> {
    let settings: Settings = toml::from_str(contents).context("invalid TOML")?;
    Ok(settings)
}

/// Load settings from `path`, or return the defaults if the file does not exist.
pub fn load_or_default(path: &Path) -> anyhow::Result<Settings> {
    if path.exists() {
        debug!("found config file at {}", path.display());
        load_config(path)
    } else {
        debug!("no config file found at {}", path.display());
        Ok(Settings::default())
    }
}

/// Picks the schema source: a local directory wins over a remote URL.
pub fn schema_provider(source: &SourceSettings) -> anyhow::Result<Arc<dyn SchemaSourceProvider>> {
    match (&source.directory, &source.url) {
        (Some(dir), _) => Ok(Arc::new(DirectorySchemaProvider::new(dir))),
        (None, Some(url)) => Ok(Arc::new(HttpSchemaProvider::new(url, source.clone()))),
        (None, None) => bail!("no schema source configured: set [source] directory or url"),
    }
}

pub fn schema_cache(settings: &Settings) -> anyhow::Result<Arc<SchemaCache>> {
    let provider = schema_provider(&settings.source)?;
    let compiler = Arc::new(
        ProtocCompiler::new(settings.compiler.clone())
            .with_correlation_field(&settings.invoker.correlation_field),
    );
    Ok(Arc::new(SchemaCache::new(
        provider,
        compiler,
        settings.cache.clone(),
    )))
}

pub fn invoker(settings: &Settings) -> anyhow::Result<DynamicInvoker> {
    let directory = Arc::new(StaticEndpointDirectory::new(settings.endpoints.clone()));
    Ok(DynamicInvoker::new(
        schema_cache(settings)?,
        directory,
        settings.invoker.clone(),
    ))
}
