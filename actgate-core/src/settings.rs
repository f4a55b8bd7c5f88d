//! # Settings
//!
//! Deserializable settings for every component of the engine. Each struct is
//! `#[serde(default)]`, so a configuration file only needs to mention the values it overrides.
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level settings, one section per component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub compiler: CompilerSettings,
    pub source: SourceSettings,
    pub endpoints: EndpointSettings,
    pub invoker: InvokerSettings,
}

/// Bounds of the schema cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of producing components kept at once.
    pub capacity: usize,
    /// Time-to-live of every entry, in seconds.
    pub ttl_secs: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 60 * 60,
        }
    }
}

/// How the external schema compiler is invoked.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// The `protoc` executable.
    pub protoc: PathBuf,
    /// Path to `protoc-gen-jsonschema`. JSON-Schema generation is skipped when unset.
    pub json_schema_plugin: Option<PathBuf>,
    /// Extra `--proto_path` entries, searched after the scratch directory.
    pub include_paths: Vec<PathBuf>,
    /// Where scratch directories are created. Defaults to the system temp dir.
    pub scratch_root: Option<PathBuf>,
    /// Package injected into sources that do not declare one.
    pub default_package: String,
    /// Upper bound for a single compiler subprocess, in milliseconds.
    pub timeout_ms: u64,
}

impl CompilerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            protoc: PathBuf::from("protoc"),
            json_schema_plugin: None,
            include_paths: Vec::new(),
            scratch_root: None,
            default_package: "gateway".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// Where the raw schema sources of a component come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Local directory holding one sub-directory of `.proto` files per component.
    pub directory: Option<PathBuf>,
    /// Base URL of the upstream schema service; `<url>/<component>` is fetched.
    pub url: Option<String>,
    /// Additional attempts after a failed fetch.
    pub retry_count: u32,
    /// Pause between attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl SourceSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            directory: None,
            url: None,
            retry_count: 10,
            retry_delay_ms: 1_000,
        }
    }
}

/// The static endpoint directory: one host, one published port per component.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub scheme: String,
    pub host: String,
    pub ports: HashMap<String, u16>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            ports: HashMap::new(),
        }
    }
}

/// Behaviour of the dynamic invoker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvokerSettings {
    /// Deadline for a whole call (connect + request + response), in milliseconds.
    pub response_timeout_ms: u64,
    /// Request field that receives the correlation identifier, when the type declares it.
    /// The same field is hidden from the JSON-Schemas handed to callers.
    pub correlation_field: String,
    /// Substring (case-insensitive) identifying status fields in responses.
    pub status_marker: String,
    /// Status value that turns a transport success into an application failure.
    pub error_status: String,
}

impl InvokerSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: 60_000,
            correlation_field: DEFAULT_CORRELATION_FIELD.to_string(),
            status_marker: "status".to_string(),
            error_status: "ERROR".to_string(),
        }
    }
}

pub const DEFAULT_CORRELATION_FIELD: &str = "parent_event_id";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();

        assert_eq!(settings.cache.capacity, 100);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(settings.compiler.default_package, "gateway");
        assert_eq!(settings.invoker.response_timeout(), Duration::from_secs(60));
        assert_eq!(settings.invoker.correlation_field, "parent_event_id");
        assert_eq!(settings.source.retry_count, 10);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "cache": { "ttl_secs": 5 },
            "endpoints": { "ports": { "router": 50051 } }
        }))
        .unwrap();

        assert_eq!(settings.cache.ttl_secs, 5);
        assert_eq!(settings.cache.capacity, 100);
        assert_eq!(settings.endpoints.host, "localhost");
        assert_eq!(settings.endpoints.ports.get("router"), Some(&50051));
    }
}
