#![allow(dead_code)]
//! Shared wiring for tests driving the engine against the `router` fixtures.
use actgate_core::directory::StaticEndpointDirectory;
use actgate_core::grpc::connector::{ConnectError, Connector};
use actgate_core::invoker::DynamicInvoker;
use actgate_core::invoker::events::{CallRecord, EventSink};
use actgate_core::provider::StaticSchemaProvider;
use actgate_core::schema::cache::SchemaCache;
use actgate_core::schema::compiler::{
    CompileError, CompiledFile, CompiledSchema, SchemaCompiler, resolve_dependencies,
};
use actgate_core::schema::json_schema::JsonSchemaDoc;
use actgate_core::schema::source::SchemaSource;
use actgate_core::settings::{CacheSettings, InvokerSettings};
use actgate_core::BoxError;
use async_trait::async_trait;
use echo_service::{EchoServer, fixtures};
use parking_lot::Mutex;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A compiler serving pre-built descriptors for the `router` files.
///
/// Unknown file names fail like `protoc` does on a missing file.
#[derive(Default)]
pub struct FixtureCompiler {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FixtureCompiler {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn descriptors() -> HashMap<String, FileDescriptorProto> {
        fixtures::router_files()
            .into_iter()
            .map(|fd| (fd.name().to_string(), fd))
            .collect()
    }
}

impl SchemaCompiler for FixtureCompiler {
    fn compile(
        &self,
        sources: &[SchemaSource],
        _search_paths: &[PathBuf],
    ) -> Result<Vec<CompiledSchema>, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let known = Self::descriptors();
        let mut resolved = BTreeMap::new();
        let mut compiled = Vec::new();

        for source in sources {
            resolve_dependencies(&source.file_name, &mut resolved, &mut |name| {
                let fd = known.get(name).cloned().ok_or_else(|| CompileError::Failed {
                    file: name.to_string(),
                    status: Some(1),
                    stderr: format!("{name}: File not found."),
                })?;
                Ok(FileDescriptorSet { file: vec![fd] })
            })?;

            let files = resolved
                .values()
                .cloned()
                .map(|fd| {
                    let mut file = CompiledFile::new(fd);
                    if file.name == fixtures::ECHO_FILE {
                        file.json_schemas = vec![JsonSchemaDoc::empty("router.EchoRequest")];
                    }
                    file
                })
                .collect();

            compiled.push(CompiledSchema {
                main_file: source.file_name.clone(),
                files,
            });
        }

        Ok(compiled)
    }
}

/// Hands out copies of an in-process server instead of dialing the address.
pub struct InProcessConnector {
    server: EchoServer,
    pub connects: AtomicUsize,
}

impl InProcessConnector {
    pub fn new(server: EchoServer) -> Self {
        Self {
            server,
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    type Service = EchoServer;

    async fn connect(&self, _address: &str) -> Result<EchoServer, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.server.clone())
    }
}

/// Keeps every call record it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<CallRecord>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, record: CallRecord) -> Result<(), BoxError> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// A sink that is always down.
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _record: CallRecord) -> Result<(), BoxError> {
        Err("event bus unavailable".into())
    }
}

/// Publishes `echo.proto` and `legacy.proto` for `router`, plus a broken file for `broken`.
pub fn provider() -> Arc<StaticSchemaProvider> {
    Arc::new(
        StaticSchemaProvider::new()
            .with_file(fixtures::COMPONENT, fixtures::ECHO_FILE, "")
            .with_file(fixtures::COMPONENT, fixtures::LEGACY_FILE, "")
            .with_file("broken", "broken.proto", "syntax = \"proto3\"; message {"),
    )
}

pub fn cache(compiler: Arc<FixtureCompiler>, ttl_secs: u64) -> Arc<SchemaCache> {
    let settings = CacheSettings {
        capacity: 10,
        ttl_secs,
    };
    Arc::new(SchemaCache::new(provider(), compiler, settings))
}

pub fn invoker(
    server: EchoServer,
    timeout_ms: u64,
) -> DynamicInvoker<InProcessConnector> {
    let directory = StaticEndpointDirectory::default().with_port(fixtures::COMPONENT, 50051);
    let settings = InvokerSettings {
        response_timeout_ms: timeout_ms,
        ..Default::default()
    };

    DynamicInvoker::with_connector(
        cache(Arc::new(FixtureCompiler::default()), 3600),
        Arc::new(directory),
        InProcessConnector::new(server),
        settings,
    )
}
