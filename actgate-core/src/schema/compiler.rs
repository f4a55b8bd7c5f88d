//! # Schema Compiler Adapter
//!
//! Turns the raw `.proto` sources of a producing component into binary descriptors and
//! JSON-Schema documents.
//!
//! ## How it works
//!
//! [`ProtocCompiler`] writes every source into a scratch directory (injecting a package where
//! one is missing) and shells out to `protoc`:
//!
//! 1. **Descriptors**: each file is compiled on its own with `--descriptor_set_out`. The
//!    resulting `FileDescriptorProto` lists its imports, and every import not yet resolved is
//!    compiled recursively. Resolved files are shared across the whole batch, so a file reached
//!    through several import paths (a diamond) is compiled exactly once.
//! 2. **JSON-Schema**: when a `protoc-gen-jsonschema` plugin is configured, the main file is
//!    compiled once more through the plugin and every generated document is collected.
//!
//! The scratch directory is a [`tempfile::TempDir`], removed when compilation returns, whether
//! it succeeded or not.
//!
//! The [`SchemaCompiler`] trait is the seam: an in-process compiler can replace the subprocess
//! without touching the assembler, registry, cache or invoker.
use super::json_schema::JsonSchemaDoc;
use super::source::{SchemaSource, inject_package};
use crate::settings::{CompilerSettings, DEFAULT_CORRELATION_FIELD};
use prost::Message;
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const JSON_SCHEMA_EXTENSIONS: [&str; 2] = ["jsonschema", "json"];

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Failed to prepare scratch space for '{file}': '{source}'")]
    Scratch {
        file: String,
        source: std::io::Error,
    },
    #[error("Failed to start schema compiler '{program}': '{source}'")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Failed to generate schema for '{file}' (exit status {status:?}): {stderr}")]
    Failed {
        file: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("Schema compiler timed out after {timeout:?} while compiling '{file}'")]
    TimedOut { file: String, timeout: Duration },
    #[error("Failed to decode the descriptor set produced for '{file}': '{source}'")]
    InvalidDescriptor {
        file: String,
        source: prost::DecodeError,
    },
    #[error("Failed to read JSON-Schema generated for '{file}': '{source}'")]
    InvalidJsonSchema {
        file: String,
        source: serde_json::Error,
    },
    #[error("The compiler produced no descriptor for main file '{0}'")]
    MissingMainDescriptor(String),
    #[error("Schema file name '{0}' must be a relative path inside its bundle")]
    UnsafeFileName(String),
}

impl CompileError {
    /// The schema file the failure is attributed to, when there is one.
    pub fn file(&self) -> Option<&str> {
        match self {
            CompileError::Scratch { file, .. }
            | CompileError::Failed { file, .. }
            | CompileError::TimedOut { file, .. }
            | CompileError::InvalidDescriptor { file, .. }
            | CompileError::InvalidJsonSchema { file, .. }
            | CompileError::MissingMainDescriptor(file)
            | CompileError::UnsafeFileName(file) => Some(file),
            CompileError::Spawn { .. } => None,
        }
    }
}

/// Compiler output for one schema file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFile {
    pub name: String,
    /// Names of the files this one imports.
    pub dependencies: Vec<String>,
    pub descriptor: FileDescriptorProto,
    /// Documents generated for this file's own message types. Only filled for main files.
    pub json_schemas: Vec<JsonSchemaDoc>,
}

impl CompiledFile {
    pub fn new(descriptor: FileDescriptorProto) -> Self {
        Self {
            name: descriptor.name().to_string(),
            dependencies: descriptor.dependency.clone(),
            descriptor,
            json_schemas: Vec::new(),
        }
    }

    /// The binary (`FileDescriptorProto`) form of this file.
    pub fn descriptor_bytes(&self) -> Vec<u8> {
        self.descriptor.encode_to_vec()
    }
}

/// A main file together with every file it transitively imports.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchema {
    pub main_file: String,
    pub files: Vec<CompiledFile>,
}

/// Compiles schema sources into descriptors.
///
/// Implementations are synchronous; callers move them off the async runtime.
pub trait SchemaCompiler: Send + Sync {
    /// Compiles every source of the batch, returning one [`CompiledSchema`] per source file.
    ///
    /// `search_paths` are extra include directories, searched after the sources themselves.
    fn compile(
        &self,
        sources: &[SchemaSource],
        search_paths: &[PathBuf],
    ) -> Result<Vec<CompiledSchema>, CompileError>;
}

/// A [`SchemaCompiler`] backed by the `protoc` executable.
#[derive(Debug, Clone)]
pub struct ProtocCompiler {
    settings: CompilerSettings,
    correlation_field: String,
}

impl ProtocCompiler {
    pub fn new(settings: CompilerSettings) -> Self {
        if settings.json_schema_plugin.is_none() {
            warn!("no JSON-Schema plugin configured, schemas will carry no JSON-Schema documents");
        }
        Self {
            settings,
            correlation_field: DEFAULT_CORRELATION_FIELD.to_string(),
        }
    }

    /// Proto name of the field stripped from generated JSON-Schemas, the one the invoker fills in.
    pub fn with_correlation_field(mut self, field: impl Into<String>) -> Self {
        self.correlation_field = field.into();
        self
    }

    fn scratch_dir(&self, file: &str) -> Result<tempfile::TempDir, CompileError> {
        let builder = tempfile::Builder::new().prefix("actgate-").to_owned();
        let dir = match &self.settings.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|source| CompileError::Scratch {
            file: file.to_string(),
            source,
        })
    }

    fn write_sources(&self, sources: &[SchemaSource], dir: &Path) -> Result<(), CompileError> {
        for source in sources {
            let path = dir.join(&source.file_name);
            let content = inject_package(
                &String::from_utf8_lossy(&source.content),
                &self.settings.default_package,
            );
            let scratch_err = |source| CompileError::Scratch {
                file: path.display().to_string(),
                source,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(scratch_err)?;
            }
            std::fs::write(&path, content).map_err(scratch_err)?;
        }
        Ok(())
    }

    fn proto_path_args(proto_paths: &[PathBuf]) -> Vec<OsString> {
        proto_paths
            .iter()
            .map(|p| {
                let mut arg = OsString::from("--proto_path=");
                arg.push(p);
                arg
            })
            .collect()
    }

    /// Runs `protoc` on a single file and returns the descriptor set it wrote.
    fn descriptor_set(
        &self,
        file: &str,
        proto_paths: &[PathBuf],
        scratch: &Path,
    ) -> Result<FileDescriptorSet, CompileError> {
        let out = tempfile::Builder::new()
            .suffix(".pb")
            .tempfile_in(scratch)
            .map_err(|source| CompileError::Scratch {
                file: file.to_string(),
                source,
            })?;

        let mut descriptor_out = OsString::from("--descriptor_set_out=");
        descriptor_out.push(out.path());

        let mut args = Self::proto_path_args(proto_paths);
        args.push(descriptor_out);
        args.push(OsString::from(file));
        self.run(file, args, scratch)?;

        let bytes = std::fs::read(out.path()).map_err(|source| CompileError::Scratch {
            file: file.to_string(),
            source,
        })?;
        FileDescriptorSet::decode(bytes.as_slice()).map_err(|source| {
            CompileError::InvalidDescriptor {
                file: file.to_string(),
                source,
            }
        })
    }

    fn json_schemas(
        &self,
        main: &FileDescriptorProto,
        proto_paths: &[PathBuf],
        scratch: &Path,
    ) -> Result<Vec<JsonSchemaDoc>, CompileError> {
        let Some(plugin) = &self.settings.json_schema_plugin else {
            return Ok(Vec::new());
        };
        let file = main.name();

        let out_dir = tempfile::Builder::new()
            .prefix("jsonschema-")
            .tempdir_in(scratch)
            .map_err(|source| CompileError::Scratch {
                file: file.to_string(),
                source,
            })?;

        let mut plugin_arg = OsString::from("--plugin=protoc-gen-jsonschema=");
        plugin_arg.push(plugin);
        let mut out_arg = OsString::from("--jsonschema_out=disallow_additional_properties,json_fieldnames:");
        out_arg.push(out_dir.path());

        let mut args = Self::proto_path_args(proto_paths);
        args.push(plugin_arg);
        args.push(out_arg);
        args.push(OsString::from(file));
        self.run(file, args, scratch)?;

        let mut docs = Vec::new();
        for entry in WalkDir::new(out_dir.path())
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_schema = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| JSON_SCHEMA_EXTENSIONS.contains(&ext));
            if !path.is_file() || !is_schema {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let raw = std::fs::read(path).map_err(|source| CompileError::Scratch {
                file: file.to_string(),
                source,
            })?;
            let schema = serde_json::from_slice(&raw).map_err(|source| {
                CompileError::InvalidJsonSchema {
                    file: file.to_string(),
                    source,
                }
            })?;

            docs.push(JsonSchemaDoc::from_generated(
                qualified_type_name(main.package(), stem),
                schema,
                &self.correlation_field,
            ));
        }

        debug!(file, documents = docs.len(), "collected JSON-Schema documents");
        Ok(docs)
    }

    fn run(&self, file: &str, args: Vec<OsString>, cwd: &Path) -> Result<(), CompileError> {
        let program = self.settings.protoc.display().to_string();
        let timeout = self.settings.timeout();

        let mut child = Command::new(&self.settings.protoc)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompileError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stderr = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            let polled = child.try_wait().map_err(|source| CompileError::Spawn {
                program: program.clone(),
                source,
            })?;
            match polled {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    error!(file, ?timeout, "schema compiler timed out");
                    return Err(CompileError::TimedOut {
                        file: file.to_string(),
                        timeout,
                    });
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let stderr = stderr_reader.join().unwrap_or_default();
        if status.success() {
            return Ok(());
        }

        error!(file, code = ?status.code(), %stderr, "schema compiler failed");
        Err(CompileError::Failed {
            file: file.to_string(),
            status: status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

impl SchemaCompiler for ProtocCompiler {
    fn compile(
        &self,
        sources: &[SchemaSource],
        search_paths: &[PathBuf],
    ) -> Result<Vec<CompiledSchema>, CompileError> {
        let Some(first) = sources.first() else {
            return Ok(Vec::new());
        };
        if let Some(unsafe_source) = sources.iter().find(|s| !is_contained(&s.file_name)) {
            error!(file = %unsafe_source.file_name, "rejecting schema file outside the bundle");
            return Err(CompileError::UnsafeFileName(unsafe_source.file_name.clone()));
        }

        let scratch = self.scratch_dir(&first.file_name)?;
        self.write_sources(sources, scratch.path())?;

        let proto_paths: Vec<PathBuf> = std::iter::once(scratch.path().to_path_buf())
            .chain(search_paths.iter().cloned())
            .chain(self.settings.include_paths.iter().cloned())
            .collect();

        let mut resolved = BTreeMap::new();
        let mut compiled = Vec::with_capacity(sources.len());

        for source in sources {
            debug!(file = %source.file_name, component = %source.component, "compiling schema");

            resolve_dependencies(&source.file_name, &mut resolved, &mut |file| {
                self.descriptor_set(file, &proto_paths, scratch.path())
            })?;

            let main = resolved
                .get(&source.file_name)
                .ok_or_else(|| CompileError::MissingMainDescriptor(source.file_name.clone()))?;
            let json_schemas = self.json_schemas(main, &proto_paths, scratch.path())?;

            let files = transitive_closure(&source.file_name, &resolved)
                .into_iter()
                .map(|fd| {
                    let mut file = CompiledFile::new(fd.clone());
                    if file.name == source.file_name {
                        file.json_schemas = json_schemas.clone();
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

/// Whether `file_name` stays below the directory it is joined onto.
fn is_contained(file_name: &str) -> bool {
    let path = Path::new(file_name);
    path.file_name().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Depth-first import resolution.
///
/// `generate` compiles a single file. Every file it returns is recorded in `resolved` before its
/// imports are visited, so each file is generated at most once however many paths reach it.
pub fn resolve_dependencies<F>(
    file: &str,
    resolved: &mut BTreeMap<String, FileDescriptorProto>,
    generate: &mut F,
) -> Result<(), CompileError>
where
    F: FnMut(&str) -> Result<FileDescriptorSet, CompileError>,
{
    if resolved.contains_key(file) {
        return Ok(());
    }

    let set = generate(file)?;
    let mut pending = Vec::new();
    for fd in set.file {
        let name = fd.name().to_string();
        if resolved.contains_key(&name) {
            continue;
        }
        pending.extend(fd.dependency.iter().cloned());
        resolved.insert(name, fd);
    }

    for dependency in pending {
        resolve_dependencies(&dependency, resolved, generate)?;
    }

    Ok(())
}

/// Collects `main` and every file it transitively imports, dependencies first.
fn transitive_closure<'a>(
    main: &str,
    resolved: &'a BTreeMap<String, FileDescriptorProto>,
) -> Vec<&'a FileDescriptorProto> {
    fn visit<'a>(
        name: &str,
        resolved: &'a BTreeMap<String, FileDescriptorProto>,
        seen: &mut HashSet<String>,
        out: &mut Vec<&'a FileDescriptorProto>,
    ) {
        if !seen.insert(name.to_string()) {
            return;
        }
        let Some(fd) = resolved.get(name) else {
            return;
        };
        for dependency in &fd.dependency {
            visit(dependency, resolved, seen, out);
        }
        out.push(fd);
    }

    let mut out = Vec::new();
    visit(main, resolved, &mut HashSet::new(), &mut out);
    out
}

fn qualified_type_name(package: &str, stem: &str) -> String {
    if package.is_empty() || stem.starts_with(&format!("{package}.")) {
        stem.to_string()
    } else {
        format!("{package}.{stem}")
    }
}
