//! # Descriptor Assembler
//!
//! Builds an in-process, cross-referenced descriptor graph out of the files a compilation
//! produced for one main file.
//!
//! Assembly is pure: no I/O happens here. Files are ordered bottom-up (a file is only added to
//! the pool once all of its imports are) and import cycles are rejected with the cycle spelled
//! out. Type-level recursion (a message holding itself) is a different graph and assembles
//! normally.
//!
//! The assembled [`DescriptorGraph`] exposes the main file's services and converts between JSON
//! and [`DynamicMessage`] in both directions.
use super::compiler::CompiledFile;
use super::json_schema::JsonSchemaDoc;
use super::types::{ProtoMethod, ProtoService, ServiceKey};
use prost_reflect::{
    Cardinality, DescriptorPool, DeserializeOptions, DynamicMessage, MessageDescriptor,
    MethodDescriptor, ReflectMessage, SerializeOptions, ServiceDescriptor, Value,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("Main file '{0}' is not part of the compiled batch")]
    MissingMainFile(String),
    #[error("Schema files form an import cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("Failed to resolve types of '{file}': '{source}'")]
    UnresolvedType {
        file: String,
        source: prost_reflect::DescriptorError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Type '{0}' is not part of the schema")]
    UnknownType(String),
    #[error("Failed to parse JSON as '{type_name}': {message}")]
    InvalidJson { type_name: String, message: String },
    #[error("Missing required field '{field}' of '{type_name}'")]
    MissingRequiredField { type_name: String, field: String },
    #[error("Failed to render '{type_name}' as JSON: '{source}'")]
    Render {
        type_name: String,
        source: serde_json::Error,
    },
}

/// The assembled descriptors of one main file plus its transitive imports.
#[derive(Debug, Clone)]
pub struct DescriptorGraph {
    main_file: String,
    files: Vec<String>,
    pool: DescriptorPool,
    services: Vec<ProtoService>,
    json_schemas: BTreeMap<String, JsonSchemaDoc>,
}

impl DescriptorGraph {
    /// Assembles `files` into a graph whose services are the ones declared by `main_file`.
    ///
    /// Imports that name files absent from the batch are dropped from the graph. Any type that
    /// lived in such a file then fails to resolve, naming the file that referenced it.
    pub fn assemble(
        component: &str,
        main_file: &str,
        files: &[CompiledFile],
    ) -> Result<Self, AssembleError> {
        let by_name: HashMap<&str, &CompiledFile> =
            files.iter().map(|f| (f.name.as_str(), f)).collect();
        let main = by_name
            .get(main_file)
            .copied()
            .ok_or_else(|| AssembleError::MissingMainFile(main_file.to_string()))?;

        let ordered = topological_order(main_file, &by_name)?;

        let mut pool = DescriptorPool::new();
        for name in &ordered {
            let file = by_name[name.as_str()];
            let descriptor = without_missing_imports(file, &by_name);
            pool.add_file_descriptor_proto(descriptor)
                .map_err(|source| AssembleError::UnresolvedType {
                    file: name.clone(),
                    source,
                })?;
        }

        let services = pool
            .get_file_by_name(main_file)
            .map(|file| {
                file.services()
                    .map(|service| describe(component, &service))
                    .collect()
            })
            .unwrap_or_default();

        let json_schemas = main
            .json_schemas
            .iter()
            .map(|doc| (doc.type_name.clone(), doc.clone()))
            .collect();

        Ok(Self {
            main_file: main_file.to_string(),
            files: ordered,
            pool,
            services,
            json_schemas,
        })
    }

    pub fn main_file(&self) -> &str {
        &self.main_file
    }

    /// Every file of the graph, dependencies first and the main file last.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Files of the graph other than the main file.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .map(String::as_str)
            .filter(|f| *f != self.main_file)
    }

    pub fn services(&self) -> &[ProtoService] {
        &self.services
    }

    pub fn service(&self, key: &ServiceKey) -> Option<&ProtoService> {
        self.services.iter().find(|s| s.name == *key)
    }

    /// JSON-Schema documents generated for the main file, keyed by type name.
    pub fn json_schemas(&self) -> &BTreeMap<String, JsonSchemaDoc> {
        &self.json_schemas
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Resolves a method of one of the main file's services.
    ///
    /// `service` may be the short name (`Echo`) or the fully-qualified one (`router.Echo`).
    pub fn method(&self, service: &str, method: &str) -> Option<MethodDescriptor> {
        self.service_descriptor(service)?
            .methods()
            .find(|m| m.name() == method)
    }

    pub fn message(&self, type_name: &str) -> Option<MessageDescriptor> {
        self.pool
            .get_message_by_name(type_name.trim_start_matches('.'))
    }

    /// Parses `json` as an instance of `type_name`.
    pub fn json_to_message(
        &self,
        type_name: &str,
        json: &serde_json::Value,
    ) -> Result<DynamicMessage, ConversionError> {
        let desc = self
            .message(type_name)
            .ok_or_else(|| ConversionError::UnknownType(type_name.to_string()))?;
        json_to_message(json, &desc)
    }

    fn service_descriptor(&self, service: &str) -> Option<ServiceDescriptor> {
        let file = self.pool.get_file_by_name(&self.main_file)?;
        file.services()
            .find(|s| s.name() == service || s.full_name() == service)
    }
}

/// Builds a wire message of type `desc` from `json`.
///
/// Unknown fields and values of the wrong kind are rejected, and so is a message that leaves a
/// `required` field unset at any depth.
pub fn json_to_message(
    json: &serde_json::Value,
    desc: &MessageDescriptor,
) -> Result<DynamicMessage, ConversionError> {
    let options = DeserializeOptions::new().deny_unknown_fields(true);
    let message = DynamicMessage::deserialize_with_options(desc.clone(), json, &options)
        .map_err(|e| ConversionError::InvalidJson {
            type_name: desc.full_name().to_string(),
            message: e.to_string(),
        })?;

    check_required(&message)?;
    Ok(message)
}

/// Renders `message` as JSON, keeping fields that hold their default value.
pub fn message_to_json(message: &DynamicMessage) -> Result<serde_json::Value, ConversionError> {
    let options = SerializeOptions::new().skip_default_fields(false);
    message
        .serialize_with_options(serde_json::value::Serializer, &options)
        .map_err(|source| ConversionError::Render {
            type_name: message.descriptor().full_name().to_string(),
            source,
        })
}

fn check_required(message: &DynamicMessage) -> Result<(), ConversionError> {
    let desc = message.descriptor();
    for field in desc.fields() {
        if field.cardinality() == Cardinality::Required && !message.has_field(&field) {
            return Err(ConversionError::MissingRequiredField {
                type_name: desc.full_name().to_string(),
                field: field.name().to_string(),
            });
        }
        if message.has_field(&field) {
            check_nested(&message.get_field(&field))?;
        }
    }
    Ok(())
}

fn check_nested(value: &Value) -> Result<(), ConversionError> {
    match value {
        Value::Message(nested) => check_required(nested),
        Value::List(items) => items.iter().try_for_each(check_nested),
        Value::Map(entries) => entries.values().try_for_each(check_nested),
        _ => Ok(()),
    }
}

fn describe(component: &str, service: &ServiceDescriptor) -> ProtoService {
    ProtoService {
        name: ServiceKey::new(component, service.name()),
        methods: service
            .methods()
            .map(|m| ProtoMethod {
                method_name: m.name().to_string(),
                input_type: m.input().full_name().to_string(),
                output_type: m.output().full_name().to_string(),
            })
            .collect(),
    }
}

/// Orders `main` and its transitive imports so every file follows its dependencies.
fn topological_order(
    main: &str,
    files: &HashMap<&str, &CompiledFile>,
) -> Result<Vec<String>, AssembleError> {
    fn visit(
        name: &str,
        files: &HashMap<&str, &CompiledFile>,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
        out: &mut Vec<String>,
    ) -> Result<(), AssembleError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| p == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(AssembleError::DependencyCycle(cycle));
        }
        let Some(file) = files.get(name) else {
            return Ok(());
        };

        path.push(name.to_string());
        for dependency in &file.dependencies {
            visit(dependency, files, path, done, out)?;
        }
        path.pop();

        done.insert(name.to_string());
        out.push(name.to_string());
        Ok(())
    }

    let mut out = Vec::new();
    visit(main, files, &mut Vec::new(), &mut HashSet::new(), &mut out)?;
    Ok(out)
}

/// Returns the file's descriptor with imports outside the batch removed.
fn without_missing_imports(
    file: &CompiledFile,
    files: &HashMap<&str, &CompiledFile>,
) -> prost_types::FileDescriptorProto {
    let mut descriptor = file.descriptor.clone();
    if descriptor
        .dependency
        .iter()
        .all(|d| files.contains_key(d.as_str()))
    {
        return descriptor;
    }

    let old = std::mem::take(&mut descriptor.dependency);
    let mut remap = HashMap::new();
    for (index, dependency) in old.into_iter().enumerate() {
        if files.contains_key(dependency.as_str()) {
            remap.insert(index as i32, descriptor.dependency.len() as i32);
            descriptor.dependency.push(dependency);
        } else {
            warn!(file = %file.name, %dependency, "import is not part of the compiled batch");
        }
    }
    let reindex = |indices: &[i32]| -> Vec<i32> {
        indices.iter().filter_map(|i| remap.get(i).copied()).collect()
    };
    descriptor.public_dependency = reindex(&descriptor.public_dependency);
    descriptor.weak_dependency = reindex(&descriptor.weak_dependency);
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;
    use echo_service::fixtures;
    use prost::Message;
    use serde_json::json;

    fn router_files() -> Vec<CompiledFile> {
        fixtures::router_files()
            .into_iter()
            .map(CompiledFile::new)
            .collect()
    }

    fn echo_graph() -> DescriptorGraph {
        DescriptorGraph::assemble(fixtures::COMPONENT, fixtures::ECHO_FILE, &router_files())
            .unwrap()
    }

    #[test]
    fn assembles_dependencies_before_main_file() {
        let graph = echo_graph();

        assert_eq!(graph.files(), &["common.proto", "echo.proto"]);
        assert_eq!(graph.dependencies().collect::<Vec<_>>(), vec!["common.proto"]);
    }

    #[test]
    fn extracts_main_file_services_only() {
        let graph = echo_graph();

        assert_eq!(graph.services().len(), 1);
        let echo = graph.service(&ServiceKey::new("router", "Echo")).unwrap();
        let ping = echo.method("Ping").unwrap();
        assert_eq!(ping.input_type, "router.EchoRequest");
        assert_eq!(ping.output_type, "router.EchoResponse");
        assert!(graph.service(&ServiceKey::new("router", "Desk")).is_none());
    }

    #[test]
    fn resolves_methods_by_short_and_full_service_name() {
        let graph = echo_graph();

        assert!(graph.method("Echo", "Ping").is_some());
        assert!(graph.method("router.Echo", "Check").is_some());
        assert!(graph.method("Echo", "Nope").is_none());
    }

    #[test]
    fn rejects_import_cycles() {
        let files: Vec<_> = fixtures::cyclic_files()
            .into_iter()
            .map(CompiledFile::new)
            .collect();

        let err = DescriptorGraph::assemble("cycle", "a.proto", &files).unwrap_err();

        match err {
            AssembleError::DependencyCycle(cycle) => {
                assert_eq!(cycle, vec!["a.proto", "b.proto", "a.proto"])
            }
            other => panic!("Expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn recursive_message_types_assemble() {
        let graph = echo_graph();

        let node = graph.message("router.Node").unwrap();
        let children = node.get_field_by_name("children").unwrap();
        assert_eq!(
            children.kind().as_message().map(|m| m.full_name().to_string()),
            Some("router.Node".to_string())
        );
    }

    #[test]
    fn missing_import_fails_on_unresolved_type() {
        let files = vec![CompiledFile::new(fixtures::echo_file())];

        let err =
            DescriptorGraph::assemble(fixtures::COMPONENT, fixtures::ECHO_FILE, &files).unwrap_err();

        assert!(matches!(err, AssembleError::UnresolvedType { ref file, .. } if file == "echo.proto"));
    }

    #[test]
    fn unknown_main_file_is_reported() {
        let err = DescriptorGraph::assemble("router", "ghost.proto", &router_files()).unwrap_err();

        assert!(matches!(err, AssembleError::MissingMainFile(_)));
    }

    #[test]
    fn rejects_unknown_fields_and_wrong_kinds() {
        let graph = echo_graph();

        let unknown = graph
            .json_to_message("router.EchoRequest", &json!({ "txt": "hi" }))
            .unwrap_err();
        let wrong_kind = graph
            .json_to_message("router.EchoRequest", &json!({ "text": 42 }))
            .unwrap_err();

        for err in [unknown, wrong_kind] {
            match err {
                ConversionError::InvalidJson { type_name, message } => {
                    assert_eq!(type_name, "router.EchoRequest");
                    assert!(!message.is_empty());
                }
                other => panic!("Expected InvalidJson, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_required_field_is_named() {
        let graph = DescriptorGraph::assemble("router", fixtures::LEGACY_FILE, &router_files())
            .unwrap();

        let top = graph
            .json_to_message("router.legacy.Ticket", &json!({}))
            .unwrap_err();
        let nested = graph
            .json_to_message("router.legacy.Ticket", &json!({ "title": "t", "inner": {} }))
            .unwrap_err();

        assert!(matches!(
            top,
            ConversionError::MissingRequiredField { ref field, .. } if field == "title"
        ));
        assert!(matches!(
            nested,
            ConversionError::MissingRequiredField { ref type_name, ref field }
                if type_name == "router.legacy.Inner" && field == "code"
        ));
    }

    #[test]
    fn json_output_keeps_default_fields() {
        let graph = echo_graph();
        let message = graph
            .json_to_message("router.EchoResponse", &json!({}))
            .unwrap();

        let rendered = message_to_json(&message).unwrap();

        assert_eq!(rendered, json!({ "text": "" }));
    }

    #[test]
    fn wire_json_wire_round_trip_preserves_fields() {
        let graph = echo_graph();
        let original = graph
            .json_to_message(
                "router.CheckResponse",
                &json!({
                    "detail": { "info": "x", "next": { "next": { "status": "OK", "note": "n" } } },
                    "nodes": [{ "name": "root", "children": [{ "name": "leaf" }] }]
                }),
            )
            .unwrap();

        let json = message_to_json(&original).unwrap();
        let back = graph.json_to_message("router.CheckResponse", &json).unwrap();

        assert_eq!(back.encode_to_vec(), original.encode_to_vec());
    }

    #[test]
    fn unknown_type_is_reported() {
        let graph = echo_graph();

        let err = graph.json_to_message("router.Ghost", &json!({})).unwrap_err();

        assert!(matches!(err, ConversionError::UnknownType(_)));
    }
}
