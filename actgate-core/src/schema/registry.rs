//! # Dependent Schema Registry
//!
//! Indexes every [`DescriptorGraph`] built for one producing component so that a service or a
//! JSON-Schema lookup resolves across the whole dependency set, not just the file declaring it.
use super::graph::DescriptorGraph;
use super::json_schema::JsonSchemaDoc;
use super::types::{ProtoService, ServiceKey};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Service '{0}' is not declared by any schema of its component")]
    ServiceNotFound(ServiceKey),
    #[error("Method '{method}' is not declared by service '{service}'")]
    MethodNotFound { service: ServiceKey, method: String },
}

/// All descriptor graphs of one producing component.
#[derive(Debug, Clone)]
pub struct DependentSchemaBundle {
    component: String,
    /// Graphs keyed by their main file.
    graphs: BTreeMap<String, DescriptorGraph>,
    /// Main file of the graph declaring each service.
    services: BTreeMap<ServiceKey, String>,
}

impl DependentSchemaBundle {
    pub fn new(component: impl Into<String>, graphs: Vec<DescriptorGraph>) -> Self {
        let component = component.into();
        let mut services = BTreeMap::new();

        for graph in &graphs {
            for service in graph.services() {
                if let Some(first) = services.get(&service.name) {
                    warn!(
                        service = %service.name,
                        kept = %first,
                        ignored = %graph.main_file(),
                        "service declared by more than one file"
                    );
                    continue;
                }
                services.insert(service.name.clone(), graph.main_file().to_string());
            }
        }

        let graphs = graphs
            .into_iter()
            .map(|g| (g.main_file().to_string(), g))
            .collect();

        Self {
            component,
            graphs,
            services,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn list_services(&self) -> Vec<ServiceKey> {
        self.services.keys().cloned().collect()
    }

    /// The graph whose main file declares `key`.
    pub fn graph(&self, key: &ServiceKey) -> Result<&DescriptorGraph, RegistryError> {
        self.services
            .get(key)
            .and_then(|file| self.graphs.get(file))
            .ok_or_else(|| RegistryError::ServiceNotFound(key.clone()))
    }

    pub fn service(&self, key: &ServiceKey) -> Result<&ProtoService, RegistryError> {
        self.graph(key)?
            .service(key)
            .ok_or_else(|| RegistryError::ServiceNotFound(key.clone()))
    }

    /// Every JSON-Schema document reachable from the graph declaring `key`.
    ///
    /// Documents of the files it imports come first. The declaring file's own documents are merged
    /// last, so they win when two files describe the same type name.
    pub fn json_schemas_for(
        &self,
        key: &ServiceKey,
    ) -> Result<BTreeMap<String, JsonSchemaDoc>, RegistryError> {
        let graph = self.graph(key)?;

        let mut docs = BTreeMap::new();
        for dependency in graph.dependencies() {
            if let Some(dependency) = self.graphs.get(dependency) {
                docs.extend(dependency.json_schemas().clone());
            }
        }
        docs.extend(graph.json_schemas().clone());

        Ok(docs)
    }

    /// The input and output documents of one method.
    ///
    /// A type without a generated document gets an empty object schema.
    pub fn method_json_schemas(
        &self,
        key: &ServiceKey,
        method: &str,
    ) -> Result<BTreeMap<String, JsonSchemaDoc>, RegistryError> {
        let signature = self.service(key)?.method(method).ok_or_else(|| {
            RegistryError::MethodNotFound {
                service: key.clone(),
                method: method.to_string(),
            }
        })?;

        let all = self.json_schemas_for(key)?;
        Ok([&signature.input_type, &signature.output_type]
            .into_iter()
            .map(|type_name| {
                let doc = all
                    .get(type_name)
                    .cloned()
                    .unwrap_or_else(|| JsonSchemaDoc::empty(type_name.as_str()));
                (type_name.clone(), doc)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::CompiledFile;
    use echo_service::fixtures;
    use serde_json::json;

    fn doc(type_name: &str, origin: &str) -> JsonSchemaDoc {
        JsonSchemaDoc {
            type_name: type_name.to_string(),
            schema: json!({ "title": type_name, "origin": origin }),
        }
    }

    /// One graph per router file, the way the cache builds them.
    fn bundle() -> DependentSchemaBundle {
        let mut common = CompiledFile::new(fixtures::common_file());
        common.json_schemas = vec![doc("router.Level1", "common"), doc("router.EventID", "common")];
        let mut echo = CompiledFile::new(fixtures::echo_file());
        echo.json_schemas = vec![doc("router.EchoRequest", "echo"), doc("router.Level1", "echo")];
        let legacy = CompiledFile::new(fixtures::legacy_file());

        let batch = vec![common, echo, legacy];
        let graphs = [fixtures::COMMON_FILE, fixtures::ECHO_FILE, fixtures::LEGACY_FILE]
            .into_iter()
            .map(|main| DescriptorGraph::assemble(fixtures::COMPONENT, main, &batch).unwrap())
            .collect();

        DependentSchemaBundle::new(fixtures::COMPONENT, graphs)
    }

    #[test]
    fn lists_services_of_every_file() {
        let bundle = bundle();

        assert_eq!(
            bundle.list_services(),
            vec![ServiceKey::new("router", "Desk"), ServiceKey::new("router", "Echo")]
        );
    }

    #[test]
    fn resolves_the_declaring_graph() {
        let bundle = bundle();

        let graph = bundle.graph(&ServiceKey::new("router", "Echo")).unwrap();

        assert_eq!(graph.main_file(), fixtures::ECHO_FILE);
    }

    #[test]
    fn unknown_service_is_not_found() {
        let bundle = bundle();
        let key = ServiceKey::new("router", "Ghost");

        assert_eq!(
            bundle.graph(&key).unwrap_err(),
            RegistryError::ServiceNotFound(key)
        );
    }

    #[test]
    fn declaring_file_documents_win_over_dependencies() {
        let bundle = bundle();

        let docs = bundle
            .json_schemas_for(&ServiceKey::new("router", "Echo"))
            .unwrap();

        assert_eq!(docs["router.Level1"].schema["origin"], "echo");
        assert_eq!(docs["router.EventID"].schema["origin"], "common");
        assert_eq!(docs["router.EchoRequest"].schema["origin"], "echo");
    }

    #[test]
    fn method_documents_fall_back_to_empty_schemas() {
        let bundle = bundle();

        let docs = bundle
            .method_json_schemas(&ServiceKey::new("router", "Echo"), "Ping")
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs["router.EchoRequest"].schema["origin"], "echo");
        assert_eq!(docs["router.EchoResponse"], JsonSchemaDoc::empty("router.EchoResponse"));
    }

    #[test]
    fn unknown_method_is_not_found() {
        let bundle = bundle();

        let err = bundle
            .method_json_schemas(&ServiceKey::new("router", "Echo"), "Nope")
            .unwrap_err();

        assert!(matches!(err, RegistryError::MethodNotFound { .. }));
    }
}
