use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Separator between the producing component and the service name.
const KEY_SEPARATOR: char = ':';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid service name: '{0}'. Service name must be formatted as 'component:service'")]
pub struct InvalidServiceKey(pub String);

/// Identifies a service declared by a producing component, e.g. `router:Echo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub component: String,
    pub service: String,
}

impl ServiceKey {
    pub fn new(component: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            service: service.into(),
        }
    }
}

impl FromStr for ServiceKey {
    type Err = InvalidServiceKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split(KEY_SEPARATOR);

        match (parts.next(), parts.next(), parts.next()) {
            (Some(component), Some(service), None)
                if !component.trim().is_empty() && !service.trim().is_empty() =>
            {
                Ok(Self::new(component, service))
            }
            _ => Err(InvalidServiceKey(value.to_string())),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.component, KEY_SEPARATOR, self.service)
    }
}

impl Serialize for ServiceKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The signature of one method, as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtoMethod {
    pub method_name: String,
    /// Fully qualified input type, without the leading dot (e.g. `router.EchoRequest`).
    pub input_type: String,
    /// Fully qualified output type, without the leading dot.
    pub output_type: String,
}

/// A service declared by a main schema file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtoService {
    pub name: ServiceKey,
    pub methods: Vec<ProtoMethod>,
}

impl ProtoService {
    pub fn method(&self, name: &str) -> Option<&ProtoMethod> {
        self.methods.iter().find(|m| m.method_name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_component_and_service() {
        let key: ServiceKey = "router:Echo".parse().unwrap();

        assert_eq!(key, ServiceKey::new("router", "Echo"));
        assert_eq!(key.to_string(), "router:Echo");
    }

    #[test]
    fn rejects_keys_without_exactly_one_separator() {
        for raw in ["onlyname", "a:b:c", ":Echo", "router:", "", " : "] {
            assert_eq!(
                raw.parse::<ServiceKey>(),
                Err(InvalidServiceKey(raw.to_string())),
                "'{raw}' should be rejected"
            );
        }
    }

    #[test]
    fn serializes_as_canonical_string() {
        let service = ProtoService {
            name: ServiceKey::new("router", "Echo"),
            methods: vec![ProtoMethod {
                method_name: "Ping".to_string(),
                input_type: "router.EchoRequest".to_string(),
                output_type: "router.EchoResponse".to_string(),
            }],
        };

        assert_eq!(
            serde_json::to_value(&service).unwrap(),
            serde_json::json!({
                "name": "router:Echo",
                "methods": [{
                    "methodName": "Ping",
                    "inputType": "router.EchoRequest",
                    "outputType": "router.EchoResponse"
                }]
            })
        );
    }
}
